mod app;
mod cli;

use cli::{CliError, Command};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_tracing();

    let command = match Command::parse(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(CliError::HelpRequested) => {
            print_usage();
            std::process::exit(0);
        }
        Err(err) => {
            eprintln!("error: {err}");
            eprintln!();
            print_usage();
            std::process::exit(2);
        }
    };

    if let Err(err) = app::run(command).await {
        error!("intake failed: {err}");
        std::process::exit(1);
    }
}

/// Logs go to stderr so stdout carries only the JSON result.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("intake=info,shared=info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_usage() {
    eprintln!(
        "Usage:\n\
         \x20 intake submit --user <uuid> --text <note> [--tz <zone>] [--capture voice|manual|template] [--select N | --keep]\n\
         \x20 intake confirm --user <uuid> --pending <file.json> [--select N]\n\
         \x20 intake history --user <uuid> [--limit N]\n\
         \n\
         Without DATABASE_URL an in-memory store is used.\n\
         submit prints a pending confirmation when candidates need a choice;\n\
         save its `pending` object to a file and pass it to confirm."
    );
}
