use std::path::PathBuf;

use shared::models::CaptureMethod;
use thiserror::Error;

const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Submit(SubmitOptions),
    Confirm(ConfirmOptions),
    History(HistoryOptions),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOptions {
    pub user_id: String,
    pub text: String,
    pub time_zone: Option<String>,
    pub capture_method: CaptureMethod,
    pub selection: Selection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmOptions {
    pub user_id: String,
    pub pending_path: PathBuf,
    pub selection: Selection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryOptions {
    pub user_id: String,
    pub limit: usize,
}

/// What to do when the pipeline stops for a product choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Print the pending confirmation and stop.
    Ask,
    /// Confirm with the model's own item.
    Keep,
    Candidate(usize),
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("missing command (expected submit, confirm or history)")]
    MissingCommand,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("unknown argument: {0}")]
    UnknownArgument(String),
    #[error("missing value for argument: {0}")]
    MissingValue(String),
    #[error("missing required argument: {0}")]
    MissingRequired(&'static str),
    #[error("invalid value for {flag}: {value}")]
    InvalidValue { flag: String, value: String },
    #[error("--select and --keep cannot be combined")]
    ConflictingSelection,
    #[error("help requested")]
    HelpRequested,
}

impl Command {
    pub fn parse<I>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut iter = args.into_iter();
        let command = iter.next().ok_or(CliError::MissingCommand)?;
        let flags = Flags::collect(iter)?;

        match command.as_str() {
            "--help" | "-h" | "help" => Err(CliError::HelpRequested),
            "submit" => Ok(Self::Submit(SubmitOptions {
                user_id: required("--user", flags.user.clone())?,
                text: required("--text", flags.text.clone())?,
                time_zone: flags.time_zone.clone(),
                capture_method: flags.capture_method.unwrap_or_default(),
                selection: flags.selection()?,
            })),
            "confirm" => Ok(Self::Confirm(ConfirmOptions {
                user_id: required("--user", flags.user.clone())?,
                pending_path: PathBuf::from(required("--pending", flags.pending.clone())?),
                selection: match flags.selection()? {
                    Selection::Ask => Selection::Keep,
                    other => other,
                },
            })),
            "history" => Ok(Self::History(HistoryOptions {
                user_id: required("--user", flags.user.clone())?,
                limit: flags.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
            })),
            unknown => Err(CliError::UnknownCommand(unknown.to_string())),
        }
    }
}

#[derive(Debug, Default)]
struct Flags {
    user: Option<String>,
    text: Option<String>,
    time_zone: Option<String>,
    capture_method: Option<CaptureMethod>,
    select: Option<usize>,
    keep: bool,
    pending: Option<String>,
    limit: Option<usize>,
}

impl Flags {
    fn collect(mut iter: impl Iterator<Item = String>) -> Result<Self, CliError> {
        let mut flags = Self::default();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--help" | "-h" => return Err(CliError::HelpRequested),
                "--keep" => flags.keep = true,
                "--user" => flags.user = Some(next_value(&mut iter, &arg)?),
                "--text" => flags.text = Some(next_value(&mut iter, &arg)?),
                "--tz" => flags.time_zone = Some(next_value(&mut iter, &arg)?),
                "--pending" => flags.pending = Some(next_value(&mut iter, &arg)?),
                "--capture" => {
                    let value = next_value(&mut iter, &arg)?;
                    flags.capture_method = Some(
                        CaptureMethod::parse(value.trim())
                            .ok_or_else(|| invalid_value(&arg, &value))?,
                    );
                }
                "--select" => {
                    let value = next_value(&mut iter, &arg)?;
                    flags.select = Some(parse_number(&arg, &value)?);
                }
                "--limit" => {
                    let value = next_value(&mut iter, &arg)?;
                    let limit = parse_number(&arg, &value)?;
                    if limit == 0 {
                        return Err(invalid_value(&arg, &value));
                    }
                    flags.limit = Some(limit);
                }
                unknown => return Err(CliError::UnknownArgument(unknown.to_string())),
            }
        }
        Ok(flags)
    }

    fn selection(&self) -> Result<Selection, CliError> {
        match (self.select, self.keep) {
            (Some(_), true) => Err(CliError::ConflictingSelection),
            (Some(index), false) => Ok(Selection::Candidate(index)),
            (None, true) => Ok(Selection::Keep),
            (None, false) => Ok(Selection::Ask),
        }
    }
}

fn required(flag: &'static str, value: Option<String>) -> Result<String, CliError> {
    value.ok_or(CliError::MissingRequired(flag))
}

fn next_value(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, CliError> {
    iter.next()
        .ok_or_else(|| CliError::MissingValue(flag.to_string()))
}

fn parse_number(flag: &str, value: &str) -> Result<usize, CliError> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| invalid_value(flag, value))
}

fn invalid_value(flag: &str, value: &str) -> CliError {
    CliError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{CliError, Command, Selection};
    use shared::models::CaptureMethod;

    fn parse(args: &[&str]) -> Result<Command, CliError> {
        Command::parse(args.iter().map(ToString::to_string))
    }

    #[test]
    fn submit_collects_flags() {
        let command = parse(&[
            "submit",
            "--user",
            "7f1c1f43-9f57-4e5e-9a39-4f3c53c0f5d1",
            "--text",
            "sauna 2-2:25pm",
            "--tz",
            "America/Los_Angeles",
            "--capture",
            "manual",
            "--select",
            "1",
        ])
        .expect("valid submit");

        match command {
            Command::Submit(options) => {
                assert_eq!(options.text, "sauna 2-2:25pm");
                assert_eq!(options.time_zone.as_deref(), Some("America/Los_Angeles"));
                assert_eq!(options.capture_method, CaptureMethod::Manual);
                assert_eq!(options.selection, Selection::Candidate(1));
            }
            other => panic!("expected submit, got {other:?}"),
        }
    }

    #[test]
    fn confirm_defaults_to_keeping_the_model_item() {
        match parse(&["confirm", "--user", "u", "--pending", "pending.json"]).expect("valid") {
            Command::Confirm(options) => assert_eq!(options.selection, Selection::Keep),
            other => panic!("expected confirm, got {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(parse(&[]), Err(CliError::MissingCommand)));
        assert!(matches!(
            parse(&["submit", "--user", "u"]),
            Err(CliError::MissingRequired("--text"))
        ));
        assert!(matches!(
            parse(&["submit", "--user", "u", "--text", "x", "--select", "1", "--keep"]),
            Err(CliError::ConflictingSelection)
        ));
        assert!(matches!(
            parse(&["history", "--user", "u", "--limit", "0"]),
            Err(CliError::InvalidValue { .. })
        ));
        assert!(matches!(parse(&["submit", "--verbose"]), Err(CliError::UnknownArgument(_))));
        assert!(matches!(parse(&["export"]), Err(CliError::UnknownCommand(_))));
    }
}
