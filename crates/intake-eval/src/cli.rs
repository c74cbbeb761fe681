use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    Mocked,
    Live,
}

impl EvalMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mocked => "mocked",
            Self::Live => "live",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CliOptions {
    pub mode: EvalMode,
    pub case_filter: Option<String>,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("unknown argument: {0}")]
    UnknownArgument(String),
    #[error("missing value for argument: {0}")]
    MissingValue(String),
    #[error("invalid --mode value: {0}")]
    InvalidMode(String),
    #[error("help requested")]
    HelpRequested,
}

impl CliOptions {
    pub fn parse<I>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut mode = EvalMode::Mocked;
        let mut case_filter = None;

        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--help" | "-h" => return Err(CliError::HelpRequested),
                "--mode" => {
                    let value = iter.next().ok_or(CliError::MissingValue(arg.clone()))?;
                    mode = parse_mode(&value)?;
                }
                "--case" => {
                    let value = iter.next().ok_or(CliError::MissingValue(arg.clone()))?;
                    case_filter = Some(value.trim().to_string());
                }
                unknown => return Err(CliError::UnknownArgument(unknown.to_string())),
            }
        }

        Ok(Self { mode, case_filter })
    }
}

fn parse_mode(value: &str) -> Result<EvalMode, CliError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "mocked" => Ok(EvalMode::Mocked),
        "live" => Ok(EvalMode::Live),
        _ => Err(CliError::InvalidMode(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::{CliError, CliOptions, EvalMode};

    #[test]
    fn defaults_to_mocked_mode() {
        let options = CliOptions::parse(Vec::<String>::new()).expect("empty args are valid");
        assert_eq!(options.mode, EvalMode::Mocked);
        assert!(options.case_filter.is_none());
    }

    #[test]
    fn parses_mode_and_case_filter() {
        let options = CliOptions::parse(
            ["--mode", "LIVE", "--case", "sauna_time_range"]
                .iter()
                .map(ToString::to_string),
        )
        .expect("valid args");
        assert_eq!(options.mode, EvalMode::Live);
        assert_eq!(options.case_filter.as_deref(), Some("sauna_time_range"));

        assert!(matches!(
            CliOptions::parse(["--mode".to_string()]),
            Err(CliError::MissingValue(_))
        ));
        assert!(matches!(
            CliOptions::parse(["--mode".to_string(), "replay".to_string()]),
            Err(CliError::InvalidMode(_))
        ));
    }
}
