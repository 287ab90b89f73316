//! Config command implementation.
//!
//! Reports on the effective configuration: defaults, then the `--config`
//! file, then `ZEPHYR_*` environment overrides.

use crate::actions::ConfigAction;
use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};
use zephyr_core::Config;
use zephyr_core::cli::{ExitCode, OutputFormat};

/// Outcome of `zephyr config validate`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValidationReport {
    /// Whether the configuration can be served
    pub valid: bool,
    /// Config file that was checked, if any
    pub source: Option<String>,
    /// Selected transport protocol, when the configuration loaded
    pub transport: Option<String>,
    /// Every problem found
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// Builds the report for a load outcome.
    #[must_use]
    pub fn new(source: Option<&Path>, loaded: &zephyr_core::Result<Config>) -> Self {
        let source = source.map(|p| p.display().to_string());
        match loaded {
            Ok(config) => Self {
                valid: true,
                source,
                transport: Some(config.transport.protocol.clone()),
                errors: Vec::new(),
            },
            Err(e) => Self {
                valid: false,
                source,
                transport: None,
                errors: vec![e.to_string()],
            },
        }
    }
}

/// Runs a config action.
///
/// `validate` exits with [`ExitCode::INVALID_INPUT`] when the
/// configuration is invalid; `show` does the same after reporting the
/// error.
///
/// # Errors
///
/// Returns an error if output formatting fails.
pub fn run(
    action: ConfigAction,
    source: Option<&Path>,
    loaded: zephyr_core::Result<Config>,
    output_format: OutputFormat,
) -> Result<ExitCode> {
    match action {
        ConfigAction::Validate => {
            let report = ValidationReport::new(source, &loaded);
            println!("{}", crate::formatters::format_output(&report, output_format)?);
            if report.valid {
                info!("configuration is valid");
                Ok(ExitCode::SUCCESS)
            } else {
                warn!(errors = report.errors.len(), "configuration is invalid");
                Ok(ExitCode::INVALID_INPUT)
            }
        }
        ConfigAction::Show => match loaded {
            Ok(config) => {
                println!("{}", crate::formatters::format_output(&config, output_format)?);
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("Error: {e}");
                Ok(ExitCode::INVALID_INPUT)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_for_valid_config() {
        let report = ValidationReport::new(Some(Path::new("zephyr.yaml")), &Ok(Config::default()));
        assert!(report.valid);
        assert_eq!(report.source.as_deref(), Some("zephyr.yaml"));
        assert_eq!(report.transport.as_deref(), Some("stdio"));
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_validate_exit_codes() {
        let ok = run(
            ConfigAction::Validate,
            None,
            Ok(Config::default()),
            OutputFormat::Json,
        )
        .unwrap();
        assert_eq!(ok, ExitCode::SUCCESS);

        let mut config = Config::default();
        config.transport.protocol = "carrier-pigeon".to_string();
        let invalid = config.validate().map(|()| config);
        let code = run(ConfigAction::Validate, None, invalid, OutputFormat::Text).unwrap();
        assert_eq!(code, ExitCode::INVALID_INPUT);
    }

    #[test]
    fn test_show_reports_load_failure() {
        let missing = Config::load(Some(Path::new("/nonexistent/zephyr.yaml")));
        let code = run(ConfigAction::Show, None, missing, OutputFormat::Json).unwrap();
        assert_eq!(code, ExitCode::INVALID_INPUT);
    }
}
