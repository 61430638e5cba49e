//! `btpi config` command handler

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use btpi_core::config::BtpiConfig;
use btpi_core::error::BtpiError;
use btpi_core::secrets::{EnvFile, mask};

use crate::cli::{ConfigAction, ConfigArgs};
use crate::commands::effective_config;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

const SECTIONS: [&str; 5] = ["general", "network", "deploy", "services", "env"];

/// Execute the `config` command.
///
/// `loaded` is the result of loading `config_path` at startup. `validate`
/// reports its error; `show` falls back to defaults when the file is missing.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    loaded: Result<BtpiConfig, BtpiError>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, loaded, writer),
        ConfigAction::Show { section } => {
            let config = effective_config(loaded)?;
            execute_show(config_path, &config, section, writer).await
        }
    }
}

/// Execute the config validate subcommand.
///
/// A missing file is an error here, unlike every other command.
///
/// # Errors
///
/// Returns `CliError::Config` if validation fails (missing file, invalid values, parse errors).
fn execute_validate(
    config_path: &Path,
    loaded: Result<BtpiConfig, BtpiError>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let report = ConfigValidationReport {
        source: config_path.display().to_string(),
        valid: loaded.is_ok(),
        errors: loaded.err().map(|e| vec![e.to_string()]).unwrap_or_default(),
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }

    Ok(())
}

/// Execute the config show subcommand.
///
/// Secrets from the `.env` file are masked.
///
/// # Errors
///
/// Returns `CliError::Command` if the section name is unknown.
async fn execute_show(
    config_path: &Path,
    config: &BtpiConfig,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let env = EnvFile::load(config.env_file_path()).await?;
    let masked = masked_env(&env);

    let report = match section.as_deref() {
        None => {
            let mut text = to_toml(config);
            if !masked.is_empty() {
                text.push_str("\n[env]\n");
                text.push_str(&to_toml(&masked));
            }
            let mut values = serde_json::to_value(config)?;
            values["env"] = serde_json::to_value(&masked)?;
            ConfigReport {
                source: config_path.display().to_string(),
                section: None,
                values,
                config_toml: text,
            }
        }
        Some("general") => ConfigReport::section(config_path, "general", &config.general)?,
        Some("network") => ConfigReport::section(config_path, "network", &config.network)?,
        Some("deploy") => ConfigReport::section(config_path, "deploy", &config.deploy)?,
        Some("services") => ConfigReport::section(config_path, "services", &config.services)?,
        Some("env") => ConfigReport::section(config_path, "env", &masked)?,
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {} (expected: {})",
                other,
                SECTIONS.join(", ")
            )));
        }
    };

    writer.render(&report)?;

    Ok(())
}

fn masked_env(env: &EnvFile) -> BTreeMap<String, String> {
    env.iter()
        .map(|(key, value)| (key.to_owned(), mask(value)))
        .collect()
}

fn to_toml<T: Serialize + ?Sized>(value: &T) -> String {
    toml::to_string_pretty(value).unwrap_or_else(|e| format!("(serialization error: {})", e))
}

/// Configuration display report.
///
/// `config_toml` is used for text rendering only; JSON output carries `values`.
#[derive(Serialize)]
pub struct ConfigReport {
    /// Configuration file path
    pub source: String,
    /// Optional section name (None = full config)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Effective values with secrets masked
    pub values: serde_json::Value,
    #[serde(skip)]
    pub config_toml: String,
}

impl ConfigReport {
    fn section<T: Serialize>(
        config_path: &Path,
        name: &str,
        value: &T,
    ) -> Result<Self, CliError> {
        Ok(Self {
            source: config_path.display().to_string(),
            section: Some(name.to_owned()),
            values: serde_json::to_value(value)?,
            config_toml: to_toml(value),
        })
    }
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{}]", section);
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;

        Ok(())
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    /// Configuration file path
    pub source: String,
    pub valid: bool,
    /// Validation error messages (empty if valid)
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btpi_core::error::ConfigError;

    #[test]
    fn test_config_report_render_text_section() {
        let config = BtpiConfig::default();
        let report = ConfigReport::section(Path::new("/etc/btpi.toml"), "network", &config.network)
            .expect("section should serialize");

        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("[network]"), "should show section name");
        assert!(output.contains("btpi-network"), "should show config content");
    }

    #[test]
    fn test_config_report_json_carries_values() {
        let config = BtpiConfig::default();
        let report = ConfigReport::section(Path::new("btpi.toml"), "deploy", &config.deploy)
            .expect("section should serialize");

        let json = serde_json::to_value(&report).expect("JSON serialization should succeed");
        assert_eq!(json["section"].as_str(), Some("deploy"));
        assert_eq!(json["values"]["mode"].as_str(), Some("full"));
        assert!(json.get("config_toml").is_none(), "config_toml should be skipped");
    }

    #[test]
    fn test_masked_env_hides_values() {
        let mut env = EnvFile::new();
        env.set("WAZUH_API_PASSWORD", "S3cret.Value").expect("valid key");
        let masked = masked_env(&env);
        assert_eq!(masked["WAZUH_API_PASSWORD"], "S3**********");
    }

    #[test]
    fn test_validate_reports_load_error() {
        let writer = OutputWriter::new(crate::cli::OutputFormat::Json);
        let loaded = Err(BtpiError::Config(ConfigError::FileNotFound {
            path: "missing.toml".to_owned(),
        }));
        let err = execute_validate(Path::new("missing.toml"), loaded, &writer)
            .expect_err("missing file is invalid");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_config_validation_report_invalid() {
        let report = ConfigValidationReport {
            source: "bad.toml".to_owned(),
            valid: false,
            errors: vec!["invalid config value for 'deploy.mode'".to_owned()],
        };

        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("INVALID"));
        assert!(output.contains("deploy.mode"));
    }
}
