//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::legacy::LegacySettings;
use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from a file without validating it.
///
/// `.json` files are read as the flat legacy settings document; anything else
/// is TOML in the native schema.
pub fn read_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        let settings: LegacySettings = serde_json::from_str(&content)?;
        Ok(settings.apply_to(GatewayConfig::default()))
    } else {
        Ok(toml::from_str(&content)?)
    }
}

/// Load and validate configuration from a TOML or legacy JSON file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_toml_by_default() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[legacy]\nhtdocs_path = \"/srv/htdocs\"\nport = 23000").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.legacy.htdocs_path, "/srv/htdocs");
        assert_eq!(config.legacy.port, 23000);
    }

    #[test]
    fn loads_legacy_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"legacyHTDOCSPath": "/srv/htdocs", "proxyPort": "23500"}}"#).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.legacy.htdocs_path, "/srv/htdocs");
        assert_eq!(config.proxy.bind_address, "0.0.0.0:23500");
    }

    #[test]
    fn rejects_invalid_config() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[legacy]\nmirrors = [\"nope\"]").unwrap();

        match load_config(file.path()) {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors, vec![ValidationError::InvalidMirror("nope".into())]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
