//! Flat JSON settings document understood by older launchers.
//!
//! Keys are camelCase and every value is optional; anything absent keeps the
//! `GatewayConfig` default.

use std::collections::HashMap;

use serde::Deserialize;

use crate::config::schema::{FallbackMode, GatewayConfig, MimeTable};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LegacySettings {
    #[serde(rename = "legacyHTDOCSPath")]
    pub legacy_htdocs_path: Option<String>,
    #[serde(rename = "legacyPHPPath")]
    pub legacy_php_path: Option<String>,
    #[serde(rename = "legacyUsePHPServer")]
    pub legacy_use_php_server: Option<bool>,
    pub verbose_logging: Option<bool>,
    pub proxy_port: Option<PortValue>,
    pub legacy_server_port: Option<PortValue>,
    #[serde(rename = "serverHTTPPort")]
    pub server_http_port: Option<PortValue>,
    pub external_file_paths: Option<Vec<String>>,
    pub ext_mime_types: Option<HashMap<String, String>>,
    #[serde(rename = "useMad4FP")]
    pub use_mad4fp: Option<bool>,
}

/// Ports appear both as strings and as numbers in the wild.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(u16),
    Text(String),
}

impl PortValue {
    fn port(&self) -> Option<u16> {
        match self {
            PortValue::Number(n) => Some(*n),
            PortValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl LegacySettings {
    /// Overlay these settings onto `base`.
    ///
    /// A port string that does not parse keeps the base value and is logged.
    pub fn apply_to(self, mut base: GatewayConfig) -> GatewayConfig {
        if let Some(path) = self.legacy_htdocs_path {
            base.legacy.htdocs_path = path;
        }
        if let Some(path) = self.legacy_php_path {
            base.interpreter.working_dir = path;
        }
        if let Some(enabled) = self.legacy_use_php_server {
            base.legacy.use_interpreter_server = enabled;
        }
        if let Some(verbose) = self.verbose_logging {
            base.observability.verbose = verbose;
        }
        if let Some(port) = self.proxy_port.as_ref().and_then(|p| parse_port("proxyPort", p)) {
            base.proxy.bind_address = format!("0.0.0.0:{port}");
        }
        if let Some(port) = self
            .legacy_server_port
            .as_ref()
            .and_then(|p| parse_port("legacyServerPort", p))
        {
            base.legacy.port = port;
        }
        if let Some(port) = self
            .server_http_port
            .as_ref()
            .and_then(|p| parse_port("serverHTTPPort", p))
        {
            base.archive.port = port;
        }
        if let Some(mirrors) = self.external_file_paths {
            base.legacy.mirrors = mirrors;
        }
        if let Some(types) = self.ext_mime_types {
            let table = MimeTable::from(types);
            base.mime.archive = table.clone();
            base.mime.overrides = table;
        }
        if let Some(fidelity) = self.use_mad4fp {
            base.legacy.mode = if fidelity {
                FallbackMode::Fidelity
            } else {
                FallbackMode::Mirrors
            };
        }
        base
    }
}

fn parse_port(key: &str, value: &PortValue) -> Option<u16> {
    let port = value.port();
    if port.is_none() {
        tracing::warn!(key, value = ?value, "Ignoring unparsable port in settings");
    }
    port
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_flat_settings() {
        let raw = r#"{
            "legacyHTDOCSPath": "D:\\Legacy\\htdocs",
            "legacyPHPPath": "D:\\Legacy",
            "legacyUsePHPServer": true,
            "proxyPort": "22500",
            "legacyServerPort": 22650,
            "serverHTTPPort": "22501",
            "externalFilePaths": ["http://mirror.example/htdocs"],
            "extMimeTypes": {"swf": "application/x-shockwave-flash", "default": "text/plain"},
            "useMad4FP": false,
            "allowCrossDomain": true
        }"#;
        let settings: LegacySettings = serde_json::from_str(raw).unwrap();
        let config = settings.apply_to(GatewayConfig::default());

        assert_eq!(config.legacy.htdocs_path, "D:\\Legacy\\htdocs");
        assert_eq!(config.interpreter.working_dir, "D:\\Legacy");
        assert!(config.legacy.use_interpreter_server);
        assert_eq!(config.proxy.bind_address, "0.0.0.0:22500");
        assert_eq!(config.legacy.port, 22650);
        assert_eq!(config.archive.port, 22501);
        assert_eq!(config.legacy.mirrors, vec!["http://mirror.example/htdocs"]);
        assert_eq!(config.mime.overrides.get("SWF"), Some("application/x-shockwave-flash"));
        assert_eq!(config.mime.archive.default_type(), Some("text/plain"));
        assert_eq!(config.legacy.mode, FallbackMode::Mirrors);
    }

    #[test]
    fn absent_keys_keep_defaults() {
        let settings: LegacySettings = serde_json::from_str(r#"{"useMad4FP": true}"#).unwrap();
        let config = settings.apply_to(GatewayConfig::default());

        assert_eq!(config.legacy.mode, FallbackMode::Fidelity);
        assert_eq!(config.legacy.port, 22600);
        assert_eq!(config.legacy.index_files, vec!["index.html", "index.htm"]);
    }

    #[test]
    fn bad_port_string_keeps_default() {
        let settings: LegacySettings =
            serde_json::from_str(r#"{"legacyServerPort": "twenty"}"#).unwrap();
        let config = settings.apply_to(GatewayConfig::default());
        assert_eq!(config.legacy.port, 22600);
    }
}
