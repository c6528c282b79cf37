//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Inbound proxy listener.
    pub proxy: ProxyListenerConfig,

    /// Archive content backend (opaque, loopback).
    pub archive: ArchiveConfig,

    /// Legacy document root and remote fallback.
    pub legacy: LegacyConfig,

    /// External script interpreter used in place of the built-in legacy server.
    pub interpreter: InterpreterConfig,

    /// Extension to MIME tables.
    pub mime: MimeConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Inbound proxy listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyListenerConfig {
    /// Bind address (e.g., "0.0.0.0:22500").
    pub bind_address: String,

    /// Maximum request body buffered per inbound request, in bytes.
    pub max_body_size: usize,
}

impl Default for ProxyListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:22500".to_string(),
            max_body_size: 16 * 1024 * 1024,
        }
    }
}

/// Archive content backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Loopback port the archive backend listens on.
    pub port: u16,

    /// Path prefix placed in front of `host+path` on every archive request.
    pub api_prefix: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            port: 22501,
            api_prefix: "content/".to_string(),
        }
    }
}

/// Fallback strategy used once the local mirror misses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FallbackMode {
    /// Walk the configured mirror list.
    #[default]
    Mirrors,
    /// Single live fetch of the original URL.
    Fidelity,
}

impl std::fmt::Display for FallbackMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackMode::Mirrors => write!(f, "mirrors"),
            FallbackMode::Fidelity => write!(f, "fidelity"),
        }
    }
}

/// Legacy document root and remote fallback configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LegacyConfig {
    /// Loopback port of the legacy backend (built-in server or interpreter).
    pub port: u16,

    /// Root of the local mirror of the legacy document root.
    pub htdocs_path: String,

    /// Fallback strategy on local miss.
    pub mode: FallbackMode,

    /// Ordered mirror base URLs; first configured, first tried.
    pub mirrors: Vec<String>,

    /// Ordered index filenames tried for directory-shaped requests.
    pub index_files: Vec<String>,

    /// Run the external script interpreter instead of the built-in legacy server.
    pub use_interpreter_server: bool,

    /// Collapse concurrent remote fetches that target the same local path.
    pub dedupe_fetches: bool,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            port: 22600,
            htdocs_path: "Legacy/htdocs".to_string(),
            mode: FallbackMode::Mirrors,
            mirrors: Vec::new(),
            index_files: vec!["index.html".to_string(), "index.htm".to_string()],
            use_interpreter_server: false,
            dedupe_fetches: false,
        }
    }
}

/// External script interpreter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Interpreter executable, resolved against `working_dir` when relative.
    pub program: String,

    /// Working directory of the spawned interpreter.
    pub working_dir: String,

    /// Router script handed to the interpreter's built-in server.
    pub router_script: String,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            program: "php".to_string(),
            working_dir: "Legacy".to_string(),
            router_script: "router.php".to_string(),
        }
    }
}

/// Extension to MIME mapping with a reserved `"default"` key.
///
/// Keys are lower-cased and stripped of a leading dot when the table is built,
/// so lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "HashMap<String, String>", into = "HashMap<String, String>")]
pub struct MimeTable {
    entries: HashMap<String, String>,
}

impl MimeTable {
    /// Key holding the fallback MIME type.
    pub const DEFAULT_KEY: &'static str = "default";

    /// Look up the MIME type for an extension (with or without a leading dot).
    pub fn get(&self, extension: &str) -> Option<&str> {
        let key = normalize_key(extension);
        self.entries
            .get(&key)
            .map(String::as_str)
            .filter(|mime| !mime.is_empty())
    }

    /// The `"default"` entry, if configured.
    pub fn default_type(&self) -> Option<&str> {
        self.get(Self::DEFAULT_KEY)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize_key(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}

impl From<HashMap<String, String>> for MimeTable {
    fn from(raw: HashMap<String, String>) -> Self {
        let entries = raw
            .into_iter()
            .map(|(ext, mime)| (normalize_key(&ext), mime))
            .collect();
        Self { entries }
    }
}

impl From<MimeTable> for HashMap<String, String> {
    fn from(table: MimeTable) -> Self {
        table.entries
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MimeTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let raw: HashMap<String, String> = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        raw.into()
    }
}

/// The two MIME tables consumed by the gateway.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MimeConfig {
    /// Table used when this engine answers as a content server (legacy server).
    pub archive: MimeTable,

    /// Table applied by the gateway to every final response.
    pub overrides: MimeTable,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Inbound request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Deadline for each outbound request (archive, legacy, mirrors) in seconds.
    pub upstream_secs: u64,

    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 300,
            upstream_secs: 300,
            connect_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Log every proxied request at debug level.
    pub verbose: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            verbose: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
