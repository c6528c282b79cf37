//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate mirror URLs and index filenames
//! - Validate value ranges (timeouts > 0, ports valid and distinct)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("mirror {0:?} is not an absolute http(s) URL")]
    InvalidMirror(String),

    #[error("index filename {0:?} must be a plain file name")]
    InvalidIndexName(String),

    #[error("port for {0} must be non-zero")]
    ZeroPort(&'static str),

    #[error("{0} and {1} share port {2}")]
    PortConflict(&'static str, &'static str, u16),

    #[error("legacy.htdocs_path must not be empty")]
    EmptyHtdocsPath,

    #[error("interpreter.program must not be empty when legacy.use_interpreter_server is set")]
    EmptyInterpreterProgram,

    #[error("timeout {0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("proxy.bind_address {0:?} is not a socket address")]
    InvalidBindAddress(String),
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for mirror in &config.legacy.mirrors {
        let valid = Url::parse(mirror)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
            .unwrap_or(false);
        if !valid {
            errors.push(ValidationError::InvalidMirror(mirror.clone()));
        }
    }

    for name in &config.legacy.index_files {
        if name.trim().is_empty() || matches!(name.as_str(), "." | "..") || name.contains(['/', '\\']) {
            errors.push(ValidationError::InvalidIndexName(name.clone()));
        }
    }

    let proxy_port = match config.proxy.bind_address.parse::<std::net::SocketAddr>() {
        Ok(addr) => Some(addr.port()),
        Err(_) => {
            errors.push(ValidationError::InvalidBindAddress(
                config.proxy.bind_address.clone(),
            ));
            None
        }
    };

    let mut ports = vec![
        ("archive.port", config.archive.port),
        ("legacy.port", config.legacy.port),
    ];
    if let Some(port) = proxy_port {
        ports.insert(0, ("proxy.bind_address", port));
    }
    for &(name, port) in &ports {
        if port == 0 {
            errors.push(ValidationError::ZeroPort(name));
        }
    }
    for (i, &(a, pa)) in ports.iter().enumerate() {
        for &(b, pb) in &ports[i + 1..] {
            if pa == pb && pa != 0 {
                errors.push(ValidationError::PortConflict(a, b, pa));
            }
        }
    }

    if config.legacy.htdocs_path.trim().is_empty() {
        errors.push(ValidationError::EmptyHtdocsPath);
    }

    if config.legacy.use_interpreter_server && config.interpreter.program.trim().is_empty() {
        errors.push(ValidationError::EmptyInterpreterProgram);
    }

    let timeouts = [
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("timeouts.upstream_secs", config.timeouts.upstream_secs),
        ("timeouts.connect_secs", config.timeouts.connect_secs),
    ];
    for (name, secs) in timeouts {
        if secs == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
