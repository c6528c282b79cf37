//! Legacy web gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────┐
//!                      │                    GATEWAY                       │
//!   Proxy client       │  ┌─────────┐      ┌──────────────────┐           │
//!   ───────────────────┼─▶│ gateway │─────▶│ archive backend  │ (< 400)   │
//!                      │  │ server  │      └──────────────────┘           │
//!                      │  └────┬────┘                                     │
//!                      │       │ >= 400 / unreachable                     │
//!                      │       ▼                                          │
//!                      │  ┌─────────────────────┐   ┌────────────────┐    │
//!                      │  │ legacy server       │──▶│ local mirror   │    │
//!                      │  │ (or interpreter)    │   │ (htdocs)       │    │
//!                      │  └─────────┬───────────┘   └────────────────┘    │
//!                      │            │ miss                                │
//!                      │            ▼                                     │
//!                      │  ┌─────────────────────┐                         │
//!                      │  │ mirrors / live URL  │── cache fill ──▶ disk   │
//!                      │  └─────────────────────┘                         │
//!                      └──────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use legacy_gateway::config::{read_config, validate_config, ConfigError, FallbackMode, GatewayConfig};
use legacy_gateway::http::{GatewayServer, LegacyServer};
use legacy_gateway::lifecycle::{self, InterpreterCommand, Shutdown};
use legacy_gateway::observability::{logging, metrics};
use legacy_gateway::resolve::{normalize, Anchor, FallbackChain, HttpOriginClient};

/// Settings file picked up from the working directory when `--config` is absent.
const DEFAULT_SETTINGS: &str = "proxySettings.json";

#[derive(Parser, Debug)]
#[command(name = "legacy-gateway")]
#[command(about = "Compatibility proxy for archived web content", long_about = None)]
struct Cli {
    /// Configuration file (TOML, or the flat JSON settings format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log every proxied request
    #[arg(short)]
    verbose: bool,

    /// Proxy listen port
    #[arg(long)]
    proxy_port: Option<u16>,

    /// Port the legacy server listens on
    #[arg(long)]
    legacy_server_port: Option<u16>,

    /// Run the external script interpreter instead of the built-in legacy server
    #[arg(long)]
    legacy_use_interpreter_server: bool,

    /// Root of the local legacy mirror
    #[arg(long)]
    legacy_htdocs_path: Option<String>,

    /// Directory holding the script interpreter
    #[arg(long)]
    legacy_php_path: Option<String>,

    /// Archive backend port
    #[arg(long)]
    server_http_port: Option<u16>,

    /// Fetch misses live from the original URL instead of the mirror list
    #[arg(long)]
    fidelity: bool,
}

impl Cli {
    fn load(&self) -> Result<GatewayConfig, ConfigError> {
        match &self.config {
            Some(path) => read_config(path),
            None if Path::new(DEFAULT_SETTINGS).is_file() => read_config(Path::new(DEFAULT_SETTINGS)),
            None => Ok(GatewayConfig::default()),
        }
    }

    /// Flags win over file values.
    fn apply(&self, config: &mut GatewayConfig) {
        if self.verbose {
            config.observability.verbose = true;
        }
        if let Some(port) = self.proxy_port {
            config.proxy.bind_address = match config.proxy.bind_address.parse::<SocketAddr>() {
                Ok(mut addr) => {
                    addr.set_port(port);
                    addr.to_string()
                }
                Err(_) => format!("0.0.0.0:{port}"),
            };
        }
        if let Some(port) = self.legacy_server_port {
            config.legacy.port = port;
        }
        if self.legacy_use_interpreter_server {
            config.legacy.use_interpreter_server = true;
        }
        if let Some(path) = &self.legacy_htdocs_path {
            config.legacy.htdocs_path = path.clone();
        }
        if let Some(path) = &self.legacy_php_path {
            config.interpreter.working_dir = path.clone();
        }
        if let Some(port) = self.server_http_port {
            config.archive.port = port;
        }
        if self.fidelity {
            config.legacy.mode = FallbackMode::Fidelity;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = cli.load()?;
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.observability)?;
    tracing::info!("legacy-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let htdocs = normalize(&config.legacy.htdocs_path, "", Anchor::Executable);
    tracing::info!(
        proxy = %config.proxy.bind_address,
        archive_port = config.archive.port,
        legacy_port = config.legacy.port,
        htdocs = %htdocs.display(),
        mode = %config.legacy.mode,
        mirrors = config.legacy.mirrors.len(),
        interpreter = config.legacy.use_interpreter_server,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    lifecycle::spawn_signal_handler(shutdown.clone());

    let legacy_task = if config.legacy.use_interpreter_server {
        let command = InterpreterCommand::from_config(&config.interpreter, config.legacy.port);
        let rx = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = lifecycle::supervise(command, rx).await {
                tracing::error!(error = %e, "Interpreter failed");
            }
        })
    } else {
        let client = HttpOriginClient::new(
            Duration::from_secs(config.timeouts.connect_secs),
            Duration::from_secs(config.timeouts.upstream_secs),
        )?;
        let chain = FallbackChain::from_config(&config.legacy, htdocs, Arc::new(client));
        let server = LegacyServer::new(Arc::new(chain), &config);
        let listener = TcpListener::bind(("127.0.0.1", config.legacy.port)).await?;
        let rx = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = server.run(listener, rx).await {
                tracing::error!(error = %e, "Legacy server failed");
            }
        })
    };

    let listener = TcpListener::bind(&config.proxy.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for proxy connections");
    let gateway = GatewayServer::new(&config)?;
    let result = gateway.run(listener, shutdown.subscribe()).await;

    shutdown.trigger();
    let _ = legacy_task.await;
    tracing::info!("Shutdown complete");
    Ok(result?)
}
