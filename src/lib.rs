//! Compatibility gateway for archived web content.
//!
//! Proxy requests are served from the archive backend when it has the
//! content, and otherwise from a local mirror of the legacy document root
//! that fills itself from remote origins on a miss.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resolve;

pub use config::GatewayConfig;
pub use http::{GatewayServer, LegacyServer};
pub use lifecycle::Shutdown;
pub use resolve::FallbackChain;
