//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Proxy client
//!     → server.rs (Axum setup, request ID, CONNECT rejection)
//!     → request.rs (buffer body, capture host/path/query)
//!     → archive backend ── status < 400 ──────────────┐
//!         └─ >= 400 / unreachable → legacy backend ───┤
//!                (legacy.rs or external interpreter)  │
//!     → mime.rs (Content-Type negotiation)  ◀─────────┘
//!     → response.rs (relay, stream body)
//!     → Send to client
//! ```

pub mod legacy;
pub mod middleware;
pub mod mime;
pub mod request;
pub mod response;
pub mod server;

pub use legacy::LegacyServer;
pub use request::{RequestTarget, LOCAL_FILENAME_HEADER};
pub use server::{GatewayServer, GatewayState};
