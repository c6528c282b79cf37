//! Content resolution engine.
//!
//! # Data Flow
//! ```text
//! RequestTarget (host + path)
//!     → path.rs (ResolvedPath::under: contain under the mirror root)
//!     → local.rs (LocalStore: file, or directory via index.rs)
//!     → chain.rs (FallbackChain: local → fidelity | mirror list)
//!         → origin.rs (OriginFetcher: fetch, then cache fill to disk)
//!     → ContentCandidate (Local | Remote | Miss)
//! ```
//!
//! # Design Decisions
//! - Existence on disk is the only record of what has been mirrored
//! - Misses are values, not errors; only local I/O failures abort a lookup
//! - Request-derived paths never leave the root

pub mod chain;
pub mod index;
pub mod local;
pub mod origin;
pub mod path;
pub mod types;

pub use chain::{FallbackChain, Resolution};
pub use index::find_index;
pub use local::LocalStore;
pub use origin::{HttpOriginClient, OriginClient, OriginFetcher, OriginResponse};
pub use path::{normalize, Anchor, ResolvedPath};
pub use types::{
    ContentCandidate, FetchError, LocalHit, PathEscape, RemoteHit, ResolveError, Served,
};
