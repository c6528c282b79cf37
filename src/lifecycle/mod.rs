//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     broadcast → gateway server (graceful drain)
//!               → legacy server (graceful drain)
//!               → interpreter.rs (kill child process)
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; every long-running task owns a receiver
//! - The interpreter and the built-in legacy server are mutually exclusive

pub mod interpreter;
pub mod shutdown;
pub mod signals;

pub use interpreter::{supervise, InterpreterCommand};
pub use shutdown::Shutdown;
pub use signals::{spawn_signal_handler, wait_for_signal};
