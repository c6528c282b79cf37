//! Request middleware shared by the gateway listeners.

pub mod connect;

pub use connect::reject_connect;
