//! TCP Proxy
//!
//! A transparent TCP relay: accepts one client at a time, connects it to a fixed
//! upstream and copies bytes unmodified in both directions until either side
//! closes or fails.

pub mod buffer;
pub mod config;
pub mod proxy;
pub mod relay;
pub mod resolver;
pub mod stream;

#[cfg(test)]
mod mock;

// Re-export commonly used types and functions
pub use buffer::{BUFFER_SIZE, DirectionalBuffer};
pub use config::{Config, ConfigError, ListenConfig, TargetConfig, USAGE};
pub use proxy::{Proxy, handle_connection};
pub use relay::{Session, SessionEnd, SessionSummary, Side};
pub use resolver::{resolve_dialer, resolve_listener};
pub use stream::{RelaySocket, prepare};
