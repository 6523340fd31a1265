//! Proxy routing-table integration.
//!
//! The player-facing proxy routes connections by server name from a TOML
//! configuration file. The registry rewrites that file and triggers a
//! reload so the proxy picks the change up.

mod registry;

pub use registry::{RouteError, RouteRegistry, VelocityConfig, VelocityRegistry};
