//! Owner identity resolution.
//!
//! Translates the human-chosen owner name into a canonical identity
//! reference via the Mojang profile directory. Lookups never fail the
//! caller: any error degrades to a sentinel value.

mod resolver;

pub use resolver::{IdentityError, IdentityResolver, MojangClient, MojangConfig, UNRESOLVED_IDENTITY};
