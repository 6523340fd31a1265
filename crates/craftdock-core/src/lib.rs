//! craftdock Core Library
//!
//! Shared functionality for craftdock components:
//! - Sanitization and validation of user-supplied request fields
//! - Deterministic request-id to VM/IP allocation
//! - Shared database helpers
//! - Tracing initialization

pub mod alloc;
pub mod db;
pub mod sanitize;
pub mod tracing_init;
pub mod validate;

pub use alloc::{AllocError, Allocation, Allocator, SEQUENCE_FLOOR};
pub use sanitize::{normalize_enum, sanitize};
pub use validate::ValidationError;
