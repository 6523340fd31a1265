//! craftdock Protocol Buffers
//!
//! Generated protobuf code for the craftdock gRPC API.
//!
//! This crate contains `RequestService`, the operator-facing surface for the
//! server-request lifecycle (submit, approve, deny, decommission,
//! list-pending).

#![allow(clippy::derive_partial_eq_without_eq)]

/// craftdock v1 API definitions.
///
/// All generated types and services are included here.
pub mod v1 {
    tonic::include_proto!("craftdock.v1");
}

// Re-export v1 as the default API version for convenience
pub use v1::*;

// Re-export prost_types for downstream crates that need Timestamp conversion
pub use prost_types;
