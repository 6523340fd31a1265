//! SQLite storage for the craftdock daemon.
//!
//! `db.rs` owns the pool and migrations, `models.rs` the row types, and
//! `queries.rs` the request and notification-job queries.

pub mod db;
pub mod models;
pub mod queries;


pub use db::{Database, DatabaseError};
pub use models::{NewRequest, NotificationJob, RequestStatus, ServerRequest};
