//! Database connection and initialization.

pub use craftdock_core::db::DatabaseError;

craftdock_core::define_database!(Database, "Database migrations complete");
