//! # Database Operations
//!
//! Connection pooling and the embedded schema migrations for the delivery
//! ledger and the appointment flag.

pub mod connection;
pub mod migrations;

pub use connection::DatabaseConnection;
pub use migrations::DatabaseMigrations;
