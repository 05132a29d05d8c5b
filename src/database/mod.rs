//! # Database
//!
//! Pool construction from configuration and the schema migration runner used by the
//! `sample-lifecycle-migrate` binary.

pub mod connection;
pub mod migrations;

pub use connection::DatabaseConnection;
pub use migrations::{DatabaseMigrations, Migration, MIGRATION_TABLE};
