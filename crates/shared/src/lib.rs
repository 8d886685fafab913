//! Shared infrastructure for Crewdesk services.
//!
//! Currently this is the database layer: pool construction for regular
//! queries, a separate pool profile for migrations, and the migration
//! runner itself. Both the API server and the worker build on these.

pub mod db;

pub use db::{create_migration_pool, create_pool, run_migrations};
