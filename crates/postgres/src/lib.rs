//! PostgreSQL storage adapter.
//!
//! Schema lives in the workspace `migrations/` directory. Each document has an
//! anchor row in `documents`; appending a version locks that row, so the
//! staleness check and the insert commit together.

pub mod rows;
pub mod store;

pub use store::PgStore;

/// Embedded workspace migrations.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");
