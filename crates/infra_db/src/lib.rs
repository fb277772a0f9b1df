//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the posting engine, using SQLx.
//!
//! # Architecture
//!
//! - [`repositories::posting`] holds row types and SQL, written against any
//!   `PgExecutor` so the same statement serves pool reads and transactional
//!   writes
//! - [`adapters::PostgresPostingStore`] implements the engine's store ports on
//!   top of those queries
//! - [`pool`] builds the connection pool and runs the embedded migrations
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresPostingStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/posting")).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresPostingStore::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{DatabasePool, create_pool, run_migrations, DatabaseConfig};
pub use error::DatabaseError;
pub use adapters::{PostgresPostingStore, PgLedgerTransaction};
