//! Test Utilities Crate
//!
//! Shared test infrastructure, fixtures, and helpers for the posting engine
//! test suites.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built reference data (accounts, customers, items, posting groups)
//! - `builders`: Document builders and the [`PostingScenario`] store seeder
//! - `database`: PostgreSQL testcontainer management and state seeding
//! - `assertions`: Ledger assertions (balanced pairs, accounts netting to zero)
//! - `generators`: Property-based invoice line generators
//! - `hooks`: Recording and failing post-commit hooks

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;
pub mod hooks;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
pub use hooks::*;
