//! Domain Adapters
//!
//! Adapter implementations of the posting domain ports, connecting them to
//! the PostgreSQL repository layer.
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresPostingStore;
//! use domain_posting::PostingStore;
//!
//! let store = PostgresPostingStore::new(pool);
//! let invoice = store.sales_invoice(company_id, invoice_id).await?;
//! ```

pub mod posting;

pub use posting::{PostgresPostingStore, PgLedgerTransaction};
