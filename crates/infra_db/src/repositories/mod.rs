//! Repository implementations
//!
//! SQL queries and row types, mapped to and from posting domain types.
//! Stored labels that have no domain counterpart surface as
//! `DatabaseError::Unmappable` instead of being coerced.

pub mod posting;
