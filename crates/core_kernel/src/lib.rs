//! Core Kernel - Foundational types and utilities for the posting engine
//!
//! This crate provides the fundamental building blocks used across all crates:
//! - Strongly-typed, company-scoped identifiers
//! - Decimal amount helpers (pro-rata allocation, zero floor)
//! - Port error and health types shared by every store adapter

pub mod amount;
pub mod identifiers;
pub mod ports;

pub use amount::{allocate_by_ratios, allocate_pro_rata, floor_at_zero, AmountError};
pub use identifiers::*;
pub use ports::{PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth};
