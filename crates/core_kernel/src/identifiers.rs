//! Strongly-typed identifiers for domain entities
//!
//! Using newtype wrappers around UUIDs provides type safety and prevents
//! accidental mixing of different identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates a new time-ordered identifier (v7)
            pub fn new_v7() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Returns the identifier prefix for display
            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                // Strip prefix if present
                let uuid_str = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(uuid_str)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

// Tenancy and actors
define_id!(CompanyId, "CO");
define_id!(UserId, "USR");

// Reference data
define_id!(ItemId, "ITM");
define_id!(ItemPostingGroupId, "IPG");
define_id!(LocationId, "LOC");
define_id!(ShelfId, "SHF");
define_id!(CustomerId, "CUS");
define_id!(CustomerTypeId, "CTY");
define_id!(AccountingPeriodId, "PER");

// Sales documents
define_id!(SalesInvoiceId, "SINV");
define_id!(SalesInvoiceLineId, "SINVL");
define_id!(ShipmentId, "SHP");
define_id!(ShipmentLineId, "SHPL");

// Orders and production
define_id!(SalesOrderId, "SO");
define_id!(SalesOrderLineId, "SOL");
define_id!(PurchaseOrderId, "PO");
define_id!(PurchaseOrderLineId, "POL");
define_id!(WarehouseTransferId, "WT");
define_id!(WarehouseTransferLineId, "WTL");
define_id!(JobId, "JOB");
define_id!(JobOperationId, "JOP");

// Ledgers
define_id!(JournalId, "JNL");
define_id!(JournalLineId, "JNLL");
define_id!(JournalLineReference, "JLR");
define_id!(ItemLedgerId, "ILE");
define_id!(TrackedEntityId, "TE");
define_id!(TrackedActivityId, "TA");
