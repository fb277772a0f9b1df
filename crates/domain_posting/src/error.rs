//! Posting domain errors

use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::{JournalLineReference, PortError};

/// Errors that can abort a posting or void run
///
/// Every variant is fatal for the run it occurs in. Nothing raised while
/// building or applying ledger effects is swallowed.
#[derive(Debug, Error)]
pub enum PostingError {
    /// A document, item, cost, customer or posting group could not be read
    #[error("Failed to fetch {entity}: {id}")]
    Lookup {
        entity: String,
        id: String,
    },

    /// The document is not in a state that allows the requested operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A line type or source document kind outside the supported set
    #[error("Unsupported {kind}: {value}")]
    UnsupportedType {
        kind: String,
        value: String,
    },

    /// The apply or reversal transaction failed and was rolled back
    #[error("Transaction failed: {0}")]
    Transaction(#[source] PortError),

    /// Journal lines sharing one reference do not net to zero
    #[error("Unbalanced journal line reference {reference}: amounts sum to {sum}")]
    Unbalanced {
        reference: JournalLineReference,
        sum: Decimal,
    },

    /// A read outside the transaction failed for a reason other than a missing row
    #[error("Store error: {0}")]
    Store(#[source] PortError),
}

impl PostingError {
    /// Creates a lookup error for a missing entity
    pub fn lookup(entity: impl Into<String>, id: impl std::fmt::Display) -> Self {
        PostingError::Lookup {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        PostingError::InvalidState(message.into())
    }

    /// Creates an unsupported type error
    pub fn unsupported(kind: impl Into<String>, value: impl Into<String>) -> Self {
        PostingError::UnsupportedType {
            kind: kind.into(),
            value: value.into(),
        }
    }

    /// Maps a read failure onto the taxonomy
    ///
    /// Missing rows become `Lookup` errors naming `entity`; everything else
    /// is a store failure.
    pub fn from_read(entity: &str, id: impl std::fmt::Display, error: PortError) -> Self {
        if error.is_not_found() {
            PostingError::lookup(entity, id)
        } else {
            PostingError::Store(error)
        }
    }

    /// Stable machine-readable name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            PostingError::Lookup { .. } => "lookup",
            PostingError::InvalidState(_) => "invalid_state",
            PostingError::UnsupportedType { .. } => "unsupported_type",
            PostingError::Transaction(_) => "transaction",
            PostingError::Unbalanced { .. } => "unbalanced",
            PostingError::Store(_) => "store",
        }
    }

    /// Returns true when the caller asked for something the document does not allow
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            PostingError::InvalidState(_) | PostingError::UnsupportedType { .. }
        )
    }
}

impl From<PortError> for PostingError {
    fn from(error: PortError) -> Self {
        PostingError::Transaction(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_message() {
        let error = PostingError::lookup("item cost", "ITM-1");
        assert_eq!(error.to_string(), "Failed to fetch item cost: ITM-1");
        assert_eq!(error.kind(), "lookup");
        assert!(!error.is_rejection());
    }

    #[test]
    fn test_from_read_maps_not_found_to_lookup() {
        let error = PostingError::from_read("customer", "CUS-1", PortError::not_found("Customer", "CUS-1"));
        assert!(matches!(error, PostingError::Lookup { .. }));

        let error = PostingError::from_read("customer", "CUS-1", PortError::connection("refused"));
        assert!(matches!(error, PostingError::Store(_)));
    }

    #[test]
    fn test_rejections() {
        assert!(PostingError::invalid_state("Draft").is_rejection());
        assert!(PostingError::unsupported("line type", "Fixed Asset").is_rejection());
        assert!(!PostingError::from(PortError::internal("boom")).is_rejection());
    }
}
