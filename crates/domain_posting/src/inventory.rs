//! Items, item ledger entries and tracked entities

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use core_kernel::{
    CompanyId, CustomerId, CustomerTypeId, ItemId, ItemLedgerId, ItemPostingGroupId, LocationId,
    ShelfId, TrackedActivityId, TrackedEntityId, UserId,
};

use crate::journal::DocumentType;
use crate::labels::labelled_enum;

labelled_enum! {
    /// How an item's stock is tracked
    pub enum ItemTrackingType ("item tracking type") {
        Inventory => "Inventory",
        Serial => "Serial",
        Batch => "Batch",
        NonInventory => "Non-Inventory",
    }
}

/// An item master record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub company_id: CompanyId,
    pub readable_id: String,
    pub item_posting_group_id: Option<ItemPostingGroupId>,
    pub item_tracking_type: ItemTrackingType,
}

impl Item {
    /// Returns true if moving the item changes stock on hand
    pub fn is_inventory(&self) -> bool {
        self.item_tracking_type != ItemTrackingType::NonInventory
    }
}

/// Standard cost of one inventory unit of an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCost {
    pub item_id: ItemId,
    pub company_id: CompanyId,
    pub unit_cost: Decimal,
}

/// The customer on an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: CustomerId,
    pub company_id: CompanyId,
    pub name: String,
    pub customer_type_id: Option<CustomerTypeId>,
}

labelled_enum! {
    /// Direction of an inventory movement
    pub enum ItemLedgerEntryType ("item ledger entry type") {
        PositiveAdjmt => "Positive Adjmt.",
        NegativeAdjmt => "Negative Adjmt.",
        Transfer => "Transfer",
    }
}

impl ItemLedgerEntryType {
    /// Entry type of the movement that undoes this one
    pub fn reversed(&self) -> Self {
        match self {
            ItemLedgerEntryType::PositiveAdjmt => ItemLedgerEntryType::NegativeAdjmt,
            ItemLedgerEntryType::NegativeAdjmt => ItemLedgerEntryType::PositiveAdjmt,
            ItemLedgerEntryType::Transfer => ItemLedgerEntryType::Transfer,
        }
    }
}

/// An inventory quantity movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemLedgerEntry {
    pub id: ItemLedgerId,
    pub company_id: CompanyId,
    pub posting_date: NaiveDate,
    pub item_id: ItemId,
    /// Signed quantity in inventory units
    pub quantity: Decimal,
    pub entry_type: ItemLedgerEntryType,
    pub document_type: DocumentType,
    pub document_id: Uuid,
    pub document_line_id: Option<Uuid>,
    pub external_document_id: Option<String>,
    pub tracked_entity_id: Option<TrackedEntityId>,
    pub location_id: Option<LocationId>,
    pub shelf_id: Option<ShelfId>,
    pub created_by: UserId,
}

labelled_enum! {
    /// Availability of a serial or batch tracked unit
    pub enum TrackedEntityStatus ("tracked entity status") {
        Available => "Available",
        Reserved => "Reserved",
        OnHold => "On Hold",
        Consumed => "Consumed",
    }
}

/// A serial or batch tracked unit of inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntity {
    pub id: TrackedEntityId,
    pub company_id: CompanyId,
    pub item_id: ItemId,
    pub status: TrackedEntityStatus,
    pub quantity: Decimal,
}

/// Restores a tracked entity to Available with the given quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedEntityRestore {
    pub tracked_entity_id: TrackedEntityId,
    pub quantity: Decimal,
}

/// Audit record of something that happened to tracked entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedActivity {
    pub id: TrackedActivityId,
    pub company_id: CompanyId,
    pub activity_type: String,
    pub source_document: String,
    pub source_document_id: Uuid,
    pub attributes: serde_json::Value,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// A tracked entity consumed or restored by an activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedActivityInput {
    pub tracked_activity_id: TrackedActivityId,
    pub tracked_entity_id: TrackedEntityId,
    pub company_id: CompanyId,
    pub quantity: Decimal,
    pub entity_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_type_reversal() {
        assert_eq!(ItemLedgerEntryType::NegativeAdjmt.reversed(), ItemLedgerEntryType::PositiveAdjmt);
        assert_eq!(ItemLedgerEntryType::PositiveAdjmt.reversed(), ItemLedgerEntryType::NegativeAdjmt);
        assert_eq!(ItemLedgerEntryType::Transfer.reversed(), ItemLedgerEntryType::Transfer);
    }

    #[test]
    fn test_entry_type_labels() {
        assert_eq!(ItemLedgerEntryType::NegativeAdjmt.as_str(), "Negative Adjmt.");
        assert_eq!(
            "Positive Adjmt.".parse::<ItemLedgerEntryType>().unwrap(),
            ItemLedgerEntryType::PositiveAdjmt
        );
    }

    #[test]
    fn test_only_non_inventory_items_skip_stock() {
        let mut item = Item {
            id: ItemId::new(),
            company_id: CompanyId::new(),
            readable_id: "P-100".to_string(),
            item_posting_group_id: None,
            item_tracking_type: ItemTrackingType::Serial,
        };
        assert!(item.is_inventory());

        item.item_tracking_type = ItemTrackingType::NonInventory;
        assert!(!item.is_inventory());
    }
}
