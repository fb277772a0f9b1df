//! Posting group resolution
//!
//! Posting groups map an item posting group together with a location
//! (inventory) or a customer type (sales) to general ledger accounts. They are
//! read-only reference data, so a posting run resolves each key once and
//! reuses it for every line.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use core_kernel::{CompanyId, CustomerTypeId, ItemPostingGroupId, LocationId};

use crate::error::PostingError;
use crate::ports::PostingStore;

/// Which posting group table a key refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostingGroupKind {
    Inventory,
    Sales,
}

/// Lookup key of an inventory posting group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryGroupKey {
    pub item_posting_group_id: Option<ItemPostingGroupId>,
    pub location_id: Option<LocationId>,
}

/// Lookup key of a sales posting group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesGroupKey {
    pub item_posting_group_id: Option<ItemPostingGroupId>,
    pub customer_type_id: Option<CustomerTypeId>,
}

fn write_optional(f: &mut fmt::Formatter<'_>, value: Option<impl fmt::Display>) -> fmt::Result {
    match value {
        Some(value) => write!(f, "{value}"),
        None => f.write_str("any"),
    }
}

impl fmt::Display for InventoryGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("item posting group ")?;
        write_optional(f, self.item_posting_group_id)?;
        f.write_str(" at location ")?;
        write_optional(f, self.location_id)
    }
}

impl fmt::Display for SalesGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("item posting group ")?;
        write_optional(f, self.item_posting_group_id)?;
        f.write_str(" for customer type ")?;
        write_optional(f, self.customer_type_id)
    }
}

/// Accounts used when inventory moves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryPostingGroup {
    pub company_id: CompanyId,
    pub item_posting_group_id: Option<ItemPostingGroupId>,
    pub location_id: Option<LocationId>,
    pub inventory_account: String,
    pub cost_of_goods_sold_account: String,
}

impl InventoryPostingGroup {
    pub fn key(&self) -> InventoryGroupKey {
        InventoryGroupKey {
            item_posting_group_id: self.item_posting_group_id,
            location_id: self.location_id,
        }
    }
}

/// Accounts used when revenue is recognised
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesPostingGroup {
    pub company_id: CompanyId,
    pub item_posting_group_id: Option<ItemPostingGroupId>,
    pub customer_type_id: Option<CustomerTypeId>,
    pub sales_account: String,
    pub receivables_account: String,
}

impl SalesPostingGroup {
    pub fn key(&self) -> SalesGroupKey {
        SalesGroupKey {
            item_posting_group_id: self.item_posting_group_id,
            customer_type_id: self.customer_type_id,
        }
    }
}

/// Posting groups resolved for one run
#[derive(Debug, Clone, Default)]
pub struct PostingGroups {
    inventory: HashMap<InventoryGroupKey, InventoryPostingGroup>,
    sales: HashMap<SalesGroupKey, SalesPostingGroup>,
}

impl PostingGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an inventory group under its own key
    pub fn insert_inventory(&mut self, group: InventoryPostingGroup) {
        self.inventory.insert(group.key(), group);
    }

    /// Adds a sales group under its own key
    pub fn insert_sales(&mut self, group: SalesPostingGroup) {
        self.sales.insert(group.key(), group);
    }

    /// # Errors
    ///
    /// Returns `Lookup` if the key was never resolved
    pub fn inventory(&self, key: &InventoryGroupKey) -> Result<&InventoryPostingGroup, PostingError> {
        self.inventory
            .get(key)
            .ok_or_else(|| PostingError::lookup("inventory posting group", key))
    }

    /// # Errors
    ///
    /// Returns `Lookup` if the key was never resolved
    pub fn sales(&self, key: &SalesGroupKey) -> Result<&SalesPostingGroup, PostingError> {
        self.sales
            .get(key)
            .ok_or_else(|| PostingError::lookup("sales posting group", key))
    }

    pub fn len(&self, kind: PostingGroupKind) -> usize {
        match kind {
            PostingGroupKind::Inventory => self.inventory.len(),
            PostingGroupKind::Sales => self.sales.len(),
        }
    }
}

/// Memoizing resolver over a store
///
/// Lives for exactly one posting run. A missing group fails the whole run.
pub struct PostingGroupResolver<'a, S: PostingStore> {
    store: &'a S,
    company_id: CompanyId,
    groups: PostingGroups,
}

impl<'a, S: PostingStore> PostingGroupResolver<'a, S> {
    pub fn new(store: &'a S, company_id: CompanyId) -> Self {
        Self {
            store,
            company_id,
            groups: PostingGroups::new(),
        }
    }

    /// Resolves an inventory posting group, reading the store at most once per key
    ///
    /// # Errors
    ///
    /// Returns `Lookup` if no group matches the key
    pub async fn inventory(&mut self, key: InventoryGroupKey) -> Result<&InventoryPostingGroup, PostingError> {
        if !self.groups.inventory.contains_key(&key) {
            let group = self
                .store
                .inventory_posting_group(self.company_id, key)
                .await
                .map_err(|e| PostingError::from_read("inventory posting group", key, e))?;
            self.groups.inventory.insert(key, group);
        }
        self.groups.inventory(&key)
    }

    /// Resolves a sales posting group, reading the store at most once per key
    ///
    /// # Errors
    ///
    /// Returns `Lookup` if no group matches the key
    pub async fn sales(&mut self, key: SalesGroupKey) -> Result<&SalesPostingGroup, PostingError> {
        if !self.groups.sales.contains_key(&key) {
            let group = self
                .store
                .sales_posting_group(self.company_id, key)
                .await
                .map_err(|e| PostingError::from_read("sales posting group", key, e))?;
            self.groups.sales.insert(key, group);
        }
        self.groups.sales(&key)
    }

    /// Ends the run's resolution phase, handing the groups to the builder
    pub fn into_groups(self) -> PostingGroups {
        self.groups
    }
}
