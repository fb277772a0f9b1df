//! Pre-built Test Fixtures
//!
//! Ready-to-use reference data for posting tests: chart of accounts numbers,
//! posting dates, customers, items and posting groups. Every fixture belongs
//! to the company passed in so tests can check company scoping.

use chrono::NaiveDate;
use fake::faker::company::en::CompanyName;
use fake::Fake;
use rust_decimal::Decimal;

use core_kernel::{CompanyId, CustomerId, CustomerTypeId, ItemId, ItemPostingGroupId, LocationId};
use domain_posting::{
    Customer, InventoryPostingGroup, Item, ItemCost, ItemTrackingType, SalesPostingGroup,
};

/// Account numbers used by the fixture posting groups
pub struct AccountFixtures;

impl AccountFixtures {
    pub const RECEIVABLES: &'static str = "1200";
    pub const INVENTORY: &'static str = "1300";
    pub const SALES: &'static str = "4000";
    pub const COST_OF_GOODS_SOLD: &'static str = "5000";
}

/// Fixture dates
pub struct DateFixtures;

impl DateFixtures {
    /// Posting date used by most scenarios (Mar 15, 2024)
    pub fn posting_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    /// A date in the following month, for accounting period tests
    pub fn next_month() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 2).unwrap()
    }
}

/// Customers, items and costs
pub struct ReferenceFixtures;

impl ReferenceFixtures {
    /// A customer with a random company name
    pub fn customer(company_id: CompanyId, customer_type_id: Option<CustomerTypeId>) -> Customer {
        Customer {
            id: CustomerId::new(),
            company_id,
            name: CompanyName().fake(),
            customer_type_id,
        }
    }

    /// An inventory-tracked item
    pub fn inventory_item(company_id: CompanyId, item_posting_group_id: Option<ItemPostingGroupId>) -> Item {
        Self::item(company_id, item_posting_group_id, ItemTrackingType::Inventory)
    }

    /// An item that is bought or sold but never stocked
    pub fn non_inventory_item(company_id: CompanyId, item_posting_group_id: Option<ItemPostingGroupId>) -> Item {
        Self::item(company_id, item_posting_group_id, ItemTrackingType::NonInventory)
    }

    pub fn item(
        company_id: CompanyId,
        item_posting_group_id: Option<ItemPostingGroupId>,
        item_tracking_type: ItemTrackingType,
    ) -> Item {
        let id = ItemId::new();
        Item {
            id,
            company_id,
            readable_id: format!("P-{}", &id.as_uuid().simple().to_string()[..6]),
            item_posting_group_id,
            item_tracking_type,
        }
    }

    pub fn cost(item: &Item, unit_cost: Decimal) -> ItemCost {
        ItemCost {
            item_id: item.id,
            company_id: item.company_id,
            unit_cost,
        }
    }
}

/// Posting groups mapped onto [`AccountFixtures`]
pub struct PostingGroupFixtures;

impl PostingGroupFixtures {
    pub fn inventory(
        company_id: CompanyId,
        item_posting_group_id: Option<ItemPostingGroupId>,
        location_id: Option<LocationId>,
    ) -> InventoryPostingGroup {
        InventoryPostingGroup {
            company_id,
            item_posting_group_id,
            location_id,
            inventory_account: AccountFixtures::INVENTORY.to_string(),
            cost_of_goods_sold_account: AccountFixtures::COST_OF_GOODS_SOLD.to_string(),
        }
    }

    pub fn sales(
        company_id: CompanyId,
        item_posting_group_id: Option<ItemPostingGroupId>,
        customer_type_id: Option<CustomerTypeId>,
    ) -> SalesPostingGroup {
        SalesPostingGroup {
            company_id,
            item_posting_group_id,
            customer_type_id,
            sales_account: AccountFixtures::SALES.to_string(),
            receivables_account: AccountFixtures::RECEIVABLES.to_string(),
        }
    }
}
