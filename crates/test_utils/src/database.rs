//! Database Test Utilities
//!
//! Provides helpers for database testing including testcontainer management,
//! connection pooling, and seeding a [`StoreState`] into PostgreSQL so the
//! same scenario runs against the in-memory store and the real one.

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};
use tokio::sync::OnceCell;

use chrono::NaiveDate;
use domain_posting::StoreState;
use infra_db::repositories::posting as repo;
use infra_db::PostgresPostingStore;

/// Default PostgreSQL image for testing
const POSTGRES_IMAGE: &str = "postgres";
const POSTGRES_TAG: &str = "16-alpine";
const POSTGRES_USER: &str = "test_user";
const POSTGRES_PASSWORD: &str = "test_password";
const POSTGRES_DB: &str = "posting_test";

type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Configuration for test database
#[derive(Debug, Clone)]
pub struct TestDatabaseConfig {
    pub user: String,
    pub password: String,
    pub database: String,
    pub host: String,
    pub port: u16,
}

impl Default for TestDatabaseConfig {
    fn default() -> Self {
        Self {
            user: POSTGRES_USER.to_string(),
            password: POSTGRES_PASSWORD.to_string(),
            database: POSTGRES_DB.to_string(),
            host: "localhost".to_string(),
            port: 5432,
        }
    }
}

impl TestDatabaseConfig {
    /// Creates the database connection URL
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// A wrapper around a PostgreSQL test container
pub struct TestDatabase {
    _container: ContainerAsync<GenericImage>,
    pub config: TestDatabaseConfig,
    pub pool: PgPool,
}

impl TestDatabase {
    /// Starts a new PostgreSQL container with the schema applied
    ///
    /// # Errors
    ///
    /// Returns an error if the container fails to start or the schema fails to apply
    pub async fn new() -> TestResult<Self> {
        let container = GenericImage::new(POSTGRES_IMAGE, POSTGRES_TAG)
            .with_exposed_port(5432.tcp())
            .with_wait_for(WaitFor::message_on_stderr("database system is ready to accept connections"))
            .with_env_var("POSTGRES_USER", POSTGRES_USER)
            .with_env_var("POSTGRES_PASSWORD", POSTGRES_PASSWORD)
            .with_env_var("POSTGRES_DB", POSTGRES_DB)
            .start()
            .await?;

        let port = container.get_host_port_ipv4(5432).await?;
        let host = container.get_host().await?.to_string();

        let config = TestDatabaseConfig {
            user: POSTGRES_USER.to_string(),
            password: POSTGRES_PASSWORD.to_string(),
            database: POSTGRES_DB.to_string(),
            host,
            port,
        };

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.connection_url())
            .await?;

        let test_db = Self {
            _container: container,
            config,
            pool,
        };

        test_db.init_schema().await?;

        Ok(test_db)
    }

    async fn init_schema(&self) -> TestResult<()> {
        let schema = include_str!("../../../migrations/20240101_000001_initial_schema.sql");
        sqlx::raw_sql(schema).execute(&self.pool).await?;
        Ok(())
    }

    /// Returns a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// A posting store over this database
    pub fn posting_store(&self) -> PostgresPostingStore {
        PostgresPostingStore::new(self.pool.clone())
    }

    /// Clears all data from the database while preserving the schema
    pub async fn clear_data(&self) -> TestResult<()> {
        let tables = [
            "tracked_activity_input",
            "tracked_activity",
            "tracked_entity",
            "item_ledger",
            "journal_line",
            "journal",
            "shipment_line",
            "shipment",
            "sales_invoice_line",
            "sales_invoice",
            "warehouse_transfer_line",
            "warehouse_transfer",
            "purchase_order_line",
            "job_operation",
            "job",
            "sales_order_line",
            "sales_order",
            "accounting_period",
            "posting_group_sales",
            "posting_group_inventory",
            "item_cost",
            "item",
            "customer",
        ];

        for table in tables {
            sqlx::query(&format!("TRUNCATE TABLE {} CASCADE", table))
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    /// Writes every row of `state` in one transaction
    pub async fn seed(&self, state: &StoreState) -> TestResult<()> {
        seed_state(&self.pool, state).await
    }
}

/// Writes every row of a store state, parents before children
///
/// # Errors
///
/// Returns the first database error; nothing is written in that case
pub async fn seed_state(pool: &PgPool, state: &StoreState) -> TestResult<()> {
    let mut tx = pool.begin().await?;

    seed_reference_data(&mut tx, state).await?;
    seed_orders(&mut tx, state).await?;
    seed_documents(&mut tx, state).await?;
    seed_ledgers(&mut tx, state).await?;

    tx.commit().await?;
    Ok(())
}

async fn seed_reference_data(tx: &mut Transaction<'static, Postgres>, state: &StoreState) -> TestResult<()> {
    for customer in state.customers.values() {
        sqlx::query("INSERT INTO customer (id, company_id, name, customer_type_id) VALUES ($1, $2, $3, $4)")
            .bind(customer.id.as_uuid())
            .bind(customer.company_id.as_uuid())
            .bind(&customer.name)
            .bind(customer.customer_type_id.map(uuid::Uuid::from))
            .execute(&mut **tx)
            .await?;
    }

    for item in state.items.values() {
        sqlx::query(
            "INSERT INTO item (id, company_id, readable_id, item_posting_group_id, item_tracking_type) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(item.id.as_uuid())
        .bind(item.company_id.as_uuid())
        .bind(&item.readable_id)
        .bind(item.item_posting_group_id.map(uuid::Uuid::from))
        .bind(item.item_tracking_type.as_str())
        .execute(&mut **tx)
        .await?;
    }

    for cost in state.item_costs.values() {
        sqlx::query("INSERT INTO item_cost (item_id, company_id, unit_cost) VALUES ($1, $2, $3)")
            .bind(cost.item_id.as_uuid())
            .bind(cost.company_id.as_uuid())
            .bind(cost.unit_cost)
            .execute(&mut **tx)
            .await?;
    }

    for group in &state.inventory_posting_groups {
        sqlx::query(
            r#"
            INSERT INTO posting_group_inventory
                (company_id, item_posting_group_id, location_id, inventory_account, cost_of_goods_sold_account)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(group.company_id.as_uuid())
        .bind(group.item_posting_group_id.map(uuid::Uuid::from))
        .bind(group.location_id.map(uuid::Uuid::from))
        .bind(&group.inventory_account)
        .bind(&group.cost_of_goods_sold_account)
        .execute(&mut **tx)
        .await?;
    }

    for group in &state.sales_posting_groups {
        sqlx::query(
            r#"
            INSERT INTO posting_group_sales
                (company_id, item_posting_group_id, customer_type_id, sales_account, receivables_account)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(group.company_id.as_uuid())
        .bind(group.item_posting_group_id.map(uuid::Uuid::from))
        .bind(group.customer_type_id.map(uuid::Uuid::from))
        .bind(&group.sales_account)
        .bind(&group.receivables_account)
        .execute(&mut **tx)
        .await?;
    }

    for ((company_id, year, month), id) in &state.accounting_periods {
        let start_date = NaiveDate::from_ymd_opt(*year, *month, 1).ok_or("invalid accounting period")?;
        let end_date = start_date
            .checked_add_months(chrono::Months::new(1))
            .and_then(|next| next.pred_opt())
            .ok_or("invalid accounting period")?;
        sqlx::query("INSERT INTO accounting_period (id, company_id, start_date, end_date) VALUES ($1, $2, $3, $4)")
            .bind(id.as_uuid())
            .bind(company_id.as_uuid())
            .bind(start_date)
            .bind(end_date)
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

async fn seed_orders(tx: &mut Transaction<'static, Postgres>, state: &StoreState) -> TestResult<()> {
    for order in state.sales_orders.values() {
        sqlx::query("INSERT INTO sales_order (id, company_id, sales_order_number, status) VALUES ($1, $2, $3, $4)")
            .bind(order.id.as_uuid())
            .bind(order.company_id.as_uuid())
            .bind(&order.sales_order_number)
            .bind(order.status.as_str())
            .execute(&mut **tx)
            .await?;
    }

    for line in state.sales_order_lines.values() {
        sqlx::query(
            r#"
            INSERT INTO sales_order_line
                (id, sales_order_id, company_id, sales_order_line_type, sale_quantity, quantity_to_invoice,
                 quantity_invoiced, invoiced_complete, quantity_sent, sent_complete, sent_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(line.id.as_uuid())
        .bind(line.sales_order_id.as_uuid())
        .bind(line.company_id.as_uuid())
        .bind(line.sales_order_line_type.as_str())
        .bind(line.sale_quantity)
        .bind(line.quantity_to_invoice)
        .bind(line.quantity_invoiced)
        .bind(line.invoiced_complete)
        .bind(line.quantity_sent)
        .bind(line.sent_complete)
        .bind(line.sent_date)
        .execute(&mut **tx)
        .await?;
    }

    for job in state.jobs.values() {
        sqlx::query(
            r#"
            INSERT INTO job (id, company_id, job_number, quantity, quantity_complete, quantity_shipped, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.company_id.as_uuid())
        .bind(&job.job_number)
        .bind(job.quantity)
        .bind(job.quantity_complete)
        .bind(job.quantity_shipped)
        .bind(job.status.as_str())
        .execute(&mut **tx)
        .await?;
    }

    for operation in state.job_operations.values() {
        sqlx::query("INSERT INTO job_operation (id, job_id, company_id, status) VALUES ($1, $2, $3, $4)")
            .bind(operation.id.as_uuid())
            .bind(operation.job_id.as_uuid())
            .bind(operation.company_id.as_uuid())
            .bind(operation.status.as_str())
            .execute(&mut **tx)
            .await?;
    }

    for line in state.purchase_order_lines.values() {
        sqlx::query(
            r#"
            INSERT INTO purchase_order_line (id, purchase_order_id, company_id, quantity_shipped, job_operation_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(line.id.as_uuid())
        .bind(line.purchase_order_id.as_uuid())
        .bind(line.company_id.as_uuid())
        .bind(line.quantity_shipped)
        .bind(line.job_operation_id.map(uuid::Uuid::from))
        .execute(&mut **tx)
        .await?;
    }

    for transfer in state.warehouse_transfers.values() {
        sqlx::query("INSERT INTO warehouse_transfer (id, company_id, transfer_number, status) VALUES ($1, $2, $3, $4)")
            .bind(transfer.id.as_uuid())
            .bind(transfer.company_id.as_uuid())
            .bind(&transfer.transfer_number)
            .bind(transfer.status.as_str())
            .execute(&mut **tx)
            .await?;
    }

    for line in state.warehouse_transfer_lines.values() {
        sqlx::query(
            r#"
            INSERT INTO warehouse_transfer_line
                (id, transfer_id, company_id, quantity, shipped_quantity, received_quantity)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(line.id.as_uuid())
        .bind(line.transfer_id.as_uuid())
        .bind(line.company_id.as_uuid())
        .bind(line.quantity)
        .bind(line.shipped_quantity)
        .bind(line.received_quantity)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

async fn seed_documents(tx: &mut Transaction<'static, Postgres>, state: &StoreState) -> TestResult<()> {
    for invoice in state.sales_invoices.values() {
        sqlx::query(
            r#"
            INSERT INTO sales_invoice
                (id, company_id, invoice_number, customer_id, location_id, posting_date, status,
                 shipping_cost, exchange_rate, updated_at, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(invoice.id.as_uuid())
        .bind(invoice.company_id.as_uuid())
        .bind(&invoice.invoice_number)
        .bind(invoice.customer_id.as_uuid())
        .bind(invoice.location_id.map(uuid::Uuid::from))
        .bind(invoice.posting_date)
        .bind(invoice.status.as_str())
        .bind(invoice.shipping_cost)
        .bind(invoice.exchange_rate)
        .bind(invoice.updated_at)
        .bind(invoice.updated_by.map(uuid::Uuid::from))
        .execute(&mut **tx)
        .await?;
    }

    // Lines keep their vector order through created_at
    let base = chrono::Utc::now();
    for (position, line) in state.sales_invoice_lines.iter().enumerate() {
        let company_id = state
            .sales_invoices
            .get(&line.invoice_id)
            .map(|invoice| *invoice.company_id.as_uuid())
            .ok_or("invoice line without invoice")?;
        sqlx::query(
            r#"
            INSERT INTO sales_invoice_line
                (id, invoice_id, company_id, invoice_line_type, item_id, description, quantity, unit_price,
                 shipping_cost, add_on_cost, tax_percent, conversion_factor, method_type, sales_order_id,
                 sales_order_line_id, location_id, shelf_id, requires_serial_tracking,
                 requires_batch_tracking, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(line.id.as_uuid())
        .bind(line.invoice_id.as_uuid())
        .bind(company_id)
        .bind(line.invoice_line_type.as_str())
        .bind(line.item_id.map(uuid::Uuid::from))
        .bind(&line.description)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.shipping_cost)
        .bind(line.add_on_cost)
        .bind(line.tax_percent)
        .bind(line.conversion_factor)
        .bind(line.method_type.as_str())
        .bind(line.sales_order_id.map(uuid::Uuid::from))
        .bind(line.sales_order_line_id.map(uuid::Uuid::from))
        .bind(line.location_id.map(uuid::Uuid::from))
        .bind(line.shelf_id.map(uuid::Uuid::from))
        .bind(line.requires_serial_tracking)
        .bind(line.requires_batch_tracking)
        .bind(base + chrono::Duration::milliseconds(position as i64))
        .execute(&mut **tx)
        .await?;
    }

    for shipment in state.shipments.values() {
        repo::insert_shipment(&mut **tx, shipment).await?;
        if let Some(voided_by) = shipment.voided_by {
            sqlx::query("UPDATE shipment SET voided_by = $2, voided_date = $3 WHERE id = $1")
                .bind(shipment.id.as_uuid())
                .bind(voided_by.as_uuid())
                .bind(shipment.voided_date)
                .execute(&mut **tx)
                .await?;
        }

        let lines: Vec<_> = state
            .shipment_lines
            .iter()
            .filter(|line| line.shipment_id == shipment.id)
            .cloned()
            .collect();
        if !lines.is_empty() {
            repo::shipment_lines_insert(*shipment.company_id.as_uuid(), &lines)
                .build()
                .execute(&mut **tx)
                .await?;
        }
    }

    Ok(())
}

async fn seed_ledgers(tx: &mut Transaction<'static, Postgres>, state: &StoreState) -> TestResult<()> {
    for journal in &state.journals {
        repo::insert_journal(&mut **tx, journal).await?;
    }
    if !state.journal_lines.is_empty() {
        repo::journal_lines_insert(&state.journal_lines)
            .build()
            .execute(&mut **tx)
            .await?;
    }

    for entity in state.tracked_entities.values() {
        sqlx::query("INSERT INTO tracked_entity (id, company_id, item_id, status, quantity) VALUES ($1, $2, $3, $4, $5)")
            .bind(entity.id.as_uuid())
            .bind(entity.company_id.as_uuid())
            .bind(entity.item_id.as_uuid())
            .bind(entity.status.as_str())
            .bind(entity.quantity)
            .execute(&mut **tx)
            .await?;
    }

    if !state.item_ledger_entries.is_empty() {
        repo::item_ledger_insert(&state.item_ledger_entries)
            .build()
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

/// Global test database for shared integration tests
static SHARED_TEST_DB: OnceCell<Arc<TestDatabase>> = OnceCell::const_new();

/// Gets or creates a shared test database instance
///
/// # Panics
///
/// Panics if the database fails to initialize
pub async fn get_shared_test_database() -> Arc<TestDatabase> {
    SHARED_TEST_DB
        .get_or_init(|| async {
            Arc::new(
                TestDatabase::new()
                    .await
                    .expect("Failed to create shared test database"),
            )
        })
        .await
        .clone()
}

/// Creates an isolated test database for a single test
pub async fn create_isolated_test_database() -> TestResult<TestDatabase> {
    TestDatabase::new().await
}

/// Helper macro for running database tests
#[macro_export]
macro_rules! db_test {
    ($name:ident, $body:expr) => {
        #[tokio::test]
        async fn $name() {
            let db = $crate::database::create_isolated_test_database()
                .await
                .expect("Failed to create test database");
            let pool = db.pool();
            $body
        }
    };
}

/// Helper trait for test assertions on database results
pub trait DatabaseTestAssertions {
    /// Asserts that a specific number of rows were affected
    fn assert_rows_affected(&self, expected: u64);
}

impl DatabaseTestAssertions for sqlx::postgres::PgQueryResult {
    fn assert_rows_affected(&self, expected: u64) {
        assert_eq!(
            self.rows_affected(),
            expected,
            "Expected {} rows affected, got {}",
            expected,
            self.rows_affected()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_connection_url() {
        let config = TestDatabaseConfig::default();
        let url = config.connection_url();

        assert!(url.starts_with("postgres://"));
        assert!(url.contains(POSTGRES_USER));
        assert!(url.ends_with(POSTGRES_DB));
    }
}
