//! PostgreSQL source and warehouse connectors
//!
//! Both sides talk to PostgreSQL through sqlx pools. The warehouse replaces
//! a table inside one transaction: truncate, batched multi-row inserts, then
//! commit. A failure anywhere rolls the table back to its previous contents.

use async_trait::async_trait;
use dimload_core::config::{SourceConfig, WarehouseConfig};
use dimload_core::model::{
    ProductDimension, PurchaseFact, SourceProduct, SourcePurchaseLine, SourceVendor,
    TimeDimension, VendorDimension,
};
use dimload_core::units::{product, purchase, vendor};
use dimload_core::{Error, SourceDatabase, Table, Warehouse};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashMap;
use std::time::Duration;

/// DDL for the star schema in the default `dw` schema
pub const WAREHOUSE_DDL: &str = include_str!("../sql/warehouse.sql");

/// Open a connection pool
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(url)
        .await
}

/// Transactional OLTP database read by the dimension and fact extracts
#[derive(Debug, Clone)]
pub struct PgSource {
    pool: PgPool,
}

impl PgSource {
    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using the source settings
    pub async fn connect(config: &SourceConfig) -> dimload_core::Result<Self> {
        let pool = connect(&config.url, config.max_connections)
            .await
            .map_err(|e| Error::source("connect", e))?;
        Ok(Self::new(pool))
    }

    async fn extract<T>(
        &self,
        name: &str,
        sql: &str,
        decode: fn(&PgRow) -> Result<T, sqlx::Error>,
    ) -> dimload_core::Result<Vec<T>> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::source(name, e))?;
        tracing::debug!("Extracted {} rows for {}", rows.len(), name);
        rows.iter()
            .map(decode)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Error::source(name, e))
    }
}

fn decode_product(row: &PgRow) -> Result<SourceProduct, sqlx::Error> {
    Ok(SourceProduct {
        product_id: row.try_get("product_id")?,
        name: row.try_get("name")?,
        product_number: row.try_get("product_number")?,
        category: row.try_get("category")?,
        subcategory: row.try_get("subcategory")?,
        standard_cost: row.try_get("standard_cost")?,
    })
}

fn decode_vendor(row: &PgRow) -> Result<SourceVendor, sqlx::Error> {
    Ok(SourceVendor {
        vendor_id: row.try_get("vendor_id")?,
        name: row.try_get("name")?,
        credit_rating: row.try_get("credit_rating")?,
        active_flag: row.try_get("active_flag")?,
        address_id: row.try_get("address_id")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
    })
}

fn decode_purchase_line(row: &PgRow) -> Result<SourcePurchaseLine, sqlx::Error> {
    Ok(SourcePurchaseLine {
        order_id: row.try_get("order_id")?,
        line_id: row.try_get("line_id")?,
        product_id: row.try_get("product_id")?,
        vendor_id: row.try_get("vendor_id")?,
        order_date: row.try_get("order_date")?,
        due_date: row.try_get("due_date")?,
        ship_date: row.try_get("ship_date")?,
        qty_ordered: row.try_get("qty_ordered")?,
        qty_received: row.try_get("qty_received")?,
        qty_rejected: row.try_get("qty_rejected")?,
        unit_price: row.try_get("unit_price")?,
        line_total: row.try_get("line_total")?,
        freight: row.try_get("freight")?,
    })
}

#[async_trait]
impl SourceDatabase for PgSource {
    async fn fetch_products(&self) -> dimload_core::Result<Vec<SourceProduct>> {
        self.extract("products", product::EXTRACT_SQL, decode_product)
            .await
    }

    async fn fetch_vendors(&self) -> dimload_core::Result<Vec<SourceVendor>> {
        self.extract("vendors", vendor::EXTRACT_SQL, decode_vendor)
            .await
    }

    async fn fetch_purchase_lines(&self) -> dimload_core::Result<Vec<SourcePurchaseLine>> {
        self.extract("purchase_lines", purchase::EXTRACT_SQL, decode_purchase_line)
            .await
    }
}

/// Star schema warehouse
#[derive(Debug, Clone)]
pub struct PgWarehouse {
    pool: PgPool,
    schema: String,
    batch_size: usize,
}

impl PgWarehouse {
    /// Wrap an existing pool
    pub fn new(pool: PgPool, schema: impl Into<String>, batch_size: usize) -> Self {
        Self {
            pool,
            schema: schema.into(),
            batch_size: batch_size.max(1),
        }
    }

    /// Connect using the warehouse settings
    pub async fn connect(config: &WarehouseConfig) -> dimload_core::Result<Self> {
        let pool = connect(&config.url, config.max_connections)
            .await
            .map_err(|e| Error::warehouse("connect", e))?;
        Ok(Self::new(pool, &config.schema, config.batch_size))
    }

    /// Replace the contents of `table` with `rows`
    async fn replace<T: Sync>(
        &self,
        table: Table,
        rows: &[T],
        bind: for<'b> fn(&mut Separated<'b, 'static, Postgres, &'static str>, &T),
    ) -> dimload_core::Result<u64> {
        let fail = |e: sqlx::Error| Error::warehouse(table.name(), e);

        let mut tx = self.pool.begin().await.map_err(fail)?;
        sqlx::query(&truncate_statement(&self.schema, table))
            .execute(&mut *tx)
            .await
            .map_err(fail)?;

        let mut inserted = 0;
        for chunk in rows.chunks(self.batch_size) {
            let mut builder: QueryBuilder<'static, Postgres> =
                QueryBuilder::new(insert_prefix(&self.schema, table));
            builder.push_values(chunk, |mut values, row| bind(&mut values, row));
            inserted += builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(fail)?
                .rows_affected();
        }

        tx.commit().await.map_err(fail)?;
        tracing::debug!("Replaced {} with {} rows", table, inserted);
        Ok(inserted)
    }

    async fn keys(
        &self,
        table: Table,
        natural: &str,
        surrogate: &str,
    ) -> dimload_core::Result<HashMap<i32, i32>> {
        let sql = format!(
            "SELECT {}, {} FROM {}",
            natural,
            surrogate,
            qualified(&self.schema, table)
        );
        let rows: Vec<(i32, i32)> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::warehouse(table.name(), e))?;
        Ok(rows.into_iter().collect())
    }
}

fn bind_time(b: &mut Separated<'_, 'static, Postgres, &'static str>, r: &TimeDimension) {
    b.push_bind(r.sk_time)
        .push_bind(r.full_date)
        .push_bind(r.year)
        .push_bind(r.month)
        .push_bind(r.month_name.clone())
        .push_bind(r.quarter)
        .push_bind(r.week_of_year)
        .push_bind(r.weekday_name.clone());
}

fn bind_product(b: &mut Separated<'_, 'static, Postgres, &'static str>, r: &ProductDimension) {
    b.push_bind(r.original_product_id)
        .push_bind(r.name.clone())
        .push_bind(r.product_number.clone())
        .push_bind(r.category.clone())
        .push_bind(r.subcategory.clone())
        .push_bind(r.standard_cost);
}

fn bind_vendor(b: &mut Separated<'_, 'static, Postgres, &'static str>, r: &VendorDimension) {
    b.push_bind(r.original_vendor_id)
        .push_bind(r.name.clone())
        .push_bind(r.credit_rating)
        .push_bind(r.active_flag)
        .push_bind(r.city.clone())
        .push_bind(r.state.clone());
}

fn bind_fact(b: &mut Separated<'_, 'static, Postgres, &'static str>, r: &PurchaseFact) {
    b.push_bind(r.sk_product)
        .push_bind(r.sk_vendor)
        .push_bind(r.sk_time_ordered)
        .push_bind(r.sk_time_due)
        .push_bind(r.sk_time_shipped)
        .push_bind(r.qty_ordered)
        .push_bind(r.qty_received)
        .push_bind(r.qty_rejected)
        .push_bind(r.unit_price)
        .push_bind(r.line_total)
        .push_bind(r.freight_per_unit)
        .push_bind(r.order_id);
}

#[async_trait]
impl Warehouse for PgWarehouse {
    async fn reload_time(&self, rows: &[TimeDimension]) -> dimload_core::Result<u64> {
        self.replace(Table::Time, rows, bind_time).await
    }

    async fn reload_products(&self, rows: &[ProductDimension]) -> dimload_core::Result<u64> {
        self.replace(Table::Product, rows, bind_product).await
    }

    async fn reload_vendors(&self, rows: &[VendorDimension]) -> dimload_core::Result<u64> {
        self.replace(Table::Vendor, rows, bind_vendor).await
    }

    async fn reload_facts(&self, rows: &[PurchaseFact]) -> dimload_core::Result<u64> {
        self.replace(Table::Purchase, rows, bind_fact).await
    }

    async fn product_keys(&self) -> dimload_core::Result<HashMap<i32, i32>> {
        self.keys(Table::Product, "original_product_id", "sk_product")
            .await
    }

    async fn vendor_keys(&self) -> dimload_core::Result<HashMap<i32, i32>> {
        self.keys(Table::Vendor, "original_vendor_id", "sk_vendor")
            .await
    }
}

/// Schema-qualified table name
pub fn qualified(schema: &str, table: Table) -> String {
    format!("{}.{}", schema, table.name())
}

/// Empty a table and reset its identity sequence.
///
/// A dimension takes the fact table with it, since fact rows would otherwise
/// point at surrogate keys that no longer exist. The fact table is named
/// explicitly because lookup misses load key 0, so it carries no foreign keys
/// for CASCADE to follow.
pub fn truncate_statement(schema: &str, table: Table) -> String {
    if table.is_dimension() {
        format!(
            "TRUNCATE TABLE {}, {} RESTART IDENTITY CASCADE",
            qualified(schema, table),
            qualified(schema, Table::Purchase)
        )
    } else {
        format!("TRUNCATE TABLE {} RESTART IDENTITY", qualified(schema, table))
    }
}

/// `INSERT INTO schema.table (columns) ` ready for a VALUES list
pub fn insert_prefix(schema: &str, table: Table) -> String {
    format!(
        "INSERT INTO {} ({}) ",
        qualified(schema, table),
        table.columns().join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(
        Table::Time,
        "TRUNCATE TABLE dw.dim_time, dw.fact_purchase RESTART IDENTITY CASCADE"
    )]
    #[case(
        Table::Product,
        "TRUNCATE TABLE dw.dim_product, dw.fact_purchase RESTART IDENTITY CASCADE"
    )]
    #[case(
        Table::Vendor,
        "TRUNCATE TABLE dw.dim_vendor, dw.fact_purchase RESTART IDENTITY CASCADE"
    )]
    #[case(Table::Purchase, "TRUNCATE TABLE dw.fact_purchase RESTART IDENTITY")]
    fn test_truncate_statement(#[case] table: Table, #[case] expected: &str) {
        assert_eq!(truncate_statement("dw", table), expected);
    }

    #[test]
    fn test_insert_prefix_skips_surrogate_key() {
        let sql = insert_prefix("mart", Table::Product);
        assert_eq!(
            sql,
            "INSERT INTO mart.dim_product (original_product_id, name, product_number, \
             category, subcategory, standard_cost) "
        );
        assert!(!sql.contains("sk_product"));
    }

    #[rstest]
    #[case(Table::Time)]
    #[case(Table::Product)]
    #[case(Table::Vendor)]
    #[case(Table::Purchase)]
    fn test_reference_ddl_declares_every_column(#[case] table: Table) {
        let create = format!("CREATE TABLE IF NOT EXISTS dw.{}", table.name());
        let start = WAREHOUSE_DDL
            .find(&create)
            .unwrap_or_else(|| panic!("no CREATE TABLE for {}", table));
        let body = &WAREHOUSE_DDL[start..];
        let body = &body[..body.find(");").unwrap()];
        for column in table.columns() {
            assert!(
                body.contains(&format!("    {} ", column)),
                "{} missing column {}",
                table,
                column
            );
        }
    }
}
