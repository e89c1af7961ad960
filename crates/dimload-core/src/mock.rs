//! In-memory connectors for testing
//!
//! [`MockSource`] serves predefined extracts and [`MockWarehouse`] keeps the
//! four tables in memory, assigning surrogate keys the way a freshly
//! truncated identity column would (1, 2, 3, ... in insert order).
//!
//! ## Simulating Failures
//!
//! ```rust,ignore
//! // Every call fails, as if the database were unreachable
//! let source = MockSource::new().with_unavailable();
//!
//! // The first two reloads of the fact table fail, later ones succeed
//! let warehouse = MockWarehouse::new().with_failures(Table::Purchase, 2);
//! ```
//!
//! A failed reload leaves the table exactly as it was.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;

use crate::connectors::{SourceDatabase, Table, Warehouse};
use crate::error::{Error, Result};
use crate::model::{
    ProductDimension, PurchaseFact, SourceProduct, SourcePurchaseLine, SourceVendor,
    TimeDimension, VendorDimension,
};

/// Source system that returns fixed extracts
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    products: Vec<SourceProduct>,
    vendors: Vec<SourceVendor>,
    purchase_lines: Vec<SourcePurchaseLine>,
    unavailable: bool,
}

impl MockSource {
    /// Create a source with empty extracts
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows returned by the product extract
    pub fn with_products(mut self, products: Vec<SourceProduct>) -> Self {
        self.products = products;
        self
    }

    /// Rows returned by the vendor extract
    pub fn with_vendors(mut self, vendors: Vec<SourceVendor>) -> Self {
        self.vendors = vendors;
        self
    }

    /// Rows returned by the purchase line extract
    pub fn with_purchase_lines(mut self, lines: Vec<SourcePurchaseLine>) -> Self {
        self.purchase_lines = lines;
        self
    }

    /// Fail every extract
    pub fn with_unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    fn extract<T: Clone>(&self, name: &str, rows: &[T]) -> Result<Vec<T>> {
        if self.unavailable {
            return Err(Error::source(name, "connection refused (simulated)"));
        }
        Ok(rows.to_vec())
    }
}

#[async_trait]
impl SourceDatabase for MockSource {
    async fn fetch_products(&self) -> Result<Vec<SourceProduct>> {
        self.extract("products", &self.products)
    }

    async fn fetch_vendors(&self) -> Result<Vec<SourceVendor>> {
        self.extract("vendors", &self.vendors)
    }

    async fn fetch_purchase_lines(&self) -> Result<Vec<SourcePurchaseLine>> {
        self.extract("purchase_lines", &self.purchase_lines)
    }
}

/// A dimension row together with the surrogate key it was given
#[derive(Debug, Clone, PartialEq)]
pub struct Keyed<T> {
    /// Surrogate key
    pub sk: i32,
    /// Stored row
    pub row: T,
}

/// Full contents of a [`MockWarehouse`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// `dim_time`
    pub time: Vec<TimeDimension>,
    /// `dim_product`
    pub products: Vec<Keyed<ProductDimension>>,
    /// `dim_vendor`
    pub vendors: Vec<Keyed<VendorDimension>>,
    /// `fact_purchase`
    pub facts: Vec<PurchaseFact>,
}

#[derive(Debug, Default)]
struct State {
    tables: Snapshot,
    reloads: HashMap<Table, u32>,
}

/// Warehouse that keeps every table in memory
#[derive(Debug, Clone, Default)]
pub struct MockWarehouse {
    state: Arc<RwLock<State>>,
    // Remaining injected failures per table, set while building
    failures: Arc<Mutex<HashMap<Table, u32>>>,
    unavailable: bool,
}

impl MockWarehouse {
    /// Create an empty warehouse
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call, as if the warehouse were unreachable
    pub fn with_unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Make the next `times` reloads of `table` fail
    pub fn with_failures(self, table: Table, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(table, times);
        self
    }

    fn take_failure(&self, table: Table) -> bool {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        match failures.get_mut(&table) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    /// Copy of every table
    pub async fn snapshot(&self) -> Snapshot {
        self.state.read().await.tables.clone()
    }

    /// Rows of `dim_time`
    pub async fn time_rows(&self) -> Vec<TimeDimension> {
        self.state.read().await.tables.time.clone()
    }

    /// Rows of `dim_product`
    pub async fn product_rows(&self) -> Vec<Keyed<ProductDimension>> {
        self.state.read().await.tables.products.clone()
    }

    /// Rows of `dim_vendor`
    pub async fn vendor_rows(&self) -> Vec<Keyed<VendorDimension>> {
        self.state.read().await.tables.vendors.clone()
    }

    /// Rows of `fact_purchase`
    pub async fn fact_rows(&self) -> Vec<PurchaseFact> {
        self.state.read().await.tables.facts.clone()
    }

    /// Successful reloads of `fact_purchase` so far
    pub async fn fact_reloads(&self) -> u32 {
        self.reloads(Table::Purchase).await
    }

    /// Successful reloads of `table` so far
    pub async fn reloads(&self, table: Table) -> u32 {
        self.state
            .read()
            .await
            .reloads
            .get(&table)
            .copied()
            .unwrap_or(0)
    }

    fn check_available(&self, table: Table) -> Result<()> {
        if self.unavailable {
            return Err(Error::warehouse(
                table.name(),
                "connection refused (simulated)",
            ));
        }
        Ok(())
    }

    async fn reload<F>(&self, table: Table, apply: F) -> Result<u64>
    where
        F: FnOnce(&mut Snapshot) -> u64 + Send,
    {
        self.check_available(table)?;
        let mut state = self.state.write().await;
        if self.take_failure(table) {
            return Err(Error::warehouse(table.name(), "insert failed (simulated)"));
        }

        // Truncating a dimension cascades to the fact table
        if table.is_dimension() {
            state.tables.facts.clear();
        }
        let inserted = apply(&mut state.tables);
        *state.reloads.entry(table).or_insert(0) += 1;
        Ok(inserted)
    }

    async fn keys<F>(&self, table: Table, read: F) -> Result<HashMap<i32, i32>>
    where
        F: FnOnce(&Snapshot) -> HashMap<i32, i32> + Send,
    {
        self.check_available(table)?;
        Ok(read(&self.state.read().await.tables))
    }
}

fn keyed<T: Clone>(rows: &[T]) -> Vec<Keyed<T>> {
    rows.iter()
        .zip(1..)
        .map(|(row, sk)| Keyed {
            sk,
            row: row.clone(),
        })
        .collect()
}

#[async_trait]
impl Warehouse for MockWarehouse {
    async fn reload_time(&self, rows: &[TimeDimension]) -> Result<u64> {
        self.reload(Table::Time, |tables| {
            tables.time = rows.to_vec();
            rows.len() as u64
        })
        .await
    }

    async fn reload_products(&self, rows: &[ProductDimension]) -> Result<u64> {
        self.reload(Table::Product, |tables| {
            tables.products = keyed(rows);
            rows.len() as u64
        })
        .await
    }

    async fn reload_vendors(&self, rows: &[VendorDimension]) -> Result<u64> {
        self.reload(Table::Vendor, |tables| {
            tables.vendors = keyed(rows);
            rows.len() as u64
        })
        .await
    }

    async fn reload_facts(&self, rows: &[PurchaseFact]) -> Result<u64> {
        self.reload(Table::Purchase, |tables| {
            tables.facts = rows.to_vec();
            rows.len() as u64
        })
        .await
    }

    async fn product_keys(&self) -> Result<HashMap<i32, i32>> {
        self.keys(Table::Product, |tables| {
            tables
                .products
                .iter()
                .map(|p| (p.row.original_product_id, p.sk))
                .collect()
        })
        .await
    }

    async fn vendor_keys(&self) -> Result<HashMap<i32, i32>> {
        self.keys(Table::Vendor, |tables| {
            tables
                .vendors
                .iter()
                .map(|v| (v.row.original_vendor_id, v.sk))
                .collect()
        })
        .await
    }
}
