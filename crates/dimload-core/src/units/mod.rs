//! Load units
//!
//! Each unit rebuilds one warehouse table from scratch:
//!
//! - `dim_time` - synthetic calendar ([`TimeDimensionBuilder`])
//! - `dim_product` - product master data ([`ProductDimensionBuilder`])
//! - `dim_vendor` - vendor master data, one row per vendor ([`VendorDimensionBuilder`])
//! - `fact_purchase` - purchase order lines keyed against the dimensions
//!   ([`PurchaseFactBuilder`])
//!
//! Units never talk to each other. The fact unit depends on the dimension
//! units only through the tables they leave behind, which is why it must
//! be scheduled after them (see [`crate::graph::TaskGraph::purchasing`]).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::error::Result;

pub mod product;
pub mod purchase;
pub mod time;
pub mod vendor;

pub use product::ProductDimensionBuilder;
pub use purchase::PurchaseFactBuilder;
pub use time::TimeDimensionBuilder;
pub use vendor::VendorDimensionBuilder;

/// Task name of the calendar dimension unit
pub const DIM_TIME: &str = "dim_time";
/// Task name of the product dimension unit
pub const DIM_PRODUCT: &str = "dim_product";
/// Task name of the vendor dimension unit
pub const DIM_VENDOR: &str = "dim_vendor";
/// Task name of the purchase fact unit
pub const FACT_PURCHASE: &str = "fact_purchase";

/// A schedulable unit of work that rebuilds one table.
///
/// Running a unit twice is safe: the second run replaces what the first
/// one loaded.
#[async_trait]
pub trait Unit: Send + Sync {
    /// Task name, as used in the [`crate::graph::TaskGraph`]
    fn name(&self) -> &'static str;

    /// Extract, transform and reload the table
    async fn run(&self) -> Result<LoadReport>;
}

/// Outcome of one successful unit run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Table that was reloaded
    pub table: String,

    /// Rows inserted
    pub rows: u64,

    /// SHA-256 of the rows in load order
    pub digest: String,

    /// Unit-specific tallies (rows extracted, duplicates dropped, lookup misses, ...)
    #[serde(default)]
    pub counters: BTreeMap<String, u64>,
}

impl LoadReport {
    /// Build a report for rows that were just loaded
    pub fn new<T: Serialize>(table: &str, rows: u64, loaded: &[T]) -> Result<Self> {
        Ok(Self {
            table: table.to_string(),
            rows,
            digest: digest(loaded)?,
            counters: BTreeMap::new(),
        })
    }

    /// Attach a counter
    pub fn with_counter(mut self, name: &str, value: u64) -> Self {
        self.counters.insert(name.to_string(), value);
        self
    }

    /// Read a counter, 0 when absent
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }
}

/// Hex SHA-256 over the JSON encoding of each row, one row per line.
pub fn digest<T: Serialize>(rows: &[T]) -> Result<String> {
    let mut hasher = Sha256::new();
    for row in rows {
        hasher.update(serde_json::to_vec(row)?);
        hasher.update(b"\n");
    }
    Ok(hex::encode(hasher.finalize()))
}
