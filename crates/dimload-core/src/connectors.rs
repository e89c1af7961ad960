//! Connector traits
//!
//! The pipeline reads from a [`SourceDatabase`] and writes to a
//! [`Warehouse`]. Postgres implementations live in `dimload-runtime`;
//! [`crate::mock`] provides in-memory ones.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

use crate::error::Result;
use crate::model::{
    ProductDimension, PurchaseFact, SourceProduct, SourcePurchaseLine, SourceVendor,
    TimeDimension, VendorDimension,
};

/// Read-only access to the operational database
#[async_trait]
pub trait SourceDatabase: Send + Sync {
    /// Products with their subcategory and category, if any
    async fn fetch_products(&self) -> Result<Vec<SourceProduct>>;

    /// Vendors, one row per address link
    async fn fetch_vendors(&self) -> Result<Vec<SourceVendor>>;

    /// Purchase order lines joined with their header
    async fn fetch_purchase_lines(&self) -> Result<Vec<SourcePurchaseLine>>;
}

/// Write access to the star schema.
///
/// Every `reload_*` call replaces the whole table: it truncates the table
/// (cascading to dependents for dimensions) and inserts `rows` in order.
/// Implementations must not leave a truncated table behind when the insert
/// fails.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Replace `dim_time`
    async fn reload_time(&self, rows: &[TimeDimension]) -> Result<u64>;

    /// Replace `dim_product`; surrogate keys are assigned in row order
    async fn reload_products(&self, rows: &[ProductDimension]) -> Result<u64>;

    /// Replace `dim_vendor`; surrogate keys are assigned in row order
    async fn reload_vendors(&self, rows: &[VendorDimension]) -> Result<u64>;

    /// Replace `fact_purchase`
    async fn reload_facts(&self, rows: &[PurchaseFact]) -> Result<u64>;

    /// Current `original_product_id -> sk_product` mapping
    async fn product_keys(&self) -> Result<HashMap<i32, i32>>;

    /// Current `original_vendor_id -> sk_vendor` mapping
    async fn vendor_keys(&self) -> Result<HashMap<i32, i32>>;
}

/// Destination tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Calendar dimension
    Time,
    /// Product dimension
    Product,
    /// Vendor dimension
    Vendor,
    /// Purchase fact
    Purchase,
}

impl Table {
    /// Unqualified table name
    pub fn name(self) -> &'static str {
        match self {
            Self::Time => "dim_time",
            Self::Product => "dim_product",
            Self::Vendor => "dim_vendor",
            Self::Purchase => "fact_purchase",
        }
    }

    /// Insert column list, surrogate keys assigned by the database excluded
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Time => &[
                "sk_time",
                "full_date",
                "year",
                "month",
                "month_name",
                "quarter",
                "week_of_year",
                "weekday_name",
            ],
            Self::Product => &[
                "original_product_id",
                "name",
                "product_number",
                "category",
                "subcategory",
                "standard_cost",
            ],
            Self::Vendor => &[
                "original_vendor_id",
                "name",
                "credit_rating",
                "active_flag",
                "city",
                "state",
            ],
            Self::Purchase => &[
                "sk_product",
                "sk_vendor",
                "sk_time_ordered",
                "sk_time_due",
                "sk_time_shipped",
                "qty_ordered",
                "qty_received",
                "qty_rejected",
                "unit_price",
                "line_total",
                "freight_per_unit",
                "order_id",
            ],
        }
    }

    /// Dimensions truncate with CASCADE so referencing facts go with them
    pub fn is_dimension(self) -> bool {
        !matches!(self, Self::Purchase)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
