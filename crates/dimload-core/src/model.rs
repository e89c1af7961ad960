//! Source records and warehouse rows
//!
//! `Source*` types mirror what the extraction queries return, nullable
//! columns included. The remaining types are the conformed rows written to
//! the star schema.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Placeholder for a product category or subcategory the source could not join.
pub const NOT_AVAILABLE: &str = "N/A";

/// Placeholder for a vendor city or state the source could not join.
pub const UNKNOWN: &str = "Unknown";

/// Product master row as extracted (product ⟕ subcategory ⟕ category)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceProduct {
    /// Natural key in the source system
    pub product_id: i32,
    /// Product name
    pub name: String,
    /// Product number
    pub product_number: String,
    /// Category name, absent when the join found nothing
    pub category: Option<String>,
    /// Subcategory name, absent when the join found nothing
    pub subcategory: Option<String>,
    /// Standard cost
    pub standard_cost: f64,
}

/// Vendor master row as extracted (vendor ⟕ address link ⟕ address ⟕ state).
///
/// A vendor with several address links appears once per link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceVendor {
    /// Natural key in the source system
    pub vendor_id: i32,
    /// Vendor name
    pub name: String,
    /// Credit rating (1 = superior .. 5 = below average)
    pub credit_rating: i32,
    /// Whether the vendor is active
    pub active_flag: bool,
    /// Linked address, used as the deduplication tie-break
    pub address_id: Option<i32>,
    /// City of the linked address
    pub city: Option<String>,
    /// State/province name of the linked address
    pub state: Option<String>,
}

/// Purchase order line joined with its header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePurchaseLine {
    /// Purchase order id (header)
    pub order_id: i32,
    /// Line id within the order
    pub line_id: i32,
    /// Product natural key
    pub product_id: i32,
    /// Vendor natural key (header)
    pub vendor_id: i32,
    /// Order date (header)
    pub order_date: Option<NaiveDate>,
    /// Due date (line)
    pub due_date: Option<NaiveDate>,
    /// Ship date (header)
    pub ship_date: Option<NaiveDate>,
    /// Quantity ordered
    pub qty_ordered: Option<i32>,
    /// Quantity received
    pub qty_received: Option<f64>,
    /// Quantity rejected
    pub qty_rejected: Option<f64>,
    /// Unit price
    pub unit_price: Option<f64>,
    /// Line total
    pub line_total: Option<f64>,
    /// Freight for the whole order (header, repeated on every line)
    pub freight: Option<f64>,
}

/// Row of `dim_time`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeDimension {
    /// `YYYYMMDD` key of `full_date`
    pub sk_time: i32,
    /// Calendar date
    pub full_date: NaiveDate,
    /// Year
    pub year: i32,
    /// Month number, 1-12
    pub month: i32,
    /// English month name
    pub month_name: String,
    /// Calendar quarter, 1-4
    pub quarter: i32,
    /// ISO-8601 week of year
    pub week_of_year: i32,
    /// English weekday name
    pub weekday_name: String,
}

/// Row of `dim_product`, before the warehouse assigns `sk_product`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDimension {
    /// Natural key
    pub original_product_id: i32,
    /// Product name
    pub name: String,
    /// Product number
    pub product_number: String,
    /// Category, or [`NOT_AVAILABLE`]
    pub category: String,
    /// Subcategory, or [`NOT_AVAILABLE`]
    pub subcategory: String,
    /// Standard cost
    pub standard_cost: f64,
}

/// Row of `dim_vendor`, before the warehouse assigns `sk_vendor`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorDimension {
    /// Natural key
    pub original_vendor_id: i32,
    /// Vendor name
    pub name: String,
    /// Credit rating
    pub credit_rating: i32,
    /// Active flag
    pub active_flag: bool,
    /// City, or [`UNKNOWN`]
    pub city: String,
    /// State/province, or [`UNKNOWN`]
    pub state: String,
}

/// Row of `fact_purchase`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseFact {
    /// Product surrogate key
    pub sk_product: i32,
    /// Vendor surrogate key
    pub sk_vendor: i32,
    /// Order date key
    pub sk_time_ordered: i32,
    /// Due date key
    pub sk_time_due: i32,
    /// Ship date key
    pub sk_time_shipped: i32,
    /// Quantity ordered
    pub qty_ordered: i32,
    /// Quantity received
    pub qty_received: f64,
    /// Quantity rejected
    pub qty_rejected: f64,
    /// Unit price
    pub unit_price: f64,
    /// Line total
    pub line_total: f64,
    /// Order freight divided by the quantity ordered on this line
    pub freight_per_unit: f64,
    /// Originating purchase order; several lines share one order
    pub order_id: i32,
}
