//! Purchase fact table
//!
//! Purchase order lines are keyed against the product and vendor dimensions
//! as they stand in the warehouse when the unit starts, so the dimension
//! units must have committed first.
//!
//! Dates outside the configured calendar have no `dim_time` row; they are
//! keyed as unknown or rejected, per [`DateOutOfRangePolicy`].
//!
//! Everything the unit reads (both key lookups and the source extract) is
//! read before the fact table is touched: a failed read leaves the previous
//! load in place.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::config::{
    DateOutOfRangePolicy, FactConfig, LookupMissPolicy, TimeDimensionConfig, ZeroQuantityPolicy,
};
use crate::connectors::{SourceDatabase, Warehouse};
use crate::datekey;
use crate::error::{Error, Result};
use crate::model::{PurchaseFact, SourcePurchaseLine};
use crate::units::{DIM_PRODUCT, DIM_VENDOR, FACT_PURCHASE, LoadReport, Unit};

/// Source query: purchase order detail ⋈ header
pub const EXTRACT_SQL: &str = r#"
SELECT
    poh.purchaseorderid                      AS order_id,
    pod.purchaseorderdetailid                AS line_id,
    pod.productid                            AS product_id,
    poh.vendorid                             AS vendor_id,
    poh.orderdate::date                      AS order_date,
    pod.duedate::date                        AS due_date,
    poh.shipdate::date                       AS ship_date,
    pod.orderqty::int4                       AS qty_ordered,
    pod.receivedqty::float8                  AS qty_received,
    pod.rejectedqty::float8                  AS qty_rejected,
    pod.unitprice::float8                    AS unit_price,
    (pod.orderqty * pod.unitprice)::float8   AS line_total,
    poh.freight::float8                      AS freight
FROM purchasing.purchaseorderdetail pod
JOIN purchasing.purchaseorderheader poh
    ON pod.purchaseorderid = poh.purchaseorderid
ORDER BY poh.purchaseorderid, pod.purchaseorderdetailid
"#;

/// Rebuilds `fact_purchase`
pub struct PurchaseFactBuilder {
    source: Arc<dyn SourceDatabase>,
    warehouse: Arc<dyn Warehouse>,
    policy: FactConfig,
    calendar: RangeInclusive<NaiveDate>,
}

impl PurchaseFactBuilder {
    /// Create a builder applying `policy` to unresolved keys, zero quantities
    /// and dates outside `calendar`
    pub fn new(
        source: Arc<dyn SourceDatabase>,
        warehouse: Arc<dyn Warehouse>,
        policy: FactConfig,
        calendar: &TimeDimensionConfig,
    ) -> Self {
        Self {
            source,
            warehouse,
            policy,
            calendar: calendar.start..=calendar.end,
        }
    }
}

#[async_trait]
impl Unit for PurchaseFactBuilder {
    fn name(&self) -> &'static str {
        FACT_PURCHASE
    }

    #[tracing::instrument(name = "unit", skip(self), fields(unit = FACT_PURCHASE))]
    async fn run(&self) -> Result<LoadReport> {
        let product_keys = self.warehouse.product_keys().await?;
        let vendor_keys = self.warehouse.vendor_keys().await?;
        if self.policy.require_loaded_dimensions {
            ensure_loaded(DIM_PRODUCT, &product_keys)?;
            ensure_loaded(DIM_VENDOR, &vendor_keys)?;
        }

        let lines = self.source.fetch_purchase_lines().await?;
        let extracted = lines.len() as u64;
        let batch = conform(
            lines,
            &product_keys,
            &vendor_keys,
            &self.calendar,
            &self.policy,
        )?;

        if batch.product_misses + batch.vendor_misses > 0 {
            tracing::warn!(
                product_misses = batch.product_misses,
                vendor_misses = batch.vendor_misses,
                policy = ?self.policy.on_lookup_miss,
                "Purchase lines reference keys missing from the dimensions"
            );
        }
        if batch.zero_quantity > 0 {
            tracing::warn!(
                lines = batch.zero_quantity,
                "Purchase lines with zero quantity get freight per unit 0"
            );
        }
        if batch.dates_out_of_range > 0 {
            tracing::warn!(
                lines = batch.dates_out_of_range,
                start = %self.calendar.start(),
                end = %self.calendar.end(),
                "Purchase lines dated outside the calendar are keyed as unknown"
            );
        }

        let loaded = self.warehouse.reload_facts(&batch.rows).await?;
        tracing::info!("Purchase facts loaded: {} rows", loaded);

        Ok(LoadReport::new(FACT_PURCHASE, loaded, &batch.rows)?
            .with_counter("extracted", extracted)
            .with_counter("product_lookup_misses", batch.product_misses)
            .with_counter("vendor_lookup_misses", batch.vendor_misses)
            .with_counter("zero_quantity", batch.zero_quantity)
            .with_counter("dates_out_of_range", batch.dates_out_of_range)
            .with_counter("skipped", batch.skipped))
    }
}

fn ensure_loaded(table: &str, keys: &HashMap<i32, i32>) -> Result<()> {
    if keys.is_empty() {
        return Err(Error::DimensionNotLoaded {
            table: table.to_string(),
        });
    }
    Ok(())
}

/// Fact rows ready to load, with what the policies did to get there
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactBatch {
    /// Rows in (order, line) order
    pub rows: Vec<PurchaseFact>,
    /// Lines whose product was not in `dim_product`
    pub product_misses: u64,
    /// Lines whose vendor was not in `dim_vendor`
    pub vendor_misses: u64,
    /// Lines with a zero or missing ordered quantity
    pub zero_quantity: u64,
    /// Lines with at least one date outside the calendar
    pub dates_out_of_range: u64,
    /// Lines left out by [`LookupMissPolicy::Skip`]
    pub skipped: u64,
}

/// Turn purchase lines into fact rows.
///
/// Dates become `YYYYMMDD` keys. A null date, or one outside `calendar`
/// under [`DateOutOfRangePolicy::Unknown`], gets [`datekey::UNKNOWN_DATE_KEY`].
/// Natural keys are swapped for surrogate keys, freight is spread over the
/// ordered quantity and missing measures become zero.
pub fn conform(
    mut lines: Vec<SourcePurchaseLine>,
    product_keys: &HashMap<i32, i32>,
    vendor_keys: &HashMap<i32, i32>,
    calendar: &RangeInclusive<NaiveDate>,
    policy: &FactConfig,
) -> Result<FactBatch> {
    lines.sort_by_key(|line| (line.order_id, line.line_id));

    let mut batch = FactBatch::default();
    for line in lines {
        let sk_product = product_keys.get(&line.product_id).copied();
        let sk_vendor = vendor_keys.get(&line.vendor_id).copied();

        if sk_product.is_none() {
            batch.product_misses += 1;
        }
        if sk_vendor.is_none() {
            batch.vendor_misses += 1;
        }
        if sk_product.is_none() || sk_vendor.is_none() {
            match policy.on_lookup_miss {
                LookupMissPolicy::Zero => {}
                LookupMissPolicy::Skip => {
                    batch.skipped += 1;
                    continue;
                }
                LookupMissPolicy::Fail => {
                    let (table, key) = if sk_product.is_none() {
                        (DIM_PRODUCT, line.product_id)
                    } else {
                        (DIM_VENDOR, line.vendor_id)
                    };
                    return Err(Error::LookupMiss {
                        table: table.to_string(),
                        key,
                        order_id: line.order_id,
                    });
                }
            }
        }

        let qty_ordered = line.qty_ordered.unwrap_or(0);
        let freight_per_unit = if qty_ordered == 0 {
            batch.zero_quantity += 1;
            match policy.on_zero_quantity {
                ZeroQuantityPolicy::Zero => 0.0,
                ZeroQuantityPolicy::Fail => {
                    return Err(Error::ZeroQuantity {
                        order_id: line.order_id,
                    });
                }
            }
        } else {
            line.freight.unwrap_or(0.0) / f64::from(qty_ordered)
        };

        let dates = [line.order_date, line.due_date, line.ship_date];
        if let Some(date) = dates.into_iter().flatten().find(|d| !calendar.contains(d)) {
            if policy.on_date_out_of_range == DateOutOfRangePolicy::Fail {
                return Err(Error::DateOutOfRange {
                    order_id: line.order_id,
                    date,
                    start: *calendar.start(),
                    end: *calendar.end(),
                });
            }
            batch.dates_out_of_range += 1;
        }
        let time_key = |date: Option<NaiveDate>| {
            datekey::encode_or_unknown(date.filter(|d| calendar.contains(d)))
        };

        batch.rows.push(PurchaseFact {
            sk_product: sk_product.unwrap_or(0),
            sk_vendor: sk_vendor.unwrap_or(0),
            sk_time_ordered: time_key(line.order_date),
            sk_time_due: time_key(line.due_date),
            sk_time_shipped: time_key(line.ship_date),
            qty_ordered,
            qty_received: line.qty_received.unwrap_or(0.0),
            qty_rejected: line.qty_rejected.unwrap_or(0.0),
            unit_price: line.unit_price.unwrap_or(0.0),
            line_total: line.line_total.unwrap_or(0.0),
            freight_per_unit,
            order_id: line.order_id,
        });
    }
    Ok(batch)
}
