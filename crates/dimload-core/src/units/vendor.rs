//! Vendor dimension
//!
//! The source join fans out through the vendor's address links, so a vendor
//! can come back several times. Exactly one row per vendor is kept: the one
//! linked to the lowest address id. Vendors without any address come back
//! once, with no address id, and keep the `Unknown` placeholders.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use crate::connectors::{SourceDatabase, Warehouse};
use crate::error::Result;
use crate::model::{SourceVendor, UNKNOWN, VendorDimension};
use crate::units::{DIM_VENDOR, LoadReport, Unit};

/// Source query: vendor ⟕ business entity address ⟕ address ⟕ state/province
pub const EXTRACT_SQL: &str = r#"
SELECT
    v.businessentityid        AS vendor_id,
    v.name::text              AS name,
    v.creditrating::int4      AS credit_rating,
    v.activeflag::bool        AS active_flag,
    bea.addressid             AS address_id,
    a.city::text              AS city,
    sp.name::text             AS state
FROM purchasing.vendor v
LEFT JOIN person.businessentityaddress bea
    ON v.businessentityid = bea.businessentityid
LEFT JOIN person.address a
    ON bea.addressid = a.addressid
LEFT JOIN person.stateprovince sp
    ON a.stateprovinceid = sp.stateprovinceid
"#;

/// Rebuilds `dim_vendor` from the vendor master
pub struct VendorDimensionBuilder {
    source: Arc<dyn SourceDatabase>,
    warehouse: Arc<dyn Warehouse>,
}

impl VendorDimensionBuilder {
    /// Create a builder reading from `source` and loading into `warehouse`
    pub fn new(source: Arc<dyn SourceDatabase>, warehouse: Arc<dyn Warehouse>) -> Self {
        Self { source, warehouse }
    }
}

#[async_trait]
impl Unit for VendorDimensionBuilder {
    fn name(&self) -> &'static str {
        DIM_VENDOR
    }

    #[tracing::instrument(name = "unit", skip(self), fields(unit = DIM_VENDOR))]
    async fn run(&self) -> Result<LoadReport> {
        let extracted = self.source.fetch_vendors().await?;
        let extracted_count = extracted.len() as u64;
        let rows = deduplicate(extracted);
        let dropped = extracted_count - rows.len() as u64;
        if dropped > 0 {
            tracing::debug!("Dropped {} extra address rows", dropped);
        }

        let loaded = self.warehouse.reload_vendors(&rows).await?;
        tracing::info!("Vendor dimension loaded: {} rows", loaded);

        Ok(LoadReport::new(DIM_VENDOR, loaded, &rows)?
            .with_counter("extracted", extracted_count)
            .with_counter("duplicates_dropped", dropped))
    }
}

/// Keep one row per vendor (lowest address id), ordered by natural key.
///
/// The result does not depend on the order of `vendors`.
pub fn deduplicate(vendors: Vec<SourceVendor>) -> Vec<VendorDimension> {
    let mut chosen: BTreeMap<i32, SourceVendor> = BTreeMap::new();
    for vendor in vendors {
        match chosen.entry(vendor.vendor_id) {
            Entry::Vacant(slot) => {
                slot.insert(vendor);
            }
            Entry::Occupied(mut slot) => {
                if precedes(&vendor, slot.get()) {
                    slot.insert(vendor);
                }
            }
        }
    }
    chosen.into_values().map(conform).collect()
}

// Rows without an address sort after any addressed row; ties on the same
// address keep the first seen.
fn precedes(candidate: &SourceVendor, current: &SourceVendor) -> bool {
    match (candidate.address_id, current.address_id) {
        (Some(a), Some(b)) => a < b,
        (Some(_), None) => true,
        _ => false,
    }
}

fn conform(vendor: SourceVendor) -> VendorDimension {
    VendorDimension {
        original_vendor_id: vendor.vendor_id,
        name: vendor.name,
        credit_rating: vendor.credit_rating,
        active_flag: vendor.active_flag,
        city: vendor.city.unwrap_or_else(|| UNKNOWN.to_string()),
        state: vendor.state.unwrap_or_else(|| UNKNOWN.to_string()),
    }
}
