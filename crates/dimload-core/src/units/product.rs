//! Product dimension

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::connectors::{SourceDatabase, Warehouse};
use crate::error::{Error, Result};
use crate::model::{NOT_AVAILABLE, ProductDimension, SourceProduct};
use crate::units::{DIM_PRODUCT, LoadReport, Unit};

/// Source query: product ⟕ subcategory ⟕ category
pub const EXTRACT_SQL: &str = r#"
SELECT
    p.productid               AS product_id,
    p.name::text              AS name,
    p.productnumber::text     AS product_number,
    pc.name::text             AS category,
    ps.name::text             AS subcategory,
    p.standardcost::float8    AS standard_cost
FROM production.product p
LEFT JOIN production.productsubcategory ps
    ON p.productsubcategoryid = ps.productsubcategoryid
LEFT JOIN production.productcategory pc
    ON ps.productcategoryid = pc.productcategoryid
"#;

/// Rebuilds `dim_product` from the product master
pub struct ProductDimensionBuilder {
    source: Arc<dyn SourceDatabase>,
    warehouse: Arc<dyn Warehouse>,
}

impl ProductDimensionBuilder {
    /// Create a builder reading from `source` and loading into `warehouse`
    pub fn new(source: Arc<dyn SourceDatabase>, warehouse: Arc<dyn Warehouse>) -> Self {
        Self { source, warehouse }
    }
}

#[async_trait]
impl Unit for ProductDimensionBuilder {
    fn name(&self) -> &'static str {
        DIM_PRODUCT
    }

    #[tracing::instrument(name = "unit", skip(self), fields(unit = DIM_PRODUCT))]
    async fn run(&self) -> Result<LoadReport> {
        let extracted = self.source.fetch_products().await?;
        let extracted_count = extracted.len() as u64;
        let rows = conform(extracted)?;

        let loaded = self.warehouse.reload_products(&rows).await?;
        tracing::info!("Product dimension loaded: {} rows", loaded);

        Ok(LoadReport::new(DIM_PRODUCT, loaded, &rows)?.with_counter("extracted", extracted_count))
    }
}

/// Fill missing category/subcategory and order by natural key.
///
/// Product ids are unique in the source; a repeated id means the extract
/// is broken and the load is refused.
pub fn conform(products: Vec<SourceProduct>) -> Result<Vec<ProductDimension>> {
    let mut by_id = BTreeMap::new();
    for product in products {
        let id = product.product_id;
        let row = ProductDimension {
            original_product_id: id,
            name: product.name,
            product_number: product.product_number,
            category: product.category.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            subcategory: product
                .subcategory
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            standard_cost: product.standard_cost,
        };
        if by_id.insert(id, row).is_some() {
            return Err(Error::DuplicateNaturalKey {
                table: DIM_PRODUCT.to_string(),
                key: id,
            });
        }
    }
    Ok(by_id.into_values().collect())
}
