//! Integration tests for the load units against in-memory connectors
//!
//! Units are run layer by layer in the order `TaskGraph::purchasing` gives,
//! which is what the runtime scheduler does minus concurrency and retries.

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dimload_core::config::{FactConfig, TimeDimensionConfig};
use dimload_core::datekey::{self, UNKNOWN_DATE_KEY};
use dimload_core::mock::{MockSource, MockWarehouse, Snapshot};
use dimload_core::model::{
    NOT_AVAILABLE, SourceProduct, SourcePurchaseLine, SourceVendor, UNKNOWN,
};
use dimload_core::units::{
    ProductDimensionBuilder, PurchaseFactBuilder, TimeDimensionBuilder, VendorDimensionBuilder,
};
use dimload_core::{Error, LoadReport, TaskGraph, Unit};

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// One product without a category, one vendor in Austin, one purchase line.
fn widget_source() -> MockSource {
    MockSource::new()
        .with_products(vec![SourceProduct {
            product_id: 7,
            name: "Widget".to_string(),
            product_number: "WG-0007".to_string(),
            category: None,
            subcategory: None,
            standard_cost: 3.25,
        }])
        .with_vendors(vec![SourceVendor {
            vendor_id: 3,
            name: "Acme".to_string(),
            credit_rating: 1,
            active_flag: true,
            address_id: Some(1),
            city: Some("Austin".to_string()),
            state: Some("Texas".to_string()),
        }])
        .with_purchase_lines(vec![widget_line()])
}

fn widget_line() -> SourcePurchaseLine {
    SourcePurchaseLine {
        order_id: 1001,
        line_id: 1,
        product_id: 7,
        vendor_id: 3,
        order_date: Some(ymd(2024, 3, 1)),
        due_date: None,
        ship_date: Some(ymd(2024, 3, 5)),
        qty_ordered: Some(10),
        qty_received: Some(10.0),
        qty_rejected: Some(0.0),
        unit_price: Some(4.0),
        line_total: Some(40.0),
        freight: Some(50.0),
    }
}

fn units(source: Arc<MockSource>, warehouse: Arc<MockWarehouse>) -> HashMap<String, Arc<dyn Unit>> {
    let list: Vec<Arc<dyn Unit>> = vec![
        Arc::new(TimeDimensionBuilder::new(
            warehouse.clone(),
            TimeDimensionConfig::default(),
        )),
        Arc::new(ProductDimensionBuilder::new(source.clone(), warehouse.clone())),
        Arc::new(VendorDimensionBuilder::new(source.clone(), warehouse.clone())),
        Arc::new(PurchaseFactBuilder::new(
            source,
            warehouse,
            FactConfig::default(),
            &TimeDimensionConfig::default(),
        )),
    ];
    list.into_iter()
        .map(|unit| (unit.name().to_string(), unit))
        .collect()
}

async fn run_pipeline(
    source: Arc<MockSource>,
    warehouse: Arc<MockWarehouse>,
) -> Vec<LoadReport> {
    let units = units(source, warehouse);
    let mut reports = Vec::new();
    for layer in TaskGraph::purchasing().layers().unwrap() {
        for name in layer {
            reports.push(units[&name].run().await.unwrap());
        }
    }
    reports
}

#[tokio::test]
async fn test_widget_end_to_end() {
    let source = Arc::new(widget_source());
    let warehouse = Arc::new(MockWarehouse::new());

    run_pipeline(source, warehouse.clone()).await;
    let tables = warehouse.snapshot().await;

    assert_eq!(tables.time.len(), 5844);

    assert_eq!(tables.products.len(), 1);
    let product = &tables.products[0];
    assert_eq!(product.row.original_product_id, 7);
    assert_eq!(product.row.name, "Widget");
    assert_eq!(product.row.category, NOT_AVAILABLE);
    assert_eq!(product.row.subcategory, NOT_AVAILABLE);

    assert_eq!(tables.vendors.len(), 1);
    let vendor = &tables.vendors[0];
    assert_eq!(vendor.row.name, "Acme");
    assert_eq!(vendor.row.city, "Austin");

    assert_eq!(tables.facts.len(), 1);
    let fact = &tables.facts[0];
    assert_eq!(fact.sk_product, product.sk);
    assert_eq!(fact.sk_vendor, vendor.sk);
    assert_eq!(fact.sk_time_ordered, datekey::encode(ymd(2024, 3, 1)));
    assert_eq!(fact.sk_time_due, UNKNOWN_DATE_KEY);
    assert_eq!(fact.sk_time_shipped, 20240305);
    assert_eq!(fact.freight_per_unit, 5.0);
    assert_eq!(fact.order_id, 1001);
}

#[tokio::test]
async fn test_fact_time_keys_reference_calendar_or_unknown() {
    let warehouse = Arc::new(MockWarehouse::new());
    run_pipeline(Arc::new(widget_source()), warehouse.clone()).await;
    let tables = warehouse.snapshot().await;

    let calendar: HashSet<i32> = tables.time.iter().map(|t| t.sk_time).collect();
    for fact in &tables.facts {
        for key in [fact.sk_time_ordered, fact.sk_time_due, fact.sk_time_shipped] {
            assert!(calendar.contains(&key) || key == UNKNOWN_DATE_KEY);
        }
    }
}

#[tokio::test]
async fn test_dates_outside_calendar_reference_unknown() {
    let mut line = widget_line();
    line.order_date = Some(ymd(2026, 2, 1));
    line.due_date = Some(ymd(2009, 12, 31));
    line.ship_date = None;
    let source = Arc::new(widget_source().with_purchase_lines(vec![line]));
    let warehouse = Arc::new(MockWarehouse::new());

    let reports = run_pipeline(source, warehouse.clone()).await;
    let tables = warehouse.snapshot().await;

    let calendar: HashSet<i32> = tables.time.iter().map(|t| t.sk_time).collect();
    let fact = &tables.facts[0];
    for key in [fact.sk_time_ordered, fact.sk_time_due, fact.sk_time_shipped] {
        assert!(calendar.contains(&key) || key == UNKNOWN_DATE_KEY, "dangling key {key}");
    }
    assert_eq!(fact.sk_time_ordered, UNKNOWN_DATE_KEY);

    let facts = reports.iter().find(|r| r.table == "fact_purchase").unwrap();
    assert_eq!(facts.counter("dates_out_of_range"), 1);
}

#[tokio::test]
async fn test_running_twice_is_idempotent() {
    let source = Arc::new(widget_source());
    let warehouse = Arc::new(MockWarehouse::new());

    let first_reports = run_pipeline(source.clone(), warehouse.clone()).await;
    let first: Snapshot = warehouse.snapshot().await;
    let second_reports = run_pipeline(source, warehouse.clone()).await;
    let second: Snapshot = warehouse.snapshot().await;

    assert_eq!(first, second);
    assert_eq!(first_reports, second_reports);
}

#[tokio::test]
async fn test_vendor_fan_out_loads_one_row() {
    let mut vendors = Vec::new();
    for (address_id, city) in [(9, "Dallas"), (4, "Austin"), (6, "Houston")] {
        vendors.push(SourceVendor {
            vendor_id: 3,
            name: "Acme".to_string(),
            credit_rating: 2,
            active_flag: true,
            address_id: Some(address_id),
            city: Some(city.to_string()),
            state: None,
        });
    }
    let source = Arc::new(widget_source().with_vendors(vendors));
    let warehouse = Arc::new(MockWarehouse::new());

    run_pipeline(source, warehouse.clone()).await;
    let tables = warehouse.snapshot().await;

    assert_eq!(tables.vendors.len(), 1);
    assert_eq!(tables.vendors[0].row.city, "Austin");
    assert_eq!(tables.vendors[0].row.state, UNKNOWN);
    assert_eq!(tables.facts.len(), 1);
}

#[tokio::test]
async fn test_fact_unit_first_fails_and_leaves_warehouse_empty() {
    let source = Arc::new(widget_source());
    let warehouse = Arc::new(MockWarehouse::new());
    let units = units(source, warehouse.clone());

    let err = units["fact_purchase"].run().await.unwrap_err();
    assert!(matches!(err, Error::DimensionNotLoaded { .. }));
    assert_eq!(warehouse.snapshot().await, Snapshot::default());
}

#[tokio::test]
async fn test_product_reload_invalidates_facts_until_fact_reload() {
    let source = Arc::new(widget_source());
    let warehouse = Arc::new(MockWarehouse::new());
    run_pipeline(source.clone(), warehouse.clone()).await;

    let units = units(source, warehouse.clone());
    units["dim_product"].run().await.unwrap();
    assert!(warehouse.fact_rows().await.is_empty());

    units["fact_purchase"].run().await.unwrap();
    assert_eq!(warehouse.fact_rows().await.len(), 1);
}

#[tokio::test]
async fn test_custom_calendar_range() {
    let warehouse = Arc::new(MockWarehouse::new());
    let unit = TimeDimensionBuilder::new(
        warehouse.clone(),
        TimeDimensionConfig {
            start: ymd(2024, 2, 1),
            end: ymd(2024, 2, 29),
            include_unknown_member: false,
        },
    );
    let report = unit.run().await.unwrap();
    assert_eq!(report.rows, 29);
    assert_eq!(
        warehouse.time_rows().await.last().unwrap().full_date,
        ymd(2024, 2, 29)
    );
}
