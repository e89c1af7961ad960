//! Calendar dimension

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use std::sync::Arc;

use crate::config::TimeDimensionConfig;
use crate::connectors::Warehouse;
use crate::datekey;
use crate::error::Result;
use crate::model::TimeDimension;
use crate::units::{DIM_TIME, LoadReport, Unit};

/// Generates `dim_time` without touching the source system
pub struct TimeDimensionBuilder {
    warehouse: Arc<dyn Warehouse>,
    config: TimeDimensionConfig,
}

impl TimeDimensionBuilder {
    /// Create a builder for the configured date range
    pub fn new(warehouse: Arc<dyn Warehouse>, config: TimeDimensionConfig) -> Self {
        Self { warehouse, config }
    }
}

#[async_trait]
impl Unit for TimeDimensionBuilder {
    fn name(&self) -> &'static str {
        DIM_TIME
    }

    #[tracing::instrument(name = "unit", skip(self), fields(unit = DIM_TIME))]
    async fn run(&self) -> Result<LoadReport> {
        let mut rows = generate(self.config.start, self.config.end);
        if self.config.include_unknown_member {
            rows.insert(0, calendar_row(datekey::unknown_date()));
        }
        tracing::debug!(
            "Generated {} calendar rows from {} to {}",
            rows.len(),
            self.config.start,
            self.config.end
        );

        let loaded = self.warehouse.reload_time(&rows).await?;
        tracing::info!("Time dimension loaded: {} rows", loaded);

        LoadReport::new(DIM_TIME, loaded, &rows)
    }
}

/// One row per day in `start..=end`; empty when `start > end`.
pub fn generate(start: NaiveDate, end: NaiveDate) -> Vec<TimeDimension> {
    start
        .iter_days()
        .take_while(|day| *day <= end)
        .map(calendar_row)
        .collect()
}

/// Derive every calendar attribute of a date
pub fn calendar_row(date: NaiveDate) -> TimeDimension {
    TimeDimension {
        sk_time: datekey::encode(date),
        full_date: date,
        year: date.year(),
        month: date.month() as i32,
        month_name: date.format("%B").to_string(),
        quarter: date.month0() as i32 / 3 + 1,
        week_of_year: date.iso_week().week() as i32,
        weekday_name: date.format("%A").to_string(),
    }
}
