//! Configuration parsing and validation
//!
//! This module handles loading and validating the `dimload.yaml` project file.
//!
//! The file is rendered as a Jinja template before it is parsed, so
//! connection strings can be taken from the environment:
//!
//! ```yaml
//! source:
//!   url: "{{ env_var('DIMLOAD_SOURCE_URL') }}"
//! warehouse:
//!   url: "{{ env_var('DIMLOAD_WAREHOUSE_URL', 'postgres://localhost/dw') }}"
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Name of the project file looked up inside a project directory
pub const CONFIG_FILE: &str = "dimload.yaml";

/// Largest insert batch accepted. Keeps the widest table under the
/// Postgres limit of 65535 bind parameters per statement.
pub const MAX_BATCH_SIZE: usize = 5000;

/// Root project configuration from `dimload.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Scheduling defaults shared by every unit
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Operational (source) database
    pub source: SourceConfig,

    /// Analytical (warehouse) database
    pub warehouse: WarehouseConfig,

    /// Calendar generation settings
    #[serde(default)]
    pub time_dimension: TimeDimensionConfig,

    /// Fact load policies
    #[serde(default)]
    pub facts: FactConfig,
}

/// Settings applied by the scheduler to every unit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Team or person owning the pipeline, attached to every run report
    #[serde(default = "default_owner")]
    pub owner: String,

    /// How many times a failed unit is re-run from the beginning
    #[serde(default)]
    pub retries: u32,

    /// Pause between attempts
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            retries: 0,
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

fn default_owner() -> String {
    "data-engineering".to_string()
}

fn default_retry_delay_secs() -> u64 {
    5
}

/// Source database connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Warehouse database connection and layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Schema holding the dimension and fact tables
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Connection pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Rows per insert statement
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_max_connections() -> u32 {
    4
}

fn default_schema() -> String {
    "dw".to_string()
}

fn default_batch_size() -> usize {
    1000
}

/// Calendar generation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeDimensionConfig {
    /// First generated day
    #[serde(default = "default_time_start")]
    pub start: NaiveDate,

    /// Last generated day (inclusive)
    #[serde(default = "default_time_end")]
    pub end: NaiveDate,

    /// Also emit the 1900-01-01 row that unknown fact dates point at
    #[serde(default)]
    pub include_unknown_member: bool,
}

impl Default for TimeDimensionConfig {
    fn default() -> Self {
        Self {
            start: default_time_start(),
            end: default_time_end(),
            include_unknown_member: false,
        }
    }
}

fn default_time_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2010, 1, 1).unwrap_or_default()
}

fn default_time_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 12, 31).unwrap_or_default()
}

/// What to do with a fact line whose product or vendor is not in its dimension
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LookupMissPolicy {
    /// Load the line with surrogate key 0
    #[default]
    Zero,
    /// Leave the line out of the load
    Skip,
    /// Abort the unit before anything is truncated
    Fail,
}

/// What to do when freight has to be spread over a zero quantity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ZeroQuantityPolicy {
    /// Freight per unit becomes 0.0
    #[default]
    Zero,
    /// Abort the unit before anything is truncated
    Fail,
}

/// What to do with a fact date that falls outside the generated calendar
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DateOutOfRangePolicy {
    /// Key the date as unknown (19000101)
    #[default]
    Unknown,
    /// Abort the unit before anything is truncated
    Fail,
}

/// Fact load policies
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FactConfig {
    /// Unresolved natural keys
    #[serde(default)]
    pub on_lookup_miss: LookupMissPolicy,

    /// Zero or missing ordered quantity
    #[serde(default)]
    pub on_zero_quantity: ZeroQuantityPolicy,

    /// Dates before `time_dimension.start` or after `time_dimension.end`
    #[serde(default)]
    pub on_date_out_of_range: DateOutOfRangePolicy,

    /// Refuse to load facts while the product or vendor dimension is empty
    #[serde(default = "default_true")]
    pub require_loaded_dimensions: bool,
}

impl Default for FactConfig {
    fn default() -> Self {
        Self {
            on_lookup_miss: LookupMissPolicy::default(),
            on_zero_quantity: ZeroQuantityPolicy::default(),
            on_date_out_of_range: DateOutOfRangePolicy::default(),
            require_loaded_dimensions: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Main configuration container
#[derive(Debug, Clone)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Base path of the project
    pub base_path: std::path::PathBuf,
}

impl Config {
    /// Load configuration from a directory or a `dimload.yaml` file
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = Config::load("./warehouse")?;
    /// println!("Project: {}", config.project.name);
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let (config_path, base_path) = if path.is_dir() {
            (path.join(CONFIG_FILE), path.to_path_buf())
        } else {
            (
                path.to_path_buf(),
                path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            )
        };

        if !config_path.exists() {
            return Err(Error::ConfigNotFound {
                path: config_path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let project = ProjectConfig::parse(&contents, |name| std::env::var(name).ok())?;
        tracing::debug!("Loaded configuration from {}", config_path.display());

        Ok(Self { project, base_path })
    }
}

impl ProjectConfig {
    /// Render, parse and validate a configuration document.
    ///
    /// `lookup` resolves `env_var(...)` calls inside the template.
    pub fn parse<F>(contents: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        let rendered = render(contents, lookup)?;
        let project: ProjectConfig = serde_yaml::from_str(&rendered)?;
        project.validate()?;
        Ok(project)
    }

    /// Check values serde cannot check on its own
    pub fn validate(&self) -> Result<()> {
        let range = &self.time_dimension;
        if range.start > range.end {
            return Err(Error::ConfigInvalid {
                message: format!(
                    "time_dimension.start ({}) is after time_dimension.end ({})",
                    range.start, range.end
                ),
            });
        }

        if !is_identifier(&self.warehouse.schema) {
            return Err(Error::ConfigInvalid {
                message: format!(
                    "warehouse.schema '{}' is not a plain SQL identifier",
                    self.warehouse.schema
                ),
            });
        }

        if self.warehouse.batch_size == 0 || self.warehouse.batch_size > MAX_BATCH_SIZE {
            return Err(Error::ConfigInvalid {
                message: format!(
                    "warehouse.batch_size must be between 1 and {}, got {}",
                    MAX_BATCH_SIZE, self.warehouse.batch_size
                ),
            });
        }

        for (key, pool) in [
            ("source.max_connections", self.source.max_connections),
            ("warehouse.max_connections", self.warehouse.max_connections),
        ] {
            if pool == 0 {
                return Err(Error::ConfigInvalid {
                    message: format!("{key} must be at least 1"),
                });
            }
        }

        if self.source.url.trim().is_empty() || self.warehouse.url.trim().is_empty() {
            return Err(Error::ConfigInvalid {
                message: "source.url and warehouse.url must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

fn render<F>(contents: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String> + Send + Sync + 'static,
{
    let mut env = minijinja::Environment::new();
    env.add_function(
        "env_var",
        move |name: String, default: Option<String>| -> std::result::Result<String, minijinja::Error> {
            lookup(&name).or(default).ok_or_else(|| {
                minijinja::Error::new(
                    minijinja::ErrorKind::InvalidOperation,
                    format!("environment variable '{}' is not set", name),
                )
            })
        },
    );
    Ok(env.render_str(contents, minijinja::context! {})?)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
