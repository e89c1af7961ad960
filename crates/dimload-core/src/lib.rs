//! dimload Core Library
//!
//! This crate provides the core functionality for dimload:
//! - Configuration parsing and validation
//! - The star schema model and `YYYYMMDD` date keys
//! - Source and warehouse connector traits
//! - The four load units and the task graph that orders them
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Source    │────▶│    Units    │────▶│  Warehouse  │
//! │   (OLTP)    │     │ (conform)   │     │ (star)      │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            ▲
//!                     ┌─────────────┐
//!                     │  TaskGraph  │
//!                     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use dimload_core::{Config, TaskGraph};
//!
//! let config = Config::load("./dimload.yaml")?;
//! for layer in TaskGraph::purchasing().layers()? {
//!     println!("{}", layer.join(", "));
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connectors;
pub mod datekey;
pub mod error;
pub mod graph;
pub mod mock;
pub mod model;
pub mod units;

pub use config::{Config, ProjectConfig};
pub use connectors::{SourceDatabase, Table, Warehouse};
pub use error::{Error, Result};
pub use graph::TaskGraph;
pub use units::{LoadReport, Unit};
