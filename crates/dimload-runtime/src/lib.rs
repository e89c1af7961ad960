//! dimload Runtime
//!
//! This crate runs the load units of `dimload-core` against real databases.
//!
//! # Features
//!
//! - PostgreSQL source and warehouse connectors via sqlx
//! - Layered, concurrent unit scheduling with retries
//! - Run reports with per-unit outcomes
//!
//! # Usage
//!
//! ```rust,ignore
//! use dimload_runtime::Runtime;
//!
//! let runtime = Runtime::connect(config).await?;
//! let report = runtime.run().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod jobs;
pub mod postgres;
pub mod scheduler;

pub use engine::Runtime;
pub use error::{Error, Result};
pub use jobs::{JobOutcome, JobStatus, RunReport};
pub use scheduler::Scheduler;
