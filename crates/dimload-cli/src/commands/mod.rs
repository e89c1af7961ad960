//! CLI command implementations

pub mod init;
pub mod plan;
pub mod run;
pub mod validate;
