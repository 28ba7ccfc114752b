//! Vacpipe Ingest - covid vaccination data pipeline
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ingests the full snapshot of the national immunization search API,
//! normalizes and deduplicates it into a fixed tabular schema, encodes
//! categorical columns, coerces numeric widths, and fans the result out to
//! three sinks: DynamoDB, PostgreSQL, and partitioned Parquet files.
//!
//! The stages are wired together by [`pipeline::Pipeline`]; each module
//! implements one stage and owns the errors it can raise.

pub mod coerce;
pub mod config;
pub mod encode;
pub mod fetch;
pub mod normalize;
pub mod pipeline;
pub mod record;
pub mod sinks;

// Re-export commonly used types
pub use config::Config;
pub use pipeline::{Pipeline, PipelineError, RunStage, RunSummary};
pub use record::VaccinationRecord;
