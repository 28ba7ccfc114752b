//! Persistence fan-out
//!
//! The finalized dataset is written to three independent backends: a
//! key-value table, a relational table, and a partitioned columnar file
//! layout. The writes are not wrapped in a cross-sink transaction — a
//! failure on one sink can leave the dataset durably written to another.
//! That window is accepted and made visible: every sink is attempted, each
//! outcome is logged, and only then does the first error propagate.

use crate::config::Config;
use crate::record::VaccinationRecord;
use thiserror::Error;
use tracing::{error, info};

pub mod keyvalue;
pub mod parquet;
pub mod relational;

pub use keyvalue::KeyValueSink;
pub use parquet::PartitionedFileSink;
pub use relational::RelationalSink;

/// Errors raised by any of the three persistence backends
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("key-value sink failed: {0}")]
    KeyValue(String),

    #[error("relational sink failed: {0}")]
    Relational(#[from] sqlx::Error),

    #[error("file sink I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("file sink batch construction failed: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("file sink write failed: {0}")]
    Parquet(#[from] ::parquet::errors::ParquetError),
}

/// Fans the finalized dataset out to the three sinks
pub struct MultiSinkWriter {
    key_value: KeyValueSink,
    relational: RelationalSink,
    files: PartitionedFileSink,
}

impl MultiSinkWriter {
    /// Assemble a writer from already-constructed sinks
    pub fn new(
        key_value: KeyValueSink,
        relational: RelationalSink,
        files: PartitionedFileSink,
    ) -> Self {
        Self {
            key_value,
            relational,
            files,
        }
    }

    /// Construct all three sinks from configuration
    ///
    /// Connections are scoped to this writer; dropping it releases the pool
    /// and client handles on every exit path.
    pub async fn connect(config: &Config) -> Result<Self, SinkError> {
        Ok(Self::new(
            KeyValueSink::new(&config.aws),
            RelationalSink::connect(&config.database).await?,
            PartitionedFileSink::new(config.file_store.root.clone()),
        ))
    }

    /// Write the dataset to every sink
    ///
    /// The three writes are independent and run concurrently. All of them
    /// are attempted regardless of individual failures; successes are logged
    /// before the first error (in fixed sink order) is returned.
    pub async fn write_all(&self, records: &[VaccinationRecord]) -> Result<(), SinkError> {
        let (key_value, relational, files) = tokio::join!(
            self.key_value.write(records),
            self.relational.write(records),
            self.files.write(records),
        );

        report("key-value", records.len(), &key_value);
        report("relational", records.len(), &relational);
        report("file", records.len(), &files);

        key_value?;
        relational?;
        files?;
        Ok(())
    }
}

fn report(sink: &str, records: usize, outcome: &Result<(), SinkError>) {
    match outcome {
        Ok(()) => info!(sink, records, "sink write succeeded"),
        Err(e) => error!(sink, error = %e, "sink write failed"),
    }
}
