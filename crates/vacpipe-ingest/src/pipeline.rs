//! Pipeline orchestration
//!
//! One invocation is a single sequential unit of work:
//!
//! ```text
//! INIT -> FETCHING -> NORMALIZING -> ENCODING -> COERCING -> WRITING -> DONE
//! ```
//!
//! Any stage failure moves the run to `FAILED`, a terminal state; there is
//! no partial resume, a failed run is re-run from `INIT` in full. The
//! dataset is built once and is read-only for all sink writes.

use crate::coerce::{self, CoercionError};
use crate::encode::{self, CategoryMapping};
use crate::fetch::{FetchError, ScrollFetcher};
use crate::normalize::{self, ParseError};
use crate::sinks::{MultiSinkWriter, SinkError};
use thiserror::Error;
use tracing::{error, info};

/// Stage of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Init,
    Fetching,
    Normalizing,
    Encoding,
    Coercing,
    Writing,
    Done,
    Failed,
}

impl RunStage {
    pub fn as_str(&self) -> &str {
        match self {
            RunStage::Init => "init",
            RunStage::Fetching => "fetching",
            RunStage::Normalizing => "normalizing",
            RunStage::Encoding => "encoding",
            RunStage::Coercing => "coercing",
            RunStage::Writing => "writing",
            RunStage::Done => "done",
            RunStage::Failed => "failed",
        }
    }
}

/// First error of any stage; fails the whole run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Coercion(#[from] CoercionError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Outcome of a completed run
#[derive(Debug)]
pub struct RunSummary {
    /// Hits fetched before deduplication
    pub fetched: usize,
    /// Rows remaining after normalization
    pub normalized: usize,
    /// Rows written to each sink
    pub written: usize,
    /// Per-column encoding artifact for this run
    pub mappings: Vec<CategoryMapping>,
}

/// Drives one full ingest run
pub struct Pipeline {
    fetcher: ScrollFetcher,
    writer: MultiSinkWriter,
}

impl Pipeline {
    pub fn new(fetcher: ScrollFetcher, writer: MultiSinkWriter) -> Self {
        Self { fetcher, writer }
    }

    /// Execute the run; all-or-nothing apart from the documented
    /// cross-sink inconsistency window.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        enter(RunStage::Init);

        let result = self.execute().await;
        match &result {
            Ok(summary) => {
                enter(RunStage::Done);
                info!(
                    fetched = summary.fetched,
                    normalized = summary.normalized,
                    written = summary.written,
                    "pipeline run complete"
                );
            }
            Err(e) => {
                error!(stage = RunStage::Failed.as_str(), error = %e, "pipeline run failed");
            }
        }
        result
    }

    async fn execute(&self) -> Result<RunSummary, PipelineError> {
        enter(RunStage::Fetching);
        let hits = self.fetcher.fetch_all().await?;
        let fetched = hits.len();

        enter(RunStage::Normalizing);
        let flat = normalize::normalize(hits)?;
        let normalized = flat.len();

        enter(RunStage::Encoding);
        let (encoded, mappings) = encode::encode(flat)?;

        enter(RunStage::Coercing);
        let records = coerce::coerce(encoded)?;

        enter(RunStage::Writing);
        self.writer.write_all(&records).await?;

        Ok(RunSummary {
            fetched,
            normalized,
            written: records.len(),
            mappings,
        })
    }
}

fn enter(stage: RunStage) {
    info!(stage = stage.as_str(), "pipeline stage");
}
