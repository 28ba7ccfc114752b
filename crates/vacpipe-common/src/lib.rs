//! Vacpipe Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared ambient infrastructure for the vacpipe workspace.
//!
//! Currently this is limited to the logging setup used by every binary:
//! structured `tracing` output with configurable level, target
//! (console/file/both) and format (text/JSON), driven by environment
//! variables so that a scheduled run and an interactive run can use the
//! same binary with different output.

pub mod logging;
