//! Environment replication pipelines: export, import and replay.

pub mod archive;
pub mod export;
pub mod import;
pub mod replay;

pub use export::{ExportOptions, ExportSummary, Exporter};
pub use import::{ImportMethod, ImportOptions, ImportResult, Importer};
pub use replay::{ReplayOutcome, ReplayRunner, FALLBACK_MINING_ADDRESS};

#[cfg(test)]
pub(crate) mod testutil;
