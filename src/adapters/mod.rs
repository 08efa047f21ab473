//! Source document adapters
//!
//! This module provides adapters that parse device documents and map them to
//! decoded events the engine understands.

mod qs;
mod suunto;

pub use qs::QsAdapter;
pub use suunto::{parse_summary, SuuntoAdapter};

use crate::error::ReconstructError;
use crate::types::{Event, SourceMode};

/// Trait for document adapters that yield timestamped events
pub trait SourceAdapter {
    /// Parse raw JSON into events, in document order
    fn parse(&self, raw_json: &str) -> Result<Vec<Event>, ReconstructError>;

    /// Mode recorded in the provenance of tables built from this adapter
    fn source_mode(&self) -> SourceMode;
}
