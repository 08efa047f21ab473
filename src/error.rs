//! Error types for beatgrid

use thiserror::Error;

/// Errors that abort the reconstruction of a recording
///
/// Unrecognized events, missing optional fields and seconds without beats are
/// not errors; they surface as empty cells and in `unparsed_count`.
#[derive(Debug, Error)]
pub enum ReconstructError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Unsupported source mode '{0}' (allowed modes: suunto_json, qs_json)")]
    UnsupportedSource(String),

    #[error("Timeline drift at burst {burst_index}: overlaps previous burst by {overlap_ms:.1} ms")]
    TimelineDrift { burst_index: usize, overlap_ms: f64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}
