//! beatgrid - Reconstruction engine for wearable sports recordings
//!
//! beatgrid turns the irregular event log of a sports watch (barometric samples,
//! GPS fixes and batched heartbeat intervals) into one table aligned on a
//! one-second grid, through a deterministic pipeline: document adaptation →
//! record classification → beat timeline reconstruction → stream alignment →
//! artifact filtering → derived metrics.
//!
//! ## Modules
//!
//! - **Adapters**: Decode Suunto app-folder and quantified-self.io documents
//! - **Engine**: Classifier, timeline reconstructor, aligner, filter, metrics
//! - **Output**: Quality assessment and table encoding

pub mod adapters;
pub mod aligner;
pub mod classifier;
pub mod config;
pub mod encoder;
pub mod error;
pub mod features;
pub mod filter;
pub mod pipeline;
pub mod quality;
pub mod timeline;
pub mod types;

pub use config::{DriftPolicy, FilterConfig, ReconstructionConfig};
pub use error::ReconstructError;
pub use pipeline::{reconstruct, reconstruct_events, suunto_to_table, Reconstructor};
pub use types::{AlignedTable, Reconstruction, RecordingOutput, SourceMode};

/// beatgrid version embedded in all encoded tables
pub const BEATGRID_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for encoded tables
pub const PRODUCER_NAME: &str = "beatgrid";
