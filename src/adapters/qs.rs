//! quantified-self.io adapter
//!
//! Exports from quantified-self.io carry streams without per-sample
//! timestamps, so only the interbeat-interval stream is read.

use serde_json::Value;

use crate::error::ReconstructError;

/// Position of the IBI stream in exports whose streams carry no type
const LEGACY_IBI_STREAM_INDEX: usize = 6;

/// quantified-self.io export adapter
pub struct QsAdapter;

impl QsAdapter {
    /// Extract the interbeat intervals (ms) of the first activity
    pub fn parse_ibi(&self, raw_json: &str) -> Result<Vec<f64>, ReconstructError> {
        let document: Value = serde_json::from_str(raw_json)?;

        let streams = document
            .pointer("/activities/0/streams")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ReconstructError::MalformedInput(
                    "missing \"activities[0].streams\" array".to_string(),
                )
            })?;

        let stream = streams
            .iter()
            .find(|s| {
                s.get("type")
                    .and_then(Value::as_str)
                    .map(|t| t.eq_ignore_ascii_case("ibi"))
                    .unwrap_or(false)
            })
            .or_else(|| streams.get(LEGACY_IBI_STREAM_INDEX))
            .ok_or_else(|| {
                ReconstructError::MalformedInput("no IBI stream in activity".to_string())
            })?;

        let data = stream.get("data").and_then(Value::as_array).ok_or_else(|| {
            ReconstructError::MalformedInput("IBI stream has no \"data\" array".to_string())
        })?;

        Ok(data.iter().filter_map(Value::as_f64).collect())
    }
}
