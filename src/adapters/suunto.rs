//! Suunto adapter
//!
//! Parses the JSON documents found in the Suunto app folder. Every record of the
//! `Samples` array carries a `TimeISO8601` timestamp and its payload under
//! `Attributes` → `suunto/sml`: either an `R-R` burst of interbeat intervals or a
//! periodic `Sample` of named numeric fields.

use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, trace};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::SourceAdapter;
use crate::error::ReconstructError;
use crate::types::{Event, SampleFields, SourceMode};

/// Suunto app-folder document adapter
pub struct SuuntoAdapter;

impl SourceAdapter for SuuntoAdapter {
    fn parse(&self, raw_json: &str) -> Result<Vec<Event>, ReconstructError> {
        let document: Value = serde_json::from_str(raw_json)?;
        let samples = samples_array(&document)?;

        let events: Vec<Event> = samples.iter().map(decode_record).collect();
        debug!("decoded {} suunto records", events.len());

        Ok(events)
    }

    fn source_mode(&self) -> SourceMode {
        SourceMode::SuuntoJson
    }
}

/// Extract the opaque header of a device summary document.
///
/// The last record of the summary's `Samples` array holds the per-recording
/// aggregates. Its `suunto/sml` → `Header` object is returned when present,
/// otherwise the record's attributes (or the record itself).
pub fn parse_summary(raw_json: &str) -> Result<Map<String, Value>, ReconstructError> {
    let document: Value = serde_json::from_str(raw_json)?;
    let samples = samples_array(&document)?;

    let last = samples.last().ok_or_else(|| {
        ReconstructError::MalformedInput("summary document has no records".to_string())
    })?;

    let header = last
        .pointer("/Attributes/suunto~1sml/Header")
        .and_then(Value::as_object)
        .or_else(|| last.get("Attributes").and_then(Value::as_object))
        .or_else(|| last.as_object());

    header.cloned().ok_or_else(|| {
        ReconstructError::MalformedInput("last summary record is not an object".to_string())
    })
}

fn samples_array(document: &Value) -> Result<&Vec<Value>, ReconstructError> {
    match document.get("Samples") {
        Some(Value::Array(samples)) => Ok(samples),
        Some(_) => Err(ReconstructError::MalformedInput(
            "\"Samples\" is not an array".to_string(),
        )),
        None => Err(ReconstructError::MalformedInput(
            "missing top-level \"Samples\" array".to_string(),
        )),
    }
}

fn decode_record(raw: &Value) -> Event {
    let record = match SuuntoRecord::deserialize(raw) {
        Ok(record) => record,
        Err(e) => {
            trace!("record left undecoded: {}", e);
            return Event {
                timestamp: None,
                ibi: None,
                sample: None,
                raw: raw.clone(),
            };
        }
    };

    let timestamp = record.time.as_deref().and_then(parse_timestamp);
    let sml = record.attributes.and_then(|a| a.sml);

    let (ibi, sample) = match sml {
        Some(sml) => (
            sml.rr.and_then(|rr| rr.ibi).map(|values| intervals(&values)),
            sml.sample.map(|fields| numeric_fields(&fields)),
        ),
        None => (None, None),
    };

    Event {
        timestamp,
        ibi,
        sample,
        raw: raw.clone(),
    }
}

/// Numeric intervals of an `IBI` array; nulls and other non-numbers are skipped
fn intervals(values: &[Value]) -> Vec<f64> {
    let intervals: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
    if intervals.len() < values.len() {
        trace!("skipped {} non-numeric intervals", values.len() - intervals.len());
    }
    intervals
}

fn numeric_fields(fields: &Map<String, Value>) -> SampleFields {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), value.as_f64()))
        .collect()
}

/// Parse an ISO 8601 timestamp; values without an offset are taken as UTC
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// Suunto document structures

#[derive(Debug, Deserialize)]
struct SuuntoRecord {
    #[serde(rename = "TimeISO8601")]
    time: Option<String>,
    #[serde(rename = "Attributes")]
    attributes: Option<SuuntoAttributes>,
}

#[derive(Debug, Deserialize)]
struct SuuntoAttributes {
    #[serde(rename = "suunto/sml")]
    sml: Option<SmlPayload>,
}

#[derive(Debug, Deserialize)]
struct SmlPayload {
    #[serde(rename = "R-R")]
    rr: Option<RrBlock>,
    #[serde(rename = "Sample")]
    sample: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RrBlock {
    #[serde(rename = "IBI")]
    ibi: Option<Vec<Value>>,
}
