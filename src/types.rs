//! Core types for the beatgrid engine
//!
//! This module defines the data structures that flow through each stage of the
//! reconstruction: decoded events, classified streams, reconstructed beats, the
//! IBI slot matrix and the aligned one-second table.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::ReconstructError;

/// Source document shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    /// JSON found in the Suunto app folder (`Samples` array)
    SuuntoJson,
    /// JSON exported from quantified-self.io (IBI stream only)
    QsJson,
}

impl SourceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMode::SuuntoJson => "suunto_json",
            SourceMode::QsJson => "qs_json",
        }
    }
}

impl FromStr for SourceMode {
    type Err = ReconstructError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().replace('-', "_").as_str() {
            "suunto_json" => Ok(SourceMode::SuuntoJson),
            "qs_json" => Ok(SourceMode::QsJson),
            _ => Err(ReconstructError::UnsupportedSource(s.to_string())),
        }
    }
}

/// Named numeric fields of a periodic sample. `None` marks a field that is
/// present in the record but carries no numeric value.
pub type SampleFields = BTreeMap<String, Option<f64>>;

/// One decoded record of the device log
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Absolute record time, if the record carried a parseable one
    pub timestamp: Option<DateTime<Utc>>,
    /// Interbeat intervals (ms) when the record is an R-R burst
    pub ibi: Option<Vec<f64>>,
    /// Periodic sample fields (pressure, position, speed, ...)
    pub sample: Option<SampleFields>,
    /// The record exactly as it appeared in the document
    pub raw: serde_json::Value,
}

impl Event {
    /// Whether the sample payload names `field`, numeric or not
    pub fn has_sample_field(&self, field: &str) -> bool {
        self.sample
            .as_ref()
            .map(|fields| fields.contains_key(field))
            .unwrap_or(false)
    }
}

/// The set of streams an event contributes to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub ibi: bool,
    pub barometric: bool,
    pub gps: bool,
}

impl Capabilities {
    pub fn is_empty(&self) -> bool {
        !(self.ibi || self.barometric || self.gps)
    }
}

/// Interbeat intervals reported together under one timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IbiBurst {
    /// Time of the last beat in the burst
    pub timestamp: DateTime<Utc>,
    /// Intervals in milliseconds, oldest first
    pub intervals: Vec<f64>,
}

impl IbiBurst {
    pub fn total_ms(&self) -> f64 {
        self.intervals.iter().sum()
    }

    /// Time of the first beat's onset (`timestamp - total_ms`), or `None` when
    /// it falls outside the representable time range
    pub fn onset(&self) -> Option<DateTime<Utc>> {
        ms_before(self.timestamp, self.total_ms())
    }

    /// Suffix sums: `remaining_ms()[i] = sum(intervals[i..])`
    pub fn remaining_ms(&self) -> Vec<f64> {
        let mut remaining: Vec<f64> = self
            .intervals
            .iter()
            .rev()
            .scan(0.0, |acc, iv| {
                *acc += iv;
                Some(*acc)
            })
            .collect();
        remaining.reverse();
        remaining
    }

    /// Whether every beat of the burst can be placed on the time axis
    pub fn is_placeable(&self) -> bool {
        self.onset().is_some()
            && self
                .remaining_ms()
                .iter()
                .all(|ms| ms_before(self.timestamp, *ms).is_some())
    }
}

/// A barometric or GPS sample with its numeric fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedSample {
    pub timestamp: DateTime<Utc>,
    pub fields: BTreeMap<String, f64>,
}

/// A reconstructed heartbeat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beat {
    /// Start of the interval (the previous beat)
    pub onset: DateTime<Utc>,
    /// Absolute time of the beat closing the interval
    pub time: DateTime<Utc>,
    pub interval_ms: f64,
    /// Index of the source burst
    pub burst: usize,
}

/// Convert a millisecond amount into a duration at microsecond precision
pub fn ms_duration(ms: f64) -> Duration {
    Duration::microseconds((ms * 1000.0).round() as i64)
}

/// `ts - ms`, or `None` for a non-finite amount or a result out of range
pub fn ms_before(ts: DateTime<Utc>, ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() {
        return None;
    }
    ts.checked_sub_signed(ms_duration(ms))
}

/// Round a timestamp to the one-second grid.
///
/// Ties (exactly half a second) go to the even second. The result is UTC
/// epoch seconds.
pub fn grid_second(ts: DateTime<Utc>) -> i64 {
    let micros = ts.timestamp_micros();
    let secs = micros.div_euclid(1_000_000);
    let rem = micros.rem_euclid(1_000_000);
    match rem.cmp(&500_000) {
        std::cmp::Ordering::Less => secs,
        std::cmp::Ordering::Greater => secs + 1,
        std::cmp::Ordering::Equal => {
            if secs % 2 == 0 {
                secs
            } else {
                secs + 1
            }
        }
    }
}

/// Convert a grid key back into a timestamp
pub fn grid_time(second: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(second, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Beats pivoted into one row per grid second and one column per slot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IbiMatrix {
    /// Row per grid second; every row has `width` cells
    pub rows: BTreeMap<i64, Vec<Option<f64>>>,
    /// Number of slot columns (largest slot index + 1)
    pub width: usize,
}

impl IbiMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, second: i64, slot: usize) -> Option<f64> {
        self.rows
            .get(&second)
            .and_then(|row| row.get(slot).copied().flatten())
    }
}

/// Derived per-row metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedFields {
    /// Heart rate from the raw IBI slots (beats/min)
    pub hr_raw: Option<f64>,
    /// Heart rate from the filtered IBI slots (beats/min)
    pub hr_filtered: Option<f64>,
    /// Pace (min/km)
    pub pace: Option<f64>,
    /// Cadence (steps/min)
    pub cadence: Option<f64>,
}

/// One row of the aligned table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignedRow {
    pub barometric: BTreeMap<String, f64>,
    pub gps: BTreeMap<String, f64>,
    pub ibi_raw: Vec<Option<f64>>,
    pub ibi_filtered: Vec<Option<f64>>,
    pub derived: DerivedFields,
}

impl AlignedRow {
    pub fn has_ibi(&self) -> bool {
        self.ibi_raw.iter().any(Option::is_some)
    }
}

/// The terminal structure: one row per distinct grid second
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignedTable {
    pub rows: BTreeMap<i64, AlignedRow>,
    /// Width of the raw and filtered IBI slot groups
    pub ibi_width: usize,
}

impl AlignedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, second: i64) -> Option<&AlignedRow> {
        self.rows.get(&second)
    }

    pub fn first_time(&self) -> Option<DateTime<Utc>> {
        self.rows.keys().next().map(|&s| grid_time(s))
    }

    pub fn last_time(&self) -> Option<DateTime<Utc>> {
        self.rows.keys().next_back().map(|&s| grid_time(s))
    }

    /// Union of barometric field names, sorted
    pub fn barometric_fields(&self) -> Vec<String> {
        union_keys(self.rows.values().map(|row| &row.barometric))
    }

    /// Union of GPS field names, sorted
    pub fn gps_fields(&self) -> Vec<String> {
        union_keys(self.rows.values().map(|row| &row.gps))
    }
}

fn union_keys<'a>(maps: impl Iterator<Item = &'a BTreeMap<String, f64>>) -> Vec<String> {
    let mut names = std::collections::BTreeSet::new();
    for map in maps {
        names.extend(map.keys().cloned());
    }
    names.into_iter().collect()
}

/// Rows discarded by the first-wins collision policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionStats {
    pub barometric: usize,
    pub gps: usize,
}

impl CollisionStats {
    pub fn total(&self) -> usize {
        self.barometric + self.gps
    }
}

/// Overlap between consecutive bursts detected in lenient mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftWarning {
    /// Index of the burst whose onset precedes the previous burst's end
    pub burst_index: usize,
    pub overlap_ms: f64,
}

/// Quality flag indicating data issues in a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    MissingIbi,
    MissingBarometric,
    MissingGps,
    TimelineDrift,
    UnparsedEvents,
    DroppedCollisions,
}

impl QualityFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityFlag::MissingIbi => "missing_ibi",
            QualityFlag::MissingBarometric => "missing_barometric",
            QualityFlag::MissingGps => "missing_gps",
            QualityFlag::TimelineDrift => "timeline_drift",
            QualityFlag::UnparsedEvents => "unparsed_events",
            QualityFlag::DroppedCollisions => "dropped_collisions",
        }
    }
}

/// Result of reconstructing one recording
#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction {
    pub table: AlignedTable,
    /// Raw per-beat series, in burst order
    pub beats: Vec<Beat>,
    pub total_events: usize,
    pub unparsed_count: usize,
    /// Records that no stream consumed, in document order
    pub unparsed: Vec<serde_json::Value>,
    pub collisions: CollisionStats,
    pub drift: Vec<DriftWarning>,
    /// Opaque header fields from the device summary document
    pub summary: Option<serde_json::Map<String, serde_json::Value>>,
    pub quality_flags: Vec<QualityFlag>,
    /// Mode of the decoded document; `None` for caller-supplied events
    pub source_mode: Option<SourceMode>,
}

/// IBI-only result for sources without per-sample timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IbiSeriesReport {
    pub ibi_raw: Vec<f64>,
    pub ibi_filtered: Vec<Option<f64>>,
    pub hr_raw: Vec<Option<f64>>,
    pub hr_filtered: Vec<Option<f64>>,
}

/// What a source document reconstructs into
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingOutput {
    Aligned(Box<Reconstruction>),
    IbiSeries(IbiSeriesReport),
}

/// Producer metadata of an encoded table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Where an encoded table came from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableProvenance {
    pub source_mode: Option<String>,
    pub first_row_utc: Option<String>,
    pub last_row_utc: Option<String>,
    pub computed_at_utc: String,
}

/// Quality section of an encoded table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableQuality {
    pub total_events: usize,
    pub unparsed_count: usize,
    pub beats: usize,
    /// Share of rows with at least one raw beat (0-1)
    pub ibi_coverage: f64,
    /// Share of raw beats that survived filtering (0-1)
    pub filter_retention: Option<f64>,
    pub dropped_collisions: CollisionStats,
    pub drift: Vec<DriftWarning>,
    pub flags: Vec<String>,
}

/// One encoded row; `values` follows the payload's `columns`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRow {
    pub time: String,
    pub values: Vec<Option<f64>>,
}

/// Complete encoded table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablePayload {
    pub format_version: String,
    pub producer: TableProducer,
    pub provenance: TableProvenance,
    pub quality: TableQuality,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<serde_json::Map<String, serde_json::Value>>,
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
}
