//! Table encoding
//!
//! This module flattens a reconstruction into a serializable payload: one column
//! per field, grouped by stream (`baro/`, `gps/`, `ibi_raw/`, `ibi_filtered/`,
//! `derived/`), and one row per grid second. Empty cells encode as `null`.

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

use crate::error::ReconstructError;
use crate::quality::QualityAssessor;
use crate::types::{
    grid_time, AlignedRow, AlignedTable, Reconstruction, TablePayload,
    TableProducer, TableProvenance, TableQuality, TableRow,
};
use crate::{BEATGRID_VERSION, PRODUCER_NAME};

/// Current table payload format version
pub const TABLE_FORMAT_VERSION: &str = "1.0.0";

const DERIVED_COLUMNS: [&str; 4] = ["hr_raw", "hr_filtered", "pace", "cadence"];

/// Encoder for reconstruction payloads
pub struct TableEncoder {
    instance_id: String,
}

impl Default for TableEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    /// Encode a reconstruction into a table payload
    pub fn encode(&self, reconstruction: &Reconstruction) -> TablePayload {
        let table = &reconstruction.table;
        let layout = ColumnLayout::of(table);

        let producer = TableProducer {
            name: PRODUCER_NAME.to_string(),
            version: BEATGRID_VERSION.to_string(),
            instance_id: self.instance_id.clone(),
        };

        let provenance = TableProvenance {
            source_mode: reconstruction.source_mode.map(|m| m.as_str().to_string()),
            first_row_utc: table.first_time().map(|t| t.to_rfc3339()),
            last_row_utc: table.last_time().map(|t| t.to_rfc3339()),
            computed_at_utc: Utc::now().to_rfc3339(),
        };

        let quality = TableQuality {
            total_events: reconstruction.total_events,
            unparsed_count: reconstruction.unparsed_count,
            beats: reconstruction.beats.len(),
            ibi_coverage: QualityAssessor::ibi_coverage(reconstruction),
            filter_retention: QualityAssessor::filter_retention(reconstruction),
            dropped_collisions: reconstruction.collisions,
            drift: reconstruction.drift.clone(),
            flags: reconstruction
                .quality_flags
                .iter()
                .map(|f| f.as_str().to_string())
                .collect(),
        };

        let rows = table
            .rows
            .iter()
            .map(|(&second, row)| TableRow {
                time: grid_time(second).to_rfc3339_opts(SecondsFormat::Secs, true),
                values: layout.values(row),
            })
            .collect();

        TablePayload {
            format_version: TABLE_FORMAT_VERSION.to_string(),
            producer,
            provenance,
            quality,
            summary: reconstruction.summary.clone(),
            columns: layout.names(),
            rows,
        }
    }

    /// Encode to JSON string
    pub fn encode_to_json(&self, reconstruction: &Reconstruction) -> Result<String, ReconstructError> {
        let payload = self.encode(reconstruction);
        serde_json::to_string_pretty(&payload).map_err(ReconstructError::JsonError)
    }
}

/// Column order of a flattened table
struct ColumnLayout {
    barometric: Vec<String>,
    gps: Vec<String>,
    ibi_width: usize,
}

impl ColumnLayout {
    fn of(table: &AlignedTable) -> Self {
        Self {
            barometric: table.barometric_fields(),
            gps: table.gps_fields(),
            ibi_width: table.ibi_width,
        }
    }

    fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        names.extend(self.barometric.iter().map(|f| format!("baro/{f}")));
        names.extend(self.gps.iter().map(|f| format!("gps/{f}")));
        names.extend((0..self.ibi_width).map(|i| format!("ibi_raw/{i}")));
        names.extend((0..self.ibi_width).map(|i| format!("ibi_filtered/{i}")));
        names.extend(DERIVED_COLUMNS.iter().map(|f| format!("derived/{f}")));
        names
    }

    fn values(&self, row: &AlignedRow) -> Vec<Option<f64>> {
        let slot = |slots: &[Option<f64>], i: usize| slots.get(i).copied().flatten();

        let mut values = Vec::new();
        values.extend(self.barometric.iter().map(|f| row.barometric.get(f).copied()));
        values.extend(self.gps.iter().map(|f| row.gps.get(f).copied()));
        values.extend((0..self.ibi_width).map(|i| slot(&row.ibi_raw, i)));
        values.extend((0..self.ibi_width).map(|i| slot(&row.ibi_filtered, i)));
        values.extend([
            row.derived.hr_raw,
            row.derived.hr_filtered,
            row.derived.pace,
            row.derived.cadence,
        ]);
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CollisionStats, DerivedFields, QualityFlag, SourceMode};
    use pretty_assertions::assert_eq;

    fn make_test_reconstruction() -> Reconstruction {
        let mut table = AlignedTable {
            ibi_width: 2,
            ..Default::default()
        };
        table.rows.insert(
            1_565_510_400,
            AlignedRow {
                barometric: [("AbsPressure".to_string(), 96500.0)].into_iter().collect(),
                ibi_raw: vec![Some(800.0), Some(3000.0)],
                ibi_filtered: vec![Some(800.0), None],
                derived: DerivedFields {
                    hr_raw: Some(31.58),
                    hr_filtered: Some(75.0),
                    pace: None,
                    cadence: None,
                },
                ..Default::default()
            },
        );
        table.rows.insert(
            1_565_510_401,
            AlignedRow {
                gps: [("Latitude".to_string(), 0.83)].into_iter().collect(),
                ibi_raw: vec![None, None],
                ibi_filtered: vec![None, None],
                ..Default::default()
            },
        );

        Reconstruction {
            table,
            beats: Vec::new(),
            total_events: 5,
            unparsed_count: 1,
            unparsed: vec![serde_json::json!({"Source": "x"})],
            collisions: CollisionStats::default(),
            drift: Vec::new(),
            summary: None,
            quality_flags: vec![QualityFlag::UnparsedEvents],
            source_mode: Some(SourceMode::SuuntoJson),
        }
    }

    #[test]
    fn test_encode_table_payload() {
        let encoder = TableEncoder::with_instance_id("test-instance".to_string());
        let payload = encoder.encode(&make_test_reconstruction());

        assert_eq!(payload.format_version, TABLE_FORMAT_VERSION);
        assert_eq!(payload.producer.name, PRODUCER_NAME);
        assert_eq!(payload.producer.instance_id, "test-instance");
        assert_eq!(payload.provenance.source_mode.as_deref(), Some("suunto_json"));
        assert_eq!(payload.quality.unparsed_count, 1);
        assert_eq!(payload.quality.flags, vec!["unparsed_events"]);

        assert_eq!(
            payload.columns,
            vec![
                "baro/AbsPressure",
                "gps/Latitude",
                "ibi_raw/0",
                "ibi_raw/1",
                "ibi_filtered/0",
                "ibi_filtered/1",
                "derived/hr_raw",
                "derived/hr_filtered",
                "derived/pace",
                "derived/cadence",
            ]
        );

        assert_eq!(payload.rows.len(), 2);
        assert_eq!(payload.rows[0].time, "2019-08-11T08:00:00Z");
        assert_eq!(
            payload.rows[0].values,
            vec![
                Some(96500.0),
                None,
                Some(800.0),
                Some(3000.0),
                Some(800.0),
                None,
                Some(31.58),
                Some(75.0),
                None,
                None,
            ]
        );
        assert!(payload.rows.iter().all(|r| r.values.len() == payload.columns.len()));
    }

    #[test]
    fn test_encode_to_json() {
        let encoder = TableEncoder::new();
        let json = encoder.encode_to_json(&make_test_reconstruction()).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed.get("producer").is_some());
        assert!(parsed.get("provenance").is_some());
        assert!(parsed.get("quality").is_some());
        assert!(parsed.get("summary").is_none());
        assert_eq!(parsed["rows"][1]["values"][0], serde_json::Value::Null);
    }

    #[test]
    fn test_events_without_source_have_no_mode() {
        let mut reconstruction = make_test_reconstruction();
        reconstruction.source_mode = None;

        let payload = TableEncoder::new().encode(&reconstruction);
        assert_eq!(payload.provenance.source_mode, None);
    }
}
