//! Pipeline orchestration
//!
//! This module provides the public API for beatgrid. It runs a recording
//! through every stage, from the raw document to the finished aligned table:
//!
//! 1. SourceAdapter - Decode the document into events
//! 2. RecordClassifier - Split events into IBI, barometric and GPS streams
//! 3. TimelineReconstructor - Absolute beat times and the raw-IBI matrix
//! 4. StreamAligner - Outer join on the one-second grid
//! 5. ArtifactFilter - Filtered IBI slots
//! 6. MetricsDeriver - Heart rate, pace and cadence columns
//!
//! Reconstruction is a pure function of the document and the configuration.
//! Recordings share no state, so a batch may be split across threads freely.

use log::{debug, info};

use crate::adapters::{parse_summary, QsAdapter, SourceAdapter, SuuntoAdapter};
use crate::aligner::{Alignment, StreamAligner};
use crate::classifier::RecordClassifier;
use crate::config::{ReconstructionConfig, MS_PER_MINUTE};
use crate::encoder::TableEncoder;
use crate::error::ReconstructError;
use crate::features::MetricsDeriver;
use crate::filter::ArtifactFilter;
use crate::quality::QualityAssessor;
use crate::timeline::TimelineReconstructor;
use crate::types::{
    Event, IbiSeriesReport, Reconstruction, RecordingOutput, SourceMode, TablePayload,
};

/// Convert a Suunto app-folder document into an encoded table (JSON).
///
/// # Example
/// ```ignore
/// let table_json = suunto_to_table(std::fs::read_to_string("run.json")?)?;
/// ```
pub fn suunto_to_table(raw_json: String) -> Result<String, ReconstructError> {
    let reconstructor = Reconstructor::new();
    let reconstruction = reconstructor.reconstruct_with_adapter(&SuuntoAdapter, &raw_json)?;
    reconstructor.encode_to_json(&reconstruction)
}

/// Reconstruct a document of the given source mode with the default
/// configuration.
///
/// The mode is checked before the document is touched.
pub fn reconstruct(raw_json: &str, mode: &str) -> Result<RecordingOutput, ReconstructError> {
    Reconstructor::new().process(raw_json, mode)
}

/// Reconstruct decoded events into an aligned table.
///
/// Fails with `EmptyInput` when heart rate is requested but no burst exists,
/// and with `TimelineDrift` when strict drift validation rejects the bursts.
pub fn reconstruct_events(
    events: &[Event],
    config: &ReconstructionConfig,
) -> Result<Reconstruction, ReconstructError> {
    config.validate()?;

    let classified = RecordClassifier::classify(events);

    let (beats, drift) = if config.heart_rate {
        if classified.bursts.is_empty() {
            return Err(ReconstructError::EmptyInput(
                "no interbeat-interval bursts, heart rate cannot be derived".to_string(),
            ));
        }
        let drift = TimelineReconstructor::check_drift(
            &classified.bursts,
            config.drift,
            config.drift_tolerance_ms,
        )?;
        (TimelineReconstructor::beats(&classified.bursts), drift)
    } else {
        (Vec::new(), Vec::new())
    };

    let matrix = TimelineReconstructor::build_matrix(&beats);
    let Alignment { mut table, collisions } =
        StreamAligner::align(&matrix, &classified.barometric, &classified.gps);

    if config.heart_rate {
        ArtifactFilter::new(config.filter.clone()).apply(&mut table);
    }
    MetricsDeriver::derive(&mut table);

    let unparsed = classified
        .unparsed_indices()
        .map(|i| events[i].raw.clone())
        .collect();

    let mut reconstruction = Reconstruction {
        table,
        beats,
        total_events: classified.total,
        unparsed_count: classified.unparsed_count(),
        unparsed,
        collisions,
        drift,
        summary: None,
        quality_flags: Vec::new(),
        source_mode: None,
    };
    reconstruction.quality_flags = QualityAssessor::flags(&reconstruction);

    info!(
        "reconstructed {} rows from {} events ({} beats, {} unparsed)",
        reconstruction.table.len(),
        reconstruction.total_events,
        reconstruction.beats.len(),
        reconstruction.unparsed_count
    );

    Ok(reconstruction)
}

/// Filter an untimed IBI series and derive per-beat heart rate
pub fn ibi_series(
    values: &[f64],
    config: &ReconstructionConfig,
) -> Result<IbiSeriesReport, ReconstructError> {
    config.validate()?;

    if config.heart_rate && values.is_empty() {
        return Err(ReconstructError::EmptyInput(
            "IBI stream has no values, heart rate cannot be derived".to_string(),
        ));
    }

    let raw: Vec<Option<f64>> = values.iter().map(|v| Some(*v)).collect();
    let filtered = ArtifactFilter::new(config.filter.clone()).filter_series(&raw);
    let rate = |v: &Option<f64>| v.filter(|ms| *ms > 0.0).map(|ms| MS_PER_MINUTE / ms);

    Ok(IbiSeriesReport {
        hr_raw: raw.iter().map(rate).collect(),
        hr_filtered: filtered.iter().map(rate).collect(),
        ibi_raw: values.to_vec(),
        ibi_filtered: filtered,
    })
}

/// Reconstructor carrying a configuration and an encoder.
///
/// Use this when several recordings share one configuration.
pub struct Reconstructor {
    config: ReconstructionConfig,
    encoder: TableEncoder,
}

impl Default for Reconstructor {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconstructor {
    /// Create a reconstructor with default settings
    pub fn new() -> Self {
        Self {
            config: ReconstructionConfig::default(),
            encoder: TableEncoder::new(),
        }
    }

    /// Create a reconstructor with a specific configuration
    pub fn with_config(config: ReconstructionConfig) -> Result<Self, ReconstructError> {
        config.validate()?;
        Ok(Self {
            config,
            encoder: TableEncoder::new(),
        })
    }

    /// Load the configuration from JSON
    pub fn load_config(&mut self, json: &str) -> Result<(), ReconstructError> {
        self.config = ReconstructionConfig::from_json(json)?;
        Ok(())
    }

    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Reconstruct one document of the given source mode
    pub fn process(&self, raw_json: &str, mode: &str) -> Result<RecordingOutput, ReconstructError> {
        self.process_with_summary(raw_json, None, mode)
    }

    /// Reconstruct one document, attaching the header of a summary document
    pub fn process_with_summary(
        &self,
        raw_json: &str,
        summary_json: Option<&str>,
        mode: &str,
    ) -> Result<RecordingOutput, ReconstructError> {
        let mode: SourceMode = mode.parse()?;
        debug!("processing {} document", mode.as_str());

        match mode {
            SourceMode::SuuntoJson => {
                let mut reconstruction = self.reconstruct_with_adapter(&SuuntoAdapter, raw_json)?;
                if let Some(summary) = summary_json {
                    reconstruction.summary = Some(parse_summary(summary)?);
                }
                Ok(RecordingOutput::Aligned(Box::new(reconstruction)))
            }
            SourceMode::QsJson => {
                let values = QsAdapter.parse_ibi(raw_json)?;
                Ok(RecordingOutput::IbiSeries(ibi_series(&values, &self.config)?))
            }
        }
    }

    /// Reconstruct documents independently, in order.
    ///
    /// An unsupported mode fails the whole batch; any other error only fails
    /// its own recording.
    pub fn process_batch(
        &self,
        documents: &[&str],
        mode: &str,
    ) -> Result<Vec<Result<RecordingOutput, ReconstructError>>, ReconstructError> {
        mode.parse::<SourceMode>()?;
        Ok(documents
            .iter()
            .map(|raw_json| self.process(raw_json, mode))
            .collect())
    }

    /// Reconstruct a document decoded by `adapter`
    pub fn reconstruct_with_adapter(
        &self,
        adapter: &dyn SourceAdapter,
        raw_json: &str,
    ) -> Result<Reconstruction, ReconstructError> {
        let events = adapter.parse(raw_json)?;
        let mut reconstruction = reconstruct_events(&events, &self.config)?;
        reconstruction.source_mode = Some(adapter.source_mode());
        Ok(reconstruction)
    }

    pub fn encode(&self, reconstruction: &Reconstruction) -> TablePayload {
        self.encoder.encode(reconstruction)
    }

    pub fn encode_to_json(&self, reconstruction: &Reconstruction) -> Result<String, ReconstructError> {
        self.encoder.encode_to_json(reconstruction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriftPolicy;
    use crate::types::{CollisionStats, QualityFlag};

    const T0: i64 = 1_565_510_410; // 2019-08-11T08:00:10Z

    fn rr(time: &str, ibi: &[u32]) -> String {
        let ibi: Vec<String> = ibi.iter().map(|v| v.to_string()).collect();
        format!(
            r#"{{"TimeISO8601": "{}", "Attributes": {{"suunto/sml": {{"R-R": {{"IBI": [{}]}}}}}}}}"#,
            time,
            ibi.join(", ")
        )
    }

    fn sample(time: &str, fields: &str) -> String {
        format!(
            r#"{{"TimeISO8601": "{}", "Attributes": {{"suunto/sml": {{"Sample": {{{}}}}}}}}}"#,
            time, fields
        )
    }

    fn document(records: &[String]) -> String {
        format!(r#"{{"Samples": [{}]}}"#, records.join(",\n"))
    }

    fn sample_suunto_json() -> String {
        document(&[
            sample(
                "2019-08-11T10:00:09.200+02:00",
                r#""AbsPressure": 96500, "Latitude": 0.8367, "Longitude": 0.1396, "Speed": 2.5, "Cadence": 1.4"#,
            ),
            rr("2019-08-11T10:00:10.000+02:00", &[800, 800, 820]),
            sample("2019-08-11T10:00:11.900+02:00", r#""AbsPressure": 96502"#),
            sample("2019-08-11T10:00:12.300+02:00", r#""AbsPressure": 96503"#),
            rr("2019-08-11T10:00:12.420+02:00", &[810, 790]),
            rr("2019-08-11T10:00:14.020+02:00", &[1600]),
            rr("2019-08-11T10:00:17.020+02:00", &[3000]),
            r#"{"TimeISO8601": "2019-08-11T10:00:18.000+02:00", "Attributes": {"suunto/sml": {"Events": [{"Lap": {}}]}}}"#.to_string(),
        ])
    }

    fn aligned(output: RecordingOutput) -> Reconstruction {
        match output {
            RecordingOutput::Aligned(reconstruction) => *reconstruction,
            RecordingOutput::IbiSeries(_) => panic!("expected an aligned table"),
        }
    }

    #[test]
    fn test_full_reconstruction() {
        let rec = aligned(reconstruct(&sample_suunto_json(), "suunto_json").unwrap());

        let keys: Vec<i64> = rec.table.rows.keys().map(|k| k - T0).collect();
        assert_eq!(keys, vec![-2, -1, 0, 2, 4, 7]);
        assert_eq!(rec.beats.len(), 7);
        assert!(rec.beats.windows(2).all(|p| p[0].time < p[1].time));
        assert_eq!(rec.table.ibi_width, 2);

        assert_eq!(rec.total_events, 8);
        assert_eq!(rec.unparsed_count, 1);
        assert_eq!(rec.unparsed.len(), 1);
        assert_eq!(
            rec.collisions,
            CollisionStats {
                barometric: 1,
                gps: 0
            }
        );
        assert!(rec.drift.is_empty());

        // Two beats share one second
        let shared = rec.table.get(T0 + 2).unwrap();
        assert_eq!(shared.ibi_raw, vec![Some(810.0), Some(790.0)]);
        assert_eq!(shared.barometric.get("AbsPressure"), Some(&96502.0));

        // 1600 ms is a plausible interval and survives filtering
        assert!(rec.table.get(T0 + 4).unwrap().ibi_filtered[0].is_some());

        // 3000 ms is removed from the filtered slots only
        let long = rec.table.get(T0 + 7).unwrap();
        assert_eq!(long.ibi_raw[0], Some(3000.0));
        assert_eq!(long.ibi_filtered[0], None);
        assert_eq!(long.derived.hr_raw, Some(20.0));
        assert_eq!(long.derived.hr_filtered, None);

        let first = rec.table.get(T0 - 1).unwrap();
        assert_eq!(first.gps.get("Latitude"), Some(&0.8367));
        assert!((first.derived.pace.unwrap() - 6.6667).abs() < 0.001);
        assert!((first.derived.cadence.unwrap() - 84.0).abs() < 1e-9);
        assert_eq!(first.derived.hr_raw, Some(75.0));

        assert!(rec.quality_flags.contains(&QualityFlag::UnparsedEvents));
        assert!(rec.quality_flags.contains(&QualityFlag::DroppedCollisions));
        assert!(!rec.quality_flags.contains(&QualityFlag::MissingGps));
    }

    #[test]
    fn test_no_bursts_with_heart_rate_is_empty_input() {
        let json = document(&[sample("2019-08-11T10:00:09Z", r#""AbsPressure": 96500"#)]);
        let result = reconstruct(&json, "suunto_json");
        assert!(matches!(result, Err(ReconstructError::EmptyInput(_))));
    }

    #[test]
    fn test_no_bursts_without_heart_rate() {
        let json = document(&[sample("2019-08-11T10:00:09Z", r#""AbsPressure": 96500"#)]);
        let config = ReconstructionConfig {
            heart_rate: false,
            ..Default::default()
        };
        let reconstructor = Reconstructor::with_config(config).unwrap();

        let rec = aligned(reconstructor.process(&json, "suunto_json").unwrap());
        assert_eq!(rec.table.len(), 1);
        assert_eq!(rec.table.ibi_width, 0);
        assert!(rec.quality_flags.contains(&QualityFlag::MissingIbi));
    }

    #[test]
    fn test_unsupported_mode_fails_before_parsing() {
        let result = reconstruct("not even json", "fit_file");
        assert!(matches!(result, Err(ReconstructError::UnsupportedSource(_))));
    }

    #[test]
    fn test_missing_samples_is_malformed() {
        let result = reconstruct(r#"{"samples": []}"#, "suunto_json");
        assert!(matches!(result, Err(ReconstructError::MalformedInput(_))));
    }

    #[test]
    fn test_strict_drift_rejects_overlap() {
        let json = document(&[
            rr("2019-08-11T10:00:10Z", &[800]),
            rr("2019-08-11T10:00:11Z", &[1000, 1000, 1000]),
        ]);

        let lenient = aligned(reconstruct(&json, "suunto_json").unwrap());
        assert_eq!(lenient.drift.len(), 1);
        assert!(lenient.quality_flags.contains(&QualityFlag::TimelineDrift));

        let strict = Reconstructor::with_config(ReconstructionConfig {
            drift: DriftPolicy::Strict,
            ..Default::default()
        })
        .unwrap();
        let result = strict.process(&json, "suunto_json");
        assert!(matches!(result, Err(ReconstructError::TimelineDrift { .. })));
    }

    #[test]
    fn test_summary_header_is_attached() {
        let summary = r#"{"Samples": [{"Attributes": {"suunto/sml": {"Header": {"Duration": 9.0}}}}]}"#;
        let output = Reconstructor::new()
            .process_with_summary(&sample_suunto_json(), Some(summary), "suunto_json")
            .unwrap();

        let rec = aligned(output);
        assert_eq!(rec.summary.unwrap()["Duration"], 9.0);
    }

    #[test]
    fn test_qs_mode_gives_ibi_series() {
        let json = r#"{"activities": [{"streams": [{"type": "IBI", "data": [800, 800, 3000, 810]}]}]}"#;

        match reconstruct(json, "qs_json").unwrap() {
            RecordingOutput::IbiSeries(report) => {
                assert_eq!(report.ibi_raw, vec![800.0, 800.0, 3000.0, 810.0]);
                assert_eq!(report.ibi_filtered[2], None);
                assert_eq!(report.hr_raw[0], Some(75.0));
                assert_eq!(report.hr_filtered[2], None);
            }
            RecordingOutput::Aligned(_) => panic!("expected an IBI series"),
        }
    }

    #[test]
    fn test_batch_isolates_failures() {
        let good = sample_suunto_json();
        let documents = [good.as_str(), "{}", good.as_str()];

        let results = Reconstructor::new()
            .process_batch(&documents, "suunto_json")
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(ReconstructError::MalformedInput(_))));
        assert!(results[2].is_ok());

        assert!(Reconstructor::new().process_batch(&documents, "csv").is_err());
    }

    #[test]
    fn test_suunto_to_table_json() {
        let json = suunto_to_table(sample_suunto_json()).unwrap();
        let payload: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(payload["producer"]["name"], "beatgrid");
        assert_eq!(payload["rows"].as_array().unwrap().len(), 6);
        assert_eq!(payload["quality"]["unparsed_count"], 1);
        assert_eq!(payload["provenance"]["source_mode"], "suunto_json");
    }

    #[test]
    fn test_gps_fix_without_pressure_gets_its_own_row() {
        let json = document(&[
            rr("2019-08-11T10:00:10.000+02:00", &[800]),
            sample(
                "2019-08-11T10:00:12.000+02:00",
                r#""Latitude": 0.8367, "Longitude": 0.1396, "Speed": 2.5"#,
            ),
        ]);
        let rec = aligned(reconstruct(&json, "suunto_json").unwrap());

        assert_eq!(rec.table.len(), 2);
        assert_eq!(rec.unparsed_count, 0);

        let fix = rec.table.get(T0 + 2).unwrap();
        assert!(fix.barometric.is_empty());
        assert_eq!(fix.gps.get("Latitude"), Some(&0.8367));
        assert!((fix.derived.pace.unwrap() - 6.6667).abs() < 0.001);
        assert!(!rec.quality_flags.contains(&QualityFlag::MissingGps));
    }

    #[test]
    fn test_out_of_range_interval_leaves_recording_intact() {
        let json = document(&[
            r#"{"TimeISO8601": "2019-08-11T10:00:08Z", "Attributes": {"suunto/sml": {"R-R": {"IBI": [1e19]}}}}"#
                .to_string(),
            rr("2019-08-11T10:00:10.000+02:00", &[800, 810]),
        ]);
        let rec = aligned(reconstruct(&json, "suunto_json").unwrap());

        assert_eq!(rec.beats.len(), 2);
        assert_eq!(rec.unparsed_count, 1);
        assert!(rec.quality_flags.contains(&QualityFlag::UnparsedEvents));

        let only_corrupt = document(&[
            r#"{"TimeISO8601": "2019-08-11T10:00:08Z", "Attributes": {"suunto/sml": {"R-R": {"IBI": [1e19]}}}}"#
                .to_string(),
        ]);
        let result = reconstruct(&only_corrupt, "suunto_json");
        assert!(matches!(result, Err(ReconstructError::EmptyInput(_))));
    }

    #[test]
    fn test_provenance_follows_the_source() {
        let rec = aligned(reconstruct(&sample_suunto_json(), "suunto_json").unwrap());
        assert_eq!(rec.source_mode, Some(SourceMode::SuuntoJson));

        let events = SuuntoAdapter.parse(&sample_suunto_json()).unwrap();
        let from_events = reconstruct_events(&events, &ReconstructionConfig::default()).unwrap();
        assert_eq!(from_events.source_mode, None);

        let payload = Reconstructor::new().encode(&from_events);
        assert_eq!(payload.provenance.source_mode, None);
    }

    #[test]
    fn test_reconstruction_is_deterministic() {
        let a = aligned(reconstruct(&sample_suunto_json(), "suunto_json").unwrap());
        let b = aligned(reconstruct(&sample_suunto_json(), "suunto_json").unwrap());
        assert_eq!(a, b);
    }
}
