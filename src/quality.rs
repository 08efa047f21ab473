//! Quality assessment
//!
//! Summarises what a reconstruction is missing or had to discard:
//! - Streams that never appeared
//! - Unparsed records and dropped collisions
//! - Timeline drift between bursts
//! - IBI coverage of the table

use crate::types::{QualityFlag, Reconstruction};

/// Assessor for reconstruction quality
pub struct QualityAssessor;

impl QualityAssessor {
    /// Flags for a finished reconstruction
    pub fn flags(reconstruction: &Reconstruction) -> Vec<QualityFlag> {
        let table = &reconstruction.table;
        let mut flags = Vec::new();

        if reconstruction.beats.is_empty() {
            flags.push(QualityFlag::MissingIbi);
        }
        if table.rows.values().all(|row| row.barometric.is_empty()) {
            flags.push(QualityFlag::MissingBarometric);
        }
        if table.rows.values().all(|row| row.gps.is_empty()) {
            flags.push(QualityFlag::MissingGps);
        }
        if !reconstruction.drift.is_empty() {
            flags.push(QualityFlag::TimelineDrift);
        }
        if reconstruction.unparsed_count > 0 {
            flags.push(QualityFlag::UnparsedEvents);
        }
        if reconstruction.collisions.total() > 0 {
            flags.push(QualityFlag::DroppedCollisions);
        }

        flags
    }

    /// Share of rows (0-1) with at least one raw beat
    pub fn ibi_coverage(reconstruction: &Reconstruction) -> f64 {
        let table = &reconstruction.table;
        if table.is_empty() {
            return 0.0;
        }
        let with_ibi = table.rows.values().filter(|row| row.has_ibi()).count();
        with_ibi as f64 / table.len() as f64
    }

    /// Share of raw beats (0-1) that survived the artifact filter
    pub fn filter_retention(reconstruction: &Reconstruction) -> Option<f64> {
        let (raw, kept) = reconstruction
            .table
            .rows
            .values()
            .fold((0usize, 0usize), |(raw, kept), row| {
                (
                    raw + row.ibi_raw.iter().flatten().count(),
                    kept + row.ibi_filtered.iter().flatten().count(),
                )
            });

        if raw == 0 {
            None
        } else {
            Some(kept as f64 / raw as f64)
        }
    }
}
