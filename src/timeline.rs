//! IBI timeline reconstruction
//!
//! Bursts report several interbeat intervals under the time of their last beat.
//! This module walks each burst backwards from that time to recover an absolute
//! time for every beat, then pivots the beats onto the one-second grid.
//!
//! Several beats usually round to the same second. Each gets a slot: the index
//! of the beat among the beats of that second, in encounter order. The
//! (second, slot) pairs are unique by construction.

use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};

use crate::config::DriftPolicy;
use crate::error::ReconstructError;
use crate::types::{grid_second, ms_before, Beat, DriftWarning, IbiBurst, IbiMatrix};

/// Reconstructor for the absolute beat timeline
pub struct TimelineReconstructor;

impl TimelineReconstructor {
    /// Flatten bursts into the raw per-beat series.
    ///
    /// Beat `i` of a burst lies at `timestamp - sum(intervals after i)`, so the
    /// last beat lands exactly on the burst timestamp and the first onset on
    /// `timestamp - sum(intervals)`.
    pub fn beats(bursts: &[IbiBurst]) -> Vec<Beat> {
        let mut beats = Vec::with_capacity(bursts.iter().map(|b| b.intervals.len()).sum());

        for (burst_index, burst) in bursts.iter().enumerate() {
            if !burst.is_placeable() {
                warn!("burst {} reaches outside the time range, skipped", burst_index);
                continue;
            }

            let remaining = burst.remaining_ms();
            for (i, &interval_ms) in burst.intervals.iter().enumerate() {
                let after = remaining.get(i + 1).copied().unwrap_or(0.0);
                let (Some(onset), Some(time)) = (
                    ms_before(burst.timestamp, remaining[i]),
                    ms_before(burst.timestamp, after),
                ) else {
                    continue;
                };
                beats.push(Beat {
                    onset,
                    time,
                    interval_ms,
                    burst: burst_index,
                });
            }
        }

        debug!("reconstructed {} beats from {} bursts", beats.len(), bursts.len());
        beats
    }

    /// Compare each burst's onset with the end of the previous burst.
    ///
    /// Gaps are expected (lost beats) and ignored. An overlap larger than
    /// `tolerance_ms` means the intervals disagree with the reported times;
    /// the bursts are never corrected.
    pub fn check_drift(
        bursts: &[IbiBurst],
        policy: DriftPolicy,
        tolerance_ms: f64,
    ) -> Result<Vec<DriftWarning>, ReconstructError> {
        let mut warnings = Vec::new();

        for (burst_index, pair) in bursts.windows(2).enumerate().map(|(i, w)| (i + 1, w)) {
            let (previous, current) = (&pair[0], &pair[1]);
            let Some(onset) = current.onset() else {
                continue;
            };
            let overlap = previous.timestamp - onset;
            let overlap_ms = overlap.num_microseconds().unwrap_or(i64::MAX) as f64 / 1000.0;

            if overlap_ms <= tolerance_ms {
                continue;
            }

            match policy {
                DriftPolicy::Strict => {
                    return Err(ReconstructError::TimelineDrift {
                        burst_index,
                        overlap_ms,
                    });
                }
                DriftPolicy::Lenient => {
                    warn!(
                        "burst {} overlaps the previous burst by {:.1} ms; kept as reported",
                        burst_index, overlap_ms
                    );
                    warnings.push(DriftWarning {
                        burst_index,
                        overlap_ms,
                    });
                }
            }
        }

        Ok(warnings)
    }

    /// Grid second and slot of every beat, in beat order
    pub fn assign_slots(beats: &[Beat]) -> Vec<(i64, usize)> {
        let mut seen: HashMap<i64, usize> = HashMap::new();

        beats
            .iter()
            .map(|beat| {
                let second = grid_second(beat.time);
                let count = seen.entry(second).or_insert(0);
                let slot = *count;
                *count += 1;
                (second, slot)
            })
            .collect()
    }

    /// Pivot the beats into the raw-IBI matrix
    pub fn build_matrix(beats: &[Beat]) -> IbiMatrix {
        let slots = Self::assign_slots(beats);
        let width = slots.iter().map(|&(_, slot)| slot + 1).max().unwrap_or(0);

        let mut rows: BTreeMap<i64, Vec<Option<f64>>> = BTreeMap::new();
        for (beat, &(second, slot)) in beats.iter().zip(&slots) {
            let row = rows.entry(second).or_insert_with(|| vec![None; width]);
            row[slot] = Some(beat.interval_ms);
        }

        debug!("raw IBI matrix: {} rows x {} slots", rows.len(), width);
        IbiMatrix { rows, width }
    }
}
