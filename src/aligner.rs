//! Stream alignment
//!
//! Rounds the barometric and GPS streams to the one-second grid and outer-joins
//! them with the raw-IBI matrix. Every grid second present in any stream gets
//! exactly one row; fields a stream did not sample stay empty.
//!
//! When several samples of one stream round to the same second only the first
//! is kept. Adjacent buckets may therefore be missing even where the device
//! sampled; consumers should not assume uniform sampling.

use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{
    grid_second, AlignedRow, AlignedTable, CollisionStats, IbiMatrix, TimedSample,
};

/// Output of the join
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub table: AlignedTable,
    pub collisions: CollisionStats,
}

/// Aligner for the independently sampled streams
pub struct StreamAligner;

impl StreamAligner {
    /// Outer-join the three streams on the grid second
    pub fn align(matrix: &IbiMatrix, barometric: &[TimedSample], gps: &[TimedSample]) -> Alignment {
        let (baro_by_second, baro_dropped) = first_per_second(barometric);
        let (gps_by_second, gps_dropped) = first_per_second(gps);

        let keys: BTreeSet<i64> = baro_by_second
            .keys()
            .chain(gps_by_second.keys())
            .chain(matrix.rows.keys())
            .copied()
            .collect();

        let rows: BTreeMap<i64, AlignedRow> = keys
            .into_iter()
            .map(|second| {
                let row = AlignedRow {
                    barometric: baro_by_second
                        .get(&second)
                        .map(|s| s.fields.clone())
                        .unwrap_or_default(),
                    gps: gps_by_second
                        .get(&second)
                        .map(|s| s.fields.clone())
                        .unwrap_or_default(),
                    ibi_raw: matrix
                        .rows
                        .get(&second)
                        .cloned()
                        .unwrap_or_else(|| vec![None; matrix.width]),
                    ibi_filtered: Vec::new(),
                    derived: Default::default(),
                };
                (second, row)
            })
            .collect();

        let collisions = CollisionStats {
            barometric: baro_dropped,
            gps: gps_dropped,
        };
        if collisions.total() > 0 {
            warn!(
                "dropped {} barometric and {} gps samples that shared a second with an earlier sample",
                collisions.barometric, collisions.gps
            );
        }
        debug!("aligned table: {} rows", rows.len());

        Alignment {
            table: AlignedTable {
                rows,
                ibi_width: matrix.width,
            },
            collisions,
        }
    }
}

/// Keep the first sample of every grid second; returns the number discarded
fn first_per_second(samples: &[TimedSample]) -> (BTreeMap<i64, &TimedSample>, usize) {
    let mut by_second = BTreeMap::new();
    let mut dropped = 0;

    for sample in samples {
        let second = grid_second(sample.timestamp);
        if by_second.contains_key(&second) {
            dropped += 1;
        } else {
            by_second.insert(second, sample);
        }
    }

    (by_second, dropped)
}
