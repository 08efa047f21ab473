//! Derived metrics
//!
//! This module appends derived columns to the aligned table:
//! - Heart rate from the raw and the filtered IBI slots
//! - Pace from speed
//! - Cadence in steps per minute

use crate::config::MS_PER_MINUTE;
use crate::types::{AlignedRow, AlignedTable};

/// Sample field holding speed (m/s)
pub const SPEED_FIELD: &str = "Speed";

/// Sample field holding cadence (per second)
pub const CADENCE_FIELD: &str = "Cadence";

/// Deriver for the metric columns
pub struct MetricsDeriver;

impl MetricsDeriver {
    /// Fill the derived fields of every row. Rows are never added or removed.
    pub fn derive(table: &mut AlignedTable) {
        for row in table.rows.values_mut() {
            row.derived.hr_raw = heart_rate(&row.ibi_raw);
            row.derived.hr_filtered = heart_rate(&row.ibi_filtered);
            row.derived.pace = sample_field(row, SPEED_FIELD).and_then(pace_min_per_km);
            row.derived.cadence = sample_field(row, CADENCE_FIELD).map(cadence_per_minute);
        }
    }
}

/// Heart rate (beats/min) from the mean of the present IBI slots
pub fn heart_rate(slots: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = slots.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }

    let mean = present.iter().sum::<f64>() / present.len() as f64;
    if mean > 0.0 {
        Some(MS_PER_MINUTE / mean)
    } else {
        None
    }
}

/// Pace (min/km) from speed (m/s); a stationary sample has no pace
pub fn pace_min_per_km(speed_m_per_s: f64) -> Option<f64> {
    if speed_m_per_s > 0.0 && speed_m_per_s.is_finite() {
        Some(1000.0 / (60.0 * speed_m_per_s))
    } else {
        None
    }
}

/// Cadence in steps per minute
pub fn cadence_per_minute(raw: f64) -> f64 {
    raw * 60.0
}

/// Look a field up in the barometric group, then the GPS group
fn sample_field(row: &AlignedRow, field: &str) -> Option<f64> {
    row.barometric
        .get(field)
        .or_else(|| row.gps.get(field))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_with(fields: &[(&str, f64)], raw: Vec<Option<f64>>, filtered: Vec<Option<f64>>) -> AlignedRow {
        AlignedRow {
            barometric: fields.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            ibi_raw: raw,
            ibi_filtered: filtered,
            ..Default::default()
        }
    }

    #[test]
    fn test_heart_rate_ignores_missing_slots() {
        assert_eq!(heart_rate(&[Some(800.0), None, Some(700.0)]), Some(80.0));
        assert_eq!(heart_rate(&[None, None]), None);
        assert_eq!(heart_rate(&[]), None);
    }

    #[test]
    fn test_pace() {
        // 4 m/s is 4:10 min/km
        let pace = pace_min_per_km(4.0).unwrap();
        assert!((pace - 4.1667).abs() < 0.001);
        assert_eq!(pace_min_per_km(0.0), None);
    }

    #[test]
    fn test_cadence() {
        assert_eq!(cadence_per_minute(1.5), 90.0);
    }

    #[test]
    fn test_derive_fills_columns_without_touching_rows() {
        let mut table = AlignedTable {
            ibi_width: 2,
            ..Default::default()
        };
        table.rows.insert(
            0,
            row_with(
                &[(SPEED_FIELD, 2.5), (CADENCE_FIELD, 1.4)],
                vec![Some(600.0), Some(3000.0)],
                vec![Some(600.0), None],
            ),
        );
        table.rows.insert(1, row_with(&[], vec![None, None], vec![None, None]));

        MetricsDeriver::derive(&mut table);

        assert_eq!(table.len(), 2);
        let first = &table.rows[&0].derived;
        assert_eq!(first.hr_raw, Some(60000.0 / 1800.0));
        assert_eq!(first.hr_filtered, Some(100.0));
        assert!((first.pace.unwrap() - 6.6667).abs() < 0.001);
        assert!((first.cadence.unwrap() - 84.0).abs() < 1e-9);

        let empty = &table.rows[&1].derived;
        assert_eq!(empty.hr_raw, None);
        assert_eq!(empty.pace, None);
        assert_eq!(empty.cadence, None);
    }
}
