//! Artifact filtering and smoothing
//!
//! The raw-IBI slots of the aligned table are read in time order (row by row,
//! slot by slot) as one beat series. The series goes through four fixed stages:
//!
//! 1. Spike filter: a value is removed when it deviates from the weighted mean
//!    of its neighbours by more than `spike_std_factor` local standard
//!    deviations. The value itself never joins its baseline; the spread is the
//!    standard deviation of the present window values, centre included.
//! 2. Maximum threshold: intervals longer than `max_threshold_ms` are removed.
//! 3. Minimum threshold: intervals shorter than `min_threshold_ms` are removed.
//! 4. Median smoothing over the surviving beats. Removed beats stay removed and
//!    are skipped, so each window holds `median_window` survivors centred on
//!    the beat, truncated at the ends of the series. An even number of values
//!    (at the ends) takes the mean of the two middle values.
//!
//! The result is written to the filtered slots; raw slots are never touched.

use log::debug;

use crate::config::FilterConfig;
use crate::types::AlignedTable;

/// Artifact filter and smoother for IBI series
#[derive(Debug, Clone)]
pub struct ArtifactFilter {
    config: FilterConfig,
}

impl Default for ArtifactFilter {
    fn default() -> Self {
        Self::new(FilterConfig::default())
    }
}

impl ArtifactFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Fill the filtered slots of every row from the raw slots
    pub fn apply(&self, table: &mut AlignedTable) {
        let positions: Vec<(i64, usize)> = table
            .rows
            .iter()
            .flat_map(|(&second, row)| {
                row.ibi_raw
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| v.is_some())
                    .map(move |(slot, _)| (second, slot))
            })
            .collect();

        let series: Vec<Option<f64>> = positions
            .iter()
            .map(|(second, slot)| table.rows[second].ibi_raw[*slot])
            .collect();

        let filtered = self.filter_series(&series);

        let width = table.ibi_width;
        for row in table.rows.values_mut() {
            row.ibi_filtered = vec![None; width];
        }
        for ((second, slot), value) in positions.into_iter().zip(filtered) {
            if let Some(row) = table.rows.get_mut(&second) {
                row.ibi_filtered[slot] = value;
            }
        }
    }

    /// Run all four stages over a beat series
    pub fn filter_series(&self, series: &[Option<f64>]) -> Vec<Option<f64>> {
        let despiked = self.remove_spikes(series);
        let capped = self.apply_max_threshold(&despiked);
        let bounded = self.apply_min_threshold(&capped);
        let smoothed = self.median_smooth(&bounded);

        debug!(
            "artifact filter: {} beats in, {} spikes, {} above max, {} below min",
            count_present(series),
            count_present(series) - count_present(&despiked),
            count_present(&despiked) - count_present(&capped),
            count_present(&capped) - count_present(&bounded),
        );

        smoothed
    }

    /// Stage 1: neighbour-baseline spike rejection
    pub fn remove_spikes(&self, series: &[Option<f64>]) -> Vec<Option<f64>> {
        let weights = &self.config.spike_window_weights;
        let half = weights.len() / 2;

        series
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let x = (*value)?;

                let mut weighted_sum = 0.0;
                let mut weight_total = 0.0;
                let mut neighbours = 0usize;
                let mut window = vec![x];

                for (k, &w) in weights.iter().enumerate() {
                    if k == half || w <= 0.0 {
                        continue;
                    }
                    let Some(j) = (i + k).checked_sub(half) else {
                        continue;
                    };
                    if let Some(Some(v)) = series.get(j) {
                        weighted_sum += w * v;
                        weight_total += w;
                        neighbours += 1;
                        window.push(*v);
                    }
                }

                // Too little context to judge
                if neighbours < 2 {
                    return Some(x);
                }

                let baseline = weighted_sum / weight_total;
                let spread = std_dev(&window);

                if (x - baseline).abs() > self.config.spike_std_factor * spread {
                    None
                } else {
                    Some(x)
                }
            })
            .collect()
    }

    /// Stage 2: drop intervals longer than the maximum threshold
    pub fn apply_max_threshold(&self, series: &[Option<f64>]) -> Vec<Option<f64>> {
        let max = self.config.max_threshold_ms;
        series.iter().map(|v| v.filter(|x| *x <= max)).collect()
    }

    /// Stage 3: drop intervals shorter than the minimum threshold
    pub fn apply_min_threshold(&self, series: &[Option<f64>]) -> Vec<Option<f64>> {
        let min = self.config.min_threshold_ms;
        series.iter().map(|v| v.filter(|x| *x >= min)).collect()
    }

    /// Stage 4: sliding median over the surviving beats
    pub fn median_smooth(&self, series: &[Option<f64>]) -> Vec<Option<f64>> {
        let survivors: Vec<f64> = series.iter().flatten().copied().collect();
        let half = self.config.median_window / 2;

        let smoothed: Vec<f64> = (0..survivors.len())
            .map(|i| {
                let start = i.saturating_sub(half);
                let end = (i + half + 1).min(survivors.len());
                median(&survivors[start..end])
            })
            .collect();

        let mut smoothed = smoothed.into_iter();
        series
            .iter()
            .map(|v| v.and_then(|_| smoothed.next()))
            .collect()
    }
}

fn count_present(series: &[Option<f64>]) -> usize {
    series.iter().filter(|v| v.is_some()).count()
}

fn std_dev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
