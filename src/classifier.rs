//! Record classification
//!
//! Scans the event sequence once and dispatches every event into the streams it
//! can feed. An event may feed more than one stream: a sample with both a
//! pressure and a latitude reading is both barometric and GPS. The two checks
//! are independent, so a fix without pressure is still GPS.

use log::{debug, warn};
use std::collections::BTreeSet;

use crate::types::{Capabilities, Event, IbiBurst, TimedSample};

/// Sample field that marks a barometric reading
pub const PRESSURE_FIELD: &str = "AbsPressure";

/// Sample field that marks a GPS fix
pub const LATITUDE_FIELD: &str = "Latitude";

/// Events split into streams, each in document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedEvents {
    pub bursts: Vec<IbiBurst>,
    pub barometric: Vec<TimedSample>,
    pub gps: Vec<TimedSample>,
    /// Indices of the events consumed by at least one stream
    pub consumed: BTreeSet<usize>,
    pub total: usize,
}

impl ClassifiedEvents {
    pub fn unparsed_count(&self) -> usize {
        self.total - self.consumed.len()
    }

    /// Indices of the events no stream consumed
    pub fn unparsed_indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.total).filter(move |i| !self.consumed.contains(i))
    }
}

/// Classifier for the flat event sequence
pub struct RecordClassifier;

impl RecordClassifier {
    /// Streams an event can feed.
    ///
    /// An interbeat-interval payload wins; only events without one are checked
    /// for pressure and latitude fields.
    pub fn capabilities(event: &Event) -> Capabilities {
        if event.ibi.is_some() {
            return Capabilities {
                ibi: true,
                ..Default::default()
            };
        }

        Capabilities {
            ibi: false,
            barometric: event.has_sample_field(PRESSURE_FIELD),
            gps: event.has_sample_field(LATITUDE_FIELD),
        }
    }

    /// Dispatch every event into its streams
    pub fn classify(events: &[Event]) -> ClassifiedEvents {
        let mut classified = ClassifiedEvents {
            total: events.len(),
            ..Default::default()
        };

        for (index, event) in events.iter().enumerate() {
            let capabilities = Self::capabilities(event);
            if capabilities.is_empty() {
                continue;
            }

            // Without a time the event cannot be placed on any stream
            let Some(timestamp) = event.timestamp else {
                debug!("event {} has no timestamp, left unparsed", index);
                continue;
            };

            if capabilities.ibi {
                let burst = IbiBurst {
                    timestamp,
                    intervals: event.ibi.clone().unwrap_or_default(),
                };
                if !burst.is_placeable() {
                    warn!("event {} has intervals outside the time range, left unparsed", index);
                    continue;
                }
                classified.bursts.push(burst);
            }

            if capabilities.barometric || capabilities.gps {
                let fields: std::collections::BTreeMap<String, f64> = event
                    .sample
                    .iter()
                    .flatten()
                    .filter_map(|(name, value)| value.map(|v| (name.clone(), v)))
                    .collect();

                if capabilities.barometric {
                    classified.barometric.push(TimedSample {
                        timestamp,
                        fields: fields.clone(),
                    });
                }
                if capabilities.gps {
                    classified.gps.push(TimedSample { timestamp, fields });
                }
            }

            classified.consumed.insert(index);
        }

        debug!(
            "classified {} events: {} bursts, {} barometric, {} gps, {} unparsed",
            classified.total,
            classified.bursts.len(),
            classified.barometric.len(),
            classified.gps.len(),
            classified.unparsed_count()
        );

        classified
    }
}
