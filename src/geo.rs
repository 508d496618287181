//! Bounding-box filter, applied after dedup and before the final sort.

use crate::models::{Bounds, Observation};

/// Retains observations inside `bounds` (inclusive). No bounds, no-op.
pub fn filter(observations: Vec<Observation>, bounds: Option<&Bounds>) -> Vec<Observation> {
    match bounds {
        Some(bounds) => observations
            .into_iter()
            .filter(|o| bounds.contains(o.latitude, o.longitude))
            .collect(),
        None => observations,
    }
}
