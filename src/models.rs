//! # Data Model
//!
//! Canonical shapes shared across the pipeline.
//!
//! Every upstream record, whatever its provider schema looked like, is
//! normalized into one [`Observation`]. Raw provider payloads are kept as
//! `serde_json::Value` until normalization because the historical formats
//! are too inconsistent to deserialize into a single typed struct.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Originating data source of an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Mindex,
    INaturalist,
    Gbif,
}

impl Source {
    /// Prefix used to build globally unique observation ids
    /// (`<source>-<nativeId>`).
    pub fn prefix(&self) -> &'static str {
        match self {
            Source::Mindex => "mindex",
            Source::INaturalist => "inat",
            Source::Gbif => "gbif",
        }
    }
}

/// One fungal sighting, normalized from any of the upstream schemas.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub id: String,
    pub scientific_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    pub source: Source,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub habitat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

/// Inclusive geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Bounds {
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.south
            && latitude <= self.north
            && longitude >= self.west
            && longitude <= self.east
    }
}

/// Per-source record counts reported in response metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    pub mindex: usize,
    #[serde(rename = "iNaturalist")]
    pub inaturalist: usize,
    pub gbif: usize,
}

impl SourceCounts {
    pub fn tally(observations: &[Observation]) -> Self {
        let mut counts = Self::default();
        for observation in observations {
            match observation.source {
                Source::Mindex => counts.mindex += 1,
                Source::INaturalist => counts.inaturalist += 1,
                Source::Gbif => counts.gbif += 1,
            }
        }
        counts
    }
}

/// Metadata block attached to every observations response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub total: usize,
    pub sources: SourceCounts,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_age: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_geocode: Option<usize>,
    pub data_source: String,
    pub timestamp: DateTime<Utc>,
}

/// Envelope returned by `GET /api/observations`.
#[derive(Debug, Clone, Serialize)]
pub struct ObservationsResponse {
    pub observations: Vec<Observation>,
    pub meta: ResponseMeta,
}
