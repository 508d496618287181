//! # Upstream Sources
//!
//! Clients for the primary index and the two external biodiversity
//! providers. The traits exist so the orchestrator and the taxon resolver
//! can be exercised against in-memory fakes.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;
use crate::models::{Bounds, Source};

pub mod gbif;
pub mod inat;
pub mod mindex;

/// The authoritative local index (MINDEX).
#[async_trait]
pub trait PrimarySource: Send + Sync {
    /// Fully paginates the observation feed, newest first, up to `cap`
    /// records. Upstream failures end pagination early; whatever was
    /// accumulated so far is returned, possibly nothing.
    async fn fetch_observations(&self, cap: Option<usize>) -> Vec<Value>;

    /// One page of the taxon catalog: `(rows, reported total)`.
    async fn fetch_taxa_page(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Value>, usize), AppError>;
}

/// An external biodiversity provider queried when the primary index is
/// empty.
#[async_trait]
pub trait FallbackSource: Send + Sync {
    fn source(&self) -> Source;

    /// With bounds: one bbox-scoped request. Without: one request per
    /// hotspot region, concurrently, each failure yielding zero records.
    /// The result is the raw concatenation, capped at `budget`.
    async fn fetch(&self, budget: usize, bounds: Option<&Bounds>) -> Vec<Value>;
}

/// Fire-and-forget sink for primary-index records that need geocoding.
#[async_trait]
pub trait GeocodeSink: Send + Sync {
    async fn queue(&self, record_ids: Vec<String>) -> Result<(), AppError>;
}

pub struct Region {
    pub name: &'static str,
    pub bounds: Bounds,
}

/// Prioritized world fungal-diversity hotspots, queried when the caller
/// gives no bounding box. Order matters: earlier regions fill the budget
/// first.
pub const HOTSPOT_REGIONS: &[Region] = &[
    Region {
        name: "pacific-northwest",
        bounds: Bounds { north: 52.0, south: 40.0, east: -116.0, west: -130.0 },
    },
    Region {
        name: "appalachia",
        bounds: Bounds { north: 43.0, south: 33.0, east: -75.0, west: -85.0 },
    },
    Region {
        name: "western-europe",
        bounds: Bounds { north: 55.0, south: 43.0, east: 20.0, west: -10.0 },
    },
    Region {
        name: "scandinavia",
        bounds: Bounds { north: 65.0, south: 55.0, east: 20.0, west: 5.0 },
    },
    Region {
        name: "japan",
        bounds: Bounds { north: 45.0, south: 30.0, east: 146.0, west: 129.0 },
    },
    Region {
        name: "eastern-australia",
        bounds: Bounds { north: -25.0, south: -44.0, east: 154.0, west: 140.0 },
    },
    Region {
        name: "new-zealand",
        bounds: Bounds { north: -34.0, south: -47.0, east: 179.0, west: 166.0 },
    },
    Region {
        name: "yunnan",
        bounds: Bounds { north: 29.0, south: 21.0, east: 106.0, west: 97.0 },
    },
    Region {
        name: "central-america",
        bounds: Bounds { north: 18.0, south: 7.0, east: -77.0, west: -93.0 },
    },
    Region {
        name: "andes-amazon",
        bounds: Bounds { north: 0.0, south: -15.0, east: -60.0, west: -80.0 },
    },
];
