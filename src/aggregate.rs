//! # Aggregation Orchestrator
//!
//! Entry point of the pipeline. Decides source priority and fallback,
//! drives pagination through the clients, and runs the assembly chain:
//! normalize → dedup → geo filter → sort → limit → cache write.
//!
//! The primary index wins whenever it returns anything at all; the external
//! providers are only consulted when it comes back empty (or the caller
//! forces them). Upstream failures never surface as errors here — every
//! degradation ends as "less data" in an otherwise normal response.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::ResponseCache;
use crate::dedup::dedup;
use crate::geo;
use crate::geocode::notify_detached;
use crate::models::{
    Bounds, Observation, ObservationsResponse, ResponseMeta, Source, SourceCounts,
};
use crate::normalize::{self, normalize};
use crate::sources::{FallbackSource, GeocodeSink, PrimarySource};
use crate::taxa::TaxonResolver;

/// Which sources the caller wants queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFilter {
    All,
    Mindex,
    INaturalist,
    Gbif,
}

impl SourceFilter {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("mindex") => SourceFilter::Mindex,
            Some("inat") => SourceFilter::INaturalist,
            Some("gbif") => SourceFilter::Gbif,
            _ => SourceFilter::All,
        }
    }

    pub fn allows(&self, source: Source) -> bool {
        match self {
            SourceFilter::All => true,
            SourceFilter::Mindex => source == Source::Mindex,
            SourceFilter::INaturalist => source == Source::INaturalist,
            SourceFilter::Gbif => source == Source::Gbif,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregateParams {
    pub limit: Option<usize>,
    pub source: SourceFilter,
    pub fallback: bool,
    pub nocache: bool,
    pub bounds: Option<Bounds>,
}

impl Default for AggregateParams {
    fn default() -> Self {
        Self {
            limit: None,
            source: SourceFilter::All,
            fallback: false,
            nocache: false,
            bounds: None,
        }
    }
}

pub struct Aggregator {
    primary: Arc<dyn PrimarySource>,
    fallbacks: Vec<Arc<dyn FallbackSource>>,
    geocode: Arc<dyn GeocodeSink>,
    resolver: Arc<TaxonResolver>,
    cache: Arc<ResponseCache>,
    hard_ceiling: usize,
    grid_precision: u32,
}

impl Aggregator {
    pub fn new(
        primary: Arc<dyn PrimarySource>,
        fallbacks: Vec<Arc<dyn FallbackSource>>,
        geocode: Arc<dyn GeocodeSink>,
        resolver: Arc<TaxonResolver>,
        cache: Arc<ResponseCache>,
        hard_ceiling: usize,
        grid_precision: u32,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            geocode,
            resolver,
            cache,
            hard_ceiling,
            grid_precision,
        }
    }

    pub async fn aggregate(&self, params: &AggregateParams) -> ObservationsResponse {
        let cap = params
            .limit
            .unwrap_or(self.hard_ceiling)
            .min(self.hard_ceiling);

        // The single cache slot only matches the default query shape;
        // filtered runs always recompute.
        let cacheable = params.source == SourceFilter::All && !params.fallback;

        if cacheable && !params.nocache {
            if let Some((entry, age)) = self.cache.get().await {
                let mut observations = geo::filter(entry.observations, params.bounds.as_ref());
                observations.truncate(cap);
                let sources = SourceCounts::tally(&observations);
                debug!(total = observations.len(), "served from response cache");
                return respond(observations, sources, entry.data_source, true, Some(age.as_secs()), None);
            }
        }

        let use_primary = !params.fallback && params.source.allows(Source::Mindex);
        let primary_raw = if use_primary {
            self.primary.fetch_observations(Some(cap)).await
        } else {
            Vec::new()
        };

        let mut pending_geocode = None;
        let (observations, data_source) = if !primary_raw.is_empty() {
            pending_geocode = self.queue_ungeolocated(&primary_raw);
            (self.normalize_primary(&primary_raw).await, "mindex")
        } else {
            let normalized = self.fetch_fallbacks(params, cap).await;
            let data_source = if use_primary && normalized.is_empty() {
                // Primary was consulted and nothing external was allowed
                // or available either.
                "mindex"
            } else {
                "external_fallback"
            };
            (normalized, data_source)
        };

        let mut observations = dedup(observations, self.grid_precision);
        observations = geo::filter(observations, params.bounds.as_ref());
        observations.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        observations.truncate(cap);

        let sources = SourceCounts::tally(&observations);
        info!(
            total = observations.len(),
            data_source, "aggregation pass complete"
        );

        self.cache
            .set(observations.clone(), sources.clone(), data_source.to_string())
            .await;

        respond(observations, sources, data_source.to_string(), false, None, pending_geocode)
    }

    async fn normalize_primary(&self, raw_records: &[Value]) -> Vec<Observation> {
        let taxa = self.resolver.table().await;
        raw_records
            .iter()
            .filter_map(|raw| normalize(raw, Source::Mindex, taxa.as_deref()))
            .collect()
    }

    async fn fetch_fallbacks(&self, params: &AggregateParams, budget: usize) -> Vec<Observation> {
        let active: Vec<&Arc<dyn FallbackSource>> = self
            .fallbacks
            .iter()
            .filter(|provider| params.source.allows(provider.source()))
            .collect();

        let requests = active
            .iter()
            .map(|provider| provider.fetch(budget, params.bounds.as_ref()));
        let raw_batches = join_all(requests).await;

        let mut observations = Vec::new();
        for (provider, raw_batch) in active.iter().zip(raw_batches) {
            let source = provider.source();
            observations.extend(
                raw_batch
                    .iter()
                    .filter_map(|raw| normalize(raw, source, None)),
            );
        }
        observations
    }

    /// Queues primary rows lacking coordinates for asynchronous geocoding.
    /// Best effort: the spawned task logs its own failures.
    fn queue_ungeolocated(&self, raw_records: &[Value]) -> Option<usize> {
        let missing: Vec<String> = raw_records
            .iter()
            .filter(|raw| normalize::coordinates(raw).is_none())
            .filter_map(|raw| normalize::id_string(raw, "id"))
            .collect();

        if missing.is_empty() {
            return None;
        }
        let count = missing.len();
        notify_detached(self.geocode.clone(), missing);
        Some(count)
    }
}

fn respond(
    observations: Vec<Observation>,
    sources: SourceCounts,
    data_source: String,
    cached: bool,
    cache_age: Option<u64>,
    pending_geocode: Option<usize>,
) -> ObservationsResponse {
    let meta = ResponseMeta {
        total: observations.len(),
        sources,
        cached,
        cache_age,
        pending_geocode,
        data_source,
        timestamp: Utc::now(),
    };
    ObservationsResponse { observations, meta }
}
