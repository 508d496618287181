//! End-to-end orchestrator tests against in-memory sources.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{Mutex, Notify};

use mycomap::aggregate::{AggregateParams, Aggregator, SourceFilter};
use mycomap::cache::{Clock, ManualClock, ResponseCache};
use mycomap::error::AppError;
use mycomap::models::{Bounds, Source};
use mycomap::sources::{FallbackSource, GeocodeSink, PrimarySource};
use mycomap::taxa::TaxonResolver;

struct FakePrimary {
    records: Vec<Value>,
    taxa: Vec<Value>,
    observation_fetches: AtomicUsize,
}

impl FakePrimary {
    fn new(records: Vec<Value>, taxa: Vec<Value>) -> Self {
        Self {
            records,
            taxa,
            observation_fetches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PrimarySource for FakePrimary {
    async fn fetch_observations(&self, cap: Option<usize>) -> Vec<Value> {
        self.observation_fetches.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.clone();
        if let Some(cap) = cap {
            records.truncate(cap);
        }
        records
    }

    async fn fetch_taxa_page(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Value>, usize), AppError> {
        let rows: Vec<Value> = self.taxa.iter().skip(offset).take(limit).cloned().collect();
        Ok((rows, self.taxa.len()))
    }
}

struct FakeProvider {
    source: Source,
    records: Vec<Value>,
    fetches: AtomicUsize,
}

impl FakeProvider {
    fn new(source: Source, records: Vec<Value>) -> Self {
        Self {
            source,
            records,
            fetches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl FallbackSource for FakeProvider {
    fn source(&self) -> Source {
        self.source
    }

    async fn fetch(&self, budget: usize, _bounds: Option<&Bounds>) -> Vec<Value> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.clone();
        records.truncate(budget);
        records
    }
}

struct FakeGeocode {
    queued: Mutex<Vec<String>>,
    notify: Notify,
}

impl FakeGeocode {
    fn new() -> Self {
        Self {
            queued: Mutex::new(Vec::new()),
            notify: Notify::new(),
        }
    }
}

#[async_trait]
impl GeocodeSink for FakeGeocode {
    async fn queue(&self, record_ids: Vec<String>) -> Result<(), AppError> {
        self.queued.lock().await.extend(record_ids);
        self.notify.notify_one();
        Ok(())
    }
}

struct Harness {
    primary: Arc<FakePrimary>,
    inat: Arc<FakeProvider>,
    gbif: Arc<FakeProvider>,
    geocode: Arc<FakeGeocode>,
    clock: Arc<ManualClock>,
    aggregator: Aggregator,
}

fn harness(
    primary_records: Vec<Value>,
    taxa: Vec<Value>,
    inat_records: Vec<Value>,
    gbif_records: Vec<Value>,
) -> Harness {
    let primary = Arc::new(FakePrimary::new(primary_records, taxa));
    let inat = Arc::new(FakeProvider::new(Source::INaturalist, inat_records));
    let gbif = Arc::new(FakeProvider::new(Source::Gbif, gbif_records));
    let geocode = Arc::new(FakeGeocode::new());
    let clock = Arc::new(ManualClock::new());

    let resolver = Arc::new(TaxonResolver::new(
        primary.clone(),
        Duration::from_secs(1800),
        100,
        clock.clone() as Arc<dyn Clock>,
    ));
    let cache = Arc::new(ResponseCache::new(
        Duration::from_secs(300),
        clock.clone() as Arc<dyn Clock>,
    ));
    let aggregator = Aggregator::new(
        primary.clone(),
        vec![inat.clone(), gbif.clone()],
        geocode.clone(),
        resolver,
        cache,
        5000,
        3,
    );

    Harness {
        primary,
        inat,
        gbif,
        geocode,
        clock,
        aggregator,
    }
}

fn mindex_record(id: u64, taxon_id: u64, lat: f64, lng: f64, observed_at: &str) -> Value {
    json!({
        "id": id,
        "taxon_id": taxon_id,
        "latitude": lat,
        "longitude": lng,
        "observed_at": observed_at,
        "verified": true,
    })
}

fn inat_record(id: u64, name: &str, lat: f64, lng: f64, observed_at: &str) -> Value {
    json!({
        "id": id,
        "taxon": { "name": name },
        "latitude": lat,
        "longitude": lng,
        "time_observed_at": observed_at,
        "quality_grade": "research",
    })
}

fn gbif_record(key: u64, species: &str, lat: f64, lng: f64, event_date: &str) -> Value {
    json!({
        "key": key,
        "species": species,
        "decimalLatitude": lat,
        "decimalLongitude": lng,
        "eventDate": event_date,
    })
}

fn taxa_catalog() -> Vec<Value> {
    vec![
        json!({ "id": 1, "canonical_name": "Amanita muscaria", "common_name": "Fly agaric" }),
        json!({ "id": 2, "canonical_name": "Boletus edulis", "common_name": "Porcini" }),
    ]
}

#[tokio::test]
async fn primary_data_short_circuits_fallback() {
    let h = harness(
        vec![
            mindex_record(1, 1, 47.61, -122.33, "2026-08-01T10:00:00Z"),
            mindex_record(2, 2, 48.10, -121.90, "2026-08-02T09:00:00Z"),
        ],
        taxa_catalog(),
        vec![inat_record(9, "Amanita muscaria", 45.0, -120.0, "2026-08-03T12:00:00Z")],
        vec![],
    );

    let response = h.aggregator.aggregate(&AggregateParams::default()).await;

    assert_eq!(response.meta.data_source, "mindex");
    assert_eq!(response.meta.sources.mindex, 2);
    assert_eq!(response.meta.sources.inaturalist, 0);
    assert!(!response.meta.cached);
    assert_eq!(h.inat.fetches.load(Ordering::SeqCst), 0);
    assert_eq!(h.gbif.fetches.load(Ordering::SeqCst), 0);

    // Taxon ids were resolved against the catalog.
    let amanita = response
        .observations
        .iter()
        .find(|o| o.id == "mindex-1")
        .expect("record present");
    assert_eq!(amanita.scientific_name, "Amanita muscaria");
    assert_eq!(amanita.common_name.as_deref(), Some("Fly agaric"));
}

#[tokio::test]
async fn empty_primary_triggers_external_fallback() {
    let h = harness(
        vec![],
        vec![],
        vec![inat_record(9, "Amanita muscaria", 45.0, -120.0, "2026-08-03T12:00:00Z")],
        vec![gbif_record(77, "Boletus edulis", 59.33, 18.07, "2026-08-02T08:00:00Z")],
    );

    let response = h.aggregator.aggregate(&AggregateParams::default()).await;

    assert_eq!(response.meta.data_source, "external_fallback");
    assert_eq!(response.meta.sources.mindex, 0);
    assert_eq!(response.meta.sources.inaturalist, 1);
    assert_eq!(response.meta.sources.gbif, 1);
    assert_eq!(h.primary.observation_fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn output_is_sorted_newest_first_and_limited() {
    let h = harness(
        vec![
            mindex_record(1, 1, 47.0, -122.0, "2026-08-01T10:00:00Z"),
            mindex_record(2, 1, 48.0, -121.0, "2026-08-03T10:00:00Z"),
            mindex_record(3, 2, 49.0, -120.0, "2026-08-02T10:00:00Z"),
        ],
        taxa_catalog(),
        vec![],
        vec![],
    );

    let response = h
        .aggregator
        .aggregate(&AggregateParams {
            limit: Some(2),
            ..Default::default()
        })
        .await;

    assert_eq!(response.meta.total, 2);
    let ids: Vec<&str> = response.observations.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec!["mindex-2", "mindex-3"]);
    assert!(response
        .observations
        .windows(2)
        .all(|pair| pair[0].timestamp >= pair[1].timestamp));
}

#[tokio::test]
async fn repeat_requests_within_ttl_hit_the_cache() {
    let h = harness(
        vec![mindex_record(1, 1, 47.0, -122.0, "2026-08-01T10:00:00Z")],
        taxa_catalog(),
        vec![],
        vec![],
    );

    let first = h.aggregator.aggregate(&AggregateParams::default()).await;
    assert!(!first.meta.cached);

    h.clock.advance(Duration::from_secs(299));
    let second = h.aggregator.aggregate(&AggregateParams::default()).await;
    assert!(second.meta.cached);
    assert_eq!(second.meta.cache_age, Some(299));
    assert_eq!(second.meta.total, first.meta.total);
    assert_eq!(h.primary.observation_fetches.load(Ordering::SeqCst), 1);

    h.clock.advance(Duration::from_secs(2));
    let third = h.aggregator.aggregate(&AggregateParams::default()).await;
    assert!(!third.meta.cached);
    assert_eq!(h.primary.observation_fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn nocache_bypasses_the_read_but_still_writes() {
    let h = harness(
        vec![mindex_record(1, 1, 47.0, -122.0, "2026-08-01T10:00:00Z")],
        taxa_catalog(),
        vec![],
        vec![],
    );

    h.aggregator.aggregate(&AggregateParams::default()).await;

    let bypassed = h
        .aggregator
        .aggregate(&AggregateParams {
            nocache: true,
            ..Default::default()
        })
        .await;
    assert!(!bypassed.meta.cached);
    assert_eq!(h.primary.observation_fetches.load(Ordering::SeqCst), 2);

    // The bypassing run refreshed the slot for everyone else.
    let after = h.aggregator.aggregate(&AggregateParams::default()).await;
    assert!(after.meta.cached);
    assert_eq!(h.primary.observation_fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn bounds_and_limit_are_reapplied_on_cache_hits() {
    let h = harness(
        vec![
            mindex_record(1, 1, 45.0, -120.0, "2026-08-01T10:00:00Z"),
            mindex_record(2, 2, 10.0, 30.0, "2026-08-02T10:00:00Z"),
        ],
        taxa_catalog(),
        vec![],
        vec![],
    );

    let warm = h.aggregator.aggregate(&AggregateParams::default()).await;
    assert_eq!(warm.meta.total, 2);

    let boxed = h
        .aggregator
        .aggregate(&AggregateParams {
            bounds: Some(Bounds {
                north: 50.0,
                south: 40.0,
                east: -110.0,
                west: -125.0,
            }),
            ..Default::default()
        })
        .await;

    assert!(boxed.meta.cached);
    assert_eq!(boxed.meta.total, 1);
    assert_eq!(boxed.observations[0].id, "mindex-1");
    assert_eq!(boxed.meta.sources.mindex, 1);
}

#[tokio::test]
async fn forced_fallback_skips_primary_and_cache() {
    let h = harness(
        vec![mindex_record(1, 1, 47.0, -122.0, "2026-08-01T10:00:00Z")],
        taxa_catalog(),
        vec![inat_record(9, "Amanita muscaria", 45.0, -120.0, "2026-08-03T12:00:00Z")],
        vec![],
    );

    h.aggregator.aggregate(&AggregateParams::default()).await;
    let primary_fetches = h.primary.observation_fetches.load(Ordering::SeqCst);

    let forced = h
        .aggregator
        .aggregate(&AggregateParams {
            fallback: true,
            ..Default::default()
        })
        .await;

    assert!(!forced.meta.cached);
    assert_eq!(forced.meta.data_source, "external_fallback");
    assert_eq!(forced.meta.sources.inaturalist, 1);
    assert_eq!(h.primary.observation_fetches.load(Ordering::SeqCst), primary_fetches);
}

#[tokio::test]
async fn source_filter_restricts_providers() {
    let h = harness(
        vec![mindex_record(1, 1, 47.0, -122.0, "2026-08-01T10:00:00Z")],
        taxa_catalog(),
        vec![inat_record(9, "Amanita muscaria", 45.0, -120.0, "2026-08-03T12:00:00Z")],
        vec![gbif_record(77, "Boletus edulis", 59.33, 18.07, "2026-08-02T08:00:00Z")],
    );

    let response = h
        .aggregator
        .aggregate(&AggregateParams {
            source: SourceFilter::Gbif,
            ..Default::default()
        })
        .await;

    assert_eq!(response.meta.data_source, "external_fallback");
    assert_eq!(response.meta.sources.gbif, 1);
    assert_eq!(response.meta.sources.inaturalist, 0);
    assert_eq!(h.inat.fetches.load(Ordering::SeqCst), 0);
    assert_eq!(h.primary.observation_fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn coordinateless_primary_rows_are_queued_for_geocoding() {
    let h = harness(
        vec![
            mindex_record(1, 1, 47.0, -122.0, "2026-08-01T10:00:00Z"),
            json!({ "id": 2, "taxon_id": 2, "observed_at": "2026-08-02T10:00:00Z" }),
        ],
        taxa_catalog(),
        vec![],
        vec![],
    );

    let response = h.aggregator.aggregate(&AggregateParams::default()).await;

    assert_eq!(response.meta.total, 1);
    assert_eq!(response.meta.pending_geocode, Some(1));

    tokio::time::timeout(Duration::from_secs(1), h.geocode.notify.notified())
        .await
        .expect("geocode notification should fire");
    assert_eq!(*h.geocode.queued.lock().await, vec!["2".to_string()]);
}

#[tokio::test]
async fn cross_provider_duplicates_collapse_first_seen_wins() {
    let h = harness(
        vec![],
        vec![],
        vec![inat_record(9, "Amanita muscaria", 47.12341, -122.45322, "2026-08-03T12:00:00Z")],
        vec![gbif_record(77, "Amanita muscaria", 47.12349, -122.45318, "2026-08-03T13:00:00Z")],
    );

    let response = h.aggregator.aggregate(&AggregateParams::default()).await;

    assert_eq!(response.meta.total, 1);
    assert_eq!(response.observations[0].source, Source::INaturalist);
}
