use std::sync::Arc;
use std::time::Duration;

use crate::aggregate::Aggregator;
use crate::cache::{Clock, ResponseCache, SystemClock};
use crate::config::Config;
use crate::geocode::GeocodeQueue;
use crate::sources::{
    gbif::GbifClient, inat::InatClient, mindex::MindexClient, FallbackSource, GeocodeSink,
    PrimarySource,
};
use crate::taxa::TaxonResolver;

pub struct AppState {
    pub config: Config,
    pub aggregator: Aggregator,
}

impl AppState {
    pub fn new() -> Arc<Self> {
        let config = Config::load();
        let http = reqwest::Client::new();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let primary: Arc<dyn PrimarySource> = Arc::new(MindexClient::new(http.clone(), &config));
        let fallbacks: Vec<Arc<dyn FallbackSource>> = vec![
            Arc::new(InatClient::new(http.clone(), &config)),
            Arc::new(GbifClient::new(http.clone(), &config)),
        ];
        let geocode: Arc<dyn GeocodeSink> = Arc::new(GeocodeQueue::new(http, &config));

        let resolver = Arc::new(TaxonResolver::new(
            primary.clone(),
            Duration::from_secs(config.taxon_cache_ttl_secs),
            config.mindex_batch_size,
            clock.clone(),
        ));
        let cache = Arc::new(ResponseCache::new(
            Duration::from_secs(config.response_cache_ttl_secs),
            clock,
        ));

        let aggregator = Aggregator::new(
            primary,
            fallbacks,
            geocode,
            resolver,
            cache,
            config.hard_result_ceiling,
            config.dedup_grid_precision,
        );

        Arc::new(Self { config, aggregator })
    }
}
