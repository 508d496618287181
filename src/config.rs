use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

/// Runtime configuration, loaded once at startup.
///
/// The thresholds without documented upstream rationale (dedup grid
/// precision, batch size, the per-region record cap) are deliberately
/// configurable rather than hard-coded.
pub struct Config {
    pub port: u16,
    pub mindex_url: String,
    pub inat_url: String,
    pub gbif_url: String,
    pub geocode_url: String,
    pub mindex_batch_size: usize,
    pub mindex_page_timeout_secs: u64,
    pub provider_timeout_secs: u64,
    pub geocode_timeout_secs: u64,
    pub region_record_cap: usize,
    pub hard_result_ceiling: usize,
    pub response_cache_ttl_secs: u64,
    pub taxon_cache_ttl_secs: u64,
    pub dedup_grid_precision: u32,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("RUST_PORT", "4020"),
            mindex_url: try_load("MINDEX_URL", "http://mindex-api:8000"),
            inat_url: try_load("INAT_URL", "https://api.inaturalist.org/v1"),
            gbif_url: try_load("GBIF_URL", "https://api.gbif.org/v1"),
            geocode_url: try_load("GEOCODE_URL", "http://geocoding:8412/queue"),
            mindex_batch_size: try_load("MINDEX_BATCH_SIZE", "1000"),
            mindex_page_timeout_secs: try_load("MINDEX_PAGE_TIMEOUT_SECS", "10"),
            provider_timeout_secs: try_load("PROVIDER_TIMEOUT_SECS", "15"),
            geocode_timeout_secs: try_load("GEOCODE_TIMEOUT_SECS", "2"),
            region_record_cap: try_load("REGION_RECORD_CAP", "200"),
            hard_result_ceiling: try_load("HARD_RESULT_CEILING", "5000"),
            response_cache_ttl_secs: try_load("RESPONSE_CACHE_TTL_SECS", "300"),
            taxon_cache_ttl_secs: try_load("TAXON_CACHE_TTL_SECS", "1800"),
            dedup_grid_precision: try_load("DEDUP_GRID_PRECISION", "3"),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}
