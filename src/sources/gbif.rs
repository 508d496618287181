//! GBIF occurrence search client, scoped to the kingdom Fungi.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::config::Config;
use crate::error::AppError;
use crate::models::{Bounds, Source};
use crate::sources::{FallbackSource, HOTSPOT_REGIONS};

/// GBIF backbone key for the kingdom Fungi.
const FUNGI_KINGDOM_KEY: u32 = 5;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Value>,
}

pub struct GbifClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    region_cap: usize,
}

impl GbifClient {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            base_url: config.gbif_url.clone(),
            timeout: Duration::from_secs(config.provider_timeout_secs),
            region_cap: config.region_record_cap,
        }
    }

    async fn fetch_box(&self, bounds: &Bounds, cap: usize) -> Result<Vec<Value>, AppError> {
        let response = self
            .http
            .get(format!("{}/occurrence/search", self.base_url))
            .query(&[
                ("kingdomKey", FUNGI_KINGDOM_KEY.to_string()),
                ("limit", cap.to_string()),
                ("decimalLatitude", format!("{},{}", bounds.south, bounds.north)),
                ("decimalLongitude", format!("{},{}", bounds.west, bounds.east)),
                ("hasCoordinate", "true".to_string()),
            ])
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamStatus(response.status().as_u16()));
        }

        Ok(response.json::<SearchResponse>().await?.results)
    }
}

#[async_trait]
impl FallbackSource for GbifClient {
    fn source(&self) -> Source {
        Source::Gbif
    }

    async fn fetch(&self, budget: usize, bounds: Option<&Bounds>) -> Vec<Value> {
        if let Some(bounds) = bounds {
            return match self.fetch_box(bounds, budget.min(self.region_cap)).await {
                Ok(results) => results,
                Err(err) => {
                    warn!(error = %err, "gbif bbox fetch failed");
                    Vec::new()
                }
            };
        }

        let requests = HOTSPOT_REGIONS
            .iter()
            .map(|region| self.fetch_box(&region.bounds, self.region_cap));
        let outcomes = join_all(requests).await;

        let mut accumulated = Vec::new();
        for (region, outcome) in HOTSPOT_REGIONS.iter().zip(outcomes) {
            match outcome {
                Ok(results) => accumulated.extend(results),
                Err(err) => {
                    warn!(region = region.name, error = %err, "gbif region fetch failed");
                }
            }
        }
        accumulated.truncate(budget);
        accumulated
    }
}
