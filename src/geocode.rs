//! Best-effort notifier for the geocoding queue.
//!
//! Primary-index records that arrive without coordinates cannot be shown on
//! the map; their ids are handed to the geocoding service to be resolved
//! asynchronously. The notification is spawned off the request task and its
//! failures are logged on their own channel, never joined into the response.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::sources::GeocodeSink;

#[derive(Serialize)]
struct QueuePayload {
    observation_ids: Vec<String>,
}

pub struct GeocodeQueue {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl GeocodeQueue {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            url: config.geocode_url.clone(),
            timeout: Duration::from_secs(config.geocode_timeout_secs),
        }
    }
}

#[async_trait]
impl GeocodeSink for GeocodeQueue {
    async fn queue(&self, record_ids: Vec<String>) -> Result<(), AppError> {
        let count = record_ids.len();
        let response = self
            .http
            .post(&self.url)
            .json(&QueuePayload {
                observation_ids: record_ids,
            })
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamStatus(response.status().as_u16()));
        }

        debug!(count, "queued records for geocoding");
        Ok(())
    }
}

/// Fires the notification without awaiting it from the request path.
pub fn notify_detached(sink: Arc<dyn GeocodeSink>, record_ids: Vec<String>) {
    if record_ids.is_empty() {
        return;
    }
    tokio::spawn(async move {
        if let Err(err) = sink.queue(record_ids).await {
            warn!(error = %err, "geocode queue notification failed");
        }
    });
}
