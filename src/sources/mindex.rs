//! Primary index (MINDEX) client.
//!
//! Both read endpoints share the same envelope:
//! `{ data: [...], pagination: { total } }` with `limit`/`offset` paging.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::sources::PrimarySource;

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    pagination: Pagination,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    #[serde(default)]
    total: usize,
}

pub struct MindexClient {
    http: reqwest::Client,
    base_url: String,
    batch_size: usize,
    page_timeout: Duration,
}

impl MindexClient {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            base_url: config.mindex_url.clone(),
            batch_size: config.mindex_batch_size,
            page_timeout: Duration::from_secs(config.mindex_page_timeout_secs),
        }
    }

    async fn fetch_page(&self, path: &str, limit: usize, offset: usize) -> Result<Page, AppError> {
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .query(&[("limit", limit), ("offset", offset)])
            .timeout(self.page_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamStatus(response.status().as_u16()));
        }

        Ok(response.json::<Page>().await?)
    }
}

#[async_trait]
impl PrimarySource for MindexClient {
    async fn fetch_observations(&self, cap: Option<usize>) -> Vec<Value> {
        paginate(
            |limit, offset| async move {
                let page = self.fetch_page("/observations", limit, offset).await?;
                debug!(offset, fetched = page.data.len(), "mindex observation page");
                Ok((page.data, page.pagination.total))
            },
            self.batch_size,
            cap,
        )
        .await
    }

    async fn fetch_taxa_page(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Value>, usize), AppError> {
        let page = self.fetch_page("/taxa", limit, offset).await?;
        Ok((page.data, page.pagination.total))
    }
}

/// Drives `limit`/`offset` pagination until the cap is reached, a short page
/// signals exhaustion, or the reported total is covered. A failed page ends
/// pagination keeping the partial accumulation; it is not retried.
pub(crate) async fn paginate<F, Fut>(
    mut fetch_page: F,
    batch_size: usize,
    cap: Option<usize>,
) -> Vec<Value>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = Result<(Vec<Value>, usize), AppError>>,
{
    let mut accumulated = Vec::new();
    let mut offset = 0usize;

    loop {
        let mut want = batch_size;
        if let Some(cap) = cap {
            if accumulated.len() >= cap {
                break;
            }
            want = want.min(cap - accumulated.len());
        }

        let (rows, total) = match fetch_page(want, offset).await {
            Ok(page) => page,
            Err(err) => {
                warn!(offset, error = %err, "page fetch failed, keeping partial results");
                break;
            }
        };

        let fetched = rows.len();
        accumulated.extend(rows);
        offset += fetched;

        if fetched < want {
            // Short page: upstream is exhausted.
            break;
        }
        if total > 0 && offset >= total {
            break;
        }
    }

    accumulated
}
