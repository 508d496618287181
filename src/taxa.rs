//! # Taxon Name Resolver
//!
//! Primary-index observation rows carry only a `taxon_id`; display names
//! live in the taxon catalog. The catalog is tens of thousands of rows, so
//! it is fetched wholesale, kept for a TTL, and rebuilt in full on the first
//! resolution after expiry. It is never updated incrementally.
//!
//! Rebuilds are single-flight: concurrent callers that find the table stale
//! queue behind one rebuild instead of each paginating the whole catalog.
//! A failed rebuild keeps the previous table (stale names beat no names)
//! and the next expiry check tries again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::cache::Clock;
use crate::error::AppError;
use crate::normalize::{id_string, str_field};
use crate::sources::PrimarySource;

/// Display names for one taxon id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonName {
    pub canonical_name: String,
    pub common_name: Option<String>,
}

struct Table {
    names: Arc<HashMap<String, TaxonName>>,
    built_at: Instant,
}

pub struct TaxonResolver {
    source: Arc<dyn PrimarySource>,
    ttl: Duration,
    page_size: usize,
    clock: Arc<dyn Clock>,
    table: RwLock<Option<Table>>,
    rebuild: Mutex<()>,
}

impl TaxonResolver {
    pub fn new(
        source: Arc<dyn PrimarySource>,
        ttl: Duration,
        page_size: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            ttl,
            page_size,
            clock,
            table: RwLock::new(None),
            rebuild: Mutex::new(()),
        }
    }

    pub async fn resolve(&self, taxon_id: &str) -> Option<TaxonName> {
        self.table().await.and_then(|names| names.get(taxon_id).cloned())
    }

    /// Current table snapshot, rebuilding first if the TTL has lapsed.
    pub async fn table(&self) -> Option<Arc<HashMap<String, TaxonName>>> {
        if let Some(names) = self.fresh_snapshot().await {
            return Some(names);
        }

        let _guard = self.rebuild.lock().await;
        // Another caller may have rebuilt while we waited for the guard.
        if let Some(names) = self.fresh_snapshot().await {
            return Some(names);
        }

        match self.build_table().await {
            Ok(names) => {
                let names = Arc::new(names);
                *self.table.write().await = Some(Table {
                    names: names.clone(),
                    built_at: self.clock.now(),
                });
                Some(names)
            }
            Err(err) => {
                warn!(error = %err, "taxon catalog rebuild failed, keeping previous table");
                let table = self.table.read().await;
                table.as_ref().map(|t| t.names.clone())
            }
        }
    }

    async fn fresh_snapshot(&self) -> Option<Arc<HashMap<String, TaxonName>>> {
        let table = self.table.read().await;
        table
            .as_ref()
            .filter(|t| self.clock.now().duration_since(t.built_at) < self.ttl)
            .map(|t| t.names.clone())
    }

    async fn build_table(&self) -> Result<HashMap<String, TaxonName>, AppError> {
        let mut names = HashMap::new();
        let mut offset = 0usize;

        loop {
            let (rows, total) = self.source.fetch_taxa_page(self.page_size, offset).await?;
            let fetched = rows.len();

            for row in rows {
                let Some(id) = id_string(&row, "id") else { continue };
                let Some(canonical) =
                    str_field(&row, "canonical_name").or_else(|| str_field(&row, "scientific_name"))
                else {
                    continue;
                };
                names.insert(
                    id,
                    TaxonName {
                        canonical_name: canonical.to_string(),
                        common_name: str_field(&row, "common_name").map(str::to_string),
                    },
                );
            }

            offset += fetched;
            if fetched < self.page_size {
                break;
            }
            if total > 0 && offset >= total {
                break;
            }
        }

        info!(taxa = names.len(), "taxon catalog cache rebuilt");
        Ok(names)
    }
}
