use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use tracing::warn;

use crate::aggregate::{AggregateParams, SourceFilter};
use crate::error::AppError;
use crate::models::{Bounds, ObservationsResponse};
use crate::state::AppState;

/// Raw query string parameters. Parsed by hand so a bad value names the
/// offending parameter instead of a generic extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct ObservationsQuery {
    limit: Option<String>,
    source: Option<String>,
    fallback: Option<String>,
    nocache: Option<String>,
    north: Option<String>,
    south: Option<String>,
    east: Option<String>,
    west: Option<String>,
}

impl ObservationsQuery {
    pub fn into_params(self) -> Result<AggregateParams, AppError> {
        if let Some(source) = self.source.as_deref() {
            if !matches!(source, "mindex" | "inat" | "gbif" | "all") {
                warn!(source, "unknown source filter, defaulting to all");
            }
        }

        // The box only activates when all four edges arrive together.
        let bounds = match (
            parse_opt::<f64>("north", self.north)?,
            parse_opt::<f64>("south", self.south)?,
            parse_opt::<f64>("east", self.east)?,
            parse_opt::<f64>("west", self.west)?,
        ) {
            (Some(north), Some(south), Some(east), Some(west)) => Some(Bounds {
                north,
                south,
                east,
                west,
            }),
            _ => None,
        };

        Ok(AggregateParams {
            limit: parse_opt::<usize>("limit", self.limit)?,
            source: SourceFilter::parse(self.source.as_deref()),
            fallback: flag(self.fallback),
            nocache: flag(self.nocache),
            bounds,
        })
    }
}

fn parse_opt<T: FromStr>(
    field: &'static str,
    value: Option<String>,
) -> Result<Option<T>, AppError> {
    value
        .map(|raw| raw.parse().map_err(|_| AppError::MalformedQuery(field)))
        .transpose()
}

fn flag(value: Option<String>) -> bool {
    matches!(value.as_deref(), Some("true") | Some("1"))
}

pub async fn observations_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ObservationsQuery>,
) -> Result<Json<ObservationsResponse>, AppError> {
    let params = query.into_params()?;
    Ok(Json(state.aggregator.aggregate(&params).await))
}

pub async fn health_handler() -> &'static str {
    "ok"
}
