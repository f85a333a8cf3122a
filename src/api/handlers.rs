//! API Handlers
//!
//! HTTP request handlers for each cache service endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;

use crate::cache::{CacheOptions, RefreshAheadCache};
use crate::error::{CacheError, Result};
use crate::models::{
    validate_key, DeleteResponse, GetResponse, HealthResponse, SetRequest, SetResponse,
    StatsResponse,
};
use crate::source::SourceAccessor;
use crate::store::KeyedStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Refresh-ahead cache over JSON values
    pub cache: RefreshAheadCache<Value>,
}

impl AppState {
    pub fn new(cache: RefreshAheadCache<Value>) -> Self {
        Self { cache }
    }

    /// Builds the cache from its collaborators and configuration.
    pub fn from_parts(
        name: &str,
        store: Arc<dyn KeyedStore>,
        source: Arc<dyn SourceAccessor<Value>>,
        options: CacheOptions,
    ) -> Result<Self> {
        Ok(Self::new(RefreshAheadCache::new(name, store, source, options)?))
    }
}

fn check_key(key: &str) -> Result<()> {
    match validate_key(key) {
        Some(error_msg) => Err(CacheError::InvalidRequest(error_msg)),
        None => Ok(()),
    }
}

/// Handler for PUT /set
///
/// Writes the value through to the source and the cache.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    state.cache.set(&req.value, &[req.key.as_str()]).await?;

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /get/:key
///
/// Reads through the cache. A key the source does not have answers
/// `found: false` rather than an error.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    check_key(&key)?;
    let value = state.cache.get(&[key.as_str()]).await?;

    Ok(Json(GetResponse::new(key, value)))
}

/// Handler for DELETE /del/:key
///
/// Deletes from the source and leaves a tombstone in the cache.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    check_key(&key)?;
    state.cache.delete(&[key.as_str()]).await?;

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::new(
        state.cache.stats(),
        state.cache.pending_refreshes(),
    ))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
