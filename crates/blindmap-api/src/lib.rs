//! JSON REST API for blindmap.
//!
//! Exposes an axum [`Router`] backed by any [`blindmap_core::store::QuizStore`].
//! Auth, TLS, and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", blindmap_api::api_router(AppState::new(store, quiz_config)))
//! ```

pub mod error;
pub mod experiments;
pub mod places;
pub mod quiz;

use std::{collections::HashMap, sync::Arc};

use axum::{
  Router,
  routing::{get, post, put},
};
use blindmap_core::{
  assignment::{AssignmentCache, CachePolicy, DEFAULT_CACHE_TTL_MINUTES},
  confusion::ConfusionOrder,
  place::Place,
  store::QuizStore,
};
use chrono::TimeDelta;
use serde::Deserialize;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Header carrying the caller's session id; assignment caches are keyed by it.
pub const SESSION_HEADER: &str = "x-session-id";

// ─── Configuration ────────────────────────────────────────────────────────────

/// Quiz behaviour knobs, deserialised from the `[quiz]` table of the server
/// configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct QuizConfig {
  /// Recompute experiment assignments on every request.
  #[serde(default)]
  pub debug:             bool,
  #[serde(default)]
  pub confusion_order:   ConfusionOrder,
  /// Number of places returned by the selector when the request names none.
  #[serde(default = "default_pool_size")]
  pub default_pool_size: usize,
  #[serde(default = "default_cache_ttl")]
  pub cache_ttl_minutes: i64,
}

fn default_pool_size() -> usize { 10 }

fn default_cache_ttl() -> i64 { DEFAULT_CACHE_TTL_MINUTES }

impl Default for QuizConfig {
  fn default() -> Self {
    Self {
      debug:             false,
      confusion_order:   ConfusionOrder::default(),
      default_pool_size: default_pool_size(),
      cache_ttl_minutes: default_cache_ttl(),
    }
  }
}

impl QuizConfig {
  /// `cache_ttl_minutes` as a duration, or `None` when it is negative or
  /// too large to represent.
  pub fn cache_ttl(&self) -> Option<TimeDelta> {
    TimeDelta::try_minutes(self.cache_ttl_minutes).filter(|ttl| *ttl >= TimeDelta::zero())
  }

  /// Falls back to the default TTL when `cache_ttl_minutes` is out of range.
  pub fn cache_policy(&self) -> CachePolicy {
    CachePolicy {
      debug: self.debug,
      ttl:   self.cache_ttl().unwrap_or(CachePolicy::default().ttl),
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S: QuizStore> {
  pub store:    Arc<S>,
  pub config:   Arc<QuizConfig>,
  /// Assignment caches by session id.
  pub sessions: Arc<Mutex<HashMap<String, AssignmentCache>>>,
}

impl<S: QuizStore> AppState<S> {
  pub fn new(store: S, config: QuizConfig) -> Self {
    Self {
      store:    Arc::new(store),
      config:   Arc::new(config),
      sessions: Arc::default(),
    }
  }
}

impl<S: QuizStore> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      config:   Arc::clone(&self.config),
      sessions: Arc::clone(&self.sessions),
    }
  }
}

/// Resolve a place code or answer 404.
pub(crate) async fn place_by_code<S: QuizStore>(store: &S, code: &str) -> Result<Place, ApiError> {
  store
    .get_place_by_code(code)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::from(blindmap_core::Error::PlaceNotFound(code.to_owned())))
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: QuizStore + 'static,
{
  Router::new()
    // Places
    .route("/places", get(places::list::<S>))
    .route("/places/states-with-map", get(places::states_with_map::<S>))
    .route("/places/{code}/bordering", get(places::bordering::<S>))
    .route("/places/{code}/confusing", get(places::confusing::<S>))
    // Quiz
    .route("/maps/{code}/ask", get(quiz::ask::<S>))
    .route("/answers", post(quiz::record_answer::<S>))
    .route("/skills", put(quiz::set_skill::<S>))
    // Experiments
    .route("/experiments", post(experiments::create::<S>))
    .route("/experiments/{name}", get(experiments::get_one::<S>))
    .route("/experiments/{name}/active", put(experiments::set_active::<S>))
    .route("/experiments/{name}/stats", get(experiments::stats::<S>))
    .route("/users/{id}/experiments", get(experiments::user_values::<S>))
    .route("/users/{id}/experiments/membership", get(experiments::membership::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
mod tests;
