//! Handlers for A/B experiment endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/experiments` | Body: [`NewGroup`]; 400 on bad probabilities or defaults |
//! | `GET`  | `/experiments/:name` | Group with its values |
//! | `PUT`  | `/experiments/:name/active` | Body: `{"active":false}` |
//! | `GET`  | `/experiments/:name/stats` | Users and answers per value |
//! | `GET`  | `/users/:id/experiments` | Cached per `x-session-id` header |
//! | `GET`  | `/users/:id/experiments/membership` | `?candidates=a,b&default=c&reason=r` |

use std::collections::BTreeMap;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
};
use blindmap_core::{
  Error as CoreError,
  assignment::{self, AssignmentCache},
  environment::ExperimentEnvironment,
  experiment::{ExperimentGroup, Group, NewGroup, Value},
  store::QuizStore,
};
use chrono::Utc;
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, SESSION_HEADER, error::ApiError};

// ─── Groups ───────────────────────────────────────────────────────────────────

/// `POST /experiments`
pub async fn create<S: QuizStore>(
  State(state): State<AppState<S>>,
  Json(body): Json<NewGroup>,
) -> Result<impl IntoResponse, ApiError> {
  let group = assignment::init_group(state.store.as_ref(), body).await?;
  Ok((StatusCode::CREATED, Json(group)))
}

/// `GET /experiments/:name`
pub async fn get_one<S: QuizStore>(
  State(state): State<AppState<S>>,
  Path(name): Path<String>,
) -> Result<Json<ExperimentGroup>, ApiError> {
  let group = state
    .store
    .get_group(&name)
    .await
    .map_err(ApiError::store)?
    .ok_or(CoreError::GroupNotFound(name))?;
  Ok(Json(group))
}

#[derive(Debug, Deserialize)]
pub struct ActiveBody {
  pub active: bool,
}

/// `PUT /experiments/:name/active`
pub async fn set_active<S: QuizStore>(
  State(state): State<AppState<S>>,
  Path(name): Path<String>,
  Json(body): Json<ActiveBody>,
) -> Result<Json<Group>, ApiError> {
  let group = state
    .store
    .set_group_active(&name, body.active)
    .await
    .map_err(ApiError::store)?
    .ok_or(CoreError::GroupNotFound(name))?;
  Ok(Json(group))
}

// ─── Statistics ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ValueStats {
  /// Assigned users per value.
  pub users:   BTreeMap<String, u64>,
  /// Answers given by the users assigned to each value.
  pub answers: BTreeMap<String, u64>,
}

/// `GET /experiments/:name/stats`
pub async fn stats<S: QuizStore>(
  State(state): State<AppState<S>>,
  Path(name): Path<String>,
) -> Result<Json<ValueStats>, ApiError> {
  if state
    .store
    .get_group(&name)
    .await
    .map_err(ApiError::store)?
    .is_none()
  {
    return Err(CoreError::GroupNotFound(name).into());
  }

  let users = state.store.users_per_value(&name).await.map_err(ApiError::store)?;
  let answers = state.store.answers_per_value(&name).await.map_err(ApiError::store)?;
  Ok(Json(ValueStats { users, answers }))
}

// ─── Assignments ──────────────────────────────────────────────────────────────

/// The caller's assignment set, reusing the cache stored under the session
/// header when there is one. Without a session header the set is computed
/// but not cached.
///
/// The session map is only written when the set was recomputed, and expired
/// entries are dropped on each write.
async fn session_cache<S: QuizStore>(
  state: &AppState<S>,
  user_id: Uuid,
  headers: &HeaderMap,
) -> Result<AssignmentCache, ApiError> {
  let session = headers
    .get(SESSION_HEADER)
    .and_then(|v| v.to_str().ok())
    .map(str::to_owned);

  let cached = match &session {
    Some(id) => state.sessions.lock().await.get(id).cloned(),
    None => None,
  };
  let cached_at = cached.as_ref().map(|c| c.computed_at);

  let now = Utc::now();
  let policy = state.config.cache_policy();
  let mut rng = StdRng::from_os_rng();
  let cache =
    assignment::init_cache(state.store.as_ref(), user_id, cached, now, policy, &mut rng).await?;

  if let Some(id) = session
    && cached_at != Some(cache.computed_at)
  {
    let mut sessions = state.sessions.lock().await;
    sessions.retain(|_, c| now - c.computed_at <= policy.ttl);
    sessions.insert(id, cache.clone());
  }
  Ok(cache)
}

/// `GET /users/:id/experiments`
pub async fn user_values<S: QuizStore>(
  State(state): State<AppState<S>>,
  Path(user_id): Path<Uuid>,
  headers: HeaderMap,
) -> Result<Json<AssignmentCache>, ApiError> {
  let cache = session_cache(&state, user_id, &headers).await?;
  Ok(Json(cache))
}

#[derive(Debug, Deserialize)]
pub struct MembershipParams {
  /// Comma-separated experiment values, in order of preference.
  pub candidates: String,
  pub default:    String,
  /// Name of the decision being made.
  pub reason:     String,
}

#[derive(Debug, Serialize)]
pub struct Membership {
  pub value:     String,
  /// Values that decided `reason` for this user.
  pub affecting: Vec<Value>,
}

/// `GET /users/:id/experiments/membership?candidates=a,b&default=c&reason=r`
pub async fn membership<S: QuizStore>(
  State(state): State<AppState<S>>,
  Path(user_id): Path<Uuid>,
  Query(params): Query<MembershipParams>,
  headers: HeaderMap,
) -> Result<Json<Membership>, ApiError> {
  let cache = session_cache(&state, user_id, &headers).await?;

  let candidates: Vec<&str> = params
    .candidates
    .split(',')
    .map(str::trim)
    .filter(|c| !c.is_empty())
    .collect();

  let mut env = ExperimentEnvironment::new(&cache);
  let value = env
    .membership(&candidates, &params.default, &params.reason)
    .to_owned();
  let affecting = env
    .affecting_values(&params.reason)
    .iter()
    .map(|v| (*v).clone())
    .collect();

  Ok(Json(Membership { value, affecting }))
}
