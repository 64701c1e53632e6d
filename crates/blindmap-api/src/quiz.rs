//! Handlers for question selection and the answer/skill write paths.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/maps/:code/ask` | `?user=<uuid>&probability=<p>` required; optional `n` |
//! | `POST` | `/answers` | Body: [`NewAnswer`]; returns 201 + stored answer |
//! | `PUT`  | `/skills` | Body: [`SkillBody`]; written by the skill estimator |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use blindmap_core::{
  answer::NewAnswer,
  selection::{self, PlaceToAsk},
  store::QuizStore,
};
use chrono::Utc;
use rand::{SeedableRng, rngs::StdRng};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError, place_by_code};

// ─── Ask ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AskParams {
  pub user:        Uuid,
  /// Desired chance that the user answers correctly, strictly inside (0, 1).
  pub probability: f64,
  pub n:           Option<usize>,
}

/// `GET /maps/:code/ask?user=<uuid>&probability=<p>[&n=<count>]`
pub async fn ask<S: QuizStore>(
  State(state): State<AppState<S>>,
  Path(code): Path<String>,
  Query(params): Query<AskParams>,
) -> Result<Json<Vec<PlaceToAsk>>, ApiError> {
  let map = place_by_code(state.store.as_ref(), &code).await?;

  let mut rng = StdRng::from_os_rng();
  let places = selection::places_to_ask(
    state.store.as_ref(),
    params.user,
    &map,
    params.probability,
    params.n.unwrap_or(state.config.default_pool_size),
    Utc::now(),
    &mut rng,
  )
  .await?;
  Ok(Json(places))
}

// ─── Answers ──────────────────────────────────────────────────────────────────

/// `POST /answers`
pub async fn record_answer<S: QuizStore>(
  State(state): State<AppState<S>>,
  Json(body): Json<NewAnswer>,
) -> Result<impl IntoResponse, ApiError> {
  let answer = state
    .store
    .record_answer(body)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(answer)))
}

// ─── Skills ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SkillBody {
  pub user_id:  Uuid,
  pub place_id: Uuid,
  pub value:    f64,
}

/// `PUT /skills`
pub async fn set_skill<S: QuizStore>(
  State(state): State<AppState<S>>,
  Json(body): Json<SkillBody>,
) -> Result<StatusCode, ApiError> {
  if !body.value.is_finite() {
    return Err(ApiError::BadRequest(format!("skill must be finite, got {}", body.value)));
  }
  state
    .store
    .set_local_skill(body.user_id, body.place_id, body.value)
    .await
    .map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}
