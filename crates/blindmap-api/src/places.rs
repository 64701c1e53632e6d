//! Handlers for `/places` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/places` | Optional `?kind=state\|city\|world\|continent\|river\|lake` |
//! | `GET`  | `/places/states-with-map` | States that have their own map |
//! | `GET`  | `/places/:code/bordering` | Empty list for places without a border |
//! | `GET`  | `/places/:code/confusing` | `?map=<code>` required; optional `n` |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use blindmap_core::{
  confusion::{self, ConfusionCandidate},
  place::{Place, PlaceKind},
  store::QuizStore,
};
use rand::{SeedableRng, rngs::StdRng};
use serde::Deserialize;

use crate::{AppState, error::ApiError, place_by_code};

/// Distractors returned when the request does not say how many.
const DEFAULT_DISTRACTORS: usize = 5;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub kind: Option<PlaceKind>,
}

/// `GET /places[?kind=<kind>]`
pub async fn list<S: QuizStore>(
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Place>>, ApiError> {
  let places = state
    .store
    .list_places(params.kind)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(places))
}

/// `GET /places/states-with-map`
pub async fn states_with_map<S: QuizStore>(
  State(state): State<AppState<S>>,
) -> Result<Json<Vec<Place>>, ApiError> {
  let places = state.store.states_with_map().await.map_err(ApiError::store)?;
  Ok(Json(places))
}

// ─── Neighbours ───────────────────────────────────────────────────────────────

/// `GET /places/:code/bordering`
pub async fn bordering<S: QuizStore>(
  State(state): State<AppState<S>>,
  Path(code): Path<String>,
) -> Result<Json<Vec<Place>>, ApiError> {
  let place = place_by_code(state.store.as_ref(), &code).await?;
  let places = state
    .store
    .bordering_places(place.place_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(places))
}

#[derive(Debug, Deserialize)]
pub struct ConfusingParams {
  /// Code of the map the question is drawn on.
  pub map: String,
  pub n:   Option<usize>,
}

/// `GET /places/:code/confusing?map=<code>[&n=<count>]`
pub async fn confusing<S: QuizStore>(
  State(state): State<AppState<S>>,
  Path(code): Path<String>,
  Query(params): Query<ConfusingParams>,
) -> Result<Json<Vec<ConfusionCandidate>>, ApiError> {
  let place = place_by_code(state.store.as_ref(), &code).await?;
  let map = place_by_code(state.store.as_ref(), &params.map).await?;

  let mut rng = StdRng::from_os_rng();
  let picked = confusion::confusing_places(
    state.store.as_ref(),
    &place,
    &map,
    params.n.unwrap_or(DEFAULT_DISTRACTORS),
    state.config.confusion_order,
    &mut rng,
  )
  .await?;
  Ok(Json(picked))
}
