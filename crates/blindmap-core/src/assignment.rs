//! Loading a user's experiment values, and the cached result.
//!
//! Per (user, group) the state is one of: not yet assigned, assigned a
//! stored value, or handed the group's default without storing it (the
//! group is inactive, or the user is outside its answer-count window).

use std::collections::HashSet;

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
  Error, Result,
  experiment::{ExperimentGroup, NewGroup, Value},
  store::QuizStore,
};

/// How long a cached assignment set is trusted.
pub const DEFAULT_CACHE_TTL_MINUTES: i64 = 15;

// ─── Resolution ──────────────────────────────────────────────────────────────

/// Outcome of assigning the groups a user had no value for.
#[derive(Debug, Default)]
pub struct Resolution {
  /// Sampled values that must be persisted.
  pub assigned:  Vec<Value>,
  /// Defaults for groups the user is not yet eligible for; not persisted.
  pub fallbacks: Vec<Value>,
}

/// Sample a value for every open group the user is eligible for and fall
/// back to the default everywhere else.
pub fn resolve_open_groups<R>(
  open: &[ExperimentGroup],
  answer_count: u64,
  rng: &mut R,
) -> Result<Resolution>
where
  R: Rng + ?Sized,
{
  let mut resolution = Resolution::default();

  for experiment in open {
    if experiment.group.accepts(answer_count) {
      resolution.assigned.push(experiment.sample(rng)?.clone());
    } else {
      let default = experiment.default_value().ok_or(Error::NoDefaultValue)?;
      resolution.fallbacks.push(default.clone());
    }
  }

  Ok(resolution)
}

/// Stored values first, then fallbacks, then the inactive-group overlay;
/// a value already present is not repeated.
pub fn merge_values(stored: Vec<Value>, fallbacks: Vec<Value>, overlay: Vec<Value>) -> Vec<Value> {
  let mut seen = HashSet::new();
  stored
    .into_iter()
    .chain(fallbacks)
    .chain(overlay)
    .filter(|v| seen.insert(v.value.clone()))
    .collect()
}

// ─── Operations ──────────────────────────────────────────────────────────────

/// Validate and create an experiment group.
pub async fn init_group<S>(store: &S, input: NewGroup) -> Result<ExperimentGroup>
where
  S: QuizStore,
{
  input.validate()?;
  store.create_group(input).await.map_err(Into::into)
}

/// Every value that applies to the user: stored assignments (assigning any
/// active group the user is eligible for on the way), defaults for groups
/// the user is not eligible for yet, and defaults of inactive groups.
pub async fn load_user_values<S, R>(store: &S, user_id: Uuid, rng: &mut R) -> Result<Vec<Value>>
where
  S: QuizStore,
  R: Rng + Send,
{
  let overlay = store.inactive_defaults().await.map_err(Error::store)?;
  let open = store
    .unassigned_active_groups(user_id)
    .await
    .map_err(Error::store)?;

  let resolution = if open.is_empty() {
    Resolution::default()
  } else {
    let answer_count = store.count_answers(user_id).await.map_err(Error::store)?;
    resolve_open_groups(&open, answer_count, rng)?
  };

  if !resolution.assigned.is_empty() {
    info!(
      %user_id,
      values = ?resolution.assigned.iter().map(|v| v.value.as_str()).collect::<Vec<_>>(),
      "assigning experiment values"
    );
    store
      .assign_values(user_id, resolution.assigned)
      .await
      .map_err(Error::store)?;
  }

  let stored = store.user_values(user_id).await.map_err(Error::store)?;
  Ok(merge_values(stored, resolution.fallbacks, overlay))
}

// ─── Cache ───────────────────────────────────────────────────────────────────

/// A computed assignment set, owned by the caller (typically kept per
/// session) and handed back on the next request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentCache {
  pub user_id:     Uuid,
  pub computed_at: DateTime<Utc>,
  pub values:      Vec<Value>,
}

impl AssignmentCache {
  /// Belongs to `user_id` and is no older than `ttl` at `now`.
  pub fn is_fresh_for(&self, user_id: Uuid, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
    self.user_id == user_id && now - self.computed_at <= ttl
  }
}

/// When a cached assignment set may be reused.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
  /// Never reuse a cache; always recompute.
  pub debug: bool,
  pub ttl:   TimeDelta,
}

impl Default for CachePolicy {
  fn default() -> Self {
    Self { debug: false, ttl: TimeDelta::minutes(DEFAULT_CACHE_TTL_MINUTES) }
  }
}

/// Return `cached` if `policy` allows reusing it for `user_id`, otherwise
/// load the user's values afresh.
pub async fn init_cache<S, R>(
  store: &S,
  user_id: Uuid,
  cached: Option<AssignmentCache>,
  now: DateTime<Utc>,
  policy: CachePolicy,
  rng: &mut R,
) -> Result<AssignmentCache>
where
  S: QuizStore,
  R: Rng + Send,
{
  if !policy.debug
    && let Some(cache) = cached
    && cache.is_fresh_for(user_id, now, policy.ttl)
  {
    return Ok(cache);
  }

  let values = load_user_values(store, user_id, rng).await?;
  debug!(
    %user_id,
    values = ?values.iter().map(|v| v.value.as_str()).collect::<Vec<_>>(),
    "initialised experiment values"
  );

  Ok(AssignmentCache { user_id, computed_at: now, values })
}
