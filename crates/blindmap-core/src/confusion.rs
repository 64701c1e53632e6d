//! The confusability ranker: distractors for multiple-choice questions.
//!
//! Two places are "confused" when a user asked for one clicks the other.
//! Only free-recall answers count; picking the wrong entry from a short
//! list says little about which shapes users mix up.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, place::Place, store::QuizStore};

/// Direction in which candidates are sorted by their confusing factor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfusionOrder {
  /// Lowest confusing factor first. This is how the quiz has always
  /// generated distractors.
  #[default]
  LeastConfusingFirst,
  MostConfusingFirst,
}

/// A candidate distractor with the number of free-recall answers in which it
/// and the asked place were mistaken for each other, in either direction.
#[derive(Debug, Clone, Serialize)]
pub struct ConfusionCandidate {
  pub place:            Place,
  pub confusing_factor: u64,
}

/// Sort by confusing factor in `order`, break ties randomly and keep `n`.
pub fn rank_confusing<R>(
  candidates: Vec<ConfusionCandidate>,
  n: usize,
  order: ConfusionOrder,
  rng: &mut R,
) -> Vec<ConfusionCandidate>
where
  R: Rng + ?Sized,
{
  let mut keyed: Vec<(f64, ConfusionCandidate)> =
    candidates.into_iter().map(|c| (rng.random(), c)).collect();

  keyed.sort_by(|(ka, a), (kb, b)| {
    let by_factor = match order {
      ConfusionOrder::LeastConfusingFirst => a.confusing_factor.cmp(&b.confusing_factor),
      ConfusionOrder::MostConfusingFirst => b.confusing_factor.cmp(&a.confusing_factor),
    };
    by_factor.then(ka.total_cmp(kb))
  });

  keyed.into_iter().take(n).map(|(_, c)| c).collect()
}

/// Up to `n` places of the same kind as `place`, on `map_place`, ordered by
/// how often they were confused with `place`.
pub async fn confusing_places<S, R>(
  store: &S,
  place: &Place,
  map_place: &Place,
  n: usize,
  order: ConfusionOrder,
  rng: &mut R,
) -> Result<Vec<ConfusionCandidate>>
where
  S: QuizStore,
  R: Rng + Send,
{
  let candidates = store
    .confusion_candidates(place.place_id, map_place.place_id)
    .await
    .map_err(Error::store)?;

  Ok(rank_confusing(candidates, n, order, rng))
}
