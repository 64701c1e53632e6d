//! The difficulty selector: which place to ask next.
//!
//! Candidates are the places on the current map for which the user has a
//! local skill. Each is scored by its [`deviation`] from the target skill;
//! places the user answered within the last minute are pushed behind every
//! other candidate so the same place is not asked twice in a row.

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use crate::{
  Error, Result,
  place::Place,
  skill::{TargetProbability, deviation, logistic},
  store::QuizStore,
};

/// How long after answering a place it stays deprioritised.
pub const RECENCY_WINDOW_SECS: i64 = 60;

/// One row from the skill store: a candidate place, the user's local skill
/// for it and when the user was last asked it.
#[derive(Debug, Clone)]
pub struct SkillCandidate {
  pub place:            Place,
  pub local_skill:      f64,
  pub last_answered_at: Option<DateTime<Utc>>,
}

impl SkillCandidate {
  /// Answered within the recency window before `now`.
  pub fn is_invalid(&self, now: DateTime<Utc>) -> bool {
    self
      .last_answered_at
      .is_some_and(|at| now - at <= TimeDelta::seconds(RECENCY_WINDOW_SECS))
  }
}

/// A selected place with the predicted probability that the user answers
/// it correctly.
#[derive(Debug, Clone, Serialize)]
pub struct PlaceToAsk {
  pub place:       Place,
  pub probability: f64,
}

struct Ranked {
  invalid:   bool,
  deviation: f64,
  tiebreak:  f64,
  candidate: SkillCandidate,
}

/// Order `candidates` by (invalidity, deviation, random) and keep the first
/// `pool_size`.
///
/// The random tie-break is drawn afresh on every call.
pub fn rank_candidates<R>(
  candidates: Vec<SkillCandidate>,
  target: TargetProbability,
  now: DateTime<Utc>,
  pool_size: usize,
  rng: &mut R,
) -> Vec<PlaceToAsk>
where
  R: Rng + ?Sized,
{
  let target_skill = target.skill();

  let mut ranked: Vec<Ranked> = candidates
    .into_iter()
    .filter_map(|candidate| {
      let deviation = deviation(candidate.local_skill, target_skill)?;
      Some(Ranked {
        invalid: candidate.is_invalid(now),
        deviation,
        tiebreak: rng.random(),
        candidate,
      })
    })
    .collect();

  ranked.sort_by(|a, b| {
    a.invalid
      .cmp(&b.invalid)
      .then(a.deviation.total_cmp(&b.deviation))
      .then(a.tiebreak.total_cmp(&b.tiebreak))
  });

  ranked
    .into_iter()
    .take(pool_size)
    .map(|r| PlaceToAsk {
      probability: logistic(r.candidate.local_skill),
      place:       r.candidate.place,
    })
    .collect()
}

/// Pick up to `pool_size` places on `map_place` whose predicted probability
/// of a correct answer is closest to `target_probability`.
///
/// `target_probability` must lie strictly inside `(0, 1)`; anything else is
/// rejected before the store is consulted.
pub async fn places_to_ask<S, R>(
  store: &S,
  user_id: Uuid,
  map_place: &Place,
  target_probability: f64,
  pool_size: usize,
  now: DateTime<Utc>,
  rng: &mut R,
) -> Result<Vec<PlaceToAsk>>
where
  S: QuizStore,
  R: Rng + Send,
{
  let target = TargetProbability::new(target_probability)?;

  let candidates = store
    .skill_candidates(user_id, map_place.place_id)
    .await
    .map_err(Error::store)?;

  Ok(rank_candidates(candidates, target, now, pool_size, rng))
}

#[cfg(test)]
mod tests {
  use rand::{SeedableRng, rngs::StdRng};

  use super::*;
  use crate::place::PlaceKind;

  fn place(code: &str) -> Place {
    Place {
      place_id: Uuid::new_v4(),
      code:     code.into(),
      name:     code.to_uppercase(),
      kind:     PlaceKind::State,
    }
  }

  fn candidate(code: &str, skill: f64, answered: Option<DateTime<Utc>>) -> SkillCandidate {
    SkillCandidate { place: place(code), local_skill: skill, last_answered_at: answered }
  }

  fn codes(picked: &[PlaceToAsk]) -> Vec<&str> {
    picked.iter().map(|p| p.place.code.as_str()).collect()
  }

  #[test]
  fn closest_skill_comes_first() {
    let now = Utc::now();
    let target = TargetProbability::new(0.75).unwrap();
    let t = target.skill();
    let mut rng = StdRng::seed_from_u64(7);

    let picked = rank_candidates(
      vec![
        candidate("far", t + 3.0, None),
        candidate("near", t + 0.1, None),
        candidate("mid", t - 1.0, None),
      ],
      target,
      now,
      10,
      &mut rng,
    );

    assert_eq!(codes(&picked), ["near", "mid", "far"]);
  }

  #[test]
  fn recently_answered_sorts_last() {
    let now = Utc::now();
    let target = TargetProbability::new(0.75).unwrap();
    let t = target.skill();
    let mut rng = StdRng::seed_from_u64(7);

    let picked = rank_candidates(
      vec![
        candidate("just-asked", t, Some(now - TimeDelta::seconds(30))),
        candidate("a-while-ago", t + 2.0, Some(now - TimeDelta::minutes(2))),
        candidate("never", t + 4.0, None),
      ],
      target,
      now,
      10,
      &mut rng,
    );

    assert_eq!(codes(&picked), ["a-while-ago", "never", "just-asked"]);
  }

  #[test]
  fn pool_size_truncates() {
    let now = Utc::now();
    let target = TargetProbability::new(0.5).unwrap();
    let mut rng = StdRng::seed_from_u64(1);

    let candidates = (1..=20)
      .map(|i| candidate(&format!("p{i}"), i as f64 / 10.0, None))
      .collect();
    let picked = rank_candidates(candidates, target, now, 5, &mut rng);

    assert_eq!(picked.len(), 5);
    assert_eq!(picked[0].place.code, "p1");
  }

  #[test]
  fn undefined_deviation_is_skipped() {
    let now = Utc::now();
    let target = TargetProbability::new(0.5).unwrap();
    let mut rng = StdRng::seed_from_u64(1);

    // Skill exactly on a zero target skill has a 0/0 deviation.
    let picked = rank_candidates(
      vec![candidate("undefined", 0.0, None), candidate("ok", 1.0, None)],
      target,
      now,
      10,
      &mut rng,
    );

    assert_eq!(codes(&picked), ["ok"]);
  }

  #[test]
  fn probability_is_logistic_of_local_skill() {
    let now = Utc::now();
    let target = TargetProbability::new(0.9).unwrap();
    let mut rng = StdRng::seed_from_u64(3);

    let picked =
      rank_candidates(vec![candidate("x", 2.0, None)], target, now, 1, &mut rng);
    assert!((picked[0].probability - logistic(2.0)).abs() < 1e-12);
  }

  #[test]
  fn ties_are_shuffled_between_calls() {
    let now = Utc::now();
    let target = TargetProbability::new(0.75).unwrap();
    let t = target.skill();
    let mut rng = StdRng::seed_from_u64(42);

    let tied: Vec<SkillCandidate> =
      (0..8).map(|i| candidate(&format!("t{i}"), t + 0.5, None)).collect();

    let firsts: std::collections::HashSet<String> = (0..50)
      .map(|_| {
        rank_candidates(tied.clone(), target, now, 1, &mut rng)[0]
          .place
          .code
          .clone()
      })
      .collect();

    assert!(firsts.len() > 1, "tie-break never varied: {firsts:?}");
  }
}
