//! Skill ↔ probability conversions.
//!
//! Local skill lives on the logit scale: `P(correct) = logistic(skill)`.
//! A target difficulty is expressed as a probability and mapped back onto
//! that scale so candidates can be compared against it.

use serde::Serialize;

use crate::{Error, Result};

/// Offset applied to the deviation denominator, on the side the local skill
/// lies relative to the target. Stretches distances far from the target.
pub const SKILL_STRETCH: f64 = 5.0;

/// `1 / (1 + e^(-skill))`
pub fn logistic(skill: f64) -> f64 { 1.0 / (1.0 + (-skill).exp()) }

/// The probability of a correct answer the caller wants the next question
/// to have. Always strictly inside `(0, 1)`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct TargetProbability(f64);

impl TargetProbability {
  /// Rejects 0, 1, anything outside and NaN.
  pub fn new(p: f64) -> Result<Self> {
    if p > 0.0 && p < 1.0 {
      Ok(Self(p))
    } else {
      Err(Error::InvalidProbability(p))
    }
  }

  pub fn value(self) -> f64 { self.0 }

  /// Inverse logistic: `-ln((1 - p) / p)`.
  pub fn skill(self) -> f64 { -((1.0 - self.0) / self.0).ln() }
}

impl TryFrom<f64> for TargetProbability {
  type Error = Error;

  fn try_from(p: f64) -> Result<Self> { Self::new(p) }
}

/// Normalised distance of `local_skill` from `target_skill`:
///
/// `|s - t| / |t + 5 * sign(s - t)|`
///
/// with `sign(0) = 0`. Returns `None` when the denominator vanishes (or the
/// result is otherwise not finite); such candidates cannot be ranked.
pub fn deviation(local_skill: f64, target_skill: f64) -> Option<f64> {
  let diff = local_skill - target_skill;
  let sign = if diff > 0.0 {
    1.0
  } else if diff < 0.0 {
    -1.0
  } else {
    0.0
  };

  let denominator = (target_skill + SKILL_STRETCH * sign).abs();
  if denominator == 0.0 {
    return None;
  }

  let d = diff.abs() / denominator;
  d.is_finite().then_some(d)
}

#[cfg(test)]
mod tests {
  use proptest::prelude::*;

  use super::*;

  #[test]
  fn half_maps_to_zero_skill() {
    let t = TargetProbability::new(0.5).unwrap();
    assert!(t.skill().abs() < 1e-12);
    assert!((logistic(0.0) - 0.5).abs() < 1e-12);
  }

  #[test]
  fn rejects_boundaries_and_nan() {
    for p in [0.0, 1.0, -0.1, 1.5, f64::NAN] {
      assert!(matches!(
        TargetProbability::new(p),
        Err(Error::InvalidProbability(_))
      ));
    }
  }

  #[test]
  fn deviation_is_zero_on_target() {
    assert_eq!(deviation(1.0, 1.0), Some(0.0));
  }

  #[test]
  fn deviation_uses_side_dependent_offset() {
    // Above the target: |2 - 1| / |1 + 5|
    let above = deviation(2.0, 1.0).unwrap();
    assert!((above - 1.0 / 6.0).abs() < 1e-12);

    // Below the target: |0 - 1| / |1 - 5|
    let below = deviation(0.0, 1.0).unwrap();
    assert!((below - 1.0 / 4.0).abs() < 1e-12);
  }

  #[test]
  fn vanishing_denominator_is_excluded() {
    // Target skill 5, local skill below it: |5 - 5| = 0.
    assert_eq!(deviation(4.0, 5.0), None);
    // Target skill 0 and local skill exactly on it: 0 / 0.
    assert_eq!(deviation(0.0, 0.0), None);
  }

  proptest! {
    #[test]
    fn target_skill_round_trips(p in 0.001f64..0.999f64) {
      let t = TargetProbability::new(p).unwrap();
      prop_assert!((logistic(t.skill()) - p).abs() < 1e-9);
    }

    #[test]
    fn deviation_is_never_negative(s in -10.0f64..10.0, t in -10.0f64..10.0) {
      if let Some(d) = deviation(s, t) {
        prop_assert!(d >= 0.0);
      }
    }
  }
}
