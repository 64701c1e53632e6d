//! A/B experiment groups and their values.
//!
//! A group is one experiment dimension. Each of its values carries an
//! integer probability; together they sum to exactly 100, and exactly one of
//! them is the default handed to users who are not (or no longer) part of
//! the experiment.

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// The total every group's value probabilities must add up to.
pub const TOTAL_PROBABILITY: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
  pub group_id:    Uuid,
  pub name:        String,
  /// Inactive groups no longer assign; everybody gets their default.
  pub active:      bool,
  /// 0 means no lower bound.
  pub min_answers: u32,
  /// 0 means no upper bound.
  pub max_answers: u32,
}

impl Group {
  /// Whether a user with `answer_count` answers may be assigned a value.
  pub fn accepts(&self, answer_count: u64) -> bool {
    let above_min = self.min_answers == 0 || answer_count >= u64::from(self.min_answers);
    let below_max = self.max_answers == 0 || answer_count <= u64::from(self.max_answers);
    above_min && below_max
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
  pub value_id:    Uuid,
  pub group_id:    Uuid,
  /// Globally unique name, e.g. `recommendation_by_skill`.
  pub value:       String,
  pub probability: u32,
  pub is_default:  bool,
}

/// A group together with all of its values, in creation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentGroup {
  pub group:  Group,
  pub values: Vec<Value>,
}

impl ExperimentGroup {
  pub fn default_value(&self) -> Option<&Value> {
    self.values.iter().find(|v| v.is_default)
  }

  /// Draw a value: an integer in `1..=100`, then the first value whose
  /// cumulative probability reaches it.
  pub fn sample<R>(&self, rng: &mut R) -> Result<&Value>
  where
    R: Rng + ?Sized,
  {
    let draw = rng.random_range(1..=TOTAL_PROBABILITY);
    choose_value(&self.values, draw).ok_or(Error::NoValueChosen(self.group.group_id))
  }
}

/// The first value whose cumulative probability is `>= draw`.
pub fn choose_value(values: &[Value], draw: u32) -> Option<&Value> {
  let mut cumulative = 0;
  values.iter().find(|v| {
    cumulative += v.probability;
    draw <= cumulative
  })
}

// ─── Creation input ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewValue {
  pub value:       String,
  pub probability: u32,
}

/// Input to [`crate::store::QuizStore::create_group`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGroup {
  pub name:          String,
  /// Must name exactly one entry of `values`.
  pub default_value: String,
  pub values:        Vec<NewValue>,
  #[serde(default = "default_active")]
  pub active:        bool,
  #[serde(default)]
  pub min_answers:   u32,
  #[serde(default)]
  pub max_answers:   u32,
}

fn default_active() -> bool { true }

impl NewGroup {
  /// An active group without answer-count bounds.
  pub fn new<'a>(
    name: impl Into<String>,
    default_value: impl Into<String>,
    values: impl IntoIterator<Item = (u32, &'a str)>,
  ) -> Self {
    Self {
      name:          name.into(),
      default_value: default_value.into(),
      values:        values
        .into_iter()
        .map(|(probability, value)| NewValue { value: value.to_owned(), probability })
        .collect(),
      active:        true,
      min_answers:   0,
      max_answers:   0,
    }
  }

  pub fn with_answer_bounds(mut self, min_answers: u32, max_answers: u32) -> Self {
    self.min_answers = min_answers;
    self.max_answers = max_answers;
    self
  }

  pub fn inactive(mut self) -> Self {
    self.active = false;
    self
  }

  /// Probabilities must sum to 100 and exactly one value must be the
  /// default.
  pub fn validate(&self) -> Result<()> {
    let total: u32 = self.values.iter().map(|v| v.probability).sum();
    if total != TOTAL_PROBABILITY {
      return Err(Error::ProbabilitySum(total));
    }

    match self.values.iter().filter(|v| v.value == self.default_value).count() {
      0 => Err(Error::NoDefaultValue),
      1 => Ok(()),
      _ => Err(Error::DuplicateDefaultValue),
    }
  }
}
