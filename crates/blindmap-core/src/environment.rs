//! Feature gating against a cached assignment set.
//!
//! [`ExperimentEnvironment`] answers membership questions from an
//! [`AssignmentCache`] without touching storage, and remembers which values
//! influenced which decision so the decision can be attributed later.

use std::collections::HashMap;

use crate::{assignment::AssignmentCache, experiment::Value};

pub struct ExperimentEnvironment<'a> {
  cache: &'a AssignmentCache,
  used:  HashMap<String, Vec<&'a Value>>,
}

impl<'a> ExperimentEnvironment<'a> {
  pub fn new(cache: &'a AssignmentCache) -> Self {
    Self { cache, used: HashMap::new() }
  }

  /// Whether the user holds `value`. A positive answer is recorded against
  /// `reason`.
  pub fn is_member_of(&mut self, value: &str, reason: &str) -> bool {
    let cache = self.cache;
    match cache.values.iter().find(|v| v.value == value) {
      Some(held) => {
        self.record(reason, held);
        true
      }
      None => false,
    }
  }

  /// The first value the user holds (in assignment order) among
  /// `candidates`, recorded against `reason`; `default` if none.
  pub fn membership<'b>(&mut self, candidates: &[&str], default: &'b str, reason: &str) -> &'b str
  where
    'a: 'b,
  {
    let cache = self.cache;
    match cache.values.iter().find(|v| candidates.contains(&v.value.as_str())) {
      Some(held) => {
        self.record(reason, held);
        held.value.as_str()
      }
      None => default,
    }
  }

  /// Values that influenced decisions made for `reason`, in order.
  pub fn affecting_values(&self, reason: &str) -> &[&'a Value] {
    self.used.get(reason).map(Vec::as_slice).unwrap_or(&[])
  }

  fn record(&mut self, reason: &str, value: &'a Value) {
    self.used.entry(reason.to_owned()).or_default().push(value);
  }
}
