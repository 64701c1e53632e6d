//! Answers: what a user was asked and what they clicked.
//!
//! Answers are written by the quiz front-end and are only ever read by the
//! core: they drive answer-recency validity, confusion counts and the
//! answer-count eligibility windows of experiments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Answers shown with fewer options than this were free recall (the user
/// clicked on the blank map rather than picking from a list).
pub const FREE_RECALL_MAX_OPTIONS: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
  pub answer_id:         Uuid,
  pub user_id:           Uuid,
  pub place_asked_id:    Uuid,
  /// `None` when the user gave up without clicking anything.
  pub place_answered_id: Option<Uuid>,
  /// 0 for free recall, otherwise the number of multiple-choice options.
  pub number_of_options: u32,
  /// Server-assigned timestamp.
  pub inserted_at:       DateTime<Utc>,
}

impl Answer {
  pub fn is_correct(&self) -> bool {
    self.place_answered_id == Some(self.place_asked_id)
  }

  pub fn is_free_recall(&self) -> bool {
    self.number_of_options < FREE_RECALL_MAX_OPTIONS
  }
}

/// Input to [`crate::store::QuizStore::record_answer`].
/// `inserted_at` is always set by the store.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAnswer {
  pub user_id:           Uuid,
  pub place_asked_id:    Uuid,
  pub place_answered_id: Option<Uuid>,
  #[serde(default)]
  pub number_of_options: u32,
}

impl NewAnswer {
  /// A free-recall answer.
  pub fn new(user_id: Uuid, place_asked_id: Uuid, place_answered_id: Option<Uuid>) -> Self {
    Self { user_id, place_asked_id, place_answered_id, number_of_options: 0 }
  }

  pub fn with_options(mut self, number_of_options: u32) -> Self {
    self.number_of_options = number_of_options;
    self
  }
}
