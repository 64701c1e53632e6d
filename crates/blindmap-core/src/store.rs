//! The `QuizStore` trait.
//!
//! The trait is implemented by storage backends (e.g.
//! `blindmap-store-sqlite`). The selection, confusion and assignment logic in
//! this crate only ever talks to storage through it.

use std::{collections::BTreeMap, future::Future};

use uuid::Uuid;

use crate::{
  answer::{Answer, NewAnswer},
  confusion::ConfusionCandidate,
  experiment::{ExperimentGroup, Group, NewGroup, Value},
  place::{NewPlace, Place, PlaceKind, PlaceRelation, RelationKind},
  selection::SkillCandidate,
  translation::{Translation, TranslationReport},
};

/// Abstraction over a blindmap storage backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait QuizStore: Send + Sync {
  /// Backend error; converting it hands back any [`crate::Error`] the
  /// backend raised itself, such as a duplicate group name.
  type Error: std::error::Error + Into<crate::Error> + Send + Sync + 'static;

  // ── Places ────────────────────────────────────────────────────────────

  fn add_place(
    &self,
    input: NewPlace,
  ) -> impl Future<Output = Result<Place, Self::Error>> + Send + '_;

  /// Look a place up by its unique code. Returns `None` if not found.
  fn get_place_by_code<'a>(
    &'a self,
    code: &'a str,
  ) -> impl Future<Output = Result<Option<Place>, Self::Error>> + Send + 'a;

  /// All places, optionally of one kind, ordered by kind then name.
  fn list_places(
    &self,
    kind: Option<PlaceKind>,
  ) -> impl Future<Output = Result<Vec<Place>, Self::Error>> + Send + '_;

  /// States that have a map of their own, ordered by name.
  fn states_with_map(
    &self,
  ) -> impl Future<Output = Result<Vec<Place>, Self::Error>> + Send + '_;

  /// Record that `place_id` relates to `related` by `kind`. Returns an error
  /// if the place already owns a relation of that kind.
  fn add_relation(
    &self,
    place_id: Uuid,
    kind: RelationKind,
    related: Vec<Uuid>,
  ) -> impl Future<Output = Result<PlaceRelation, Self::Error>> + Send + '_;

  /// Places sharing a land-border group with `place_id`, excluding it.
  /// Empty when the place has no border relation.
  fn bordering_places(
    &self,
    place_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Place>, Self::Error>> + Send + '_;

  // ── Answers and skills ────────────────────────────────────────────────

  /// Persist an answer. `inserted_at` is set by the store.
  fn record_answer(
    &self,
    input: NewAnswer,
  ) -> impl Future<Output = Result<Answer, Self::Error>> + Send + '_;

  /// Total number of answers the user ever gave.
  fn count_answers(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Write path for the external skill estimator. Overwrites any previous
  /// value for the pair.
  fn set_local_skill(
    &self,
    user_id: Uuid,
    place_id: Uuid,
    value: f64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Places on `map_place_id` (on-map or submap relation) for which the user
  /// has a local skill, with the time the user was last asked each.
  fn skill_candidates(
    &self,
    user_id: Uuid,
    map_place_id: Uuid,
  ) -> impl Future<Output = Result<Vec<SkillCandidate>, Self::Error>> + Send + '_;

  /// Places of the same kind as `place_id` related to `map_place_id`,
  /// excluding `place_id`, each with its free-recall confusion count.
  fn confusion_candidates(
    &self,
    place_id: Uuid,
    map_place_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ConfusionCandidate>, Self::Error>> + Send + '_;

  // ── Experiments ───────────────────────────────────────────────────────

  /// Validate `input` and create the group with all of its values
  /// atomically: on any failure nothing is persisted.
  fn create_group(
    &self,
    input: NewGroup,
  ) -> impl Future<Output = Result<ExperimentGroup, Self::Error>> + Send + '_;

  fn get_group<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<ExperimentGroup>, Self::Error>> + Send + 'a;

  /// Switch a group on or off. Returns `None` if no group has that name.
  fn set_group_active<'a>(
    &'a self,
    name: &'a str,
    active: bool,
  ) -> impl Future<Output = Result<Option<Group>, Self::Error>> + Send + 'a;

  /// Values stored for the user, one per group at most.
  fn user_values(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Value>, Self::Error>> + Send + '_;

  /// Default values of every inactive group.
  fn inactive_defaults(
    &self,
  ) -> impl Future<Output = Result<Vec<Value>, Self::Error>> + Send + '_;

  /// Active groups the user holds no stored value for, with their values.
  fn unassigned_active_groups(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ExperimentGroup>, Self::Error>> + Send + '_;

  /// Persist new assignments in one write. A value for a group the user is
  /// already assigned in is ignored.
  fn assign_values(
    &self,
    user_id: Uuid,
    values: Vec<Value>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// For each value of the named group, the number of answers given by
  /// users assigned to it.
  fn answers_per_value<'a>(
    &'a self,
    group_name: &'a str,
  ) -> impl Future<Output = Result<BTreeMap<String, u64>, Self::Error>> + Send + 'a;

  /// For each value of the named group, the number of users assigned to it.
  fn users_per_value<'a>(
    &'a self,
    group_name: &'a str,
  ) -> impl Future<Output = Result<BTreeMap<String, u64>, Self::Error>> + Send + 'a;

  // ── Translations ──────────────────────────────────────────────────────

  /// Rename places. A translation whose code is not a known place falls
  /// back to renaming any place whose code or current name equals it.
  fn apply_translations(
    &self,
    translations: Vec<Translation>,
  ) -> impl Future<Output = Result<TranslationReport, Self::Error>> + Send + '_;
}
