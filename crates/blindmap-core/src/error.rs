//! Error types for `blindmap-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("target probability must lie strictly between 0 and 1, got {0}")]
  InvalidProbability(f64),

  #[error("total probability has to be equal to 100, it was {0}")]
  ProbabilitySum(u32),

  #[error("there is no default value")]
  NoDefaultValue,

  #[error("can't have more than one default value")]
  DuplicateDefaultValue,

  /// The cumulative walk over a group's values never reached the draw.
  /// Unreachable for a group that passed validation.
  #[error("no value chosen for experiment group {0}")]
  NoValueChosen(Uuid),

  #[error("experiment group already exists: {0}")]
  DuplicateGroup(String),

  /// Value strings are unique across all groups.
  #[error("experiment value already in use: {0}")]
  DuplicateValue(String),

  #[error("place not found: {0}")]
  PlaceNotFound(String),

  #[error("experiment group not found: {0}")]
  GroupNotFound(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Box a backend error.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }

  /// Whether the error was caused by the caller's input rather than by the
  /// backend or an internal inconsistency.
  pub fn is_usage(&self) -> bool {
    matches!(
      self,
      Self::InvalidProbability(_)
        | Self::ProbabilitySum(_)
        | Self::NoDefaultValue
        | Self::DuplicateDefaultValue
        | Self::DuplicateGroup(_)
        | Self::DuplicateValue(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
