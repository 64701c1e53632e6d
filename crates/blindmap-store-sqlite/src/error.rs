//! Error type for `blindmap-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] blindmap_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  /// A column held text that does not decode into its domain type.
  #[error("decode error: {0}")]
  Decode(String),

  #[error("place not found: {0}")]
  PlaceNotFound(uuid::Uuid),

  #[error("place {0} already has a {1} relation")]
  DuplicateRelation(uuid::Uuid, blindmap_core::place::RelationKind),
}

impl From<Error> for blindmap_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(core) => core,
      other => blindmap_core::Error::store(other),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
