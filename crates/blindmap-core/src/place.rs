//! Places and the typed relations between them.
//!
//! Places are reference data: they are created when maps are imported and
//! afterwards only their display name changes (translations).

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// What sort of geographic feature a place is.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PlaceKind {
  State,
  City,
  World,
  Continent,
  River,
  Lake,
}

/// The meaning of an edge from an owning place to its related places.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RelationKind {
  /// The related places are drawn on the owning place's map.
  IsOnMap,
  /// The related places have maps of their own nested in the owner's map.
  IsSubmap,
  /// The related places form the owner's border group.
  HaveLandBorder,
}

impl RelationKind {
  /// Relation kinds that put a place into a map's question pool.
  pub const QUESTION_POOL: [RelationKind; 2] =
    [RelationKind::IsOnMap, RelationKind::IsSubmap];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
  pub place_id: Uuid,
  /// Unique slug, e.g. `cz` or `europe`.
  pub code:     String,
  pub name:     String,
  pub kind:     PlaceKind,
}

/// Input to [`crate::store::QuizStore::add_place`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewPlace {
  pub code: String,
  pub name: String,
  pub kind: PlaceKind,
}

impl NewPlace {
  pub fn new(code: impl Into<String>, name: impl Into<String>, kind: PlaceKind) -> Self {
    Self { code: code.into(), name: name.into(), kind }
  }
}

/// A typed edge between one owning place and a set of related places.
/// A place owns at most one relation of each kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceRelation {
  pub relation_id: Uuid,
  pub place_id:    Uuid,
  pub kind:        RelationKind,
  pub related:     Vec<Uuid>,
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use super::*;

  #[test]
  fn kinds_use_snake_case_discriminants() {
    assert_eq!(RelationKind::HaveLandBorder.as_ref(), "have_land_border");
    assert_eq!(PlaceKind::from_str("continent").unwrap(), PlaceKind::Continent);
    assert!(PlaceKind::from_str("ocean").is_err());
  }

  #[test]
  fn serde_matches_strum() {
    let json = serde_json::to_string(&RelationKind::IsSubmap).unwrap();
    assert_eq!(json, format!("\"{}\"", RelationKind::IsSubmap));
  }
}
