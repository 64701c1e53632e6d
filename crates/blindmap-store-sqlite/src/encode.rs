//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings (microsecond
//! precision, `Z` suffix) so that SQL `MAX()` and comparisons order them
//! chronologically. UUIDs are stored as hyphenated lowercase strings. Place
//! and relation kinds use their snake_case discriminants.

use std::str::FromStr;

use blindmap_core::{
  confusion::ConfusionCandidate,
  experiment::{Group, Value},
  place::{Place, PlaceKind},
  selection::SkillCandidate,
};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("bad timestamp {s:?}: {e}")))
}

// ─── PlaceKind ─────────────────────────────────────────────────────────────────

pub fn decode_place_kind(s: &str) -> Result<PlaceKind> {
  PlaceKind::from_str(s).map_err(|_| Error::Decode(format!("unknown place kind: {s:?}")))
}

// ─── Integers ─────────────────────────────────────────────────────────────────

pub fn decode_u32(n: i64, column: &str) -> Result<u32> {
  u32::try_from(n).map_err(|_| Error::Decode(format!("{column} out of range: {n}")))
}

pub fn decode_u64(n: i64, column: &str) -> Result<u64> {
  u64::try_from(n).map_err(|_| Error::Decode(format!("{column} out of range: {n}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawPlace::from_row`], for a `places` table aliased
/// as `p`.
pub const PLACE_COLUMNS: &str = "p.place_id, p.code, p.name, p.kind";

/// Raw strings read directly from a `places` row.
pub struct RawPlace {
  pub place_id: String,
  pub code:     String,
  pub name:     String,
  pub kind:     String,
}

impl RawPlace {
  /// Read the four [`PLACE_COLUMNS`] starting at column `offset`.
  pub fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(RawPlace {
      place_id: row.get(offset)?,
      code:     row.get(offset + 1)?,
      name:     row.get(offset + 2)?,
      kind:     row.get(offset + 3)?,
    })
  }

  pub fn into_place(self) -> Result<Place> {
    Ok(Place {
      place_id: decode_uuid(&self.place_id)?,
      code:     self.code,
      name:     self.name,
      kind:     decode_place_kind(&self.kind)?,
    })
  }
}

/// A place on the map joined with the user's local skill and their most
/// recent answer to it.
pub struct RawSkillCandidate {
  pub place:            RawPlace,
  pub local_skill:      f64,
  pub last_answered_at: Option<String>,
}

impl RawSkillCandidate {
  pub fn into_candidate(self) -> Result<SkillCandidate> {
    Ok(SkillCandidate {
      place:            self.place.into_place()?,
      local_skill:      self.local_skill,
      last_answered_at: self.last_answered_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

pub struct RawConfusionCandidate {
  pub place:            RawPlace,
  pub confusing_factor: i64,
}

impl RawConfusionCandidate {
  pub fn into_candidate(self) -> Result<ConfusionCandidate> {
    Ok(ConfusionCandidate {
      place:            self.place.into_place()?,
      confusing_factor: decode_u64(self.confusing_factor, "confusing_factor")?,
    })
  }
}

/// Column list matching [`RawGroup::from_row`], for `ab_groups` aliased as `g`.
pub const GROUP_COLUMNS: &str = "g.group_id, g.name, g.active, g.min_answers, g.max_answers";

/// Raw columns read directly from an `ab_groups` row.
pub struct RawGroup {
  pub group_id:    String,
  pub name:        String,
  pub active:      bool,
  pub min_answers: i64,
  pub max_answers: i64,
}

impl RawGroup {
  pub fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(RawGroup {
      group_id:    row.get(offset)?,
      name:        row.get(offset + 1)?,
      active:      row.get(offset + 2)?,
      min_answers: row.get(offset + 3)?,
      max_answers: row.get(offset + 4)?,
    })
  }

  pub fn into_group(self) -> Result<Group> {
    Ok(Group {
      group_id:    decode_uuid(&self.group_id)?,
      name:        self.name,
      active:      self.active,
      min_answers: decode_u32(self.min_answers, "min_answers")?,
      max_answers: decode_u32(self.max_answers, "max_answers")?,
    })
  }
}

/// Column list matching [`RawValue::from_row`], for `ab_values` aliased as `v`.
pub const VALUE_COLUMNS: &str = "v.value_id, v.group_id, v.value, v.probability, v.is_default";

/// Raw columns read directly from an `ab_values` row.
pub struct RawValue {
  pub value_id:    String,
  pub group_id:    String,
  pub value:       String,
  pub probability: i64,
  pub is_default:  bool,
}

impl RawValue {
  pub fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(RawValue {
      value_id:    row.get(offset)?,
      group_id:    row.get(offset + 1)?,
      value:       row.get(offset + 2)?,
      probability: row.get(offset + 3)?,
      is_default:  row.get(offset + 4)?,
    })
  }

  pub fn into_value(self) -> Result<Value> {
    Ok(Value {
      value_id:    decode_uuid(&self.value_id)?,
      group_id:    decode_uuid(&self.group_id)?,
      value:       self.value,
      probability: decode_u32(self.probability, "probability")?,
      is_default:  self.is_default,
    })
  }
}
