//! SQL schema for the blindmap SQLite store.
//!
//! Executed once at connection startup. There is no migration runner; the
//! `user_version` pragma records which layout a file was created with.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS places (
    place_id  TEXT PRIMARY KEY,
    code      TEXT NOT NULL UNIQUE,
    name      TEXT NOT NULL,
    kind      TEXT NOT NULL    -- 'state' | 'city' | 'world' | 'continent' | 'river' | 'lake'
);

-- One relation of each kind per owning place.
CREATE TABLE IF NOT EXISTS place_relations (
    relation_id TEXT PRIMARY KEY,
    place_id    TEXT NOT NULL REFERENCES places(place_id),
    kind        TEXT NOT NULL,  -- 'is_on_map' | 'is_submap' | 'have_land_border'
    UNIQUE (kind, place_id)
);

CREATE TABLE IF NOT EXISTS place_relation_members (
    relation_id TEXT NOT NULL REFERENCES place_relations(relation_id),
    place_id    TEXT NOT NULL REFERENCES places(place_id),
    PRIMARY KEY (relation_id, place_id)
);

-- Users are external; user_id is whatever identity the caller supplies.
CREATE TABLE IF NOT EXISTS answers (
    answer_id         TEXT PRIMARY KEY,
    user_id           TEXT NOT NULL,
    place_asked_id    TEXT NOT NULL REFERENCES places(place_id),
    place_answered_id TEXT REFERENCES places(place_id),
    number_of_options INTEGER NOT NULL DEFAULT 0,
    inserted_at       TEXT NOT NULL   -- fixed-width RFC 3339 UTC; sortable
);

-- Maintained by the external skill estimator.
CREATE TABLE IF NOT EXISTS local_skills (
    user_id    TEXT NOT NULL,
    place_id   TEXT NOT NULL REFERENCES places(place_id),
    value      REAL NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, place_id)
);

CREATE TABLE IF NOT EXISTS ab_groups (
    group_id    TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    active      INTEGER NOT NULL DEFAULT 1,
    min_answers INTEGER NOT NULL DEFAULT 0,
    max_answers INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS ab_values (
    value_id    TEXT PRIMARY KEY,
    group_id    TEXT NOT NULL REFERENCES ab_groups(group_id),
    value       TEXT NOT NULL UNIQUE,
    probability INTEGER NOT NULL,
    is_default  INTEGER NOT NULL,
    position    INTEGER NOT NULL
);

-- At most one value per (user, group).
CREATE TABLE IF NOT EXISTS ab_user_values (
    user_id     TEXT NOT NULL,
    group_id    TEXT NOT NULL REFERENCES ab_groups(group_id),
    value_id    TEXT NOT NULL REFERENCES ab_values(value_id),
    assigned_at TEXT NOT NULL,
    PRIMARY KEY (user_id, group_id)
);

CREATE INDEX IF NOT EXISTS answers_user_asked_idx ON answers(user_id, place_asked_id);
CREATE INDEX IF NOT EXISTS answers_pair_idx       ON answers(place_asked_id, place_answered_id);
CREATE INDEX IF NOT EXISTS relation_members_idx   ON place_relation_members(place_id);
CREATE INDEX IF NOT EXISTS ab_values_group_idx    ON ab_values(group_id);

PRAGMA user_version = 1;
";
