//! [`SqliteStore`], the SQLite implementation of [`QuizStore`].

use std::{collections::BTreeMap, path::Path};

use blindmap_core::{
  Error as CoreError,
  answer::{Answer, FREE_RECALL_MAX_OPTIONS, NewAnswer},
  confusion::ConfusionCandidate,
  experiment::{ExperimentGroup, Group, NewGroup, Value},
  place::{NewPlace, Place, PlaceKind, PlaceRelation, RelationKind},
  selection::SkillCandidate,
  store::QuizStore,
  translation::{Translation, TranslationReport},
};
use chrono::Utc;
use rusqlite::{OptionalExtension as _, ToSql};
use tracing::info;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    GROUP_COLUMNS, PLACE_COLUMNS, RawConfusionCandidate, RawGroup, RawPlace,
    RawSkillCandidate, RawValue, VALUE_COLUMNS, decode_u64, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

fn row_exists(conn: &rusqlite::Connection, sql: &str, param: &str) -> rusqlite::Result<bool> {
  Ok(conn.query_row(sql, [param], |_| Ok(())).optional()?.is_some())
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A blindmap store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a place query whose result columns are [`PLACE_COLUMNS`].
  async fn query_places(&self, sql: String, params: Vec<String>) -> Result<Vec<Place>> {
    let raws: Vec<RawPlace> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            RawPlace::from_row(row, 0)
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPlace::into_place).collect()
  }

  /// Load groups matching `filter` (a condition over `ab_groups g`) together
  /// with their values.
  async fn query_experiments(
    &self,
    filter: &'static str,
    params: Vec<String>,
  ) -> Result<Vec<ExperimentGroup>> {
    let (groups, values): (Vec<RawGroup>, Vec<RawValue>) = self
      .conn
      .call(move |conn| {
        let params: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();

        let mut stmt = conn.prepare(&format!(
          "SELECT {GROUP_COLUMNS} FROM ab_groups g WHERE {filter} ORDER BY g.name"
        ))?;
        let groups = stmt
          .query_map(params.as_slice(), |row| RawGroup::from_row(row, 0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(&format!(
          "SELECT {VALUE_COLUMNS}
           FROM ab_values v
           INNER JOIN ab_groups g ON g.group_id = v.group_id
           WHERE {filter}
           ORDER BY v.group_id, v.position"
        ))?;
        let values = stmt
          .query_map(params.as_slice(), |row| RawValue::from_row(row, 0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((groups, values))
      })
      .await?;

    let values = values
      .into_iter()
      .map(RawValue::into_value)
      .collect::<Result<Vec<_>>>()?;

    groups
      .into_iter()
      .map(|raw| {
        let group = raw.into_group()?;
        let values = values
          .iter()
          .filter(|v| v.group_id == group.group_id)
          .cloned()
          .collect();
        Ok(ExperimentGroup { group, values })
      })
      .collect()
  }

  /// Run a value query whose result columns are [`VALUE_COLUMNS`].
  async fn query_values(&self, sql: &'static str, params: Vec<String>) -> Result<Vec<Value>> {
    let raws: Vec<RawValue> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            RawValue::from_row(row, 0)
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawValue::into_value).collect()
  }

  /// Per-value counts for a group; `count_expr` is aggregated over the
  /// value joined with its assigned users (`u`) and their answers (`a`).
  async fn per_value_counts(
    &self,
    group_name: &str,
    count_expr: &'static str,
    join_answers: bool,
  ) -> Result<BTreeMap<String, u64>> {
    let group_name = group_name.to_owned();
    let answers_join = if join_answers {
      "LEFT JOIN answers a ON a.user_id = u.user_id"
    } else {
      ""
    };

    let rows: Vec<(String, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT v.value, {count_expr}
           FROM ab_values v
           INNER JOIN ab_groups g ON g.group_id = v.group_id
           LEFT JOIN ab_user_values u ON u.value_id = v.value_id
           {answers_join}
           WHERE g.name = ?1
           GROUP BY v.value_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![group_name], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(value, count)| Ok((value, decode_u64(count, "count")?)))
      .collect()
  }
}

// ─── QuizStore impl ──────────────────────────────────────────────────────────

impl QuizStore for SqliteStore {
  type Error = Error;

  // ── Places ────────────────────────────────────────────────────────────────

  async fn add_place(&self, input: NewPlace) -> Result<Place> {
    let place = Place {
      place_id: Uuid::new_v4(),
      code:     input.code,
      name:     input.name,
      kind:     input.kind,
    };

    let id_str   = encode_uuid(place.place_id);
    let code     = place.code.clone();
    let name     = place.name.clone();
    let kind_str = place.kind.as_ref().to_owned();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO places (place_id, code, name, kind) VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, code, name, kind_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(place)
  }

  async fn get_place_by_code<'a>(&'a self, code: &'a str) -> Result<Option<Place>> {
    let code = code.to_owned();

    let raw: Option<RawPlace> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {PLACE_COLUMNS} FROM places p WHERE p.code = ?1"),
            rusqlite::params![code],
            |row| RawPlace::from_row(row, 0),
          )
          .optional()?)
      })
      .await?;

    raw.map(RawPlace::into_place).transpose()
  }

  async fn list_places(&self, kind: Option<PlaceKind>) -> Result<Vec<Place>> {
    let mut places = match kind {
      Some(k) => {
        self
          .query_places(
            format!("SELECT {PLACE_COLUMNS} FROM places p WHERE p.kind = ?1"),
            vec![k.as_ref().to_owned()],
          )
          .await?
      }
      None => {
        self
          .query_places(format!("SELECT {PLACE_COLUMNS} FROM places p"), vec![])
          .await?
      }
    };

    places.sort_by(|a, b| (a.kind as u8, &a.name).cmp(&(b.kind as u8, &b.name)));
    Ok(places)
  }

  async fn states_with_map(&self) -> Result<Vec<Place>> {
    self
      .query_places(
        format!(
          "SELECT {PLACE_COLUMNS}
           FROM places p
           INNER JOIN place_relations r ON r.place_id = p.place_id
           WHERE p.kind = ?1 AND r.kind = ?2
           ORDER BY p.name"
        ),
        vec![
          PlaceKind::State.as_ref().to_owned(),
          RelationKind::IsOnMap.as_ref().to_owned(),
        ],
      )
      .await
  }

  async fn add_relation(
    &self,
    place_id: Uuid,
    kind:     RelationKind,
    related:  Vec<Uuid>,
  ) -> Result<PlaceRelation> {
    let relation = PlaceRelation {
      relation_id: Uuid::new_v4(),
      place_id,
      kind,
      related,
    };

    let place_id_str = encode_uuid(place_id);
    let kind_str     = kind.as_ref().to_owned();

    let (place_exists, duplicate): (bool, bool) = {
      let place_id_str = place_id_str.clone();
      let kind_str     = kind_str.clone();
      self
        .conn
        .call(move |conn| {
          let place_exists = conn
            .query_row(
              "SELECT 1 FROM places WHERE place_id = ?1",
              rusqlite::params![place_id_str],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
          let duplicate = conn
            .query_row(
              "SELECT 1 FROM place_relations WHERE place_id = ?1 AND kind = ?2",
              rusqlite::params![place_id_str, kind_str],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
          Ok((place_exists, duplicate))
        })
        .await?
    };

    if !place_exists {
      return Err(Error::PlaceNotFound(place_id));
    }
    if duplicate {
      return Err(Error::DuplicateRelation(place_id, kind));
    }

    let relation_id_str = encode_uuid(relation.relation_id);
    let members: Vec<String> = relation.related.iter().copied().map(encode_uuid).collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO place_relations (relation_id, place_id, kind) VALUES (?1, ?2, ?3)",
          rusqlite::params![relation_id_str, place_id_str, kind_str],
        )?;
        for member in &members {
          tx.execute(
            "INSERT OR IGNORE INTO place_relation_members (relation_id, place_id)
             VALUES (?1, ?2)",
            rusqlite::params![relation_id_str, member],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(relation)
  }

  async fn bordering_places(&self, place_id: Uuid) -> Result<Vec<Place>> {
    // Every place whose border group shares a member with this place's
    // border group. No border relation means an empty subquery.
    self
      .query_places(
        format!(
          "SELECT DISTINCT {PLACE_COLUMNS}
           FROM places p
           INNER JOIN place_relations r ON r.place_id = p.place_id AND r.kind = ?2
           INNER JOIN place_relation_members m ON m.relation_id = r.relation_id
           WHERE m.place_id IN (
               SELECT m2.place_id
               FROM place_relations r2
               INNER JOIN place_relation_members m2 ON m2.relation_id = r2.relation_id
               WHERE r2.place_id = ?1 AND r2.kind = ?2
             )
             AND p.place_id != ?1
           ORDER BY p.name"
        ),
        vec![encode_uuid(place_id), RelationKind::HaveLandBorder.as_ref().to_owned()],
      )
      .await
  }

  // ── Answers and skills ────────────────────────────────────────────────────

  async fn record_answer(&self, input: NewAnswer) -> Result<Answer> {
    let answer = Answer {
      answer_id:         Uuid::new_v4(),
      user_id:           input.user_id,
      place_asked_id:    input.place_asked_id,
      place_answered_id: input.place_answered_id,
      number_of_options: input.number_of_options,
      inserted_at:       Utc::now(),
    };

    let answer_id_str   = encode_uuid(answer.answer_id);
    let user_id_str     = encode_uuid(answer.user_id);
    let asked_str       = encode_uuid(answer.place_asked_id);
    let answered_str    = answer.place_answered_id.map(encode_uuid);
    let options         = i64::from(answer.number_of_options);
    let inserted_at_str = encode_dt(answer.inserted_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO answers (
             answer_id, user_id, place_asked_id, place_answered_id,
             number_of_options, inserted_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            answer_id_str,
            user_id_str,
            asked_str,
            answered_str,
            options,
            inserted_at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(answer)
  }

  async fn count_answers(&self, user_id: Uuid) -> Result<u64> {
    let user_id_str = encode_uuid(user_id);

    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(answer_id) FROM answers WHERE user_id = ?1",
          rusqlite::params![user_id_str],
          |row| row.get(0),
        )?)
      })
      .await?;

    decode_u64(count, "answer count")
  }

  async fn set_local_skill(&self, user_id: Uuid, place_id: Uuid, value: f64) -> Result<()> {
    let user_id_str  = encode_uuid(user_id);
    let place_id_str = encode_uuid(place_id);
    let at_str       = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO local_skills (user_id, place_id, value, updated_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (user_id, place_id)
           DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
          rusqlite::params![user_id_str, place_id_str, value, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn skill_candidates(&self, user_id: Uuid, map_place_id: Uuid) -> Result<Vec<SkillCandidate>> {
    let user_id_str = encode_uuid(user_id);
    let map_id_str  = encode_uuid(map_place_id);
    let [on_map, submap] = RelationKind::QUESTION_POOL.map(|k| k.as_ref().to_owned());

    let raws: Vec<RawSkillCandidate> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PLACE_COLUMNS}, s.value, MAX(a.inserted_at)
           FROM local_skills s
           INNER JOIN places p ON p.place_id = s.place_id
           LEFT JOIN answers a
             ON a.user_id = s.user_id AND a.place_asked_id = s.place_id
           WHERE s.user_id = ?1
             AND s.place_id IN (
               SELECT m.place_id
               FROM place_relations r
               INNER JOIN place_relation_members m ON m.relation_id = r.relation_id
               WHERE r.place_id = ?2 AND r.kind IN (?3, ?4)
             )
           GROUP BY s.place_id"
        ))?;

        let rows = stmt
          .query_map(
            rusqlite::params![user_id_str, map_id_str, on_map, submap],
            |row| {
              Ok(RawSkillCandidate {
                place:            RawPlace::from_row(row, 0)?,
                local_skill:      row.get(4)?,
                last_answered_at: row.get(5)?,
              })
            },
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSkillCandidate::into_candidate).collect()
  }

  async fn confusion_candidates(
    &self,
    place_id:     Uuid,
    map_place_id: Uuid,
  ) -> Result<Vec<ConfusionCandidate>> {
    let place_id_str = encode_uuid(place_id);
    let map_id_str   = encode_uuid(map_place_id);
    let max_options  = i64::from(FREE_RECALL_MAX_OPTIONS);

    let raws: Vec<RawConfusionCandidate> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT
             {PLACE_COLUMNS},
             (
               SELECT COUNT(a.answer_id)
               FROM answers a
               WHERE a.place_asked_id != a.place_answered_id
                 AND (
                   (a.place_asked_id = p.place_id AND a.place_answered_id = ?1)
                   OR (a.place_answered_id = p.place_id AND a.place_asked_id = ?1)
                 )
                 AND a.number_of_options < ?3
             ) AS confusing_factor
           FROM places p
           WHERE p.place_id IN (
               SELECT m.place_id
               FROM place_relations r
               INNER JOIN place_relation_members m ON m.relation_id = r.relation_id
               WHERE r.place_id = ?2
             )
             AND p.place_id != ?1
             AND p.kind = (SELECT kind FROM places WHERE place_id = ?1)"
        ))?;

        let rows = stmt
          .query_map(rusqlite::params![place_id_str, map_id_str, max_options], |row| {
            Ok(RawConfusionCandidate {
              place:            RawPlace::from_row(row, 0)?,
              confusing_factor: row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawConfusionCandidate::into_candidate).collect()
  }

  // ── Experiments ───────────────────────────────────────────────────────────

  async fn create_group(&self, input: NewGroup) -> Result<ExperimentGroup> {
    input.validate()?;

    let group = Group {
      group_id:    Uuid::new_v4(),
      name:        input.name,
      active:      input.active,
      min_answers: input.min_answers,
      max_answers: input.max_answers,
    };
    let values: Vec<Value> = input
      .values
      .into_iter()
      .map(|v| Value {
        value_id:    Uuid::new_v4(),
        group_id:    group.group_id,
        is_default:  v.value == input.default_value,
        value:       v.value,
        probability: v.probability,
      })
      .collect();
    let experiment = ExperimentGroup { group, values };

    let rows = experiment.clone();
    let conflict = self
      .conn
      .call(move |conn| {
        // Dropping the transaction on any early return rolls the group back.
        let tx = conn.transaction()?;
        if row_exists(&tx, "SELECT 1 FROM ab_groups WHERE name = ?1", &rows.group.name)? {
          return Ok(Some(CoreError::DuplicateGroup(rows.group.name)));
        }

        let group_id_str = encode_uuid(rows.group.group_id);
        tx.execute(
          "INSERT INTO ab_groups (group_id, name, active, min_answers, max_answers)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![
            group_id_str,
            rows.group.name,
            rows.group.active,
            rows.group.min_answers,
            rows.group.max_answers,
          ],
        )?;
        for (position, value) in rows.values.iter().enumerate() {
          if row_exists(&tx, "SELECT 1 FROM ab_values WHERE value = ?1", &value.value)? {
            return Ok(Some(CoreError::DuplicateValue(value.value.clone())));
          }
          tx.execute(
            "INSERT INTO ab_values (value_id, group_id, value, probability, is_default, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
              encode_uuid(value.value_id),
              group_id_str,
              value.value,
              value.probability,
              value.is_default,
              position as i64,
            ],
          )?;
        }
        tx.commit()?;
        Ok(None)
      })
      .await?;
    if let Some(e) = conflict {
      return Err(e.into());
    }

    info!(group = %experiment.group.name, values = experiment.values.len(), "created experiment group");
    Ok(experiment)
  }

  async fn get_group<'a>(&'a self, name: &'a str) -> Result<Option<ExperimentGroup>> {
    let mut found = self
      .query_experiments("g.name = ?1", vec![name.to_owned()])
      .await?;
    Ok(found.pop())
  }

  async fn set_group_active<'a>(&'a self, name: &'a str, active: bool) -> Result<Option<Group>> {
    let name = name.to_owned();

    let raw: Option<RawGroup> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE ab_groups SET active = ?2 WHERE name = ?1",
          rusqlite::params![name, active],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(conn
          .query_row(
            &format!("SELECT {GROUP_COLUMNS} FROM ab_groups g WHERE g.name = ?1"),
            rusqlite::params![name],
            |row| RawGroup::from_row(row, 0),
          )
          .optional()?)
      })
      .await?;

    raw.map(RawGroup::into_group).transpose()
  }

  async fn user_values(&self, user_id: Uuid) -> Result<Vec<Value>> {
    self
      .query_values(
        "SELECT v.value_id, v.group_id, v.value, v.probability, v.is_default
         FROM ab_user_values u
         INNER JOIN ab_values v ON v.value_id = u.value_id
         INNER JOIN ab_groups g ON g.group_id = u.group_id
         WHERE u.user_id = ?1
         ORDER BY u.assigned_at, g.name",
        vec![encode_uuid(user_id)],
      )
      .await
  }

  async fn inactive_defaults(&self) -> Result<Vec<Value>> {
    self
      .query_values(
        "SELECT v.value_id, v.group_id, v.value, v.probability, v.is_default
         FROM ab_values v
         INNER JOIN ab_groups g ON g.group_id = v.group_id
         WHERE v.is_default AND NOT g.active
         ORDER BY g.name",
        vec![],
      )
      .await
  }

  async fn unassigned_active_groups(&self, user_id: Uuid) -> Result<Vec<ExperimentGroup>> {
    self
      .query_experiments(
        "g.active AND g.group_id NOT IN (
           SELECT group_id FROM ab_user_values WHERE user_id = ?1
         )",
        vec![encode_uuid(user_id)],
      )
      .await
  }

  async fn assign_values(&self, user_id: Uuid, values: Vec<Value>) -> Result<()> {
    let user_id_str = encode_uuid(user_id);
    let at_str      = encode_dt(Utc::now());
    let rows: Vec<(String, String)> = values
      .iter()
      .map(|v| (encode_uuid(v.group_id), encode_uuid(v.value_id)))
      .collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for (group_id, value_id) in &rows {
          tx.execute(
            "INSERT OR IGNORE INTO ab_user_values (user_id, group_id, value_id, assigned_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![user_id_str, group_id, value_id, at_str],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn answers_per_value<'a>(&'a self, group_name: &'a str) -> Result<BTreeMap<String, u64>> {
    self
      .per_value_counts(group_name, "COUNT(a.answer_id)", true)
      .await
  }

  async fn users_per_value<'a>(&'a self, group_name: &'a str) -> Result<BTreeMap<String, u64>> {
    self
      .per_value_counts(group_name, "COUNT(u.user_id)", false)
      .await
  }

  // ── Translations ──────────────────────────────────────────────────────────

  async fn apply_translations(&self, translations: Vec<Translation>) -> Result<TranslationReport> {
    let report = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut report = TranslationReport::default();

        for t in &translations {
          let current: Option<String> = tx
            .query_row(
              "SELECT name FROM places WHERE code = ?1",
              rusqlite::params![t.code],
              |row| row.get(0),
            )
            .optional()?;

          match current {
            Some(name) if name == t.name => report.unchanged += 1,
            Some(_) => {
              tx.execute(
                "UPDATE places SET name = ?1 WHERE code = ?2",
                rusqlite::params![t.name, t.code],
              )?;
              report.updated += 1;
            }
            None => {
              let changed = tx.execute(
                "UPDATE places SET name = ?1 WHERE code = ?2 OR name = ?2",
                rusqlite::params![t.name, t.code],
              )?;
              if changed > 0 {
                report.fallback += 1;
              } else {
                report.unmatched += 1;
              }
            }
          }
        }

        tx.commit()?;
        Ok(report)
      })
      .await?;

    info!(
      updated = report.updated,
      unchanged = report.unchanged,
      fallback = report.fallback,
      unmatched = report.unmatched,
      "applied translations"
    );
    Ok(report)
  }
}
