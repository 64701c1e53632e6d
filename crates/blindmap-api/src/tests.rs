//! Router tests against an in-memory SQLite store.

use axum::{
  body::Body,
  http::{Request, StatusCode, header},
};
use blindmap_core::{
  assignment::AssignmentCache,
  place::{NewPlace, Place, PlaceKind, RelationKind},
  store::QuizStore,
};
use chrono::{TimeDelta, Utc};
use blindmap_store_sqlite::SqliteStore;
use serde_json::{Value as Json, json};
use tower::ServiceExt as _;
use uuid::Uuid;

use crate::{AppState, QuizConfig, SESSION_HEADER, api_router};

async fn make_state() -> AppState<SqliteStore> {
  let store = SqliteStore::open_in_memory().await.unwrap();
  AppState::new(store, QuizConfig::default())
}

async fn send(
  state: &AppState<SqliteStore>,
  method: &str,
  uri: &str,
  headers: Vec<(&str, &str)>,
  body: Option<Json>,
) -> (StatusCode, Json) {
  let mut builder = Request::builder().method(method).uri(uri);
  for (k, v) in headers {
    builder = builder.header(k, v);
  }
  let req = match body {
    Some(b) => builder
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(b.to_string()))
      .unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  };

  let resp = api_router(state.clone()).oneshot(req).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
    .await
    .unwrap();
  let json = if bytes.is_empty() {
    Json::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, json)
}

async fn get(state: &AppState<SqliteStore>, uri: &str) -> (StatusCode, Json) {
  send(state, "GET", uri, vec![], None).await
}

async fn add_place(state: &AppState<SqliteStore>, code: &str, kind: PlaceKind) -> Place {
  state
    .store
    .add_place(NewPlace::new(code, code.to_uppercase(), kind))
    .await
    .unwrap()
}

/// A world map with two states, `cz` and `sk`.
async fn seed_map(state: &AppState<SqliteStore>) -> (Place, Place, Place) {
  let world = add_place(state, "world", PlaceKind::World).await;
  let cz = add_place(state, "cz", PlaceKind::State).await;
  let sk = add_place(state, "sk", PlaceKind::State).await;
  state
    .store
    .add_relation(world.place_id, RelationKind::IsOnMap, vec![cz.place_id, sk.place_id])
    .await
    .unwrap();
  (world, cz, sk)
}

// ─── Places ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_places_by_kind() {
  let state = make_state().await;
  seed_map(&state).await;

  let (status, body) = get(&state, "/places?kind=state").await;
  assert_eq!(status, StatusCode::OK);
  let codes: Vec<_> = body.as_array().unwrap().iter().map(|p| p["code"].clone()).collect();
  assert_eq!(codes, [json!("cz"), json!("sk")]);

  let (status, body) = get(&state, "/places").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn unknown_kind_is_rejected() {
  let state = make_state().await;
  let (status, _) = get(&state, "/places?kind=ocean").await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bordering_of_unknown_place_is_not_found() {
  let state = make_state().await;
  let (status, body) = get(&state, "/places/atlantis/bordering").await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert!(body["error"].as_str().unwrap().contains("atlantis"));
}

#[tokio::test]
async fn bordering_without_border_is_empty() {
  let state = make_state().await;
  seed_map(&state).await;
  let (status, body) = get(&state, "/places/cz/bordering").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, json!([]));
}

#[tokio::test]
async fn confusing_places_on_map() {
  let state = make_state().await;
  seed_map(&state).await;

  let (status, body) = get(&state, "/places/cz/confusing?map=world&n=3").await;
  assert_eq!(status, StatusCode::OK);
  let picked = body.as_array().unwrap();
  assert_eq!(picked.len(), 1);
  assert_eq!(picked[0]["place"]["code"], "sk");
  assert_eq!(picked[0]["confusing_factor"], 0);
}

// ─── Quiz ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ask_returns_places_with_probabilities() {
  let state = make_state().await;
  let (_, cz, sk) = seed_map(&state).await;
  let user = Uuid::new_v4();

  for (place, skill) in [(&cz, 1.0), (&sk, 3.0)] {
    let (status, _) = send(
      &state,
      "PUT",
      "/skills",
      vec![],
      Some(json!({ "user_id": user, "place_id": place.place_id, "value": skill })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
  }

  let (status, body) = get(&state, &format!("/maps/world/ask?user={user}&probability=0.7&n=1")).await;
  assert_eq!(status, StatusCode::OK);
  let picked = body.as_array().unwrap();
  assert_eq!(picked.len(), 1);
  assert_eq!(picked[0]["place"]["code"], "cz");
  let p = picked[0]["probability"].as_f64().unwrap();
  assert!((p - 1.0 / (1.0 + (-1.0f64).exp())).abs() < 1e-9);
}

#[tokio::test]
async fn ask_with_certain_probability_is_bad_request() {
  let state = make_state().await;
  seed_map(&state).await;
  let user = Uuid::new_v4();

  let (status, body) = get(&state, &format!("/maps/world/ask?user={user}&probability=1")).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].is_string());
}

#[tokio::test]
async fn record_answer_returns_created() {
  let state = make_state().await;
  let (_, cz, sk) = seed_map(&state).await;
  let user = Uuid::new_v4();

  let (status, body) = send(
    &state,
    "POST",
    "/answers",
    vec![],
    Some(json!({
      "user_id": user,
      "place_asked_id": cz.place_id,
      "place_answered_id": sk.place_id,
      "number_of_options": 0,
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["place_asked_id"], json!(cz.place_id));
  assert_eq!(state.store.count_answers(user).await.unwrap(), 1);
}

// ─── Experiments ─────────────────────────────────────────────────────────────

fn group_body(name: &str, values: &[(&str, u32)], default: &str) -> Json {
  json!({
    "name": name,
    "default_value": default,
    "values": values
      .iter()
      .map(|(value, probability)| json!({ "value": value, "probability": probability }))
      .collect::<Vec<_>>(),
  })
}

#[tokio::test]
async fn create_group_validates_probabilities() {
  let state = make_state().await;

  let (status, body) = send(
    &state,
    "POST",
    "/experiments",
    vec![],
    Some(group_body("g", &[("a", 30), ("b", 60)], "a")),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].as_str().unwrap().contains("90"));

  let (status, _) = get(&state, "/experiments/g").await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (status, body) = send(
    &state,
    "POST",
    "/experiments",
    vec![],
    Some(group_body("g", &[("a", 30), ("b", 70)], "a")),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["group"]["name"], "g");
  assert_eq!(body["values"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn duplicate_group_or_value_is_a_conflict() {
  let state = make_state().await;
  let (status, _) =
    send(&state, "POST", "/experiments", vec![], Some(group_body("g", &[("a", 100)], "a"))).await;
  assert_eq!(status, StatusCode::CREATED);

  let (status, body) =
    send(&state, "POST", "/experiments", vec![], Some(group_body("g", &[("b", 100)], "b"))).await;
  assert_eq!(status, StatusCode::CONFLICT);
  let message = body["error"].as_str().unwrap();
  assert!(message.contains("already exists"));
  assert!(!message.contains("UNIQUE"));

  let (status, body) =
    send(&state, "POST", "/experiments", vec![], Some(group_body("h", &[("a", 100)], "a"))).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert!(body["error"].as_str().unwrap().contains("already in use"));
  let (status, _) = get(&state, "/experiments/h").await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn toggle_group_and_read_stats() {
  let state = make_state().await;
  send(
    &state,
    "POST",
    "/experiments",
    vec![],
    Some(group_body("g", &[("a", 100), ("b", 0)], "a")),
  )
  .await;

  let user = Uuid::new_v4();
  let (status, _) = get(&state, &format!("/users/{user}/experiments")).await;
  assert_eq!(status, StatusCode::OK);

  let (status, body) = get(&state, "/experiments/g/stats").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["users"], json!({ "a": 1, "b": 0 }));
  assert_eq!(body["answers"], json!({ "a": 0, "b": 0 }));

  let (status, body) = send(
    &state,
    "PUT",
    "/experiments/g/active",
    vec![],
    Some(json!({ "active": false })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["active"], false);

  let (status, _) = get(&state, "/experiments/missing/stats").await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  let (status, _) = send(
    &state,
    "PUT",
    "/experiments/missing/active",
    vec![],
    Some(json!({ "active": true })),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn session_cache_is_reused() {
  let state = make_state().await;
  send(&state, "POST", "/experiments", vec![], Some(group_body("first", &[("one", 100)], "one")))
    .await;
  let user = Uuid::new_v4();
  let uri = format!("/users/{user}/experiments");

  let (status, body) = send(&state, "GET", &uri, vec![(SESSION_HEADER, "s1")], None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["values"].as_array().unwrap().len(), 1);

  send(&state, "POST", "/experiments", vec![], Some(group_body("second", &[("two", 100)], "two")))
    .await;

  // Same session: the cached set comes back untouched.
  let (_, cached) = send(&state, "GET", &uri, vec![(SESSION_HEADER, "s1")], None).await;
  assert_eq!(cached, body);

  // No session: computed afresh.
  let (_, fresh) = get(&state, &uri).await;
  assert_eq!(fresh["values"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn expired_sessions_are_dropped_on_write() {
  let state = make_state().await;
  let user = Uuid::new_v4();
  let now = Utc::now();
  {
    let mut sessions = state.sessions.lock().await;
    for (id, age) in [("expired", 20), ("recent", 5)] {
      sessions.insert(id.to_owned(), AssignmentCache {
        user_id:     user,
        computed_at: now - TimeDelta::minutes(age),
        values:      vec![],
      });
    }
  }

  let uri = format!("/users/{user}/experiments");
  for i in 0..5 {
    let session = format!("s{i}");
    let (status, _) = send(&state, "GET", &uri, vec![(SESSION_HEADER, session.as_str())], None).await;
    assert_eq!(status, StatusCode::OK);
  }

  let sessions = state.sessions.lock().await;
  assert!(!sessions.contains_key("expired"));
  assert!(sessions.contains_key("recent"));
  assert_eq!(sessions.len(), 6);
}

#[tokio::test]
async fn reused_session_cache_is_not_written_back() {
  let state = make_state().await;
  let user = Uuid::new_v4();
  let now = Utc::now();
  let fresh = AssignmentCache { user_id: user, computed_at: now, values: vec![] };
  {
    let mut sessions = state.sessions.lock().await;
    sessions.insert("s1".to_owned(), fresh.clone());
    sessions.insert("expired".to_owned(), AssignmentCache {
      user_id:     user,
      computed_at: now - TimeDelta::minutes(20),
      values:      vec![],
    });
  }

  let uri = format!("/users/{user}/experiments");
  let (status, _) = send(&state, "GET", &uri, vec![(SESSION_HEADER, "s1")], None).await;
  assert_eq!(status, StatusCode::OK);

  // Nothing was written, so nothing was pruned either.
  let sessions = state.sessions.lock().await;
  assert_eq!(sessions.get("s1"), Some(&fresh));
  assert!(sessions.contains_key("expired"));
}

#[test]
fn out_of_range_cache_ttl_falls_back_to_default() {
  let default_ttl = QuizConfig::default().cache_policy().ttl;
  assert_eq!(default_ttl, TimeDelta::minutes(15));

  for minutes in [-1, i64::MAX] {
    let config = QuizConfig { cache_ttl_minutes: minutes, ..QuizConfig::default() };
    assert!(config.cache_ttl().is_none());
    assert_eq!(config.cache_policy().ttl, default_ttl);
  }

  let config = QuizConfig { cache_ttl_minutes: 1, ..QuizConfig::default() };
  assert_eq!(config.cache_policy().ttl, TimeDelta::minutes(1));
}

#[tokio::test]
async fn debug_mode_bypasses_the_session_cache() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let state = AppState::new(store, QuizConfig { debug: true, ..QuizConfig::default() });
  send(&state, "POST", "/experiments", vec![], Some(group_body("first", &[("one", 100)], "one")))
    .await;
  let user = Uuid::new_v4();
  let uri = format!("/users/{user}/experiments");

  send(&state, "GET", &uri, vec![(SESSION_HEADER, "s1")], None).await;
  send(&state, "POST", "/experiments", vec![], Some(group_body("second", &[("two", 100)], "two")))
    .await;

  let (_, body) = send(&state, "GET", &uri, vec![(SESSION_HEADER, "s1")], None).await;
  assert_eq!(body["values"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn membership_reports_the_deciding_value() {
  let state = make_state().await;
  send(
    &state,
    "POST",
    "/experiments",
    vec![],
    Some(group_body("layout", &[("grid", 100), ("list", 0)], "list")),
  )
  .await;
  let user = Uuid::new_v4();

  let (status, body) = get(
    &state,
    &format!("/users/{user}/experiments/membership?candidates=list,grid&default=plain&reason=layout"),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["value"], "grid");
  let affecting = body["affecting"].as_array().unwrap();
  assert_eq!(affecting.len(), 1);
  assert_eq!(affecting[0]["value"], "grid");

  let (_, body) = get(
    &state,
    &format!("/users/{user}/experiments/membership?candidates=other&default=plain&reason=x"),
  )
  .await;
  assert_eq!(body["value"], "plain");
  assert_eq!(body["affecting"], json!([]));
}
