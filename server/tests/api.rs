//! HTTP-level tests: error mapping, identity enforcement, idempotency,
//! role scoping, and the agentic review endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::Value;
use serde_json::json;

use gauntlet_config::GauntletConfig;
use gauntlet_council::ScriptedTransport;
use gauntlet_protocol::ReviewEntry;
use gauntlet_protocol::SessionConfig;
use gauntlet_protocol::SessionNotebook;
use gauntlet_server::AppState;
use gauntlet_store::MemoryStore;

const TRAINER: &str = "t1@example.com";
const REVIEWER: &str = "rev@example.com";

fn test_config() -> GauntletConfig {
    let mut config = GauntletConfig::default();
    config.team = serde_yaml::from_str(
        r#"
super_admins:
  - { email: "root@example.com" }
admins:
  - { email: "ada@example.com", pods: ["pod-1"] }
pods:
  pod-1:
    reviewer: { email: "rev@example.com" }
    trainers: ["t1@example.com"]
  pod-2:
    reviewer: { email: "rev2@example.com" }
    trainers: ["t2@example.com"]
"#,
    )
    .unwrap();
    config
}

async fn spawn_server(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let router = gauntlet_server::router(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

async fn fixture() -> (AppState, String) {
    let state = AppState::new(
        test_config(),
        Arc::new(MemoryStore::new()),
        Arc::new(ScriptedTransport::new()),
    );
    let base = spawn_server(state.clone()).await;
    (state, base)
}

async fn create_session(state: &AppState, session_id: &str, trainer: &str) {
    let notebook: SessionNotebook = serde_json::from_value(json!({
        "prompt": "Write a haiku.",
        "response_reference": "C1: three lines",
        "metadata": { "Task ID": format!("TASK-{session_id}") }
    }))
    .unwrap();
    state
        .repo
        .create(session_id, &notebook, &SessionConfig::default(), Some(trainer))
        .await
        .unwrap();
}

async fn ready_to_submit(state: &AppState, session_id: &str) {
    let reviews: BTreeMap<String, ReviewEntry> = (1..=4u32)
        .map(|i| {
            (
                i.to_string(),
                serde_json::from_value(json!({
                    "judgment": "pass",
                    "grading_basis": "criteria",
                    "submitted": true
                }))
                .unwrap(),
            )
        })
        .collect();
    state.repo.set_reviews(session_id, &reviews).await.unwrap();
    state.repo.set_qc_done(session_id).await.unwrap();
}

fn inline_session(models: [&str; 4]) -> Value {
    json!({
        "session_id": "inline-1",
        "notebook": {
            "prompt": "Write a haiku.",
            "response_reference": r#"[{"id":"C1","criteria1":"3 lines"},{"id":"C2","criteria2":"mentions code"}]"#
        },
        "all_results": (1..=4).map(|i| json!({
            "hunt_id": i,
            "model": models[(i - 1) as usize],
            "response": format!("r{i}")
        })).collect::<Vec<_>>(),
    })
}

#[tokio::test]
async fn unknown_session_is_404() {
    let (_state, base) = fixture().await;
    let response = reqwest::get(format!("{base}/api/session/missing"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["detail"], "Session not found");
}

#[tokio::test]
async fn submit_flow_and_conflict_mapping() {
    let (state, base) = fixture().await;
    create_session(&state, "s1", TRAINER).await;
    ready_to_submit(&state, "s1").await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/session/s1/submit-for-review"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["review_status"], "submitted");
    assert_eq!(body["review_round"], 1);

    // A second submit hits the CAS and maps to 409 with the observed
    // state in the body.
    let response = client
        .post(format!("{base}/api/session/s1/submit-for-review"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["current_status"], "submitted");
}

#[tokio::test]
async fn submit_without_qc_is_400_and_changes_nothing() {
    let (state, base) = fixture().await;
    create_session(&state, "s1", TRAINER).await;
    // Reviews complete, QC not done.
    let reviews: BTreeMap<String, ReviewEntry> = (1..=4u32)
        .map(|i| {
            (
                i.to_string(),
                serde_json::from_value(json!({ "judgment": "pass", "submitted": true })).unwrap(),
            )
        })
        .collect();
    state.repo.set_reviews("s1", &reviews).await.unwrap();

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base}/api/session/s1/submit-for-review"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(
        body["detail"]
            .as_str()
            .unwrap()
            .contains("Complete the Quality Check")
    );

    let session: Value = reqwest::get(format!("{base}/api/session/s1"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(session["review_status"], "draft");
    assert_eq!(session["version"], 0);
}

#[tokio::test]
async fn idempotency_key_replays_the_first_response() {
    let (state, base) = fixture().await;
    create_session(&state, "s1", TRAINER).await;
    ready_to_submit(&state, "s1").await;
    let client = reqwest::Client::new();

    let first: Value = client
        .post(format!("{base}/api/session/s1/submit-for-review"))
        .header("Idempotency-Key", "click-1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let second_response = client
        .post(format!("{base}/api/session/s1/submit-for-review"))
        .header("Idempotency-Key", "click-1")
        .send()
        .await
        .unwrap();
    assert_eq!(second_response.status(), StatusCode::OK);
    let second: Value = second_response.json().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(state.repo.get_review_round("s1").await.unwrap(), 1);
}

#[tokio::test]
async fn reviewer_routes_require_a_known_reviewer() {
    let (state, base) = fixture().await;
    create_session(&state, "s1", TRAINER).await;
    let client = reqwest::Client::new();

    // No header at all.
    let response = client
        .post(format!("{base}/api/tasks/s1/approve"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // A trainer is not a reviewer.
    let response = client
        .post(format!("{base}/api/tasks/s1/approve"))
        .header("X-Reviewer-Email", TRAINER)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn approve_notifies_the_trainer() {
    let (state, base) = fixture().await;
    create_session(&state, "s1", TRAINER).await;
    ready_to_submit(&state, "s1").await;
    let client = reqwest::Client::new();
    client
        .post(format!("{base}/api/session/s1/submit-for-review"))
        .send()
        .await
        .unwrap();

    let response = client
        .post(format!("{base}/api/tasks/s1/approve"))
        .header("X-Reviewer-Email", REVIEWER)
        .json(&json!({ "comment": "well graded" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["review_status"], "approved");

    let notifications: Value = client
        .get(format!("{base}/api/notifications"))
        .header("X-Trainer-Email", TRAINER)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(notifications["unread_count"], 1);
    assert_eq!(notifications["notifications"][0]["type"], "task_approved");
    assert_eq!(
        notifications["notifications"][0]["task_display_id"],
        "TASK-s1"
    );
}

#[tokio::test]
async fn trainer_queue_scopes_by_role() {
    let (state, base) = fixture().await;
    create_session(&state, "s1", TRAINER).await;
    create_session(&state, "s2", "t2@example.com").await;
    let client = reqwest::Client::new();

    // A trainer only sees their own sessions.
    let queue: Value = client
        .get(format!("{base}/api/trainer-queue"))
        .header("X-Trainer-Email", TRAINER)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(queue["total"], 1);
    assert_eq!(queue["sessions"][0]["session_id"], "s1");

    // A super-admin sees everything.
    let queue: Value = client
        .get(format!("{base}/api/trainer-queue"))
        .header("X-Trainer-Email", "root@example.com")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(queue["total"], 2);

    // Unknown identities are rejected.
    let response = client
        .get(format!("{base}/api/trainer-queue"))
        .header("X-Trainer-Email", "stranger@example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn reviewer_queue_sees_only_their_pod() {
    let (state, base) = fixture().await;
    create_session(&state, "s1", TRAINER).await;
    create_session(&state, "s2", "t2@example.com").await;
    for id in ["s1", "s2"] {
        ready_to_submit(&state, id).await;
        state.pipeline.submit_for_review(id).await.unwrap();
    }
    let client = reqwest::Client::new();

    let queue: Value = client
        .get(format!("{base}/api/queue"))
        .header("X-Reviewer-Email", REVIEWER)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(queue["count"], 1);
    assert_eq!(queue["sessions"][0], "s1");
}

#[tokio::test]
async fn diff_validates_version_range() {
    let (state, base) = fixture().await;
    create_session(&state, "s1", TRAINER).await;
    ready_to_submit(&state, "s1").await;
    state.pipeline.submit_for_review("s1").await.unwrap();

    let response = reqwest::get(format!("{base}/api/session/s1/diff?v1=1&v2=9"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("Version out of range"));

    let response = reqwest::get(format!("{base}/api/session/s1/diff?v1=1&v2=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["changed_count"], 0);
}

#[tokio::test]
async fn agentic_preflight_passes_on_uniform_selection() {
    let (_state, base) = fixture().await;
    let client = reqwest::Client::new();
    let body: Value = client
        .post(format!("{base}/api/review"))
        .json(&json!({
            "session": inline_session(["qwen/qwen3-235b"; 4]),
            "checkpoint": "preflight",
            "selected_hunt_ids": [1, 2, 3, 4]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["passed"], true);
    assert_eq!(body["issues"], json!([]));
    assert_eq!(body["checkpoint"], "preflight");
}

#[tokio::test]
async fn agentic_preflight_fails_on_mixed_models() {
    let (_state, base) = fixture().await;
    let client = reqwest::Client::new();
    let body: Value = client
        .post(format!("{base}/api/review"))
        .json(&json!({
            "session": inline_session([
                "qwen/qwen3-235b",
                "openai/gpt-4o",
                "qwen/qwen3-235b",
                "qwen/qwen3-235b"
            ]),
            "checkpoint": "preflight",
            "selected_hunt_ids": [1, 2, 3, 4]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["passed"], false);
    let issues = body["issues"].as_array().unwrap();
    let issue = issues
        .iter()
        .find(|i| i["rule_id"] == "model_consistency")
        .unwrap();
    let message = issue["message"].as_str().unwrap();
    assert!(message.contains("qwen/qwen3-235b") && message.contains("openai/gpt-4o"));
}

#[tokio::test]
async fn agentic_preflight_requires_four_ids() {
    let (_state, base) = fixture().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base}/api/review"))
        .json(&json!({
            "session": inline_session(["m"; 4]),
            "checkpoint": "preflight",
            "selected_hunt_ids": [1, 2]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn notification_mark_read_round_trip() {
    let (state, base) = fixture().await;
    create_session(&state, "s1", TRAINER).await;
    ready_to_submit(&state, "s1").await;
    state.pipeline.submit_for_review("s1").await.unwrap();
    let client = reqwest::Client::new();

    // The reviewer received the submit notification.
    let list: Value = client
        .get(format!("{base}/api/notifications"))
        .header("X-Trainer-Email", REVIEWER)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["unread_count"], 1);
    let notif_id = list["notifications"][0]["id"].as_str().unwrap().to_string();

    let marked: Value = client
        .post(format!("{base}/api/notifications/{notif_id}/read"))
        .header("X-Trainer-Email", REVIEWER)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(marked["ok"], true);

    let count: Value = client
        .get(format!("{base}/api/notifications/unread-count"))
        .header("X-Trainer-Email", REVIEWER)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(count["unread_count"], 0);
}
