//! End-to-end exercises of the review state machine over the embedded
//! store: CAS serialisation, preconditions, rounds, escalation, and the
//! notification/audit side effects.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use gauntlet_config::TaskIdentityConfig;
use gauntlet_config::TeamConfig;
use gauntlet_config::TeamDirectory;
use gauntlet_protocol::NotificationKind;
use gauntlet_protocol::ReviewEntry;
use gauntlet_protocol::ReviewStatus;
use gauntlet_protocol::ReviewerFeedback;
use gauntlet_protocol::SessionConfig;
use gauntlet_protocol::SessionNotebook;
use gauntlet_review::ReviewError;
use gauntlet_review::ReviewPipeline;
use gauntlet_session::AuditLog;
use gauntlet_session::NotificationStore;
use gauntlet_session::SessionRepository;
use gauntlet_session::Versioning;
use gauntlet_store::MemoryStore;

const TRAINER: &str = "t1@example.com";
const REVIEWER: &str = "rev@example.com";
const ADMIN: &str = "ada@example.com";

struct Fixture {
    repo: Arc<SessionRepository>,
    versioning: Arc<Versioning>,
    audit: Arc<AuditLog>,
    notifications: Arc<NotificationStore>,
    pipeline: Arc<ReviewPipeline>,
}

fn fixture(max_rounds: u32) -> Fixture {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let ttl = Duration::from_secs(14400);
    let repo = Arc::new(SessionRepository::new(
        store.clone(),
        ttl,
        TaskIdentityConfig::default(),
    ));
    let versioning = Arc::new(Versioning::new(store.clone(), ttl, Duration::from_secs(86400)));
    let audit = Arc::new(AuditLog::new(store.clone(), ttl));
    let notifications = Arc::new(NotificationStore::new(store));
    let team: TeamConfig = serde_yaml::from_str(
        r#"
super_admins:
  - { email: "root@example.com" }
admins:
  - { email: "ada@example.com", pods: ["pod-1"] }
pods:
  pod-1:
    reviewer: { email: "rev@example.com" }
    trainers: ["t1@example.com"]
"#,
    )
    .unwrap();
    let pipeline = Arc::new(ReviewPipeline::new(
        repo.clone(),
        versioning.clone(),
        audit.clone(),
        notifications.clone(),
        Arc::new(TeamDirectory::new(team)),
        max_rounds,
        4,
    ));
    Fixture {
        repo,
        versioning,
        audit,
        notifications,
        pipeline,
    }
}

async fn create_session(f: &Fixture, session_id: &str) {
    let notebook: SessionNotebook = serde_json::from_value(json!({
        "prompt": "Write a haiku.",
        "response_reference": "C1: three lines",
        "metadata": { "Task ID": format!("TASK-{session_id}") }
    }))
    .unwrap();
    f.repo
        .create(session_id, &notebook, &SessionConfig::default(), Some(TRAINER))
        .await
        .unwrap();
}

async fn complete_reviews(f: &Fixture, session_id: &str) {
    let reviews: BTreeMap<String, ReviewEntry> = (1..=4u32)
        .map(|i| {
            (
                i.to_string(),
                serde_json::from_value(json!({
                    "judgment": "pass",
                    "grading_basis": "criteria",
                    "explanation": format!("slot {i} meets C1"),
                    "submitted": true
                }))
                .unwrap(),
            )
        })
        .collect();
    f.repo.set_reviews(session_id, &reviews).await.unwrap();
}

/// Drive a fresh draft session to `submitted`.
async fn submitted_session(f: &Fixture, session_id: &str) {
    create_session(f, session_id).await;
    complete_reviews(f, session_id).await;
    f.pipeline.mark_qc_done(session_id).await.unwrap();
    f.pipeline.submit_for_review(session_id).await.unwrap();
}

fn feedback(comment: &str) -> ReviewerFeedback {
    serde_json::from_value(json!({ "overall_comment": comment })).unwrap()
}

#[tokio::test]
async fn submit_without_qc_is_rejected() {
    let f = fixture(3);
    create_session(&f, "s1").await;
    complete_reviews(&f, "s1").await;
    let version_before = f.versioning.get_version("s1").await.unwrap();

    let err = f.pipeline.submit_for_review("s1").await.unwrap_err();
    match err {
        ReviewError::PreconditionFailed(message) => {
            assert!(message.contains("Complete the Quality Check"), "{message}");
        }
        other => panic!("expected precondition failure, got {other:?}"),
    }
    assert_eq!(
        f.repo.get_review_status("s1").await.unwrap(),
        ReviewStatus::Draft
    );
    assert_eq!(f.versioning.get_version("s1").await.unwrap(), version_before);
}

#[tokio::test]
async fn submit_requires_four_reviews() {
    let f = fixture(3);
    create_session(&f, "s1").await;
    f.pipeline.mark_qc_done("s1").await.unwrap();
    let err = f.pipeline.submit_for_review("s1").await.unwrap_err();
    assert!(matches!(err, ReviewError::PreconditionFailed(ref m) if m.contains("4 human reviews")));
}

#[tokio::test]
async fn submit_increments_round_and_version_and_notifies_reviewer() {
    let f = fixture(3);
    create_session(&f, "s1").await;
    complete_reviews(&f, "s1").await;
    f.pipeline.mark_qc_done("s1").await.unwrap();

    let outcome = f.pipeline.submit_for_review("s1").await.unwrap();
    assert_eq!(outcome.review_status, ReviewStatus::Submitted);
    assert_eq!(outcome.review_round, 1);
    assert!(outcome.version > 0);

    // History snapshot for round 1 exists.
    let history = f.versioning.version_history("s1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["round"], 1);

    // Audit trail records the transition.
    let audit = f.audit.entries("s1", 10).await.unwrap();
    assert_eq!(audit[0].action, "submitted");

    // The pod's reviewer hears about it.
    let inbox = f.notifications.list(REVIEWER, false, 10).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].kind, NotificationKind::TaskSubmitted);
    assert_eq!(inbox[0].task_display_id, "TASK-s1");
}

#[tokio::test]
async fn duplicate_submit_conflicts_with_observed_state() {
    let f = fixture(3);
    submitted_session(&f, "s1").await;
    let err = f.pipeline.submit_for_review("s1").await.unwrap_err();
    match err {
        ReviewError::Conflict { current, message } => {
            assert_eq!(current, ReviewStatus::Submitted);
            assert!(message.contains("Only drafts can be submitted"));
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_approves_serialise_on_cas() {
    let f = fixture(3);
    submitted_session(&f, "s1").await;

    let first = {
        let pipeline = f.pipeline.clone();
        tokio::spawn(async move { pipeline.approve("s1", REVIEWER, None).await })
    };
    let second = {
        let pipeline = f.pipeline.clone();
        tokio::spawn(async move { pipeline.approve("s1", REVIEWER, None).await })
    };
    let results = [first.await.unwrap(), second.await.unwrap()];

    let ok_count = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok_count, 1, "exactly one approve must win");
    let loser = results.into_iter().find(Result::is_err).unwrap().unwrap_err();
    match loser {
        ReviewError::Conflict { current, .. } => assert_eq!(current, ReviewStatus::Approved),
        other => panic!("loser should see a conflict, got {other:?}"),
    }
    assert_eq!(
        f.repo.get_review_status("s1").await.unwrap(),
        ReviewStatus::Approved
    );
}

#[tokio::test]
async fn return_clears_qc_and_blocks_unacknowledged_resubmit() {
    let f = fixture(3);
    submitted_session(&f, "s1").await;
    f.pipeline
        .return_task("s1", REVIEWER, Some(&feedback("Fix slot 2.")))
        .await
        .unwrap();

    assert!(!f.repo.get_qc_done("s1").await.unwrap());
    assert_eq!(
        f.repo.get_review_status("s1").await.unwrap(),
        ReviewStatus::Returned
    );

    // QC not redone yet.
    let err = f.pipeline.resubmit("s1").await.unwrap_err();
    assert!(matches!(err, ReviewError::PreconditionFailed(ref m) if m.contains("Re-run Quality Check")));

    // QC redone but feedback not acknowledged.
    f.pipeline.mark_qc_done("s1").await.unwrap();
    let err = f.pipeline.resubmit("s1").await.unwrap_err();
    assert!(matches!(err, ReviewError::PreconditionFailed(ref m) if m.contains("Acknowledge reviewer feedback")));

    // The trainer sees the return notification.
    let inbox = f.notifications.list(TRAINER, true, 10).await.unwrap();
    assert_eq!(inbox[0].kind, NotificationKind::TaskReturned);
}

#[tokio::test]
async fn resubmit_archives_feedback_and_resets_acknowledgement() {
    let f = fixture(3);
    submitted_session(&f, "s1").await;
    f.pipeline
        .return_task("s1", REVIEWER, Some(&feedback("Slot 2 grade is wrong.")))
        .await
        .unwrap();
    f.pipeline.acknowledge("s1").await.unwrap();
    f.pipeline.mark_qc_done("s1").await.unwrap();

    let outcome = f.pipeline.resubmit("s1").await.unwrap();
    assert_eq!(outcome.review_status, ReviewStatus::Submitted);
    assert_eq!(outcome.review_round, 2);

    // Prior feedback is the last archive element; current feedback and
    // acknowledgement are reset.
    assert_eq!(f.repo.get_feedback("s1").await.unwrap(), None);
    let archive = f.repo.feedback_archive("s1").await.unwrap();
    assert_eq!(
        archive.last().unwrap().overall_comment,
        "Slot 2 grade is wrong."
    );
    assert_eq!(f.versioning.acknowledged_at("s1").await.unwrap(), None);
}

#[tokio::test]
async fn acknowledge_only_applies_to_returned_tasks() {
    let f = fixture(3);
    submitted_session(&f, "s1").await;
    let err = f.pipeline.acknowledge("s1").await.unwrap_err();
    assert!(matches!(err, ReviewError::PreconditionFailed(ref m) if m.contains("'submitted'")));
}

#[tokio::test]
async fn escalation_after_max_rounds() {
    let f = fixture(3);
    submitted_session(&f, "s1").await;

    // Two full return/resubmit cycles bring the round to 3.
    for _ in 0..2 {
        f.pipeline
            .return_task("s1", REVIEWER, Some(&feedback("again")))
            .await
            .unwrap();
        f.pipeline.acknowledge("s1").await.unwrap();
        f.pipeline.mark_qc_done("s1").await.unwrap();
        f.pipeline.resubmit("s1").await.unwrap();
    }
    assert_eq!(f.repo.get_review_round("s1").await.unwrap(), 3);

    // A third return and resubmit would be round 4 > max 3: escalate.
    f.pipeline
        .return_task("s1", REVIEWER, Some(&feedback("still wrong")))
        .await
        .unwrap();
    f.pipeline.acknowledge("s1").await.unwrap();
    f.pipeline.mark_qc_done("s1").await.unwrap();
    let outcome = f.pipeline.resubmit("s1").await.unwrap();
    assert!(outcome.escalated);
    assert_eq!(outcome.review_status, ReviewStatus::Escalated);
    assert_eq!(outcome.review_round, 4);

    // Admins and super-admins are notified.
    for admin in [ADMIN, "root@example.com"] {
        let inbox = f.notifications.list(admin, false, 10).await.unwrap();
        assert_eq!(inbox.len(), 1, "{admin} should hear about the escalation");
        assert_eq!(inbox[0].kind, NotificationKind::TaskEscalated);
        assert!(inbox[0].message.contains("exceeded 3 review rounds"));
    }

    // A plain reviewer cannot act on the escalated task.
    let err = f.pipeline.approve("s1", REVIEWER, None).await.unwrap_err();
    assert!(matches!(err, ReviewError::Forbidden(_)));

    // An admin can.
    let outcome = f.pipeline.approve("s1", ADMIN, None).await.unwrap();
    assert_eq!(outcome.review_status, ReviewStatus::Approved);
}

#[tokio::test]
async fn admin_may_return_an_escalated_task() {
    let f = fixture(1);
    submitted_session(&f, "s1").await;
    f.pipeline
        .return_task("s1", REVIEWER, Some(&feedback("fix")))
        .await
        .unwrap();
    f.pipeline.acknowledge("s1").await.unwrap();
    f.pipeline.mark_qc_done("s1").await.unwrap();
    let outcome = f.pipeline.resubmit("s1").await.unwrap();
    assert!(outcome.escalated);

    let outcome = f
        .pipeline
        .return_task("s1", ADMIN, Some(&feedback("one more pass")))
        .await
        .unwrap();
    assert_eq!(outcome.review_status, ReviewStatus::Returned);
    assert!(!f.repo.get_qc_done("s1").await.unwrap());
}

#[tokio::test]
async fn terminal_states_refuse_further_review() {
    let f = fixture(3);
    submitted_session(&f, "s1").await;
    f.pipeline.approve("s1", REVIEWER, Some("nice work")).await.unwrap();

    let err = f.pipeline.reject("s1", REVIEWER, None).await.unwrap_err();
    match err {
        ReviewError::Conflict { current, message } => {
            assert_eq!(current, ReviewStatus::Approved);
            assert!(message.contains("Only submitted or escalated tasks can be reviewed"));
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    // The approval comment landed in feedback.
    let feedback = f.repo.get_feedback("s1").await.unwrap().unwrap();
    assert_eq!(feedback.approval_comment, "nice work");
}

#[tokio::test]
async fn version_is_monotonic_across_transitions() {
    let f = fixture(3);
    create_session(&f, "s1").await;
    complete_reviews(&f, "s1").await;

    let mut last = f.versioning.get_version("s1").await.unwrap();
    f.pipeline.mark_qc_done("s1").await.unwrap();
    for step in ["qc", "submit", "return", "ack", "qc2", "resubmit"] {
        match step {
            "qc" | "qc2" => {}
            "submit" => {
                f.pipeline.submit_for_review("s1").await.unwrap();
            }
            "return" => {
                f.pipeline.return_task("s1", REVIEWER, None).await.unwrap();
            }
            "ack" => {
                f.pipeline.acknowledge("s1").await.unwrap();
            }
            "resubmit" => {
                f.pipeline.mark_qc_done("s1").await.unwrap();
                f.pipeline.resubmit("s1").await.unwrap();
            }
            _ => unreachable!(),
        }
        let version = f.versioning.get_version("s1").await.unwrap();
        assert!(version >= last, "version regressed at {step}");
        last = version;
    }
    assert!(last >= 4);
}

#[tokio::test]
async fn bulk_resubmit_reports_per_item_outcomes() {
    let f = fixture(3);

    // s1 is properly returned, acknowledged, and QC'd.
    submitted_session(&f, "s1").await;
    f.pipeline.return_task("s1", REVIEWER, None).await.unwrap();
    f.pipeline.acknowledge("s1").await.unwrap();
    f.pipeline.mark_qc_done("s1").await.unwrap();

    // s2 is still a draft; s3 does not exist.
    create_session(&f, "s2").await;

    let outcome = f
        .pipeline
        .bulk_resubmit(&["s1".to_string(), "s2".to_string(), "s3".to_string()])
        .await
        .unwrap();
    assert_eq!(outcome.succeeded, ["s1"]);
    assert_eq!(outcome.failed.len(), 2);
    assert_eq!(outcome.failed[1].session_id, "s3");
    assert_eq!(outcome.failed[1].reason, "Session not found");
}

#[tokio::test]
async fn bulk_actions_enforce_the_batch_cap() {
    let f = fixture(3);
    let ids: Vec<String> = (0..5).map(|i| format!("s{i}")).collect();
    let err = f.pipeline.bulk_resubmit(&ids).await.unwrap_err();
    assert!(matches!(err, ReviewError::Validation(ref m) if m.contains("Max 4 tasks per batch")));

    let err = f.pipeline.bulk_approve(&[], REVIEWER, None).await.unwrap_err();
    assert!(matches!(err, ReviewError::Validation(ref m) if m.contains("No session_ids")));
}
