use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::info;
use tracing::warn;

use gauntlet_config::TeamDirectory;
use gauntlet_protocol::NotificationKind;
use gauntlet_protocol::ReviewStatus;
use gauntlet_protocol::ReviewerFeedback;
use gauntlet_session::AuditLog;
use gauntlet_session::NotificationStore;
use gauntlet_session::SessionRepository;
use gauntlet_session::Versioning;
use gauntlet_session::safe_notify;
use gauntlet_store::CasOutcome;

use crate::error::ReviewError;

type Result<T> = std::result::Result<T, ReviewError>;

/// Result of a successful transition, echoed to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    pub review_status: ReviewStatus,
    pub review_round: u32,
    pub version: u64,
    pub escalated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkFailure {
    pub session_id: String,
    pub reason: String,
}

/// Per-item outcome of a bulk action; partial success is the default
/// result shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<BulkFailure>,
}

/// Coordinates review-state transitions over the session services.
pub struct ReviewPipeline {
    repo: Arc<SessionRepository>,
    versioning: Arc<Versioning>,
    audit: Arc<AuditLog>,
    notifications: Arc<NotificationStore>,
    team: Arc<TeamDirectory>,
    max_rounds: u32,
    bulk_max: usize,
}

impl ReviewPipeline {
    pub fn new(
        repo: Arc<SessionRepository>,
        versioning: Arc<Versioning>,
        audit: Arc<AuditLog>,
        notifications: Arc<NotificationStore>,
        team: Arc<TeamDirectory>,
        max_rounds: u32,
        bulk_max: usize,
    ) -> Self {
        Self {
            repo,
            versioning,
            audit,
            notifications,
            team,
            max_rounds,
            bulk_max,
        }
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    async fn require_session(&self, session_id: &str) -> Result<()> {
        if self.repo.exists(session_id).await? {
            Ok(())
        } else {
            Err(ReviewError::NotFound)
        }
    }

    async fn outcome(
        &self,
        session_id: &str,
        review_status: ReviewStatus,
        escalated: bool,
    ) -> Result<TransitionOutcome> {
        Ok(TransitionOutcome {
            review_status,
            review_round: self.repo.get_review_round(session_id).await?,
            version: self.versioning.get_version(session_id).await?,
            escalated,
        })
    }

    // ---- trainer transitions ----

    /// `draft -> submitted`. Requires four completed reviews and a
    /// passed QC.
    pub async fn submit_for_review(&self, session_id: &str) -> Result<TransitionOutcome> {
        self.require_session(session_id).await?;
        if self.repo.review_count(session_id).await? < 4 {
            return Err(ReviewError::PreconditionFailed(
                "Complete all 4 human reviews before submitting for review.".to_string(),
            ));
        }
        if !self.repo.get_qc_done(session_id).await? {
            return Err(ReviewError::PreconditionFailed(
                "Complete the Quality Check (Proceed to QC) before submitting for review.".to_string(),
            ));
        }
        match self
            .repo
            .cas_review_status(session_id, ReviewStatus::Draft, ReviewStatus::Submitted)
            .await?
        {
            CasOutcome::Swapped => {}
            CasOutcome::Conflict { current } => {
                let current = observed_status(current);
                return Err(ReviewError::conflict(
                    current,
                    format!("Cannot submit: task is currently '{current}'. Only drafts can be submitted."),
                ));
            }
        }
        let round = self.repo.incr_review_round(session_id).await?;
        self.versioning.incr_version(session_id).await?;
        self.versioning.snapshot_for_history(session_id, round).await?;
        self.audit.append(session_id, "submitted", "trainer", None).await?;
        self.repo.touch(session_id).await?;
        safe_notify(
            self.notify_reviewer(
                session_id,
                NotificationKind::TaskSubmitted,
                "A new task has been submitted for your review.",
            ),
            &format!("submit notification for {session_id}"),
        )
        .await;
        info!("session {session_id} submitted for review (round {round})");
        self.outcome(session_id, ReviewStatus::Submitted, false).await
    }

    /// `returned -> submitted`, or `returned -> escalated` when the
    /// next round would exceed the configured maximum. Requires a fresh
    /// QC pass and an acknowledged return.
    pub async fn resubmit(&self, session_id: &str) -> Result<TransitionOutcome> {
        self.require_session(session_id).await?;
        if !self.repo.get_qc_done(session_id).await? {
            return Err(ReviewError::PreconditionFailed(
                "Re-run Quality Check before resubmitting. Reviews may have changed since last QC.".to_string(),
            ));
        }
        if self.versioning.acknowledged_at(session_id).await?.is_none() {
            return Err(ReviewError::PreconditionFailed(
                "Acknowledge reviewer feedback before resubmitting.".to_string(),
            ));
        }

        let next_round = self.repo.get_review_round(session_id).await? + 1;
        if next_round > self.max_rounds {
            match self
                .repo
                .cas_review_status(session_id, ReviewStatus::Returned, ReviewStatus::Escalated)
                .await?
            {
                CasOutcome::Swapped => {}
                CasOutcome::Conflict { current } => {
                    let current = observed_status(current);
                    return Err(ReviewError::conflict(
                        current,
                        format!("Cannot resubmit: task is currently '{current}'."),
                    ));
                }
            }
            self.finish_resubmit(session_id).await?;
            self.repo.incr_review_round(session_id).await?;
            self.versioning.incr_version(session_id).await?;
            self.audit
                .append(
                    session_id,
                    "escalated",
                    "trainer",
                    Some(json!({ "reason": format!("Max rounds ({}) exceeded", self.max_rounds) })),
                )
                .await?;
            self.repo.touch(session_id).await?;
            self.notify_escalation(session_id, next_round).await;
            info!(
                "session {session_id} escalated to admin (round {next_round} > max {})",
                self.max_rounds
            );
            return self.outcome(session_id, ReviewStatus::Escalated, true).await;
        }

        match self
            .repo
            .cas_review_status(session_id, ReviewStatus::Returned, ReviewStatus::Submitted)
            .await?
        {
            CasOutcome::Swapped => {}
            CasOutcome::Conflict { current } => {
                let current = observed_status(current);
                return Err(ReviewError::conflict(
                    current,
                    format!(
                        "Cannot resubmit: task is currently '{current}'. Only returned tasks can be resubmitted."
                    ),
                ));
            }
        }
        self.finish_resubmit(session_id).await?;
        self.repo.incr_review_round(session_id).await?;
        self.versioning.incr_version(session_id).await?;
        self.versioning
            .snapshot_for_history(session_id, next_round)
            .await?;
        self.audit
            .append(session_id, "resubmitted", "trainer", None)
            .await?;
        self.repo.touch(session_id).await?;
        safe_notify(
            self.notify_reviewer(
                session_id,
                NotificationKind::TaskResubmitted,
                "A task has been fixed and resubmitted for your review.",
            ),
            &format!("resubmit notification for {session_id}"),
        )
        .await;
        info!("session {session_id} resubmitted for review round {next_round} (feedback archived)");
        self.outcome(session_id, ReviewStatus::Submitted, false).await
    }

    /// Post-CAS resubmit bookkeeping: archive the reviewer's feedback,
    /// stamp the resubmit, and reset the acknowledgement.
    async fn finish_resubmit(&self, session_id: &str) -> Result<()> {
        self.repo.archive_and_clear_feedback(session_id).await?;
        self.repo.set_resubmitted_at(session_id).await?;
        self.versioning.clear_acknowledged(session_id).await?;
        Ok(())
    }

    /// Trainer acknowledges the reviewer's feedback on a returned task.
    pub async fn acknowledge(&self, session_id: &str) -> Result<String> {
        self.require_session(session_id).await?;
        let status = self.repo.get_review_status(session_id).await?;
        if status != ReviewStatus::Returned {
            return Err(ReviewError::PreconditionFailed(format!(
                "Can only acknowledge when status is 'returned'. Current: '{status}'."
            )));
        }
        let ts = self.versioning.set_acknowledged(session_id).await?;
        self.versioning.incr_version(session_id).await?;
        self.audit
            .append(session_id, "acknowledged", "trainer", None)
            .await?;
        Ok(ts)
    }

    pub async fn mark_qc_done(&self, session_id: &str) -> Result<()> {
        self.require_session(session_id).await?;
        self.repo.set_qc_done(session_id).await?;
        self.versioning.incr_version(session_id).await?;
        info!("session {session_id}: QC marked done");
        Ok(())
    }

    // ---- reviewer transitions ----

    /// Submitted tasks are reviewable by any reviewer; escalated tasks
    /// only by admins. Returns the state the transition must CAS from.
    async fn validated_reviewable(
        &self,
        session_id: &str,
        reviewer_email: &str,
    ) -> Result<ReviewStatus> {
        self.require_session(session_id).await?;
        let current = self.repo.get_review_status(session_id).await?;
        match current {
            ReviewStatus::Submitted => Ok(current),
            ReviewStatus::Escalated => {
                let role = self.team.role_of(reviewer_email);
                if role.is_some_and(|r| r.can_act_on_escalated()) {
                    Ok(current)
                } else {
                    Err(ReviewError::Forbidden(
                        "Task is escalated. Only admins can act on escalated tasks.".to_string(),
                    ))
                }
            }
            other => Err(ReviewError::conflict(
                other,
                format!("Task is '{other}'. Only submitted or escalated tasks can be reviewed."),
            )),
        }
    }

    async fn cas_from_reviewable(
        &self,
        session_id: &str,
        expected: ReviewStatus,
        new: ReviewStatus,
    ) -> Result<()> {
        match self.repo.cas_review_status(session_id, expected, new).await? {
            CasOutcome::Swapped => Ok(()),
            CasOutcome::Conflict { current } => {
                let current = observed_status(current);
                Err(ReviewError::conflict(
                    current,
                    format!(
                        "Conflict: task status changed to '{current}' before your action completed. Refresh and try again."
                    ),
                ))
            }
        }
    }

    /// `submitted|escalated -> approved` (terminal).
    pub async fn approve(
        &self,
        session_id: &str,
        reviewer_email: &str,
        comment: Option<&str>,
    ) -> Result<TransitionOutcome> {
        let current = self.validated_reviewable(session_id, reviewer_email).await?;
        self.cas_from_reviewable(session_id, current, ReviewStatus::Approved)
            .await?;
        if let Some(comment) = comment.map(str::trim).filter(|c| !c.is_empty()) {
            let mut feedback = self
                .repo
                .get_feedback(session_id)
                .await?
                .unwrap_or_default();
            feedback.approval_comment = comment.to_string();
            self.repo.set_feedback(session_id, &feedback).await?;
        }
        self.versioning.incr_version(session_id).await?;
        self.audit
            .append(session_id, "approved", reviewer_email, None)
            .await?;
        safe_notify(
            self.notify_trainer(
                session_id,
                NotificationKind::TaskApproved,
                "Your task has been approved by the reviewer.",
            ),
            &format!("approve notification for {session_id}"),
        )
        .await;
        self.outcome(session_id, ReviewStatus::Approved, false).await
    }

    /// `submitted|escalated -> returned`. Saves the feedback body and
    /// clears QC so the trainer must re-run it before resubmitting.
    pub async fn return_task(
        &self,
        session_id: &str,
        reviewer_email: &str,
        feedback: Option<&ReviewerFeedback>,
    ) -> Result<TransitionOutcome> {
        let current = self.validated_reviewable(session_id, reviewer_email).await?;
        if let Some(feedback) = feedback {
            self.repo.set_feedback(session_id, feedback).await?;
        }
        self.cas_from_reviewable(session_id, current, ReviewStatus::Returned)
            .await?;
        self.repo.clear_qc_done(session_id).await?;
        self.versioning.incr_version(session_id).await?;
        self.audit
            .append(session_id, "returned", reviewer_email, None)
            .await?;
        safe_notify(
            self.notify_trainer(
                session_id,
                NotificationKind::TaskReturned,
                "Your task has been returned with comments. Please review and fix.",
            ),
            &format!("return notification for {session_id}"),
        )
        .await;
        self.outcome(session_id, ReviewStatus::Returned, false).await
    }

    /// `submitted|escalated -> rejected` (terminal).
    pub async fn reject(
        &self,
        session_id: &str,
        reviewer_email: &str,
        feedback: Option<&ReviewerFeedback>,
    ) -> Result<TransitionOutcome> {
        let current = self.validated_reviewable(session_id, reviewer_email).await?;
        if let Some(feedback) = feedback {
            self.repo.set_feedback(session_id, feedback).await?;
        }
        self.cas_from_reviewable(session_id, current, ReviewStatus::Rejected)
            .await?;
        self.versioning.incr_version(session_id).await?;
        self.audit
            .append(session_id, "rejected", reviewer_email, None)
            .await?;
        safe_notify(
            self.notify_trainer(
                session_id,
                NotificationKind::TaskRejected,
                "Your task has been rejected by the reviewer.",
            ),
            &format!("reject notification for {session_id}"),
        )
        .await;
        self.outcome(session_id, ReviewStatus::Rejected, false).await
    }

    // ---- bulk operations ----

    fn check_batch(&self, session_ids: &[String]) -> Result<()> {
        if session_ids.is_empty() {
            return Err(ReviewError::Validation("No session_ids provided".to_string()));
        }
        if session_ids.len() > self.bulk_max {
            return Err(ReviewError::Validation(format!(
                "Max {} tasks per batch. Got {}.",
                self.bulk_max,
                session_ids.len()
            )));
        }
        Ok(())
    }

    pub async fn bulk_approve(
        &self,
        session_ids: &[String],
        reviewer_email: &str,
        comment: Option<&str>,
    ) -> Result<BulkOutcome> {
        self.check_batch(session_ids)?;
        let mut outcome = BulkOutcome::default();
        for session_id in session_ids {
            match self.approve(session_id, reviewer_email, comment).await {
                Ok(_) => outcome.succeeded.push(session_id.clone()),
                Err(err) => outcome.failed.push(BulkFailure {
                    session_id: session_id.clone(),
                    reason: err.to_string(),
                }),
            }
        }
        Ok(outcome)
    }

    pub async fn bulk_resubmit(&self, session_ids: &[String]) -> Result<BulkOutcome> {
        self.check_batch(session_ids)?;
        let mut outcome = BulkOutcome::default();
        for session_id in session_ids {
            match self.resubmit(session_id).await {
                Ok(_) => outcome.succeeded.push(session_id.clone()),
                Err(err) => outcome.failed.push(BulkFailure {
                    session_id: session_id.clone(),
                    reason: err.to_string(),
                }),
            }
        }
        Ok(outcome)
    }

    // ---- notification routing ----

    async fn notify_trainer(
        &self,
        session_id: &str,
        kind: NotificationKind,
        message: &str,
    ) -> gauntlet_store::Result<()> {
        let Some(trainer) = self.repo.trainer_email(session_id).await? else {
            return Ok(());
        };
        let display_id = self.repo.task_display_id(session_id).await?;
        self.notifications
            .notify(&trainer, kind, session_id, message, &display_id)
            .await
    }

    async fn notify_reviewer(
        &self,
        session_id: &str,
        kind: NotificationKind,
        message: &str,
    ) -> gauntlet_store::Result<()> {
        let Some(trainer) = self.repo.trainer_email(session_id).await? else {
            return Ok(());
        };
        let Some(reviewer) = self.team.reviewer_for_trainer(&trainer) else {
            return Ok(());
        };
        let display_id = self.repo.task_display_id(session_id).await?;
        self.notifications
            .notify(&reviewer, kind, session_id, message, &display_id)
            .await
    }

    /// Escalations notify every admin and super-admin. Failures are
    /// swallowed so the escalation CAS is never rolled back.
    async fn notify_escalation(&self, session_id: &str, round: u32) {
        let message = format!(
            "Task escalated: exceeded {} review rounds (currently round {round}). Needs admin decision.",
            self.max_rounds
        );
        let display_id = match self.repo.task_display_id(session_id).await {
            Ok(display_id) => display_id,
            Err(err) => {
                warn!("failed to resolve display id for escalation of {session_id}: {err}");
                String::new()
            }
        };
        for email in self.team.admin_emails() {
            safe_notify(
                self.notifications.notify(
                    &email,
                    NotificationKind::TaskEscalated,
                    session_id,
                    &message,
                    &display_id,
                ),
                &format!("escalation notification for {session_id}"),
            )
            .await;
        }
    }
}

/// Parse the state a CAS observed; an absent or unknown value reads as
/// draft.
fn observed_status(current: Option<String>) -> ReviewStatus {
    current
        .as_deref()
        .and_then(|s| ReviewStatus::from_str(s).ok())
        .unwrap_or(ReviewStatus::Draft)
}
