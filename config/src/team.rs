//! Team directory: who holds which role, and which pod they belong to.
//!
//! Roles are asserted upstream via trusted identity headers; this
//! module only maps emails to roles and pods for queue scoping and
//! notification routing. All email comparisons are case-insensitive.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Reviewer,
    Trainer,
}

impl Role {
    /// Admins and super-admins may act on escalated tasks.
    pub fn can_act_on_escalated(self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin)
    }

    pub fn can_review(self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin | Role::Reviewer)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdminMember {
    pub email: String,
    #[serde(default)]
    pub pods: Vec<String>,
}

/// A group of trainers with a designated reviewer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub reviewer: Option<Member>,
    #[serde(default)]
    pub trainers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamConfig {
    pub super_admins: Vec<Member>,
    pub admins: Vec<AdminMember>,
    pub pods: BTreeMap<String, Pod>,
}

/// Which sessions an identity may see in queue listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueScope {
    /// Super-admins see everything.
    All,
    /// Sessions whose trainer is in this set.
    Trainers(BTreeSet<String>),
    /// Trainers see only their own sessions.
    SelfOnly(String),
}

impl QueueScope {
    pub fn permits(&self, trainer_email: Option<&str>) -> bool {
        match self {
            QueueScope::All => true,
            QueueScope::Trainers(allowed) => {
                trainer_email.is_some_and(|email| allowed.contains(&normalize(email)))
            }
            QueueScope::SelfOnly(own) => {
                trainer_email.is_some_and(|email| normalize(email) == *own)
            }
        }
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Lookup view over a [`TeamConfig`].
#[derive(Debug, Clone)]
pub struct TeamDirectory {
    config: TeamConfig,
}

impl TeamDirectory {
    pub fn new(config: TeamConfig) -> Self {
        Self { config }
    }

    /// Highest role for an email: super_admin > admin > reviewer >
    /// trainer. `None` for unknown identities.
    pub fn role_of(&self, email: &str) -> Option<Role> {
        let email = normalize(email);
        if email.is_empty() {
            return None;
        }
        if self
            .config
            .super_admins
            .iter()
            .any(|m| normalize(&m.email) == email)
        {
            return Some(Role::SuperAdmin);
        }
        if self
            .config
            .admins
            .iter()
            .any(|m| normalize(&m.email) == email)
        {
            return Some(Role::Admin);
        }
        for pod in self.config.pods.values() {
            if pod
                .reviewer
                .as_ref()
                .is_some_and(|r| normalize(&r.email) == email)
            {
                return Some(Role::Reviewer);
            }
            if pod.trainers.iter().any(|t| normalize(t) == email) {
                return Some(Role::Trainer);
            }
        }
        None
    }

    /// Pod a reviewer or trainer belongs to. Admins span pods and
    /// return `None` here.
    pub fn pod_for(&self, email: &str) -> Option<&str> {
        let email = normalize(email);
        match self.role_of(&email) {
            Some(Role::Reviewer | Role::Trainer) => {}
            _ => return None,
        }
        for (pod_id, pod) in &self.config.pods {
            let is_reviewer = pod
                .reviewer
                .as_ref()
                .is_some_and(|r| normalize(&r.email) == email);
            if is_reviewer || pod.trainers.iter().any(|t| normalize(t) == email) {
                return Some(pod_id);
            }
        }
        None
    }

    pub fn reviewer_for_pod(&self, pod_id: &str) -> Option<String> {
        self.config
            .pods
            .get(pod_id)?
            .reviewer
            .as_ref()
            .map(|r| normalize(&r.email))
            .filter(|email| !email.is_empty())
    }

    pub fn trainers_in_pod(&self, pod_id: &str) -> Vec<String> {
        self.config
            .pods
            .get(pod_id)
            .map(|pod| {
                pod.trainers
                    .iter()
                    .map(|t| normalize(t))
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn pods_for_admin(&self, email: &str) -> Vec<String> {
        let email = normalize(email);
        self.config
            .admins
            .iter()
            .find(|m| normalize(&m.email) == email)
            .map(|m| m.pods.clone())
            .unwrap_or_default()
    }

    /// The reviewer responsible for a trainer, via the trainer's pod.
    pub fn reviewer_for_trainer(&self, trainer_email: &str) -> Option<String> {
        let pod_id = self.pod_for(trainer_email)?;
        self.reviewer_for_pod(pod_id)
    }

    /// Everyone notified about escalations.
    pub fn admin_emails(&self) -> Vec<String> {
        let mut emails: BTreeSet<String> = BTreeSet::new();
        for member in &self.config.super_admins {
            let email = normalize(&member.email);
            if !email.is_empty() {
                emails.insert(email);
            }
        }
        for member in &self.config.admins {
            let email = normalize(&member.email);
            if !email.is_empty() {
                emails.insert(email);
            }
        }
        emails.into_iter().collect()
    }

    /// Queue scoping per role. `None` for unknown identities, which
    /// protected routes reject.
    pub fn queue_scope(&self, email: &str) -> Option<QueueScope> {
        let normalized = normalize(email);
        match self.role_of(&normalized)? {
            Role::SuperAdmin => Some(QueueScope::All),
            Role::Admin => {
                let mut trainers = BTreeSet::new();
                for pod_id in self.pods_for_admin(&normalized) {
                    trainers.extend(self.trainers_in_pod(&pod_id));
                }
                Some(QueueScope::Trainers(trainers))
            }
            Role::Reviewer => {
                let trainers = self
                    .pod_for(&normalized)
                    .map(|pod_id| self.trainers_in_pod(pod_id).into_iter().collect())
                    .unwrap_or_default();
                Some(QueueScope::Trainers(trainers))
            }
            Role::Trainer => Some(QueueScope::SelfOnly(normalized)),
        }
    }
}
