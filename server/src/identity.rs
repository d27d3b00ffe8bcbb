//! Trusted-header identity.
//!
//! Roles are asserted upstream; `X-Reviewer-Email` / `X-Trainer-Email`
//! carry the caller identity and the team directory maps it to a role.
//! Protected routes reject missing or unknown identities with 403.

use axum::http::HeaderMap;

use gauntlet_config::Role;
use gauntlet_config::TeamDirectory;

use crate::error::ApiError;

pub const REVIEWER_HEADER: &str = "x-reviewer-email";
pub const TRAINER_HEADER: &str = "x-trainer-email";
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
}

/// Caller identity from either identity header.
pub fn identity(headers: &HeaderMap) -> Option<String> {
    header_value(headers, REVIEWER_HEADER).or_else(|| header_value(headers, TRAINER_HEADER))
}

/// Trainer identity header, used by trainer-scoped listings and the
/// notification routes.
pub fn trainer_identity(headers: &HeaderMap) -> Option<String> {
    header_value(headers, TRAINER_HEADER).or_else(|| header_value(headers, REVIEWER_HEADER))
}

pub fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Require a caller whose role may review (reviewer, admin, or
/// super-admin). Returns the normalized email.
pub fn require_reviewer(team: &TeamDirectory, headers: &HeaderMap) -> Result<String, ApiError> {
    let Some(email) = identity(headers) else {
        return Err(ApiError::Forbidden(
            "Missing reviewer identity: set X-Reviewer-Email header".to_string(),
        ));
    };
    match team.role_of(&email) {
        Some(role) if role.can_review() => Ok(email),
        Some(_) | None => Err(ApiError::Forbidden(
            "Not an allowed reviewer. Contact admin to be added to the team directory.".to_string(),
        )),
    }
}

/// Require any known identity; returns the email and its role.
pub fn require_known(
    team: &TeamDirectory,
    headers: &HeaderMap,
) -> Result<(String, Role), ApiError> {
    let Some(email) = identity(headers) else {
        return Err(ApiError::Forbidden(
            "Missing identity: set X-Trainer-Email or X-Reviewer-Email header".to_string(),
        ));
    };
    match team.role_of(&email) {
        Some(role) => Ok((email, role)),
        None => Err(ApiError::Forbidden(format!(
            "Unknown identity '{email}'. Contact admin to be added to the team directory."
        ))),
    }
}
