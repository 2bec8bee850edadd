use anyhow::anyhow;
use axum::Router;

use crate::config::AppConfig;
use crate::models::{User, MODERATOR_ROLES};
use crate::{AppState, Error, Result};

mod ads;
mod giveaways;
mod reviews;
mod scripts;
mod uploads;
mod users;

pub fn routes(config: &AppConfig) -> Router<AppState> {
    Router::new()
        .merge(scripts::routes())
        .merge(giveaways::routes())
        .merge(ads::routes())
        .merge(reviews::routes())
        .merge(users::routes())
        .merge(uploads::routes(config))
}

/// Reject callers that are not allowed to act on the moderation queue.
fn require_moderator(user: &User) -> Result<()> {
    if user.has_any(MODERATOR_ROLES) {
        Ok(())
    } else {
        Err(Error::forbidden(anyhow!(
            "moderation requires the admin or founder role"
        )))
    }
}

/// Ownership-scoped mutation: admins and founders may touch anything,
/// everyone else only content they own.
fn can_mutate(user: &User, owner_id: &str, owner_email: &str) -> bool {
    user.has_any(MODERATOR_ROLES) || user.id == owner_id || user.email == owner_email
}

/// Validate a required string field, returning its trimmed value.
fn required<'v>(value: &'v str, name: &str) -> Result<&'v str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(anyhow!("{name} is required")));
    }
    Ok(trimmed)
}

/// Whether the database rejected a write because of a UNIQUE constraint.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
