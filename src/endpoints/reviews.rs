//! Ratings and reviews for scripts and giveaways.

use anyhow::{anyhow, Context as _};
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::is_unique_violation;
use crate::auth::AuthenticatedUser;
use crate::db::Db;
use crate::models::{GiveawayReview, ModerationStatus, ScriptReview};
use crate::{AppState, Error, Result};

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct CreateReview {
    rating: i64,
    comment: Option<String>,
}

fn validate_rating(rating: i64) -> Result<()> {
    if !(1..=5).contains(&rating) {
        return Err(Error::validation(anyhow!("rating must be between 1 and 5")));
    }
    Ok(())
}

/// Review a script. One review per reviewer email; updates the script's
/// rating aggregates in the same transaction.
/// - POST `/api/scripts/{id}/reviews`
async fn create_script_review(
    user: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(input): Json<CreateReview>,
) -> Result<Json<Value>> {
    validate_rating(input.rating)?;

    let status: Option<String> = sqlx::query_scalar("SELECT status FROM scripts WHERE id = ?")
        .bind(&id)
        .fetch_optional(&db)
        .await?;
    match status.as_deref() {
        None => return Err(Error::not_found(anyhow!("script not found"))),
        Some(s) if s != ModerationStatus::Approved.as_str() => {
            return Err(Error::validation(anyhow!("script is not approved")));
        }
        Some(_) => {}
    }

    let mut tx = db.begin().await.context("failed to begin transaction")?;

    let review_id = Uuid::new_v4().to_string();
    let inserted = sqlx::query_as::<_, ScriptReview>(
        r#"
        INSERT INTO script_reviews (id, script_id, reviewer_email, reviewer_name, rating, comment)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, script_id, reviewer_email, reviewer_name, rating, comment, created_at
        "#,
    )
    .bind(&review_id)
    .bind(&id)
    .bind(&user.email)
    .bind(&user.display_name)
    .bind(input.rating)
    .bind(&input.comment)
    .fetch_one(&mut *tx)
    .await;

    let review = match inserted {
        Ok(review) => review,
        Err(err) if is_unique_violation(&err) => {
            return Err(Error::validation(anyhow!(
                "you have already reviewed this script"
            )));
        }
        Err(err) => {
            return Err(anyhow::Error::new(err)
                .context("failed to insert review")
                .into());
        }
    };

    sqlx::query(
        "UPDATE scripts SET rating_sum = rating_sum + ?, rating_count = rating_count + 1 WHERE id = ?",
    )
    .bind(input.rating)
    .bind(&id)
    .execute(&mut *tx)
    .await
    .context("failed to update rating aggregates")?;

    tx.commit().await.context("failed to commit review")?;

    Ok(Json(json!({ "success": true, "review": review })))
}

/// List reviews for a script.
/// - GET `/api/scripts/{id}/reviews`
async fn list_script_reviews(
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let reviews = sqlx::query_as::<_, ScriptReview>(
        r#"
        SELECT id, script_id, reviewer_email, reviewer_name, rating, comment, created_at
        FROM script_reviews WHERE script_id = ? ORDER BY created_at DESC
        "#,
    )
    .bind(&id)
    .fetch_all(&db)
    .await?;

    Ok(Json(json!({ "success": true, "reviews": reviews })))
}

/// Review a giveaway. One review per reviewer email.
/// - POST `/api/giveaways/{id}/reviews`
async fn create_giveaway_review(
    user: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(input): Json<CreateReview>,
) -> Result<Json<Value>> {
    validate_rating(input.rating)?;

    let status: Option<String> = sqlx::query_scalar("SELECT status FROM giveaways WHERE id = ?")
        .bind(&id)
        .fetch_optional(&db)
        .await?;
    match status.as_deref() {
        None => return Err(Error::not_found(anyhow!("giveaway not found"))),
        Some(s) if s != ModerationStatus::Approved.as_str() => {
            return Err(Error::validation(anyhow!("giveaway is not approved")));
        }
        Some(_) => {}
    }

    let review_id = Uuid::new_v4().to_string();
    let inserted = sqlx::query_as::<_, GiveawayReview>(
        r#"
        INSERT INTO giveaway_reviews (id, giveaway_id, reviewer_email, reviewer_name, rating, comment)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, giveaway_id, reviewer_email, reviewer_name, rating, comment, created_at
        "#,
    )
    .bind(&review_id)
    .bind(&id)
    .bind(&user.email)
    .bind(&user.display_name)
    .bind(input.rating)
    .bind(&input.comment)
    .fetch_one(&db)
    .await;

    let review = match inserted {
        Ok(review) => review,
        Err(err) if is_unique_violation(&err) => {
            return Err(Error::validation(anyhow!(
                "you have already reviewed this giveaway"
            )));
        }
        Err(err) => {
            return Err(anyhow::Error::new(err)
                .context("failed to insert review")
                .into());
        }
    };

    Ok(Json(json!({ "success": true, "review": review })))
}

/// List reviews for a giveaway.
/// - GET `/api/giveaways/{id}/reviews`
async fn list_giveaway_reviews(
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let reviews = sqlx::query_as::<_, GiveawayReview>(
        r#"
        SELECT id, giveaway_id, reviewer_email, reviewer_name, rating, comment, created_at
        FROM giveaway_reviews WHERE giveaway_id = ? ORDER BY created_at DESC
        "#,
    )
    .bind(&id)
    .fetch_all(&db)
    .await?;

    Ok(Json(json!({ "success": true, "reviews": reviews })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/scripts/{id}/reviews",
            get(list_script_reviews).post(create_script_review),
        )
        .route(
            "/giveaways/{id}/reviews",
            get(list_giveaway_reviews).post(create_giveaway_review),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_bounds() {
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());
        assert!(validate_rating(-3).is_err());
    }
}
