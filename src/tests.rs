//! HTTP-level tests for the marketplace API.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use figment::{providers::Format as _, Figment};
use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::SESSION_COOKIE;
use crate::config::AppConfig;
use crate::db::{establish_pool, Db};
use crate::models::Role;
use crate::serve::{router, AppState};

/// A temporary test directory that will be cleaned up when the struct is dropped.
struct TempDir {
    /// The path to the directory.
    path: PathBuf,
}

impl TempDir {
    /// Create a new temporary directory.
    fn new() -> Result<Self> {
        let path = std::env::temp_dir().join(format!("scriptmarket-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    /// Get the path to the directory.
    fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

/// One running app instance over a throwaway database.
struct TestState {
    /// Keeps the temp dir alive for the lifetime of the test.
    _temp_dir: TempDir,
    /// The address the test server is listening on.
    address: SocketAddr,
    /// Handle to the same pool the server uses, for seeding.
    db: Db,
    /// The HTTP client.
    client: reqwest::Client,
}

impl TestState {
    async fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;

        let config: AppConfig = Figment::new()
            .merge(figment::providers::Toml::string(&format!(
                r#"
                host_name = "localhost"
                db = "sqlite://{dir}/test.db"
                test = true

                [upload]
                path = "{dir}/uploads"
                limit = 1024   # 1 KiB, so the over-limit path is cheap to hit

                [oauth]
                authorize_url = "http://localhost/oauth/authorize"
                token_url = "http://localhost/oauth/token"
                userinfo_url = "http://localhost/oauth/userinfo"
                client_id = "test"
                client_secret = "test"
                redirect_url = "http://localhost/auth/callback"
            "#,
                dir = temp_dir.path().display()
            )))
            .extract()?;

        std::fs::create_dir_all(temp_dir.path().join("uploads"))?;

        let db = establish_pool(&config.db).await?;

        let app = router(AppState {
            config,
            db: db.clone(),
            client: reqwest::Client::new(),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app.into_make_service()).await;
        });

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            _temp_dir: temp_dir,
            address,
            db,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.address)
    }

    /// Insert a user with the given roles and mint a session for them.
    /// Returns (user id, session cookie header value).
    async fn seed_user(&self, email: &str, roles: &[Role]) -> Result<(String, String)> {
        let id = Uuid::new_v4().to_string();
        let roles_json = serde_json::to_string(roles)?;

        sqlx::query("INSERT INTO users (id, email, display_name, roles) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(email)
            .bind(email)
            .bind(&roles_json)
            .execute(&self.db)
            .await
            .context("failed to seed user")?;

        let token = crate::oauth::create_session(&self.db, &id, 3600)
            .await
            .map_err(|e| anyhow::anyhow!("failed to seed session: {e}"))?;

        Ok((id, format!("{SESSION_COOKIE}={token}")))
    }

    async fn post_json(&self, path: &str, cookie: &str, body: &Value) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(self.url(path))
            .header("Cookie", cookie)
            .json(body)
            .send()
            .await?)
    }
}

async fn body_json(resp: reqwest::Response) -> Result<Value> {
    Ok(resp.json().await?)
}

#[tokio::test]
async fn submission_status_depends_on_role() -> Result<()> {
    let t = TestState::new().await?;
    let (_, creator) = t
        .seed_user("creator@example.com", &[Role::User, Role::VerifiedCreator])
        .await?;
    let (_, admin) = t.seed_user("admin@example.com", &[Role::Admin]).await?;

    let script = json!({ "title": "Tuner", "description": "A tuning script", "price": 5.0 });

    let resp = t.post_json("/api/scripts", &creator, &script).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    assert_eq!(body["script"]["status"], "pending");

    let resp = t.post_json("/api/scripts", &admin, &script).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    assert_eq!(body["script"]["status"], "approved");

    Ok(())
}

#[tokio::test]
async fn ineligible_roles_get_forbidden() -> Result<()> {
    let t = TestState::new().await?;
    let (_, plain) = t.seed_user("plain@example.com", &[Role::User]).await?;

    let resp = t
        .post_json(
            "/api/scripts",
            &plain,
            &json!({ "title": "T", "description": "D", "price": 1.0 }),
        )
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = t
        .post_json(
            "/api/giveaways",
            &plain,
            &json!({
                "title": "G", "description": "D",
                "total_value": 100.0, "end_date": "2030-01-01T00:00:00Z"
            }),
        )
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = t
        .post_json(
            "/api/ads",
            &plain,
            &json!({ "title": "A", "link": "https://example.com", "category": "both" }),
        )
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn unauthenticated_requests_are_rejected() -> Result<()> {
    let t = TestState::new().await?;

    let resp = t
        .client
        .post(t.url("/api/scripts"))
        .json(&json!({ "title": "T", "description": "D", "price": 1.0 }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Stale cookie is just as dead.
    let resp = t
        .post_json(
            "/api/scripts",
            &format!("{SESSION_COOKIE}=bogus"),
            &json!({ "title": "T", "description": "D", "price": 1.0 }),
        )
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn moderation_transitions_and_reason_rules() -> Result<()> {
    let t = TestState::new().await?;
    let (_, creator) = t
        .seed_user("c@example.com", &[Role::VerifiedCreator])
        .await?;
    let (admin_id, admin) = t.seed_user("a@example.com", &[Role::Admin]).await?;
    let (_, moderator) = t.seed_user("m@example.com", &[Role::Moderator]).await?;

    let resp = t
        .post_json(
            "/api/scripts",
            &creator,
            &json!({ "title": "T", "description": "D", "price": 1.0 }),
        )
        .await?;
    let id = body_json(resp).await?["script"]["id"]
        .as_str()
        .context("no id")?
        .to_owned();

    // The moderator role is not enough; only admin/founder act on the queue.
    let resp = t
        .post_json(&format!("/api/scripts/{id}/approve"), &moderator, &json!({}))
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Reject without a reason is a validation error.
    let resp = t
        .post_json(
            &format!("/api/scripts/{id}/reject"),
            &admin,
            &json!({ "reason": "  " }),
        )
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = t
        .post_json(
            &format!("/api/scripts/{id}/approve"),
            &admin,
            &json!({ "notes": "looks fine" }),
        )
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    assert_eq!(body["script"]["status"], "approved");
    assert_eq!(body["script"]["reviewed_by"], Value::String(admin_id));

    // Approved items cannot be re-reviewed.
    let resp = t
        .post_json(
            &format!("/api/scripts/{id}/reject"),
            &admin,
            &json!({ "reason": "changed my mind" }),
        )
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn pending_items_hidden_from_public() -> Result<()> {
    let t = TestState::new().await?;
    let (_, creator) = t
        .seed_user("c2@example.com", &[Role::VerifiedCreator])
        .await?;

    let resp = t
        .post_json(
            "/api/scripts",
            &creator,
            &json!({ "title": "Hidden", "description": "D", "price": 1.0 }),
        )
        .await?;
    let id = body_json(resp).await?["script"]["id"]
        .as_str()
        .context("no id")?
        .to_owned();

    // Anonymous fetch: 404. Owner fetch: 200.
    let resp = t.client.get(t.url(&format!("/api/scripts/{id}"))).send().await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = t
        .client
        .get(t.url(&format!("/api/scripts/{id}")))
        .header("Cookie", &creator)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // And the public listing does not contain it.
    let resp = t.client.get(t.url("/api/scripts")).send().await?;
    let body = body_json(resp).await?;
    assert!(body["scripts"].as_array().context("no scripts")?.is_empty());

    Ok(())
}

#[tokio::test]
async fn giveaway_entries_are_unique_and_counted() -> Result<()> {
    let t = TestState::new().await?;
    let (_, crew) = t.seed_user("crew@example.com", &[Role::Crew]).await?;
    let (_, admin) = t.seed_user("boss@example.com", &[Role::Admin]).await?;
    let (_, alice) = t.seed_user("alice@example.com", &[Role::User]).await?;
    let (_, bob) = t.seed_user("bob@example.com", &[Role::User]).await?;

    let resp = t
        .post_json(
            "/api/giveaways",
            &crew,
            &json!({
                "title": "Big drop", "description": "D",
                "total_value": 500.0, "end_date": "2030-01-01T00:00:00Z",
                "max_entries": 10
            }),
        )
        .await?;
    let id = body_json(resp).await?["giveaway"]["id"]
        .as_str()
        .context("no id")?
        .to_owned();

    // Cannot enter while pending.
    let resp = t
        .post_json(&format!("/api/giveaways/{id}/enter"), &alice, &json!({}))
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = t
        .post_json(&format!("/api/giveaways/{id}/approve"), &admin, &json!({}))
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    for cookie in [&alice, &bob] {
        let resp = t
            .post_json(&format!("/api/giveaways/{id}/enter"), cookie, &json!({}))
            .await?;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    // Alice cannot enter twice.
    let resp = t
        .post_json(&format!("/api/giveaways/{id}/enter"), &alice, &json!({}))
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = t
        .client
        .get(t.url(&format!("/api/giveaways/{id}")))
        .send()
        .await?;
    let body = body_json(resp).await?;
    assert_eq!(body["giveaway"]["entries_count"], 2);

    // The owner sees the entry list; entrants do not.
    let resp = t
        .client
        .get(t.url(&format!("/api/giveaways/{id}/entries")))
        .header("Cookie", &crew)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    assert_eq!(body["entries"].as_array().context("no entries")?.len(), 2);

    let resp = t
        .client
        .get(t.url(&format!("/api/giveaways/{id}/entries")))
        .header("Cookie", &alice)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Withdrawal decrements the counter.
    let resp = t
        .client
        .delete(t.url(&format!("/api/giveaways/{id}/enter")))
        .header("Cookie", &bob)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = t
        .client
        .get(t.url(&format!("/api/giveaways/{id}")))
        .send()
        .await?;
    let body = body_json(resp).await?;
    assert_eq!(body["giveaway"]["entries_count"], 1);

    Ok(())
}

#[tokio::test]
async fn giveaway_entries_respect_capacity_and_end_date() -> Result<()> {
    let t = TestState::new().await?;
    let (_, admin) = t.seed_user("caps@example.com", &[Role::Admin]).await?;
    let (_, alice) = t.seed_user("cap-a@example.com", &[Role::User]).await?;
    let (_, bob) = t.seed_user("cap-b@example.com", &[Role::User]).await?;

    // One seat only. Admin-created, so it is approved and open immediately.
    let resp = t
        .post_json(
            "/api/giveaways",
            &admin,
            &json!({
                "title": "One seat", "description": "D",
                "total_value": 50.0, "end_date": "2030-01-01T00:00:00Z",
                "max_entries": 1
            }),
        )
        .await?;
    let full_id = body_json(resp).await?["giveaway"]["id"]
        .as_str()
        .context("no id")?
        .to_owned();

    let resp = t
        .post_json(&format!("/api/giveaways/{full_id}/enter"), &alice, &json!({}))
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // Giveaway is full; the next entrant is turned away.
    let resp = t
        .post_json(&format!("/api/giveaways/{full_id}/enter"), &bob, &json!({}))
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = t
        .client
        .get(t.url(&format!("/api/giveaways/{full_id}")))
        .send()
        .await?;
    let body = body_json(resp).await?;
    assert_eq!(body["giveaway"]["entries_count"], 1);

    // A giveaway whose end date has passed takes no entries at all.
    let resp = t
        .post_json(
            "/api/giveaways",
            &admin,
            &json!({
                "title": "Over", "description": "D",
                "total_value": 50.0, "end_date": "2020-01-01T00:00:00Z"
            }),
        )
        .await?;
    let past_id = body_json(resp).await?["giveaway"]["id"]
        .as_str()
        .context("no id")?
        .to_owned();

    let resp = t
        .post_json(&format!("/api/giveaways/{past_id}/enter"), &alice, &json!({}))
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = t
        .client
        .get(t.url(&format!("/api/giveaways/{past_id}")))
        .send()
        .await?;
    let body = body_json(resp).await?;
    assert_eq!(body["giveaway"]["entries_count"], 0);

    Ok(())
}

#[tokio::test]
async fn uploads_round_trip_and_size_limit() -> Result<()> {
    let t = TestState::new().await?;
    let (_, user) = t.seed_user("up@example.com", &[Role::User]).await?;

    // No session, no upload.
    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(b"x".to_vec()).file_name("x.png"),
    );
    let resp = t
        .client
        .post(t.url("/api/uploads"))
        .multipart(form)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Happy path: the file lands under /uploads/ and is served back.
    let data = b"fake png bytes".to_vec();
    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(data.clone()).file_name("shot.PNG"),
    );
    let resp = t
        .client
        .post(t.url("/api/uploads"))
        .header("Cookie", &user)
        .multipart(form)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    let url = body["url"].as_str().context("no url")?.to_owned();
    assert!(url.starts_with("/uploads/"));
    assert!(url.ends_with(".png"));

    let resp = t.client.get(t.url(&url)).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.bytes().await?.to_vec(), data);

    // The harness caps uploads at 1 KiB; double that is refused with 413.
    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(vec![0u8; 2048]).file_name("big.bin"),
    );
    let resp = t
        .client
        .post(t.url("/api/uploads"))
        .header("Cookie", &user)
        .multipart(form)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

    Ok(())
}

#[tokio::test]
async fn inactive_ads_hidden_from_public() -> Result<()> {
    let t = TestState::new().await?;
    let (_, admin) = t.seed_user("pause@example.com", &[Role::Admin]).await?;

    let resp = t
        .post_json(
            "/api/ads",
            &admin,
            &json!({ "title": "Paused", "link": "https://example.com", "category": "both" }),
        )
        .await?;
    let id = body_json(resp).await?["ad"]["id"]
        .as_str()
        .context("no id")?
        .to_owned();

    let resp = t
        .client
        .patch(t.url(&format!("/api/ads/{id}")))
        .header("Cookie", &admin)
        .json(&json!({ "status": "inactive" }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // Anonymous single fetch matches the listing: not active, not visible.
    let resp = t.client.get(t.url(&format!("/api/ads/{id}"))).send().await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = t
        .client
        .get(t.url(&format!("/api/ads/{id}")))
        .header("Cookie", &admin)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    assert_eq!(body["ad"]["status"], "inactive");

    Ok(())
}

#[tokio::test]
async fn reviews_bounded_and_unique() -> Result<()> {
    let t = TestState::new().await?;
    let (_, admin) = t.seed_user("rev-admin@example.com", &[Role::Admin]).await?;
    let (_, reviewer) = t.seed_user("rev@example.com", &[Role::User]).await?;

    let resp = t
        .post_json(
            "/api/scripts",
            &admin,
            &json!({ "title": "Rated", "description": "D", "price": 3.0 }),
        )
        .await?;
    let id = body_json(resp).await?["script"]["id"]
        .as_str()
        .context("no id")?
        .to_owned();

    for bad in [0, 6] {
        let resp = t
            .post_json(
                &format!("/api/scripts/{id}/reviews"),
                &reviewer,
                &json!({ "rating": bad }),
            )
            .await?;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    let resp = t
        .post_json(
            &format!("/api/scripts/{id}/reviews"),
            &reviewer,
            &json!({ "rating": 4, "comment": "solid" }),
        )
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // Same reviewer, second attempt.
    let resp = t
        .post_json(
            &format!("/api/scripts/{id}/reviews"),
            &reviewer,
            &json!({ "rating": 5 }),
        )
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Aggregates moved with the accepted review only.
    let resp = t
        .client
        .get(t.url(&format!("/api/scripts/{id}")))
        .send()
        .await?;
    let body = body_json(resp).await?;
    assert_eq!(body["script"]["rating_count"], 1);
    assert_eq!(body["script"]["rating_sum"], 4);

    Ok(())
}

#[tokio::test]
async fn ownership_scoped_mutation() -> Result<()> {
    let t = TestState::new().await?;
    let (_, owner) = t
        .seed_user("owner@example.com", &[Role::VerifiedCreator])
        .await?;
    let (_, stranger) = t
        .seed_user("stranger@example.com", &[Role::VerifiedCreator])
        .await?;
    let (_, admin) = t.seed_user("root@example.com", &[Role::Founder]).await?;

    let resp = t
        .post_json(
            "/api/scripts",
            &owner,
            &json!({ "title": "Mine", "description": "D", "price": 2.0 }),
        )
        .await?;
    let id = body_json(resp).await?["script"]["id"]
        .as_str()
        .context("no id")?
        .to_owned();

    let patch = json!({ "title": "Renamed" });

    let resp = t
        .client
        .patch(t.url(&format!("/api/scripts/{id}")))
        .header("Cookie", &stranger)
        .json(&patch)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = t
        .client
        .patch(t.url(&format!("/api/scripts/{id}")))
        .header("Cookie", &owner)
        .json(&patch)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    assert_eq!(body["script"]["title"], "Renamed");

    // Unknown fields in a patch are rejected, not dropped.
    let resp = t
        .client
        .patch(t.url(&format!("/api/scripts/{id}")))
        .header("Cookie", &owner)
        .json(&json!({ "status": "approved" }))
        .send()
        .await?;
    assert!(resp.status().is_client_error());

    let resp = t
        .client
        .delete(t.url(&format!("/api/scripts/{id}")))
        .header("Cookie", &stranger)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = t
        .client
        .delete(t.url(&format!("/api/scripts/{id}")))
        .header("Cookie", &admin)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn role_updates_enforce_vocabulary() -> Result<()> {
    let t = TestState::new().await?;
    let (_, admin) = t.seed_user("hr@example.com", &[Role::Admin]).await?;
    let (target_id, target) = t.seed_user("t@example.com", &[Role::User]).await?;

    // Non-admins cannot hand out roles.
    let resp = t
        .client
        .patch(t.url(&format!("/api/users/{target_id}/roles")))
        .header("Cookie", &target)
        .json(&json!({ "roles": ["admin"] }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = t
        .client
        .patch(t.url(&format!("/api/users/{target_id}/roles")))
        .header("Cookie", &admin)
        .json(&json!({ "roles": ["user", "superuser"] }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = t
        .client
        .patch(t.url(&format!("/api/users/{target_id}/roles")))
        .header("Cookie", &admin)
        .json(&json!({ "roles": ["user", "verified_creator"] }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    assert_eq!(
        body["user"]["roles"],
        json!(["user", "verified_creator"])
    );

    Ok(())
}

#[tokio::test]
async fn test_mode_sign_in_bootstraps_founder() -> Result<()> {
    let t = TestState::new().await?;

    // First sign-in ever: the account gets founder/admin.
    let resp = t
        .client
        .get(t.url("/auth/callback?code=first@example.com"))
        .send()
        .await?;
    assert!(resp.status().is_redirection());
    let cookie = resp
        .headers()
        .get("set-cookie")
        .context("no session cookie")?
        .to_str()?
        .split(';')
        .next()
        .context("empty cookie")?
        .to_owned();

    let resp = t
        .client
        .get(t.url("/api/users/me"))
        .header("Cookie", &cookie)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    assert_eq!(body["user"]["roles"], json!(["founder", "admin"]));

    // Later arrivals are plain users.
    let resp = t
        .client
        .get(t.url("/auth/callback?code=second@example.com"))
        .send()
        .await?;
    assert!(resp.status().is_redirection());

    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&t.db)
        .await?;
    assert_eq!(users, 2);
    let roles: String = sqlx::query_scalar("SELECT roles FROM users WHERE email = ?")
        .bind("second@example.com")
        .fetch_one(&t.db)
        .await?;
    assert_eq!(roles, r#"["user"]"#);

    Ok(())
}

#[tokio::test]
async fn ads_order_by_priority_and_filter_by_category() -> Result<()> {
    let t = TestState::new().await?;
    let (_, admin) = t.seed_user("ads@example.com", &[Role::Admin]).await?;

    for (title, category, priority) in [
        ("low", "scripts", 1),
        ("high", "scripts", 10),
        ("elsewhere", "giveaways", 50),
        ("everywhere", "both", 5),
    ] {
        let resp = t
            .post_json(
                "/api/ads",
                &admin,
                &json!({
                    "title": title,
                    "link": "https://example.com/x",
                    "category": category,
                    "priority": priority
                }),
            )
            .await?;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = t
        .client
        .get(t.url("/api/ads?category=scripts"))
        .send()
        .await?;
    let body = body_json(resp).await?;
    let titles: Vec<&str> = body["ads"]
        .as_array()
        .context("no ads")?
        .iter()
        .filter_map(|a| a["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["high", "everywhere", "low"]);

    Ok(())
}
