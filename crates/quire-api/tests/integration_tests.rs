//! # Integration Tests for quire-api
//!
//! Drives the full router with `tower::ServiceExt::oneshot` against an
//! in-memory SQLite database and a manual clock: registration and login,
//! session revocation, role gates, rate limiting, records, themes, settings,
//! invites, and the ambient endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use quire_api::config::{AppConfig, PasswordParams, SigningSecret};
use quire_api::state::AppState;
use quire_core::{BucketPolicy, ManualClock};

const START_MS: u64 = 1_750_000_000_000;

struct TestApp {
    app: Router,
    state: AppState,
    clock: Arc<ManualClock>,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

fn test_config() -> AppConfig {
    AppConfig {
        jwt_secret: SigningSecret::new(b"integration-test-secret-0123456789abcdef".to_vec()),
        jwt_secret_ephemeral: false,
        password: PasswordParams {
            memory_kib: 64,
            iterations: 1,
        },
        ..AppConfig::default()
    }
}

async fn spawn_with(config: AppConfig) -> TestApp {
    let pool = quire_api::db::init_pool("sqlite::memory:").await.unwrap();
    let clock = Arc::new(ManualClock::new(START_MS));
    let state = AppState::with_clock(pool, config, clock.clone());
    TestApp {
        app: quire_api::app(state.clone()),
        state,
        clock,
    }
}

async fn spawn() -> TestApp {
    spawn_with(test_config()).await
}

impl TestApp {
    async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
        extra: &[(&str, &str)],
    ) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        for (name, value) in extra {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        Reply {
            status,
            headers,
            body,
        }
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> Reply {
        self.request(Method::GET, uri, token, None, &[]).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> Reply {
        self.request(Method::POST, uri, token, Some(body), &[]).await
    }

    async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> Reply {
        self.request(Method::PUT, uri, token, Some(body), &[]).await
    }

    async fn delete(&self, uri: &str, token: Option<&str>) -> Reply {
        self.request(Method::DELETE, uri, token, None, &[]).await
    }

    /// Register `login` and return its id.
    async fn register(&self, login: &str) -> Uuid {
        let reply = self
            .post(
                "/api/register",
                None,
                json!({"login": login, "password": "password123"}),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{:?}", reply.body);
        reply.body["data"]["id"].as_str().unwrap().parse().unwrap()
    }

    /// Log in and return the bearer token.
    async fn login(&self, login: &str) -> String {
        let reply = self
            .post(
                "/api/login",
                None,
                json!({"login": login, "password": "password123"}),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK, "{:?}", reply.body);
        reply.body["data"]["token"].as_str().unwrap().to_string()
    }

    /// An admin (the first user) and its token.
    async fn admin(&self) -> (Uuid, String) {
        let id = self.register("admin").await;
        (id, self.login("admin").await)
    }

    /// A user holding exactly `roles`, and its token.
    async fn user_with_roles(&self, admin_token: &str, login: &str, roles: &[&str]) -> (Uuid, String) {
        let id = self.register(login).await;
        let reply = self
            .put(
                &format!("/api/users/{id}/roles"),
                Some(admin_token),
                json!({"roles": roles}),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK, "{:?}", reply.body);
        (id, self.login(login).await)
    }
}

// -- Health, Metrics, OpenAPI ------------------------------------------------

#[tokio::test]
async fn health_probes_respond() {
    let t = spawn().await;
    let live = t.get("/health/liveness", None).await;
    assert_eq!(live.status, StatusCode::OK);
    assert_eq!(live.body, "ok");
    let ready = t.get("/health/readiness", None).await;
    assert_eq!(ready.status, StatusCode::OK);
    assert_eq!(ready.body, "ready");
}

#[tokio::test]
async fn metrics_exposes_request_counters() {
    let t = spawn().await;
    t.get("/api/themes", None).await;
    let reply = t.get("/metrics", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let text = reply.body.as_str().unwrap();
    assert!(text.contains("quire_http_requests_total"));
}

#[tokio::test]
async fn metrics_disabled_is_not_found() {
    let t = spawn_with(AppConfig {
        metrics_enabled: false,
        ..test_config()
    })
    .await;
    assert_eq!(t.get("/metrics", None).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let t = spawn().await;
    let reply = t.get("/api/openapi.json", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["info"]["title"], "Quire CMS API");
}

#[tokio::test]
async fn unknown_route_returns_envelope() {
    let t = spawn().await;
    let reply = t.get("/api/nope", None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["success"], false);
    assert_eq!(reply.body["message"], "Route not found");
    assert!(reply.body["timestamp"].is_string());
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let t = spawn().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// -- Registration & Login ----------------------------------------------------

#[tokio::test]
async fn register_with_short_fields_reports_both_errors() {
    let t = spawn().await;
    let reply = t
        .post("/api/register", None, json!({"login": "ab", "password": "x"}))
        .await;
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
    let errors: Vec<String> = serde_json::from_value(reply.body["errors"].clone()).unwrap();
    assert!(errors.iter().any(|e| e.contains("login")), "{errors:?}");
    assert!(errors.iter().any(|e| e.contains("password")), "{errors:?}");
}

#[tokio::test]
async fn first_user_is_admin_later_users_have_no_role() {
    let t = spawn().await;
    let first = t
        .post("/api/register", None, json!({"login": "first", "password": "password123"}))
        .await;
    assert_eq!(first.body["data"]["roles"], json!(["admin"]));

    let second = t
        .post("/api/register", None, json!({"login": "second", "password": "password123"}))
        .await;
    assert_eq!(second.status, StatusCode::CREATED);
    assert_eq!(second.body["data"]["roles"], json!([]));
}

#[tokio::test]
async fn duplicate_login_conflicts() {
    let t = spawn().await;
    t.register("taken").await;
    let reply = t
        .post("/api/register", None, json!({"login": "TAKEN", "password": "password123"}))
        .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn login_returns_token_and_profile() {
    let t = spawn().await;
    t.register("ok_user").await;
    let reply = t
        .post("/api/login", None, json!({"login": "ok_user", "password": "password123"}))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["token_type"], "Bearer");
    assert_eq!(reply.body["data"]["user"]["login"], "ok_user");
    let token = reply.body["data"]["token"].as_str().unwrap();

    let me = t.get("/api/me", Some(token)).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["data"]["login"], "ok_user");
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let t = spawn().await;
    t.register("someone").await;
    let reply = t
        .post("/api/login", None, json!({"login": "someone", "password": "not-the-one"}))
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["message"], "Invalid login or password");
}

#[tokio::test]
async fn relogin_revokes_previous_session() {
    let t = spawn().await;
    let id = t.register("twice").await;
    let old = t.login("twice").await;
    let new = t.login("twice").await;

    // Still cryptographically valid, but its session row is gone.
    let old_claims = t.state.tokens.decode(&old).unwrap();
    let live = quire_api::db::sessions::for_user(&t.state.pool, id)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(live.id, old_claims.sid);

    assert_eq!(t.get("/api/me", Some(&old)).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(t.get("/api/me", Some(&new)).await.status, StatusCode::OK);
}

#[tokio::test]
async fn stateless_mode_keeps_old_tokens_until_subject_is_deleted() {
    let t = spawn_with(AppConfig {
        strict_sessions: false,
        ..test_config()
    })
    .await;
    let (_, admin) = t.admin().await;
    let victim = t.register("victim").await;
    let old = t.login("victim").await;
    let _new = t.login("victim").await;
    assert_eq!(t.get("/api/me", Some(&old)).await.status, StatusCode::OK);

    let reply = t.delete(&format!("/api/users/{victim}"), Some(&admin)).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert_eq!(t.get("/api/me", Some(&old)).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_ends_session() {
    let t = spawn().await;
    t.register("leaver").await;
    let token = t.login("leaver").await;
    let reply = t.request(Method::POST, "/api/logout", Some(&token), None, &[]).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert_eq!(t.get("/api/me", Some(&token)).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let t = spawn().await;
    t.register("sleepy").await;
    let token = t.login("sleepy").await;
    t.clock.advance(3_600_000);
    assert_eq!(t.get("/api/me", Some(&token)).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn garbage_token_is_unauthorized_but_public_routes_still_work() {
    let t = spawn().await;
    assert_eq!(
        t.get("/api/me", Some("not.a.token")).await.status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(t.get("/api/records", Some("not.a.token")).await.status, StatusCode::OK);
}

#[tokio::test]
async fn password_change_requires_current_and_ends_session() {
    let t = spawn().await;
    t.register("changer").await;
    let token = t.login("changer").await;

    let wrong = t
        .put(
            "/api/me/password",
            Some(&token),
            json!({"current_password": "nope", "new_password": "another-pass"}),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNPROCESSABLE_ENTITY);

    let ok = t
        .put(
            "/api/me/password",
            Some(&token),
            json!({"current_password": "password123", "new_password": "another-pass"}),
        )
        .await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(t.get("/api/me", Some(&token)).await.status, StatusCode::UNAUTHORIZED);

    let relog = t
        .post("/api/login", None, json!({"login": "changer", "password": "another-pass"}))
        .await;
    assert_eq!(relog.status, StatusCode::OK);
}

#[tokio::test]
async fn profile_update_accepts_nested_fields() {
    let t = spawn().await;
    t.register("writer").await;
    let token = t.login("writer").await;

    let reply = t
        .put(
            "/api/me",
            Some(&token),
            json!({"display_name": "Writer", "profile": {"bio": "Words.", "website": "https://w.example"}}),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK, "{:?}", reply.body);
    assert_eq!(reply.body["data"]["profile"]["bio"], "Words.");

    let bad = t
        .put("/api/me", Some(&token), json!({"profile": {"website": "nope"}}))
        .await;
    assert_eq!(bad.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(bad.body["errors"][0].as_str().unwrap().contains("profile.website"));
}

// -- User Administration -----------------------------------------------------

#[tokio::test]
async fn deactivated_user_loses_access() {
    let t = spawn().await;
    let (_, admin) = t.admin().await;
    let id = t.register("benched").await;
    let token = t.login("benched").await;

    let reply = t
        .put(&format!("/api/users/{id}/status"), Some(&admin), json!({"is_active": false}))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(t.get("/api/me", Some(&token)).await.status, StatusCode::UNAUTHORIZED);

    let login = t
        .post("/api/login", None, json!({"login": "benched", "password": "password123"}))
        .await;
    assert_eq!(login.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_cannot_remove_themselves() {
    let t = spawn().await;
    let (id, admin) = t.admin().await;
    assert_eq!(
        t.delete(&format!("/api/users/{id}"), Some(&admin)).await.status,
        StatusCode::CONFLICT
    );
    assert_eq!(
        t.put(&format!("/api/users/{id}/roles"), Some(&admin), json!({"roles": ["editor"]}))
            .await
            .status,
        StatusCode::CONFLICT
    );
}

#[tokio::test]
async fn user_routes_require_admin() {
    let t = spawn().await;
    let (_, admin) = t.admin().await;
    let (_, editor) = t.user_with_roles(&admin, "editor1", &["editor"]).await;
    assert_eq!(t.get("/api/users", None).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(t.get("/api/users", Some(&editor)).await.status, StatusCode::FORBIDDEN);
    let list = t.get("/api/users", Some(&admin)).await;
    assert_eq!(list.status, StatusCode::OK);
    assert_eq!(list.body["data"].as_array().unwrap().len(), 2);
    assert_eq!(
        t.get(&format!("/api/users/{}", Uuid::new_v4()), Some(&admin)).await.status,
        StatusCode::NOT_FOUND
    );
}

// -- Records -----------------------------------------------------------------

#[tokio::test]
async fn admin_only_record_delete_gates() {
    let t = spawn().await;
    let (_, admin) = t.admin().await;
    let (_, author) = t.user_with_roles(&admin, "author1", &["author"]).await;

    let created = t
        .post("/api/records", Some(&admin), json!({"title": "Doomed", "content": "..."}))
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let id = created.body["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/records/{id}");

    assert_eq!(t.delete(&uri, None).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(t.delete(&uri, Some(&author)).await.status, StatusCode::FORBIDDEN);
    let deleted = t.delete(&uri, Some(&admin)).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert_eq!(deleted.body, Value::Null);
    assert_eq!(t.get(&uri, Some(&admin)).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn drafts_hidden_until_published() {
    let t = spawn().await;
    let (_, admin) = t.admin().await;
    let (_, author) = t.user_with_roles(&admin, "author1", &["author"]).await;

    let created = t
        .post("/api/records", Some(&author), json!({"title": "Hello World"}))
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["data"]["slug"], "hello-world");
    let id = created.body["data"]["id"].as_str().unwrap().to_string();

    assert_eq!(t.get("/api/records", None).await.body["data"]["total"], 0);
    assert_eq!(
        t.get(&format!("/api/records/{id}"), None).await.status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        t.get(&format!("/api/records/{id}"), Some(&author)).await.status,
        StatusCode::OK
    );

    let denied = t
        .request(Method::POST, &format!("/api/records/{id}/publish"), Some(&author), None, &[])
        .await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let published = t
        .request(Method::POST, &format!("/api/records/{id}/publish"), Some(&admin), None, &[])
        .await;
    assert_eq!(published.status, StatusCode::OK);
    assert!(published.body["data"]["published_at"].is_string());

    let list = t.get("/api/records", None).await;
    assert_eq!(list.body["data"]["total"], 1);
    assert_eq!(list.body["data"]["items"][0]["id"], id.as_str());
}

#[tokio::test]
async fn authors_cannot_publish_or_edit_others() {
    let t = spawn().await;
    let (_, admin) = t.admin().await;
    let (_, author) = t.user_with_roles(&admin, "author1", &["author"]).await;
    let (_, other) = t.user_with_roles(&admin, "author2", &["author"]).await;

    let publish = t
        .post("/api/records", Some(&author), json!({"title": "Live", "is_published": true}))
        .await;
    assert_eq!(publish.status, StatusCode::FORBIDDEN);

    let created = t.post("/api/records", Some(&author), json!({"title": "Mine"})).await;
    let id = created.body["data"]["id"].as_str().unwrap().to_string();
    let edit = t
        .put(&format!("/api/records/{id}"), Some(&other), json!({"title": "Theirs"}))
        .await;
    assert_eq!(edit.status, StatusCode::FORBIDDEN);
    let own = t
        .put(&format!("/api/records/{id}"), Some(&author), json!({"title": "Still mine"}))
        .await;
    assert_eq!(own.status, StatusCode::OK);
    assert_eq!(own.body["data"]["title"], "Still mine");
}

#[tokio::test]
async fn users_without_roles_cannot_write() {
    let t = spawn().await;
    t.admin().await;
    t.register("reader").await;
    let reader = t.login("reader").await;
    let reply = t.post("/api/records", Some(&reader), json!({"title": "Nope"})).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn duplicate_slug_conflicts() {
    let t = spawn().await;
    let (_, admin) = t.admin().await;
    let first = t.post("/api/records", Some(&admin), json!({"title": "Same"})).await;
    assert_eq!(first.status, StatusCode::CREATED);
    let second = t.post("/api/records", Some(&admin), json!({"title": "Same"})).await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert_eq!(second.body["message"], "Slug is already in use");
}

#[tokio::test]
async fn record_listing_paginates() {
    let t = spawn().await;
    let (_, admin) = t.admin().await;
    for i in 0..5 {
        let reply = t
            .post(
                "/api/records",
                Some(&admin),
                json!({"title": format!("Post {i}"), "is_published": true}),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED);
    }
    let page = t.get("/api/records?page=2&per_page=2", None).await;
    assert_eq!(page.status, StatusCode::OK);
    assert_eq!(page.body["data"]["items"].as_array().unwrap().len(), 2);
    assert_eq!(page.body["data"]["total"], 5);
    assert_eq!(page.body["data"]["total_pages"], 3);

    let bad = t.get("/api/records?per_page=500", None).await;
    assert_eq!(bad.status, StatusCode::UNPROCESSABLE_ENTITY);
}

// -- Themes ------------------------------------------------------------------

#[tokio::test]
async fn exactly_one_theme_is_active() {
    let t = spawn().await;
    let (_, admin) = t.admin().await;

    let themes = t.get("/api/themes", None).await;
    let list = themes.body["data"].as_array().unwrap().clone();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["is_active"], true);
    let default_id = list[0]["id"].as_str().unwrap().to_string();

    let created = t
        .post("/api/themes", Some(&admin), json!({"name": "Dark", "description": "Night"}))
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["data"]["is_active"], false);
    let dark = created.body["data"]["id"].as_str().unwrap().to_string();

    let dup = t.post("/api/themes", Some(&admin), json!({"name": "dark"})).await;
    assert_eq!(dup.status, StatusCode::CONFLICT);

    let activated = t
        .request(Method::PUT, &format!("/api/themes/{dark}/activate"), Some(&admin), None, &[])
        .await;
    assert_eq!(activated.status, StatusCode::OK);

    let themes = t.get("/api/themes", None).await;
    let active: Vec<&Value> = themes.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|th| th["is_active"] == true)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["id"], dark.as_str());

    assert_eq!(
        t.delete(&format!("/api/themes/{dark}"), Some(&admin)).await.status,
        StatusCode::CONFLICT
    );
    assert_eq!(
        t.delete(&format!("/api/themes/{default_id}"), Some(&admin)).await.status,
        StatusCode::NO_CONTENT
    );
}

// -- Settings & Invites ------------------------------------------------------

#[tokio::test]
async fn settings_are_public_and_admin_writable() {
    let t = spawn().await;
    let (_, admin) = t.admin().await;

    let settings = t.get("/api/settings", None).await;
    assert_eq!(settings.status, StatusCode::OK);
    assert!(settings.body["data"]["site_title"].is_string());

    let unknown = t.put("/api/settings", Some(&admin), json!({"favicon": "x"})).await;
    assert_eq!(unknown.status, StatusCode::UNPROCESSABLE_ENTITY);

    let updated = t
        .put("/api/settings", Some(&admin), json!({"site_title": "My Site", "records_per_page": 25}))
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["data"]["site_title"], "My Site");
    assert_eq!(updated.body["data"]["records_per_page"], 25);
}

#[tokio::test]
async fn closed_registration_requires_single_use_invite() {
    let t = spawn().await;
    let (_, admin) = t.admin().await;

    let closed = t
        .put("/api/settings", Some(&admin), json!({"registration_open": false}))
        .await;
    assert_eq!(closed.status, StatusCode::OK);

    let refused = t
        .post("/api/register", None, json!({"login": "outsider", "password": "password123"}))
        .await;
    assert_eq!(refused.status, StatusCode::FORBIDDEN);

    let invite = t.post("/api/invites", Some(&admin), json!({"role": "editor"})).await;
    assert_eq!(invite.status, StatusCode::CREATED);
    let code = invite.body["data"]["code"].as_str().unwrap().to_string();

    let joined = t
        .post(
            "/api/register",
            None,
            json!({"login": "insider", "password": "password123", "invite_code": code}),
        )
        .await;
    assert_eq!(joined.status, StatusCode::CREATED, "{:?}", joined.body);
    assert_eq!(joined.body["data"]["roles"], json!(["editor"]));

    let reused = t
        .post(
            "/api/register",
            None,
            json!({"login": "another", "password": "password123", "invite_code": code}),
        )
        .await;
    assert_eq!(reused.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn expired_invite_is_refused() {
    let t = spawn().await;
    let (_, admin) = t.admin().await;
    let invite = t
        .post("/api/invites", Some(&admin), json!({"expires_in_hours": 1}))
        .await;
    let code = invite.body["data"]["code"].as_str().unwrap().to_string();
    assert_eq!(invite.body["data"]["role"], "author");

    t.clock.advance(2 * 3_600_000);
    let reply = t
        .post(
            "/api/register",
            None,
            json!({"login": "late", "password": "password123", "invite_code": code}),
        )
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invites_can_be_listed_and_deleted() {
    let t = spawn().await;
    let (_, admin) = t.admin().await;
    let invite = t.post("/api/invites", Some(&admin), json!({})).await;
    let code = invite.body["data"]["code"].as_str().unwrap().to_string();

    let list = t.get("/api/invites", Some(&admin)).await;
    assert_eq!(list.body["data"].as_array().unwrap().len(), 1);

    let uri = format!("/api/invites/{code}");
    assert_eq!(t.delete(&uri, Some(&admin)).await.status, StatusCode::NO_CONTENT);
    assert_eq!(t.delete(&uri, Some(&admin)).await.status, StatusCode::NOT_FOUND);
}

// -- Rate Limiting -----------------------------------------------------------

#[tokio::test]
async fn auth_bucket_limits_then_bans() {
    let mut config = test_config();
    config.rate_limit.enabled = true;
    config.rate_limit.exempt_loopback = false;
    let t = spawn_with(config).await;
    let client = [("x-forwarded-for", "203.0.113.7")];
    let body = json!({"login": "nobody", "password": "password123"});

    for i in 0..10u32 {
        let reply = t
            .request(Method::POST, "/api/login", None, Some(body.clone()), &client)
            .await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.headers["x-ratelimit-limit"], "10");
        assert_eq!(
            reply.headers["x-ratelimit-remaining"],
            (9 - i).to_string().as_str()
        );
    }

    let limited = t
        .request(Method::POST, "/api/login", None, Some(body.clone()), &client)
        .await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.headers[header::RETRY_AFTER], "30");
    assert_eq!(
        limited.body["message"],
        "Rate limit exceeded. Try again in 30 seconds."
    );

    // Another client is unaffected.
    let other = t
        .request(
            Method::POST,
            "/api/login",
            None,
            Some(body.clone()),
            &[("x-forwarded-for", "198.51.100.1")],
        )
        .await;
    assert_eq!(other.status, StatusCode::UNAUTHORIZED);

    t.clock.advance(30_000);
    let after_ban = t
        .request(Method::POST, "/api/login", None, Some(body), &client)
        .await;
    assert_eq!(after_ban.status, StatusCode::UNAUTHORIZED);
    assert_eq!(after_ban.headers["x-ratelimit-remaining"], "9");
    assert_eq!(t.state.metrics.rate_limited(), 1);
}

#[tokio::test]
async fn anonymous_reads_bypass_limits() {
    let mut config = test_config();
    config.rate_limit.enabled = true;
    config.rate_limit.exempt_loopback = false;
    let t = spawn_with(config).await;
    let reply = t
        .request(Method::GET, "/api/records", None, None, &[("x-forwarded-for", "203.0.113.9")])
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.headers.get("x-ratelimit-limit").is_none());
}

#[tokio::test]
async fn production_defaults_ignore_forwarded_loopback() {
    let vars = [
        ("QUIRE_ENV", "production"),
        ("QUIRE_JWT_SECRET", "0123456789abcdef0123456789abcdef"),
    ];
    let mut config = AppConfig::from_lookup(|name| {
        vars.iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.to_string())
    })
    .unwrap();
    config.password = test_config().password;
    assert!(config.rate_limit.enabled);
    let t = spawn_with(config).await;

    let spoofed = [("x-forwarded-for", "127.0.0.1")];
    let body = json!({"login": "nobody", "password": "password123"});
    for _ in 0..10 {
        let reply = t
            .request(Method::POST, "/api/login", None, Some(body.clone()), &spoofed)
            .await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    }
    let limited = t
        .request(Method::POST, "/api/login", None, Some(body), &spoofed)
        .await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn loopback_socket_peer_is_exempt() {
    let mut config = test_config();
    config.rate_limit.enabled = true;
    config.rate_limit.exempt_loopback = true;
    let t = spawn_with(config).await;
    let body = json!({"login": "nobody", "password": "password123"});

    for _ in 0..15 {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri("/api/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40_000))));
        let response = t.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }
    assert_eq!(t.state.metrics.rate_limited(), 0);
}

#[tokio::test]
async fn limiter_refuses_before_authentication() {
    let mut config = test_config();
    config.rate_limit.enabled = true;
    config.rate_limit.exempt_loopback = false;
    config.rate_limit.read_auth = BucketPolicy::new(2, 60_000, 30_000);
    let t = spawn_with(config).await;
    t.register("reader").await;
    let token = t.login("reader").await;
    let client = [("x-forwarded-for", "203.0.113.20")];

    // Rejected tokens still count against the client's quota.
    for remaining in ["1", "0"] {
        let reply = t
            .request(Method::GET, "/api/me", Some("garbage"), None, &client)
            .await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.headers["x-ratelimit-remaining"], remaining);
    }

    let banned = t
        .request(Method::GET, "/api/me", Some("garbage"), None, &client)
        .await;
    assert_eq!(banned.status, StatusCode::TOO_MANY_REQUESTS);

    // A valid token does not lift the ban.
    let valid = t
        .request(Method::GET, "/api/me", Some(&token), None, &client)
        .await;
    assert_eq!(valid.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(valid.headers[header::RETRY_AFTER], "30");

    t.clock.advance(30_000);
    let after = t
        .request(Method::GET, "/api/me", Some(&token), None, &client)
        .await;
    assert_eq!(after.status, StatusCode::OK);
}
