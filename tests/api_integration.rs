use anyhow::Context;
use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt; // for `oneshot`

use tolgee_authz::create_app;
use tolgee_authz::jwt::JwtConfig;
use tolgee_authz::models::{ApiKey, LanguagePermissionKind, PermissionType, ProjectPermission, Scope};
use tolgee_authz::store::{ApiKeyStore, SqliteStore};
use tolgee_authz::utils::{hash_api_key, utc_now};

const JWT_SECRET: &str = "test-secret";

async fn setup() -> Result<(TempDir, SqliteStore, Router)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
        .await?;
    migrator.run(&pool).await?;

    for statement in [
        "INSERT INTO users (id, username, role) VALUES (1, 'translator', 'USER'), (2, 'root', 'ADMIN')",
        "INSERT INTO projects (id, name) VALUES (5, 'Web'), (7, 'Mobile')",
        "INSERT INTO languages (id, project_id, tag, name) VALUES (10, 5, 'en', 'English'), (11, 5, 'fr', 'French'), (12, 5, 'de', 'German')",
        "INSERT INTO keys (id, project_id, name) VALUES (1, 5, 'home.title'), (3, 7, 'app.title')",
    ] {
        sqlx::query(statement).execute(&pool).await?;
    }

    let store = SqliteStore::new(pool.clone());
    store
        .save_permission(
            &ProjectPermission::new(0, 1, 5)
                .with_type(PermissionType::Translate)
                .with_languages(LanguagePermissionKind::View, [10, 12])
                .with_languages(LanguagePermissionKind::Translate, [10]),
        )
        .await?;

    // tests run in CI/container; ensure a JWT secret is available for signing tokens
    std::env::set_var("JWT_SECRET", JWT_SECRET);
    let app = create_app(pool).await?;

    Ok((dir, store, app))
}

fn bearer(user_id: i64) -> Result<String> {
    Ok(format!("Bearer {}", JwtConfig::new(JWT_SECRET, 1).encode(user_id)?))
}

async fn send(app: &Router, req: Request<Body>) -> Result<(StatusCode, Value)> {
    let resp: Response = app.clone().oneshot(req).await?;
    let status = resp.status();
    let body_bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes)?
    };
    Ok((status, value))
}

fn post(uri: &str, auth: &str, body: Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", auth)
        .body(Body::from(body.to_string()))?)
}

#[tokio::test]
async fn requests_without_credentials_are_rejected() -> Result<()> {
    let (_dir, _, app) = setup().await?;

    let req = Request::builder()
        .method("GET")
        .uri("/v2/projects/5/authz/scopes")
        .body(Body::empty())?;
    let (status, body) = send(&app, req).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", body);

    let req = Request::builder()
        .method("GET")
        .uri("/v2/projects/5/authz/scopes")
        .header("authorization", "Bearer not-a-token")
        .body(Body::empty())?;
    let (status, _) = send(&app, req).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn bearer_session_checks_project_scopes() -> Result<()> {
    let (_dir, _, app) = setup().await?;
    let auth = bearer(1)?;

    let req = Request::builder()
        .method("GET")
        .uri("/v2/projects/5/authz/scopes")
        .header("authorization", &auth)
        .body(Body::empty())?;
    let (status, body) = send(&app, req).await?;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let scopes: Vec<&str> = body["scopes"].as_array().context("scopes array")?.iter().filter_map(Value::as_str).collect();
    assert!(scopes.contains(&"translations.edit"));
    assert!(!scopes.contains(&"keys.delete"));
    assert_eq!(body["apiKeyAuth"], json!(false));

    let (status, _) = send(&app, post("/v2/projects/5/authz/scope", &auth, json!({ "scope": "keys.view" }))?).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, post("/v2/projects/5/authz/scope", &auth, json!({ "scope": "keys.delete" }))?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "operation_not_permitted");
    assert_eq!(body["params"], json!(["keys.delete"]));

    let (status, body) = send(&app, post("/v2/projects/7/authz/scope", &auth, json!({ "scope": "keys.view" }))?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "user_has_no_project_access");

    let (status, _) = send(&app, post("/v2/projects/5/authz/scope", &auth, json!({ "scope": "keys.fly" }))?).await?;
    assert!(status.is_client_error());
    Ok(())
}

#[tokio::test]
async fn language_checks_report_rejected_languages() -> Result<()> {
    let (_dir, _, app) = setup().await?;
    let auth = bearer(1)?;

    let (status, body) = send(
        &app,
        post(
            "/v2/projects/5/authz/languages",
            &auth,
            json!({ "kind": "translate", "languageTags": ["en", "de"] }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "language_not_permitted");
    assert_eq!(body["params"], json!([[12], ["de"]]));

    let (status, _) = send(
        &app,
        post("/v2/projects/5/authz/languages", &auth, json!({ "kind": "view", "languageIds": [10, 12] }))?,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(
        &app,
        post("/v2/projects/5/authz/languages", &auth, json!({ "kind": "view", "languageTags": ["xx"] }))?,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "language_not_found");

    let (status, body) = send(
        &app,
        post("/v2/projects/5/authz/languages/viewable", &auth, json!({ "tags": ["en", "fr", "de"] }))?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tags"], json!(["en", "de"]));
    Ok(())
}

#[tokio::test]
async fn key_ids_must_belong_to_the_project() -> Result<()> {
    let (_dir, _, app) = setup().await?;
    let auth = bearer(1)?;

    let (status, _) = send(&app, post("/v2/projects/5/authz/keys", &auth, json!({ "keyIds": [1] }))?).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, post("/v2/projects/5/authz/keys", &auth, json!({ "keyIds": [1, 3] }))?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "multiple_projects_not_supported");

    let (status, body) = send(&app, post("/v2/projects/5/authz/keys", &auth, json!({ "keyIds": [1, 404] }))?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "key_not_found");
    Ok(())
}

#[tokio::test]
async fn api_key_sessions_are_bound_to_key_scopes() -> Result<()> {
    let (_dir, store, app) = setup().await?;
    store
        .create_api_key(ApiKey::new(0, 1, 5, [Scope::TranslationsView]).with_hash(hash_api_key("tgpak_live")))
        .await?;
    store
        .create_api_key(
            ApiKey::new(0, 1, 5, [Scope::TranslationsView])
                .with_hash(hash_api_key("tgpak_expired"))
                .with_expiry(utc_now() - chrono::Duration::minutes(5)),
        )
        .await?;

    let req = Request::builder()
        .method("GET")
        .uri("/v2/projects/5/authz/scopes")
        .header("X-API-Key", "tgpak_live")
        .body(Body::empty())?;
    let (status, body) = send(&app, req).await?;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["apiKeyAuth"], json!(true));
    assert_eq!(body["scopes"], json!(["keys.view", "translations.view"]));

    let req = Request::builder()
        .method("POST")
        .uri("/v2/projects/5/authz/scope")
        .header("content-type", "application/json")
        .header("X-API-Key", "tgpak_live")
        .body(Body::from(json!({ "scope": "translations.edit" }).to_string()))?;
    let (status, _) = send(&app, req).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = Request::builder()
        .method("GET")
        .uri("/v2/projects/5/authz/scopes")
        .header("X-API-Key", "tgpak_expired")
        .body(Body::empty())?;
    let (status, _) = send(&app, req).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn api_key_scope_grants_follow_the_owner() -> Result<()> {
    let (_dir, _, app) = setup().await?;
    let auth = bearer(1)?;

    let (status, _) = send(
        &app,
        post("/v2/projects/5/authz/api-key-scopes", &auth, json!({ "scopes": ["translations.edit"] }))?,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        post("/v2/projects/5/authz/api-key-scopes", &auth, json!({ "scopes": ["admin"] }))?,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = bearer(2)?;
    let (status, _) = send(
        &app,
        post("/v2/projects/7/authz/api-key-scopes", &admin, json!({ "scopes": ["admin"] }))?,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    Ok(())
}
