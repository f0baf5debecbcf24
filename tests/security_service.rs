use std::sync::Arc;

use anyhow::Result;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};

use tolgee_authz::errors::{AppError, Message};
use tolgee_authz::models::{
    ApiKey, LanguagePermissionKind, PermissionType, ProjectPermission, Scope, ScopeSet,
};
use tolgee_authz::store::{ApiKeyStore, PermissionData, SqliteStore};
use tolgee_authz::utils::hash_api_key;
use tolgee_authz::SecurityService;

const SEED: &[&str] = &[
    "INSERT INTO users (id, username, role) VALUES (1, 'translator', 'USER'), (2, 'root', 'ADMIN'), (3, 'owner', 'USER')",
    "INSERT INTO projects (id, name) VALUES (5, 'Web'), (7, 'Mobile'), (9, 'Docs')",
    "INSERT INTO languages (id, project_id, tag, name) VALUES (10, 5, 'en', 'English'), (11, 5, 'fr', 'French'), (12, 5, 'de', 'German')",
    "INSERT INTO keys (id, project_id, name) VALUES (1, 5, 'home.title'), (2, 5, 'home.body'), (3, 7, 'app.title')",
];

// keep the TempDir alive for as long as the pool is used
async fn setup() -> Result<(TempDir, Arc<SqliteStore>, SecurityService)> {
    let dir = tempdir()?;
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    for statement in SEED {
        sqlx::query(statement).execute(&pool).await?;
    }

    let store = Arc::new(SqliteStore::new(pool));
    store
        .save_permission(
            &ProjectPermission::new(0, 1, 5)
                .with_type(PermissionType::Translate)
                .with_languages(LanguagePermissionKind::View, [10, 12])
                .with_languages(LanguagePermissionKind::Translate, [10]),
        )
        .await?;
    store
        .save_permission(&ProjectPermission::new(0, 3, 5).with_scopes([Scope::KeysView, Scope::ScreenshotsView]))
        .await?;

    let service = SecurityService::from_store(store.clone());
    Ok((dir, store, service))
}

fn tags(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[tokio::test]
async fn stored_permission_round_trips_with_language_lists() -> Result<()> {
    let (_dir, store, _) = setup().await?;

    let permission = store.find_project_permission(5, 1).await?.expect("permission row");
    assert_eq!(permission.permission_type, Some(PermissionType::Translate));
    assert_eq!(permission.view_language_ids.iter().copied().collect::<Vec<_>>(), vec![10, 12]);
    assert_eq!(permission.translate_language_ids.iter().copied().collect::<Vec<_>>(), vec![10]);
    assert!(permission.state_change_language_ids.is_empty());

    // saving again replaces the row instead of adding a second one
    let updated = store
        .save_permission(&ProjectPermission::new(0, 1, 5).with_type(PermissionType::Review))
        .await?;
    assert_eq!(updated.id, permission.id);
    let reloaded = store.find_project_permission(5, 1).await?.expect("permission row");
    assert_eq!(reloaded.permission_type, Some(PermissionType::Review));
    assert!(reloaded.view_language_ids.is_empty());

    Ok(())
}

#[tokio::test]
async fn server_admin_without_rows_passes() -> Result<()> {
    let (_dir, _, service) = setup().await?;
    let admin = service.principal_for_user(2).await?;

    service.check_project_permission(&admin, 9, Scope::Admin).await?;
    service
        .check_language_permission_by_tag(&admin, 5, &tags(&["fr"]), LanguagePermissionKind::StateChange)
        .await?;
    Ok(())
}

#[tokio::test]
async fn key_ids_report_three_distinct_failures() -> Result<()> {
    let (_dir, _, service) = setup().await?;

    let err = service.check_key_ids_exist_and_is_from_project(&[1, 2, 3], 5).await.unwrap_err();
    assert_eq!(err.message(), Some(Message::MultipleProjectsNotSupported));

    let err = service.check_key_ids_exist_and_is_from_project(&[1, 2], 9).await.unwrap_err();
    assert_eq!(err.message(), Some(Message::KeyNotFromProject));

    let err = service.check_key_ids_exist_and_is_from_project(&[1, 99], 5).await.unwrap_err();
    assert_eq!(err.message(), Some(Message::KeyNotFound));

    service.check_key_ids_exist_and_is_from_project(&[2, 1], 5).await?;
    Ok(())
}

#[tokio::test]
async fn view_filter_drops_restricted_tags() -> Result<()> {
    let (_dir, _, service) = setup().await?;
    let translator = service.principal_for_user(1).await?;

    let visible = service
        .filter_view_permission_by_tag(&translator, 5, &tags(&["en", "fr", "de"]))
        .await?;
    assert_eq!(visible, tags(&["en", "de"]));

    match service
        .check_language_permission_by_tag(&translator, 5, &tags(&["fr", "en"]), LanguagePermissionKind::View)
        .await
    {
        Err(AppError::LanguageNotPermitted { language_ids, language_tags }) => {
            assert_eq!(language_ids, vec![11]);
            assert_eq!(language_tags, tags(&["fr"]));
        }
        other => panic!("expected language denial, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn api_key_scopes_are_pruned_once() -> Result<()> {
    let (_dir, store, service) = setup().await?;

    let created = store
        .create_api_key(
            ApiKey::new(0, 3, 5, [Scope::KeysView, Scope::KeysEdit, Scope::ScreenshotsView])
                .with_hash(hash_api_key("tgpak_prune")),
        )
        .await?;

    let mut api_key = created.clone();
    assert!(service.fix_invalid_api_key_when_required(&mut api_key).await?);
    let expected = ScopeSet::from([Scope::KeysView, Scope::ScreenshotsView]);
    assert_eq!(api_key.scopes, expected);

    let stored = store.find_api_key_by_hash(&hash_api_key("tgpak_prune")).await?.expect("stored key");
    assert_eq!(stored.scopes, expected);

    let mut again = stored;
    assert!(!service.fix_invalid_api_key_when_required(&mut again).await?);
    assert_eq!(again.scopes, expected);

    // a writer holding the pre-prune scopes loses the compare-and-set
    assert!(!store.replace_api_key_scopes(created.id, &created.scopes, &ScopeSet::new()).await?);
    Ok(())
}

#[tokio::test]
async fn api_key_session_is_limited_by_owner_and_key() -> Result<()> {
    let (_dir, store, service) = setup().await?;
    store
        .create_api_key(ApiKey::new(0, 3, 5, [Scope::Admin]).with_hash(hash_api_key("tgpak_wide")))
        .await?;

    let session = service.principal_for_api_key("tgpak_wide").await?;
    assert!(session.is_api_key_auth());

    let effective = service.project_permission_scopes(&session, 5).await?;
    assert_eq!(effective, ScopeSet::from([Scope::KeysView, Scope::ScreenshotsView]));

    let err = service
        .check_project_permission(&session, 5, Scope::TranslationsView)
        .await
        .unwrap_err();
    assert_eq!(err.message(), Some(Message::OperationNotPermitted));

    let err = service.check_project_permission(&session, 7, Scope::KeysView).await.unwrap_err();
    assert_eq!(err.message(), Some(Message::UserHasNoProjectAccess));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_pruning_writes_once_without_errors() -> Result<()> {
    let (_dir, store, service) = setup().await?;

    for round in 0..10 {
        let created = store
            .create_api_key(
                ApiKey::new(0, 3, 5, [Scope::KeysView, Scope::KeysEdit])
                    .with_hash(hash_api_key(&format!("tgpak_race_{round}"))),
            )
            .await?;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let mut api_key = created.clone();
                tokio::spawn(async move { service.fix_invalid_api_key_when_required(&mut api_key).await })
            })
            .collect();

        let mut writes = 0;
        for handle in handles {
            if handle.await?? {
                writes += 1;
            }
        }
        assert_eq!(writes, 1, "round {round}: exactly one caller should persist");

        let stored = store
            .find_api_key_by_hash(&hash_api_key(&format!("tgpak_race_{round}")))
            .await?
            .expect("stored key");
        assert_eq!(stored.scopes, ScopeSet::from([Scope::KeysView]));
    }
    Ok(())
}
