use sqlx::Row;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use tolgee_authz::config::DEFAULT_DATABASE_URL;
use tolgee_authz::models::{
    ApiKey, LanguagePermissionKind, PermissionType, ProjectPermission, Scope, ServerRole, UserAccount,
};
use tolgee_authz::store::{ApiKeyStore, PermissionData, SqliteStore};
use tolgee_authz::utils::{generate_api_key, hash_api_key, utc_now};
use tolgee_authz::SecurityService;

#[derive(Parser, Debug)]
#[command(author, version, about = "tolgee-authz administration tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Create a user account
    CreateUser {
        username: String,
        /// Make the user a server administrator
        #[arg(long)]
        admin: bool,
    },
    /// Create a project with an optional set of languages
    CreateProject {
        name: String,
        /// Language tags to create in the project, e.g. en,fr,de
        #[arg(long, value_delimiter = ',')]
        languages: Vec<String>,
    },
    /// Grant (or replace) a user's permission in a project
    Grant {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        project: i64,
        /// Preset such as VIEW, TRANSLATE, REVIEW, EDIT or MANAGE
        #[arg(long = "type")]
        permission_type: Option<String>,
        /// Explicit scopes, used when no preset is given
        #[arg(long, value_delimiter = ',')]
        scopes: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        view_languages: Vec<i64>,
        #[arg(long, value_delimiter = ',')]
        translate_languages: Vec<i64>,
        #[arg(long, value_delimiter = ',')]
        state_languages: Vec<i64>,
    },
    /// Issue a project API key and print its secret once
    IssueApiKey {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        project: i64,
        #[arg(long, value_delimiter = ',', required = true)]
        scopes: Vec<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        expires_in_hours: Option<i64>,
    },
    /// Drop scopes from API keys whose owners no longer hold them
    PruneApiKeys,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Try to load env from CWD; when running in Docker the binary CWD may differ,
    // so fall back to the crate-local `.env` using CARGO_MANIFEST_DIR.
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::CreateUser { username, admin } => {
            let pool = get_pool().await?;
            let role = if admin { ServerRole::Admin } else { ServerRole::User };
            let id: i64 = sqlx::query_scalar("INSERT INTO users (username, role) VALUES (?, ?) RETURNING id")
                .bind(&username)
                .bind(role.as_str())
                .fetch_one(&pool)
                .await
                .with_context(|| format!("failed to create user {}", username))?;
            println!("Created user {} ({}) with id {}", username, role.as_str(), id);
        }
        Commands::CreateProject { name, languages } => {
            let pool = get_pool().await?;
            let mut tx = pool.begin().await?;
            let id: i64 = sqlx::query_scalar("INSERT INTO projects (name) VALUES (?) RETURNING id")
                .bind(&name)
                .fetch_one(&mut *tx)
                .await?;
            for tag in &languages {
                let language_id: i64 =
                    sqlx::query_scalar("INSERT INTO languages (project_id, tag, name) VALUES (?, ?, ?) RETURNING id")
                        .bind(id)
                        .bind(tag)
                        .bind(tag)
                        .fetch_one(&mut *tx)
                        .await
                        .with_context(|| format!("failed to create language {}", tag))?;
                println!("  language {} -> id {}", tag, language_id);
            }
            tx.commit().await?;
            println!("Created project {} with id {}", name, id);
        }
        Commands::Grant {
            user,
            project,
            permission_type,
            scopes,
            view_languages,
            translate_languages,
            state_languages,
        } => {
            let store = SqliteStore::new(get_pool().await?);
            store
                .find_user(user)
                .await?
                .with_context(|| format!("user {} does not exist", user))?;

            let mut permission = ProjectPermission::new(0, user, project)
                .with_scopes(parse_scopes(&scopes)?)
                .with_languages(LanguagePermissionKind::View, view_languages)
                .with_languages(LanguagePermissionKind::Translate, translate_languages)
                .with_languages(LanguagePermissionKind::StateChange, state_languages);
            if let Some(permission_type) = permission_type {
                permission = permission.with_type(permission_type.parse::<PermissionType>()?);
            }
            if permission.granted_scopes().is_empty() {
                anyhow::bail!("either --type or --scopes is required");
            }

            let saved = store.save_permission(&permission).await?;
            println!("Saved permission {} for user {} in project {}", saved.id, user, project);
        }
        Commands::IssueApiKey {
            user,
            project,
            scopes,
            description,
            expires_in_hours,
        } => {
            let store = Arc::new(SqliteStore::new(get_pool().await?));
            let security = SecurityService::from_store(store.clone());

            let owner: UserAccount = store
                .find_user(user)
                .await?
                .with_context(|| format!("user {} does not exist", user))?;
            let scopes = parse_scopes(&scopes)?;
            security
                .check_api_key_scopes_grantable(&owner, project, &scopes)
                .await
                .context("requested scopes exceed the user's permission in the project")?;

            let raw_key = generate_api_key();
            let mut api_key = ApiKey::new(0, user, project, scopes).with_hash(hash_api_key(&raw_key));
            api_key.description = description;
            if let Some(hours) = expires_in_hours {
                api_key = api_key.with_expiry(utc_now() + chrono::Duration::hours(hours));
            }

            let created = store.create_api_key(api_key).await?;
            println!("Issued api key {} for user {} in project {}", created.id, user, project);
            println!("{}", raw_key);
        }
        Commands::PruneApiKeys => {
            let store = Arc::new(SqliteStore::new(get_pool().await?));
            let security = SecurityService::from_store(store.clone());

            let mut pruned = 0usize;
            for mut api_key in store.list_api_keys().await? {
                if security.fix_invalid_api_key_when_required(&mut api_key).await? {
                    pruned += 1;
                }
            }
            println!("Pruned {} api key(s)", pruned);
        }
    }

    Ok(())
}

fn parse_scopes(values: &[String]) -> anyhow::Result<Vec<Scope>> {
    values
        .iter()
        .filter(|value| !value.trim().is_empty())
        .map(|value| value.trim().parse::<Scope>().map_err(anyhow::Error::from))
        .collect()
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
    let options = database_url
        .parse::<SqliteConnectOptions>()
        .context("invalid DATABASE_URL")?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    // If the migrations table doesn't exist, nothing is applied yet
    let db_applied = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
        .fetch_optional(pool)
        .await?;
    let applied_versions: HashSet<i64> = if db_applied.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} Name", "Status", "Version");
    for migration in migrator.iter() {
        let version = migration.version;
        let status = if applied_versions.contains(&version) { "applied" } else { "pending" };
        let desc = migration.description.as_ref().trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, version, name);
    }

    Ok(())
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // Try local ./migrations first (when running from repo root), then the
    // crate-local folder for containers where CWD differs.
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let migrator_path_display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", migrator_path_display))
}
