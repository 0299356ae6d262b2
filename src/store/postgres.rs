use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info};
use serde_json::{json, Map, Value};
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};

use crate::error::{StoreError, StoreResult};
use crate::model::{
    Activity, AppendTarget, Branch, Id, Repository, RepositoryUpdate, Timestamp, User, Version,
    DEFAULT_BRANCH,
};
use crate::store::traits::{BranchInsert, CounterStore, MembershipLedger, RepositoryStore};

const CONTENT_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS repositories (
        repo_id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        public BOOLEAN NOT NULL DEFAULT FALSE,
        doc JSONB NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS repositories_owner_idx ON repositories (owner_id)",
    "CREATE INDEX IF NOT EXISTS repositories_public_idx ON repositories (public)",
    r#"
    CREATE TABLE IF NOT EXISTS counters (
        key TEXT PRIMARY KEY,
        value BIGINT NOT NULL
    )
    "#,
];

const LEDGER_SCHEMA: &[&str] = &[r#"
    CREATE TABLE IF NOT EXISTS users (
        user_id VARCHAR(36) PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        username TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL,
        repo_ids TEXT[] NOT NULL DEFAULT '{}',
        liked_repos TEXT[] NOT NULL DEFAULT '{}',
        created_at BIGINT NOT NULL,
        updated_at BIGINT NOT NULL
    )
    "#];

/// Runs one remote call, turning an elapsed deadline into `Unavailable`
async fn bounded<T, F>(call_timeout: Duration, what: &str, fut: F) -> StoreResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(call_timeout, fut).await {
        Ok(result) => result.map_err(StoreError::from),
        Err(_) => Err(StoreError::Unavailable(format!(
            "{} timed out after {}s",
            what,
            call_timeout.as_secs()
        ))),
    }
}

async fn connect_pool(database_url: &str, max_connections: u32, call_timeout: Duration) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(call_timeout)
        .connect(database_url)
        .await
        .context("Failed to create PostgreSQL connection pool")
}

async fn run_schema(pool: &PgPool, statements: &[&str]) -> Result<()> {
    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("Failed to run schema migration")?;
    }
    Ok(())
}

fn repository_from_row(row: &PgRow) -> StoreResult<Repository> {
    let doc: Value = row.try_get("doc")?;
    Ok(serde_json::from_value(doc)?)
}

/// Embedded arrays that accept appends
#[derive(Debug, Clone, Copy)]
enum EmbeddedList {
    Versions,
    Activity,
}

impl EmbeddedList {
    fn repository_field(self) -> &'static str {
        match self {
            EmbeddedList::Versions => "versions",
            EmbeddedList::Activity => "activity",
        }
    }

    fn branch_field(self) -> &'static str {
        match self {
            EmbeddedList::Versions => "versions",
            EmbeddedList::Activity => "activities",
        }
    }
}

/// Document store for repository aggregates plus the ID counters, backed by
/// a JSONB column.
#[derive(Debug, Clone)]
pub struct PostgresContentStore {
    pool: PgPool,
    call_timeout: Duration,
}

impl PostgresContentStore {
    pub async fn connect(database_url: &str, max_connections: u32, call_timeout: Duration) -> Result<Self> {
        let pool = connect_pool(database_url, max_connections, call_timeout).await?;
        Ok(Self { pool, call_timeout })
    }

    /// Create the content tables if they do not exist yet
    pub async fn migrate(&self) -> Result<()> {
        run_schema(&self.pool, CONTENT_SCHEMA).await?;
        info!("Content store schema ready");
        Ok(())
    }

    async fn repository_exists(&self, repo_id: &str) -> StoreResult<bool> {
        let query = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM repositories WHERE repo_id = $1)",
        )
        .bind(repo_id)
        .fetch_one(&self.pool);
        bounded(self.call_timeout, "repository lookup", query).await
    }

    async fn push_embedded(
        &self,
        repo_id: &str,
        target: &AppendTarget,
        list: EmbeddedList,
        entry: Value,
        now: Timestamp,
    ) -> StoreResult<bool> {
        let result = match target {
            AppendTarget::Repository => {
                let field = list.repository_field();
                let sql = format!(
                    r#"
                    UPDATE repositories
                    SET doc = jsonb_set(doc, '{{{field}}}', COALESCE(doc->'{field}', '[]'::jsonb) || jsonb_build_array($2::jsonb))
                              || jsonb_build_object('updatedAt', $3::bigint)
                    WHERE repo_id = $1
                    "#
                );
                let query = sqlx::query(&sql)
                    .bind(repo_id)
                    .bind(entry)
                    .bind(now)
                    .execute(&self.pool);
                bounded(self.call_timeout, "repository append", query).await?
            }
            AppendTarget::Branch(branch_name) => {
                let field = list.branch_field();
                // The branch is located by name inside the row being written,
                // so a concurrent branch delete cannot shift the target.
                let sql = format!(
                    r#"
                    UPDATE repositories
                    SET doc = jsonb_set(doc, '{{branches}}', (
                            SELECT jsonb_agg(
                                CASE WHEN b.elem->>'name' = $2
                                    THEN jsonb_set(b.elem, '{{{field}}}', COALESCE(b.elem->'{field}', '[]'::jsonb) || jsonb_build_array($3::jsonb))
                                    ELSE b.elem
                                END
                                ORDER BY b.ord
                            )
                            FROM jsonb_array_elements(doc->'branches') WITH ORDINALITY AS b(elem, ord)
                        )) || jsonb_build_object('updatedAt', $4::bigint)
                    WHERE repo_id = $1
                      AND EXISTS (
                          SELECT 1
                          FROM jsonb_array_elements(doc->'branches') AS b(elem)
                          WHERE b.elem->>'name' = $2
                      )
                    "#
                );
                let query = sqlx::query(&sql)
                    .bind(repo_id)
                    .bind(branch_name)
                    .bind(entry)
                    .bind(now)
                    .execute(&self.pool);
                bounded(self.call_timeout, "branch append", query).await?
            }
        };

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl RepositoryStore for PostgresContentStore {
    async fn insert_repository(&self, repo: &Repository) -> StoreResult<()> {
        let doc = serde_json::to_value(repo)?;
        let query = sqlx::query(
            "INSERT INTO repositories (repo_id, owner_id, public, doc) VALUES ($1, $2, $3, $4)",
        )
        .bind(&repo.repo_id)
        .bind(&repo.owner_id)
        .bind(repo.public)
        .bind(doc)
        .execute(&self.pool);
        bounded(self.call_timeout, "repository insert", query).await?;
        Ok(())
    }

    async fn get_repository(&self, repo_id: &str) -> StoreResult<Option<Repository>> {
        let query = sqlx::query("SELECT doc FROM repositories WHERE repo_id = $1")
            .bind(repo_id)
            .fetch_optional(&self.pool);
        let row = bounded(self.call_timeout, "repository fetch", query).await?;

        let Some(row) = row else {
            return Ok(None);
        };
        repository_from_row(&row).map(Some)
    }

    async fn list_repositories_by_ids(&self, repo_ids: &[Id]) -> StoreResult<Vec<Repository>> {
        if repo_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = sqlx::query(
            r#"
            SELECT doc FROM repositories
            WHERE repo_id = ANY($1)
            ORDER BY (doc->>'createdAt')::bigint, repo_id
            "#,
        )
        .bind(repo_ids.to_vec())
        .fetch_all(&self.pool);
        let rows = bounded(self.call_timeout, "repository list", query).await?;

        rows.iter().map(repository_from_row).collect()
    }

    async fn list_public_repositories(&self) -> StoreResult<Vec<Repository>> {
        let query = sqlx::query(
            r#"
            SELECT doc FROM repositories
            WHERE public = TRUE
            ORDER BY (doc->>'createdAt')::bigint, repo_id
            "#,
        )
        .fetch_all(&self.pool);
        let rows = bounded(self.call_timeout, "public repository list", query).await?;

        rows.iter().map(repository_from_row).collect()
    }

    async fn delete_repository(&self, repo_id: &str) -> StoreResult<bool> {
        let query = sqlx::query("DELETE FROM repositories WHERE repo_id = $1")
            .bind(repo_id)
            .execute(&self.pool);
        let result = bounded(self.call_timeout, "repository delete", query).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_repository(
        &self,
        repo_id: &str,
        update: &RepositoryUpdate,
        now: Timestamp,
    ) -> StoreResult<bool> {
        let mut top = Map::new();
        if let Some(name) = &update.name {
            top.insert("name".to_string(), json!(name));
        }
        if let Some(public) = update.public {
            top.insert("public".to_string(), json!(public));
        }
        top.insert("updatedAt".to_string(), json!(now));

        let mut description = Map::new();
        if let Some(bpm) = update.bpm {
            description.insert("bpm".to_string(), json!(bpm));
        }
        if let Some(scale) = &update.scale {
            description.insert("scale".to_string(), json!(scale));
        }
        if let Some(genre) = &update.genre {
            description.insert("genre".to_string(), json!(genre));
        }

        let query = sqlx::query(
            r#"
            UPDATE repositories
            SET doc = jsonb_set(doc || $2::jsonb, '{description}', COALESCE(doc->'description', '{}'::jsonb) || $3::jsonb),
                public = COALESCE($4, public)
            WHERE repo_id = $1
            "#,
        )
        .bind(repo_id)
        .bind(Value::Object(top))
        .bind(Value::Object(description))
        .bind(update.public)
        .execute(&self.pool);
        let result = bounded(self.call_timeout, "repository update", query).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn push_branch(&self, repo_id: &str, branch: &Branch, now: Timestamp) -> StoreResult<BranchInsert> {
        let doc = serde_json::to_value(branch)?;
        // The name check is part of the UPDATE so it is evaluated against
        // the row version being written.
        let query = sqlx::query(
            r#"
            UPDATE repositories
            SET doc = jsonb_set(doc, '{branches}', COALESCE(doc->'branches', '[]'::jsonb) || jsonb_build_array($2::jsonb))
                      || jsonb_build_object('updatedAt', $3::bigint)
            WHERE repo_id = $1
              AND NOT EXISTS (
                  SELECT 1
                  FROM jsonb_array_elements(COALESCE(doc->'branches', '[]'::jsonb)) AS b(elem)
                  WHERE b.elem->>'name' = $4
              )
            "#,
        )
        .bind(repo_id)
        .bind(doc)
        .bind(now)
        .bind(&branch.name)
        .execute(&self.pool);
        let result = bounded(self.call_timeout, "branch insert", query).await?;

        if result.rows_affected() > 0 {
            return Ok(BranchInsert::Inserted);
        }
        if self.repository_exists(repo_id).await? {
            Ok(BranchInsert::NameTaken)
        } else {
            Ok(BranchInsert::RepositoryMissing)
        }
    }

    async fn pull_branch(&self, repo_id: &str, name: &str, now: Timestamp) -> StoreResult<bool> {
        let query = sqlx::query(
            r#"
            UPDATE repositories
            SET doc = jsonb_set(doc, '{branches}', COALESCE((
                    SELECT jsonb_agg(b.elem ORDER BY b.ord)
                    FROM jsonb_array_elements(doc->'branches') WITH ORDINALITY AS b(elem, ord)
                    WHERE b.elem->>'name' <> $2
                ), '[]'::jsonb)) || jsonb_build_object('updatedAt', $3::bigint)
            WHERE repo_id = $1
              AND $2 <> $4
              AND EXISTS (
                  SELECT 1
                  FROM jsonb_array_elements(doc->'branches') AS b(elem)
                  WHERE b.elem->>'name' = $2
              )
            "#,
        )
        .bind(repo_id)
        .bind(name)
        .bind(now)
        .bind(DEFAULT_BRANCH)
        .execute(&self.pool);
        let result = bounded(self.call_timeout, "branch delete", query).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn push_version(
        &self,
        repo_id: &str,
        target: &AppendTarget,
        version: &Version,
        now: Timestamp,
    ) -> StoreResult<bool> {
        let entry = serde_json::to_value(version)?;
        self.push_embedded(repo_id, target, EmbeddedList::Versions, entry, now)
            .await
    }

    async fn push_activity(
        &self,
        repo_id: &str,
        target: &AppendTarget,
        activity: &Activity,
        now: Timestamp,
    ) -> StoreResult<bool> {
        let entry = serde_json::to_value(activity)?;
        self.push_embedded(repo_id, target, EmbeddedList::Activity, entry, now)
            .await
    }
}

#[async_trait::async_trait]
impl CounterStore for PostgresContentStore {
    async fn increment(&self, key: &str) -> StoreResult<i64> {
        let query = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO counters (key, value) VALUES ($1, 1)
            ON CONFLICT (key) DO UPDATE SET value = counters.value + 1
            RETURNING value
            "#,
        )
        .bind(key)
        .fetch_one(&self.pool);
        let value = bounded(self.call_timeout, "counter increment", query).await?;
        debug!("Counter '{}' advanced to {}", key, value);
        Ok(value)
    }
}

const USER_COLUMNS: &str =
    "user_id, email, username, password, repo_ids, liked_repos, created_at, updated_at";

fn user_from_row(row: &PgRow) -> StoreResult<User> {
    Ok(User {
        user_id: row.try_get("user_id")?,
        email: row.try_get("email")?,
        username: row.try_get("username")?,
        password: row.try_get("password")?,
        repo_ids: row.try_get("repo_ids")?,
        liked_repos: row.try_get("liked_repos")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Membership ledger on its own PostgreSQL database
#[derive(Debug, Clone)]
pub struct PostgresLedger {
    pool: PgPool,
    call_timeout: Duration,
}

impl PostgresLedger {
    pub async fn connect(database_url: &str, max_connections: u32, call_timeout: Duration) -> Result<Self> {
        let pool = connect_pool(database_url, max_connections, call_timeout).await?;
        Ok(Self { pool, call_timeout })
    }

    /// Create the users table if it does not exist yet
    pub async fn migrate(&self) -> Result<()> {
        run_schema(&self.pool, LEDGER_SCHEMA).await?;
        info!("Ledger schema ready");
        Ok(())
    }

    async fn find_user_by(&self, column: &'static str, value: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {} = $1", USER_COLUMNS, column);
        let query = sqlx::query(&sql).bind(value).fetch_optional(&self.pool);
        let row = bounded(self.call_timeout, "user fetch", query).await?;

        row.as_ref().map(user_from_row).transpose()
    }
}

#[async_trait::async_trait]
impl MembershipLedger for PostgresLedger {
    async fn get_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        self.find_user_by("user_id", user_id).await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.find_user_by("email", email).await
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.find_user_by("username", username).await
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO users ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            USER_COLUMNS
        );
        let query = sqlx::query(&sql)
            .bind(&user.user_id)
            .bind(&user.email)
            .bind(&user.username)
            .bind(&user.password)
            .bind(user.repo_ids.clone())
            .bind(user.liked_repos.clone())
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(&self.pool);
        bounded(self.call_timeout, "user insert", query).await?;
        Ok(())
    }

    async fn save_user(&self, user: &User) -> StoreResult<bool> {
        let query = sqlx::query(
            r#"
            UPDATE users
            SET email = $2, username = $3, password = $4, repo_ids = $5,
                liked_repos = $6, updated_at = $7
            WHERE user_id = $1
            "#,
        )
        .bind(&user.user_id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password)
        .bind(user.repo_ids.clone())
        .bind(user.liked_repos.clone())
        .bind(user.updated_at)
        .execute(&self.pool);
        let result = bounded(self.call_timeout, "user save", query).await?;
        Ok(result.rows_affected() > 0)
    }
}
