use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use shared::{Client, PullEntryRequest, PullHistoryEntry};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    QueryBuilder, Sqlite, SqlitePool,
};
use std::path::Path;
use std::str::FromStr;

use crate::store::{ClientChanges, ClientStore, NewClient, PullHistoryStore, RosterStore, StoreError, StoreResult};

mod models;

pub use models::*;

const CLIENT_COLUMNS: &str = "id, client_name, domain_url, client_id, password, original_password, \
     latest_pull_date, latest_pull_by, gsos_version, created_at, updated_at";

const HISTORY_COLUMNS: &str = "id, client_id, pull_date, pull_by, version, created_at";

/// SQLite-backed roster store.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(path: &str) -> Result<Self> {
        // Ensure the directory exists
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// A private in-memory database. One connection, kept open, so every
    /// query sees the same data.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS clients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_name TEXT NOT NULL,
                domain_url TEXT NOT NULL,
                client_id TEXT NOT NULL,
                password TEXT NOT NULL,
                original_password TEXT NOT NULL,
                latest_pull_date DATETIME,
                latest_pull_by TEXT,
                gsos_version TEXT,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pull_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id INTEGER NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
                pull_date DATETIME NOT NULL,
                pull_by TEXT NOT NULL,
                version TEXT,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_pull_history_client_date ON pull_history (client_id, pull_date DESC)",
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Database migrations completed");
        Ok(())
    }

    /// Full row including the credential hash. Never serialized to callers.
    pub async fn get_client_row(&self, id: i64) -> StoreResult<Option<ClientRow>> {
        let row = sqlx::query_as::<_, ClientRow>(&format!("SELECT {} FROM clients WHERE id = ?", CLIENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

#[async_trait]
impl ClientStore for Database {
    async fn list_all(&self) -> StoreResult<Vec<Client>> {
        let rows = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {} FROM clients ORDER BY client_name ASC, id ASC",
            CLIENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Client::from).collect())
    }

    async fn get_by_id(&self, id: i64) -> StoreResult<Option<Client>> {
        Ok(self.get_client_row(id).await?.map(Client::from))
    }

    async fn insert(&self, client: NewClient) -> StoreResult<i64> {
        let now = Utc::now();
        let (hash, plain) = client.credentials.into_parts();
        let result = sqlx::query(
            r#"
            INSERT INTO clients (
                client_name, domain_url, client_id, password, original_password,
                latest_pull_date, latest_pull_by, gsos_version, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&client.client_name)
        .bind(&client.domain_url)
        .bind(&client.client_id)
        .bind(hash)
        .bind(plain)
        .bind(client.latest_pull_date)
        .bind(&client.latest_pull_by)
        .bind(&client.gsos_version)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn update(&self, id: i64, changes: ClientChanges) -> StoreResult<()> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE clients SET updated_at = ");
        qb.push_bind(Utc::now());

        if let Some(name) = changes.client_name {
            qb.push(", client_name = ").push_bind(name);
        }
        if let Some(url) = changes.domain_url {
            qb.push(", domain_url = ").push_bind(url);
        }
        if let Some(client_id) = changes.client_id {
            qb.push(", client_id = ").push_bind(client_id);
        }
        if let Some(credentials) = changes.credentials {
            let (hash, plain) = credentials.into_parts();
            qb.push(", password = ").push_bind(hash);
            qb.push(", original_password = ").push_bind(plain);
        }
        if let Some(date) = changes.latest_pull_date {
            qb.push(", latest_pull_date = ").push_bind(date);
        }
        if let Some(by) = changes.latest_pull_by {
            qb.push(", latest_pull_by = ").push_bind(by);
        }
        if let Some(version) = changes.gsos_version {
            qb.push(", gsos_version = ").push_bind(version);
        }
        qb.push(" WHERE id = ").push_bind(id);

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::client_not_found(id));
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        // pull_history rows go with it via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM clients WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::client_not_found(id));
        }
        Ok(())
    }
}

#[async_trait]
impl PullHistoryStore for Database {
    async fn list_for_client(&self, client_id: i64) -> StoreResult<Vec<PullHistoryEntry>> {
        let rows = sqlx::query_as::<_, PullHistoryRow>(&format!(
            "SELECT {} FROM pull_history WHERE client_id = ? ORDER BY pull_date DESC, id DESC",
            HISTORY_COLUMNS
        ))
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PullHistoryEntry::from).collect())
    }

    async fn append(&self, client_id: i64, entry: PullEntryRequest) -> StoreResult<PullHistoryEntry> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM clients WHERE id = ?")
            .bind(client_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::client_not_found(client_id));
        }

        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO pull_history (client_id, pull_date, pull_by, version, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(client_id)
        .bind(entry.pull_date)
        .bind(&entry.pull_by)
        .bind(&entry.version)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query(
            "UPDATE clients SET latest_pull_date = ?, latest_pull_by = ?, gsos_version = ?, updated_at = ? WHERE id = ?",
        )
        .bind(entry.pull_date)
        .bind(&entry.pull_by)
        .bind(&entry.version)
        .bind(now)
        .bind(client_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(PullHistoryEntry {
            id,
            client_id,
            pull_date: entry.pull_date,
            pull_by: entry.pull_by,
            version: entry.version,
            created_at: Some(now),
        })
    }
}

impl RosterStore for Database {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
