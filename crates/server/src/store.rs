//! Storage port for the roster.
//!
//! Route handlers only see [`RosterStore`]; the SQLite adapter
//! ([`crate::db::Database`]) and the hosted adapter
//! ([`crate::supabase::SupabaseStore`]) are interchangeable behind it.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{Client, CreateClientRequest, PullEntryRequest, PullHistoryEntry, UpdateClientRequest};
use thiserror::Error;

use crate::{
    config::{Backend, StorageConfig},
    credentials::{CredentialError, Credentials},
    db::Database,
    supabase::SupabaseStore,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error(transparent)]
    Credentials(#[from] CredentialError),
}

impl StoreError {
    pub fn client_not_found(id: i64) -> Self {
        StoreError::NotFound { entity: "client", id }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Fields for a new client row.
#[derive(Debug, Clone)]
pub struct NewClient {
    pub client_name: String,
    pub domain_url: String,
    pub client_id: String,
    pub credentials: Credentials,
    pub latest_pull_date: Option<DateTime<Utc>>,
    pub latest_pull_by: Option<String>,
    pub gsos_version: Option<String>,
}

impl NewClient {
    pub fn from_request(req: CreateClientRequest) -> StoreResult<Self> {
        Ok(Self {
            credentials: Credentials::from_plaintext(&req.password)?,
            client_name: req.client_name,
            domain_url: req.domain_url,
            client_id: req.client_id,
            latest_pull_date: req.latest_pull_date,
            latest_pull_by: req.latest_pull_by,
            gsos_version: req.gsos_version,
        })
    }
}

/// A partial update. `None` leaves a column alone; for the nullable summary
/// columns `Some(None)` writes NULL.
#[derive(Debug, Clone, Default)]
pub struct ClientChanges {
    pub client_name: Option<String>,
    pub domain_url: Option<String>,
    pub client_id: Option<String>,
    pub credentials: Option<Credentials>,
    pub latest_pull_date: Option<Option<DateTime<Utc>>>,
    pub latest_pull_by: Option<Option<String>>,
    pub gsos_version: Option<Option<String>>,
}

impl ClientChanges {
    pub fn from_request(req: UpdateClientRequest) -> StoreResult<Self> {
        let credentials = match req.password.as_deref() {
            Some(password) => Some(Credentials::from_plaintext(password)?),
            None => None,
        };
        Ok(Self {
            client_name: req.client_name,
            domain_url: req.domain_url,
            client_id: req.client_id,
            credentials,
            latest_pull_date: req.latest_pull_date,
            latest_pull_by: req.latest_pull_by,
            gsos_version: req.gsos_version,
        })
    }
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    /// All clients ordered by name.
    async fn list_all(&self) -> StoreResult<Vec<Client>>;

    async fn get_by_id(&self, id: i64) -> StoreResult<Option<Client>>;

    /// Inserts a client and returns its id.
    async fn insert(&self, client: NewClient) -> StoreResult<i64>;

    async fn update(&self, id: i64, changes: ClientChanges) -> StoreResult<()>;

    /// Removes the client together with its pull history.
    async fn delete(&self, id: i64) -> StoreResult<()>;
}

#[async_trait]
pub trait PullHistoryStore: Send + Sync {
    /// Entries for one client, newest `pull_date` first.
    async fn list_for_client(&self, client_id: i64) -> StoreResult<Vec<PullHistoryEntry>>;

    /// Records a pull and copies its values onto the client's summary
    /// columns. The copy is unconditional: an older `pull_date` still wins.
    async fn append(&self, client_id: i64, entry: PullEntryRequest) -> StoreResult<PullHistoryEntry>;
}

pub trait RosterStore: ClientStore + PullHistoryStore {
    fn backend_name(&self) -> &'static str;
}

/// Opens the configured backend.
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn RosterStore>> {
    match config.backend {
        Backend::Sqlite => {
            let db = Database::new(&config.sqlite.path).await?;
            db.run_migrations().await?;
            tracing::info!("Using SQLite store at {}", config.sqlite.path);
            Ok(Arc::new(db))
        }
        Backend::Supabase => {
            let supabase = config
                .supabase
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("supabase backend selected but SUPABASE_URL/SUPABASE_KEY are not set"))?;
            tracing::info!("Using hosted store at {}", supabase.url);
            Ok(Arc::new(SupabaseStore::new(&supabase.url, &supabase.key)))
        }
    }
}
