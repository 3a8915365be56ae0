use chrono::{DateTime, Utc};
use shared::{Client, PullHistoryEntry};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct ClientRow {
    pub id: i64,
    pub client_name: String,
    pub domain_url: String,
    pub client_id: String,
    pub password: String,
    pub original_password: String,
    pub latest_pull_date: Option<DateTime<Utc>>,
    pub latest_pull_by: Option<String>,
    pub gsos_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ClientRow> for Client {
    fn from(row: ClientRow) -> Self {
        Client {
            id: row.id,
            client_name: row.client_name,
            domain_url: row.domain_url,
            client_id: row.client_id,
            original_password: Some(row.original_password),
            latest_pull_date: row.latest_pull_date,
            latest_pull_by: row.latest_pull_by,
            gsos_version: row.gsos_version,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PullHistoryRow {
    pub id: i64,
    pub client_id: i64,
    pub pull_date: DateTime<Utc>,
    pub pull_by: String,
    pub version: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<PullHistoryRow> for PullHistoryEntry {
    fn from(row: PullHistoryRow) -> Self {
        PullHistoryEntry {
            id: row.id,
            client_id: row.client_id,
            pull_date: row.pull_date,
            pull_by: row.pull_by,
            version: row.version,
            created_at: Some(row.created_at),
        }
    }
}
