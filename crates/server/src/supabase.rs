//! Hosted roster store speaking PostgREST (Supabase).
//!
//! The remote schema is not under our control, so cascading deletes are done
//! explicitly, and a failed summary update after a pull insert is undone with
//! a compensating delete.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use shared::{Client, PullEntryRequest, PullHistoryEntry};

use crate::store::{ClientChanges, ClientStore, NewClient, PullHistoryStore, RosterStore, StoreError, StoreResult};

const CLIENTS: &str = "clients";
const PULL_HISTORY: &str = "pull_history";

#[derive(Clone)]
pub struct SupabaseStore {
    http: reqwest::Client,
    base_url: String,
    key: String,
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    message: Option<String>,
    details: Option<String>,
}

#[derive(Serialize)]
struct ClientInsert<'a> {
    client_name: &'a str,
    domain_url: &'a str,
    client_id: &'a str,
    password: &'a str,
    original_password: &'a str,
    latest_pull_date: Option<DateTime<Utc>>,
    latest_pull_by: Option<&'a str>,
    gsos_version: Option<&'a str>,
}

#[derive(Serialize)]
struct HistoryInsert<'a> {
    client_id: i64,
    pull_date: DateTime<Utc>,
    pull_by: &'a str,
    version: Option<&'a str>,
}

#[derive(Deserialize)]
struct IdOnly {
    id: i64,
}

fn eq(id: i64) -> String {
    format!("eq.{}", id)
}

impl SupabaseStore {
    pub fn new(base_url: &str, key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            key: key.to_string(),
        }
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/rest/v1/{}", self.base_url, table))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    fn returning(builder: RequestBuilder) -> RequestBuilder {
        builder.header("Prefer", "return=representation")
    }

    async fn check(resp: Response) -> StoreResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<PostgrestError>(&body) {
            Ok(PostgrestError { message: Some(m), details }) => match details {
                Some(d) if !d.is_empty() => format!("{} ({})", m, d),
                _ => m,
            },
            _ => body,
        };
        Err(StoreError::Upstream {
            status: status.as_u16(),
            message,
        })
    }

    async fn rows<T: DeserializeOwned>(builder: RequestBuilder) -> StoreResult<Vec<T>> {
        let resp = Self::check(builder.send().await?).await?;
        Ok(resp.json().await?)
    }

    async fn remove_history_row(&self, id: i64) -> StoreResult<()> {
        let id = eq(id);
        let resp = self
            .request(Method::DELETE, PULL_HISTORY)
            .query(&[("id", id.as_str())])
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl ClientStore for SupabaseStore {
    async fn list_all(&self) -> StoreResult<Vec<Client>> {
        Self::rows(
            self.request(Method::GET, CLIENTS)
                .query(&[("select", "*"), ("order", "client_name.asc")]),
        )
        .await
    }

    async fn get_by_id(&self, id: i64) -> StoreResult<Option<Client>> {
        let id = eq(id);
        let rows: Vec<Client> = Self::rows(
            self.request(Method::GET, CLIENTS)
                .query(&[("select", "*"), ("id", id.as_str())]),
        )
        .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert(&self, client: NewClient) -> StoreResult<i64> {
        let body = ClientInsert {
            client_name: &client.client_name,
            domain_url: &client.domain_url,
            client_id: &client.client_id,
            password: client.credentials.hash(),
            original_password: client.credentials.plain(),
            latest_pull_date: client.latest_pull_date,
            latest_pull_by: client.latest_pull_by.as_deref(),
            gsos_version: client.gsos_version.as_deref(),
        };
        let rows: Vec<IdOnly> = Self::rows(Self::returning(self.request(Method::POST, CLIENTS)).json(&body)).await?;
        rows.into_iter()
            .next()
            .map(|row| row.id)
            .ok_or_else(|| StoreError::Upstream {
                status: 200,
                message: "insert returned no rows".to_string(),
            })
    }

    async fn update(&self, id: i64, changes: ClientChanges) -> StoreResult<()> {
        let mut body = Map::new();
        body.insert("updated_at".into(), json!(Utc::now()));
        if let Some(name) = changes.client_name {
            body.insert("client_name".into(), json!(name));
        }
        if let Some(url) = changes.domain_url {
            body.insert("domain_url".into(), json!(url));
        }
        if let Some(client_id) = changes.client_id {
            body.insert("client_id".into(), json!(client_id));
        }
        if let Some(credentials) = changes.credentials {
            let (hash, plain) = credentials.into_parts();
            body.insert("password".into(), json!(hash));
            body.insert("original_password".into(), json!(plain));
        }
        if let Some(date) = changes.latest_pull_date {
            body.insert("latest_pull_date".into(), json!(date));
        }
        if let Some(by) = changes.latest_pull_by {
            body.insert("latest_pull_by".into(), json!(by));
        }
        if let Some(version) = changes.gsos_version {
            body.insert("gsos_version".into(), json!(version));
        }

        let id_filter = eq(id);
        let rows: Vec<IdOnly> = Self::rows(
            Self::returning(self.request(Method::PATCH, CLIENTS))
                .query(&[("id", id_filter.as_str()), ("select", "id")])
                .json(&Value::Object(body)),
        )
        .await?;
        if rows.is_empty() {
            return Err(StoreError::client_not_found(id));
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        let id_filter = eq(id);

        let resp = self
            .request(Method::DELETE, PULL_HISTORY)
            .query(&[("client_id", id_filter.as_str())])
            .send()
            .await?;
        Self::check(resp).await?;

        let rows: Vec<IdOnly> = Self::rows(
            Self::returning(self.request(Method::DELETE, CLIENTS))
                .query(&[("id", id_filter.as_str()), ("select", "id")]),
        )
        .await?;
        if rows.is_empty() {
            return Err(StoreError::client_not_found(id));
        }
        Ok(())
    }
}

#[async_trait]
impl PullHistoryStore for SupabaseStore {
    async fn list_for_client(&self, client_id: i64) -> StoreResult<Vec<PullHistoryEntry>> {
        let client_filter = eq(client_id);
        Self::rows(
            self.request(Method::GET, PULL_HISTORY).query(&[
                ("select", "*"),
                ("client_id", client_filter.as_str()),
                ("order", "pull_date.desc"),
            ]),
        )
        .await
    }

    async fn append(&self, client_id: i64, entry: PullEntryRequest) -> StoreResult<PullHistoryEntry> {
        if self.get_by_id(client_id).await?.is_none() {
            return Err(StoreError::client_not_found(client_id));
        }

        let body = HistoryInsert {
            client_id,
            pull_date: entry.pull_date,
            pull_by: &entry.pull_by,
            version: entry.version.as_deref(),
        };
        let inserted: Vec<PullHistoryEntry> =
            Self::rows(Self::returning(self.request(Method::POST, PULL_HISTORY)).json(&body)).await?;
        let inserted = inserted.into_iter().next().ok_or_else(|| StoreError::Upstream {
            status: 200,
            message: "insert returned no rows".to_string(),
        })?;

        let changes = ClientChanges {
            latest_pull_date: Some(Some(entry.pull_date)),
            latest_pull_by: Some(Some(entry.pull_by.clone())),
            gsos_version: Some(entry.version.clone()),
            ..Default::default()
        };
        if let Err(e) = self.update(client_id, changes).await {
            tracing::error!(
                "Client summary update failed after pull {} was recorded, removing it: {}",
                inserted.id,
                e
            );
            if let Err(cleanup) = self.remove_history_row(inserted.id).await {
                tracing::error!("Compensating delete of pull {} failed: {}", inserted.id, cleanup);
            }
            return Err(e);
        }

        Ok(inserted)
    }
}

impl RosterStore for SupabaseStore {
    fn backend_name(&self) -> &'static str {
        "supabase"
    }
}
