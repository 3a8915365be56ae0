//! HTTP client for the roster API.

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    Client, CreateClientRequest, CreatedResponse, ErrorResponse, MessageResponse, PullEntryRequest,
    PullHistoryEntry, UpdateClientRequest,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("could not reach the server: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Server { status: 404, .. })
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(builder: RequestBuilder) -> ApiResult<Response> {
        let resp = builder.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or_else(|_| {
                if body.trim().is_empty() {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                } else {
                    body
                }
            });
        Err(ApiError::Server {
            status: status.as_u16(),
            message,
        })
    }

    async fn json<T: DeserializeOwned>(builder: RequestBuilder) -> ApiResult<T> {
        Ok(Self::send(builder).await?.json().await?)
    }

    pub async fn list_clients(&self) -> ApiResult<Vec<Client>> {
        Self::json(self.http.get(self.url("/clients"))).await
    }

    pub async fn client_details(&self, id: i64) -> ApiResult<Client> {
        Self::json(self.http.get(self.url(&format!("/clients/{}/details", id)))).await
    }

    pub async fn create_client(&self, req: &CreateClientRequest) -> ApiResult<CreatedResponse> {
        Self::json(self.http.post(self.url("/clients")).json(req)).await
    }

    pub async fn update_client(&self, id: i64, req: &UpdateClientRequest) -> ApiResult<MessageResponse> {
        Self::json(self.http.put(self.url(&format!("/clients/{}", id))).json(req)).await
    }

    pub async fn delete_client(&self, id: i64) -> ApiResult<MessageResponse> {
        Self::json(self.http.delete(self.url(&format!("/clients/{}", id)))).await
    }

    pub async fn history(&self, id: i64) -> ApiResult<Vec<PullHistoryEntry>> {
        Self::json(self.http.get(self.url(&format!("/clients/{}/history", id)))).await
    }

    pub async fn add_history(&self, id: i64, req: &PullEntryRequest) -> ApiResult<MessageResponse> {
        Self::json(self.http.post(self.url(&format!("/clients/{}/history", id))).json(req)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_list_clients() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/clients"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": 1,
                "client_name": "Acme",
                "domain_url": "https://acme.example",
                "client_id": "ACME-01",
                "original_password": "pw",
                "latest_pull_date": "2024-06-01 09:30:00",
                "latest_pull_by": "dana",
                "gsos_version": "4.2",
                "created_at": "2024-05-01T10:00:00Z",
                "updated_at": "2024-06-01T09:30:00Z"
            }])))
            .mount(&server)
            .await;

        let api = ApiClient::new(&format!("{}/api/", server.uri()));
        let clients = api.list_clients().await.unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].client_name, "Acme");
        assert!(clients[0].latest_pull_date.is_some());
    }

    #[tokio::test]
    async fn test_update_sends_only_set_fields() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/clients/7"))
            .and(body_json(json!({"client_name": "Renamed"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"message": "Client updated successfully"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri());
        let req = UpdateClientRequest {
            client_name: Some("Renamed".to_string()),
            ..Default::default()
        };
        let resp = api.update_client(7, &req).await.unwrap();
        assert_eq!(resp.message, "Client updated successfully");
    }

    #[tokio::test]
    async fn test_server_error_message_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/clients/3"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "Client not found"})))
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri());
        let err = api.delete_client(3).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "server returned 404: Client not found");
    }

    #[tokio::test]
    async fn test_plain_text_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clients/3/history"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri());
        match api.history(3).await {
            Err(ApiError::Server { status, message }) => {
                assert_eq!(status, 502);
                assert_eq!(message, "bad gateway");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_add_history_posts_entry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/clients/5/history"))
            .and(body_json(json!({
                "pull_date": "2024-06-01T00:00:00+00:00",
                "pull_by": "lee",
                "version": "4.3"
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"message": "Pull history added successfully"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri());
        let req = PullEntryRequest {
            pull_date: "2024-06-01T00:00:00Z".parse().unwrap(),
            pull_by: "lee".to_string(),
            version: Some("4.3".to_string()),
        };
        api.add_history(5, &req).await.unwrap();
    }
}
