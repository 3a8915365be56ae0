use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{fields, timestamp};

pub const MAX_TEXT_LEN: usize = 255;
pub const MAX_URL_LEN: usize = 2048;

// ============================================================================
// Roster records
// ============================================================================

/// One tracked deployment of the GSOS product.
///
/// The credential hash is never part of this type; it stays in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub client_name: String,
    pub domain_url: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_password: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub latest_pull_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub latest_pull_by: Option<String>,
    #[serde(default)]
    pub gsos_version: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Client {
    pub fn has_pull_history(&self) -> bool {
        self.latest_pull_date.is_some()
    }
}

/// One recorded pull. Rows are never edited once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullHistoryEntry {
    pub id: i64,
    pub client_id: i64,
    #[serde(with = "timestamp::required")]
    pub pull_date: DateTime<Utc>,
    pub pull_by: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Requests
// ============================================================================

/// Body of `POST /clients`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClientRequest {
    pub client_name: String,
    pub domain_url: String,
    pub client_id: String,
    pub password: String,
    #[serde(default, with = "timestamp::option")]
    pub latest_pull_date: Option<DateTime<Utc>>,
    #[serde(default, with = "fields::blank_string")]
    pub latest_pull_by: Option<String>,
    #[serde(default, with = "fields::blank_string")]
    pub gsos_version: Option<String>,
}

/// Body of `PUT /clients/:id`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateClientRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Blank means "keep the current credential".
    #[serde(default, with = "fields::blank_string", skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, with = "timestamp::patch", skip_serializing_if = "Option::is_none")]
    pub latest_pull_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, with = "fields::patch_string", skip_serializing_if = "Option::is_none")]
    pub latest_pull_by: Option<Option<String>>,
    #[serde(default, with = "fields::patch_string", skip_serializing_if = "Option::is_none")]
    pub gsos_version: Option<Option<String>>,
}

impl UpdateClientRequest {
    pub fn is_empty(&self) -> bool {
        self.client_name.is_none()
            && self.domain_url.is_none()
            && self.client_id.is_none()
            && self.password.is_none()
            && self.latest_pull_date.is_none()
            && self.latest_pull_by.is_none()
            && self.gsos_version.is_none()
    }
}

/// Body of `POST /clients/:id/history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullEntryRequest {
    #[serde(with = "timestamp::required")]
    pub pull_date: DateTime<Utc>,
    pub pull_by: String,
    #[serde(default, with = "fields::blank_string")]
    pub version: Option<String>,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub backend: String,
}

// ============================================================================
// Validation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field} {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

fn check_required(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError {
            field,
            reason: "is required".to_string(),
        });
    }
    check_len(field, value, max)
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError {
            field,
            reason: format!("must be at most {} characters", max),
        });
    }
    Ok(())
}

impl CreateClientRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_required("client_name", &self.client_name, MAX_TEXT_LEN)?;
        check_required("domain_url", &self.domain_url, MAX_URL_LEN)?;
        check_required("client_id", &self.client_id, MAX_TEXT_LEN)?;
        check_required("password", &self.password, MAX_TEXT_LEN)?;
        if let Some(by) = &self.latest_pull_by {
            check_len("latest_pull_by", by, MAX_TEXT_LEN)?;
        }
        if let Some(version) = &self.gsos_version {
            check_len("gsos_version", version, MAX_TEXT_LEN)?;
        }
        Ok(())
    }
}

impl UpdateClientRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.client_name {
            check_required("client_name", name, MAX_TEXT_LEN)?;
        }
        if let Some(url) = &self.domain_url {
            check_required("domain_url", url, MAX_URL_LEN)?;
        }
        if let Some(id) = &self.client_id {
            check_required("client_id", id, MAX_TEXT_LEN)?;
        }
        if let Some(password) = &self.password {
            check_len("password", password, MAX_TEXT_LEN)?;
        }
        if let Some(Some(by)) = &self.latest_pull_by {
            check_len("latest_pull_by", by, MAX_TEXT_LEN)?;
        }
        if let Some(Some(version)) = &self.gsos_version {
            check_len("gsos_version", version, MAX_TEXT_LEN)?;
        }
        Ok(())
    }
}

impl PullEntryRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_required("pull_by", &self.pull_by, MAX_TEXT_LEN)?;
        if let Some(version) = &self.version {
            check_len("version", version, MAX_TEXT_LEN)?;
        }
        Ok(())
    }
}
