use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared::{ErrorResponse, ValidationError};
use thiserror::Error;

use crate::store::StoreError;

const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Store(StoreError),

    #[error("{0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity: "client", .. } => AppError::NotFound("Client not found".to_string()),
            StoreError::NotFound { entity, id } => AppError::NotFound(format!("{} {} not found", entity, id)),
            other => AppError::Store(other),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// The unredacted message behind a 500, carried on the response so an outer
/// layer can choose to reveal it.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: msg })).into_response(),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, Json(ErrorResponse { error: msg })).into_response(),
            AppError::Store(_) | AppError::Internal(_) => {
                let detail = self.to_string();
                tracing::error!("Request failed: {}", detail);
                let mut response = (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: INTERNAL_MESSAGE.to_string(),
                    }),
                )
                    .into_response();
                response.extensions_mut().insert(ErrorDetail(detail));
                response
            }
        }
    }
}

/// Response mapper that swaps the generic 500 body for the stored detail.
pub async fn reveal_internal_errors(response: Response) -> Response {
    match response.extensions().get::<ErrorDetail>().cloned() {
        Some(ErrorDetail(detail)) => (response.status(), Json(ErrorResponse { error: detail })).into_response(),
        None => response,
    }
}

/// `Json` whose rejections use the `{ "error": ... }` body and status 400.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// `Path` with the same JSON 400 on a malformed segment.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);
