use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use shared::{MessageResponse, PullEntryRequest, PullHistoryEntry};

use crate::{
    error::{AppError, AppJson, AppPath},
    state::AppState,
};

/// History for a client, newest first. An unknown id yields an empty list.
pub async fn list_history(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Vec<PullHistoryEntry>>, AppError> {
    let entries = state.store.list_for_client(id).await?;
    Ok(Json(entries))
}

pub async fn add_history(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<PullEntryRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    req.validate()?;

    let entry = state.store.append(id, req).await?;
    tracing::info!(
        "Recorded pull {} for client {} by {} ({})",
        entry.id,
        id,
        entry.pull_by,
        entry.version.as_deref().unwrap_or("no version")
    );

    Ok((StatusCode::CREATED, Json(MessageResponse::new("Pull history added successfully"))))
}
