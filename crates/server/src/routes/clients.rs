use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use shared::{Client, CreateClientRequest, CreatedResponse, MessageResponse, UpdateClientRequest};

use crate::{
    error::{AppError, AppJson, AppPath},
    state::AppState,
    store::{ClientChanges, NewClient},
};

pub async fn list_clients(State(state): State<AppState>) -> Result<Json<Vec<Client>>, AppError> {
    let clients = state.store.list_all().await?;
    Ok(Json(clients))
}

pub async fn create_client(
    State(state): State<AppState>,
    AppJson(req): AppJson<CreateClientRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    req.validate()?;

    let name = req.client_name.clone();
    let id = state.store.insert(NewClient::from_request(req)?).await?;
    tracing::info!("Added client {} ({})", id, name);

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            id,
            message: "Client added successfully".to_string(),
        }),
    ))
}

pub async fn update_client(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<UpdateClientRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    req.validate()?;

    let password_changed = req.password.is_some();
    state.store.update(id, ClientChanges::from_request(req)?).await?;
    tracing::info!("Updated client {} (password changed: {})", id, password_changed);

    Ok(Json(MessageResponse::new("Client updated successfully")))
}

pub async fn delete_client(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<MessageResponse>, AppError> {
    state.store.delete(id).await?;
    tracing::info!("Deleted client {} and its pull history", id);

    Ok(Json(MessageResponse::new("Client deleted successfully")))
}

pub async fn get_client_details(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Client>, AppError> {
    state
        .store
        .get_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Client not found".to_string()))
}
