use crate::error::ApiError;
use crate::models::{
    HistoryEntry, HistoryListResponse, HistoryMutationResponse, HistoryPatch, HistorySaveRequest,
};
use crate::services::history_service;
use crate::AppState;
use rocket::serde::json::Json;
use rocket::{delete, get, post, put, State};

const DEFAULT_LIST_LIMIT: usize = 50;

#[get("/history?<user_id>&<limit>")]
pub async fn list_history(
    user_id: Option<String>,
    limit: Option<usize>,
    state: &State<AppState>,
) -> Result<Json<HistoryListResponse>, ApiError> {
    let entries = history_service::list_history(
        &state.es_client,
        user_id.as_deref(),
        limit.unwrap_or(DEFAULT_LIST_LIMIT),
    )
    .await?;

    Ok(Json(HistoryListResponse {
        success: true,
        count: entries.len(),
        entries,
    }))
}

#[get("/history/<id>")]
pub async fn get_history(
    id: &str,
    state: &State<AppState>,
) -> Result<Json<HistoryEntry>, ApiError> {
    match history_service::get_history(&state.es_client, id).await? {
        Some(entry) => Ok(Json(entry)),
        None => Err(ApiError::NotFound(format!("history entry {id}"))),
    }
}

#[post("/history", data = "<request>")]
pub async fn save_history(
    request: Json<HistorySaveRequest>,
    state: &State<AppState>,
) -> Result<Json<HistoryMutationResponse>, ApiError> {
    let request = request.into_inner();
    let id = history_service::save_history(
        &state.es_client,
        request.user_id.as_deref(),
        &request.query,
        &request.search_results,
        request.summary_data,
    )
    .await?;

    // A signed-out save is a quiet no-op, not an error.
    let (success, message) = match &id {
        Some(id) => (true, format!("History entry {id} saved")),
        None => (false, "Sign in to save history".to_string()),
    };

    Ok(Json(HistoryMutationResponse {
        success,
        message,
        id,
        deleted: None,
    }))
}

#[put("/history/<id>", data = "<patch>")]
pub async fn update_history(
    id: &str,
    patch: Json<HistoryPatch>,
    state: &State<AppState>,
) -> Result<Json<HistoryMutationResponse>, ApiError> {
    let patch = patch.into_inner();
    let user_id = patch.user_id.clone();
    let updated =
        history_service::update_history(&state.es_client, id, patch, user_id.as_deref()).await?;

    Ok(Json(HistoryMutationResponse {
        success: updated,
        message: if updated {
            format!("History entry {id} updated")
        } else {
            format!("History entry {id} was not updated")
        },
        id: Some(id.to_string()),
        deleted: None,
    }))
}

#[delete("/history/<id>?<user_id>")]
pub async fn delete_history(
    id: &str,
    user_id: Option<String>,
    state: &State<AppState>,
) -> Result<Json<HistoryMutationResponse>, ApiError> {
    let deleted =
        history_service::delete_history(&state.es_client, id, user_id.as_deref()).await?;

    Ok(Json(HistoryMutationResponse {
        success: deleted,
        message: if deleted {
            format!("History entry {id} deleted")
        } else {
            format!("History entry {id} was not deleted")
        },
        id: Some(id.to_string()),
        deleted: None,
    }))
}

#[delete("/history?<user_id>")]
pub async fn delete_all_history(
    user_id: Option<String>,
    state: &State<AppState>,
) -> Result<Json<HistoryMutationResponse>, ApiError> {
    let deleted = history_service::delete_all_history(&state.es_client, user_id.as_deref()).await?;

    Ok(Json(HistoryMutationResponse {
        success: true,
        message: format!("Deleted {deleted} history entries"),
        id: None,
        deleted: Some(deleted),
    }))
}
