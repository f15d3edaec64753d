use crate::error::ApiError;
use crate::models::{ConsumeResponse, PurchaseRequest, TokenResponse};
use crate::services::token_service;
use crate::AppState;
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::{get, post, State};
use std::time::Duration;

const LEDGER_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[get("/tokens/<user_id>")]
pub async fn get_tokens(
    user_id: &str,
    state: &State<AppState>,
) -> Result<Json<TokenResponse>, ApiError> {
    let ledger = token_service::get_or_create(&state.es_client, user_id).await?;
    Ok(Json(TokenResponse {
        success: true,
        ledger,
    }))
}

/// Server-sent events stream of ledger changes, so a client can show the
/// balance updating without polling the GET endpoint itself.
#[get("/tokens/<user_id>/live")]
pub async fn stream_tokens(
    user_id: &str,
    state: &State<AppState>,
) -> Result<EventStream![], ApiError> {
    let mut ledger_rx = token_service::subscribe(
        state.es_client.clone(),
        user_id.to_string(),
        LEDGER_POLL_INTERVAL,
    )
    .await?;

    Ok(EventStream! {
        loop {
            let ledger = ledger_rx.borrow_and_update().clone();
            if let Ok(json) = serde_json::to_string(&ledger) {
                yield Event::data(json);
            }
            if ledger_rx.changed().await.is_err() {
                break;
            }
        }
    })
}

#[post("/tokens/<user_id>/consume")]
pub async fn consume_token(
    user_id: &str,
    state: &State<AppState>,
) -> Result<Json<ConsumeResponse>, ApiError> {
    let consumed = token_service::consume(&state.es_client, user_id).await?;
    let ledger = token_service::get_or_create(&state.es_client, user_id).await?;

    Ok(Json(ConsumeResponse {
        success: true,
        consumed,
        tokens_remaining: ledger.tokens,
    }))
}

#[post("/tokens/<user_id>/purchase", data = "<request>")]
pub async fn purchase_subscription(
    user_id: &str,
    request: Json<PurchaseRequest>,
    state: &State<AppState>,
) -> Result<Json<TokenResponse>, ApiError> {
    let ledger = token_service::purchase(&state.es_client, user_id, request.tier).await?;
    Ok(Json(TokenResponse {
        success: true,
        ledger,
    }))
}

#[post("/tokens/<user_id>/cancel")]
pub async fn cancel_subscription(
    user_id: &str,
    state: &State<AppState>,
) -> Result<Json<TokenResponse>, ApiError> {
    let ledger = token_service::cancel(&state.es_client, user_id).await?;
    Ok(Json(TokenResponse {
        success: true,
        ledger,
    }))
}
