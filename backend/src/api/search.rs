use crate::config::FILMOT_API_KEY;
use crate::error::ApiError;
use crate::models::{
    BatchSearchRequest, BatchSearchResponse, DuplicateStats, FilmotResponse, SearchResponse,
};
use crate::services::aggregator;
use crate::services::search_service::{VideoSearcher, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT};
use crate::AppState;
use chrono::Utc;
use log::info;
use rocket::serde::json::Json;
use rocket::{get, post, State};
use serde_json::Value;

#[get("/search?<q>&<limit>")]
pub async fn search_videos(
    q: Option<String>,
    limit: Option<usize>,
    state: &State<AppState>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = q.unwrap_or_default();
    let query = query.trim();
    if query.is_empty() {
        return Err(ApiError::Validation(
            "query parameter 'q' must not be blank".to_string(),
        ));
    }

    let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT);
    let videos = state.searcher.search(query, limit).await?;
    info!("Search for '{query}' returned {} videos", videos.len());

    Ok(Json(SearchResponse {
        success: true,
        count: videos.len(),
        videos,
        query: query.to_string(),
    }))
}

#[post("/batch-search", data = "<request>")]
pub async fn batch_search(
    request: Json<BatchSearchRequest>,
    state: &State<AppState>,
) -> Result<Json<BatchSearchResponse>, ApiError> {
    let phrases: Vec<String> = request
        .phrases
        .iter()
        .map(|phrase| phrase.trim().to_string())
        .filter(|phrase| !phrase.is_empty())
        .collect();

    if phrases.is_empty() {
        return Err(ApiError::Validation(
            "'phrases' must be a non-empty array of search phrases".to_string(),
        ));
    }

    let per_phrase = request
        .videos_per_phrase
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);

    let outcome = aggregator::aggregate(&state.searcher, &phrases, per_phrase).await;

    Ok(Json(BatchSearchResponse {
        success: true,
        total_videos: outcome.videos.len(),
        videos: outcome.videos,
        duplicate_stats: DuplicateStats {
            count: outcome.duplicate_count,
        },
        phrases,
    }))
}

/// Proxy to the Filmot caption-search API, so browser callers avoid its
/// CORS restrictions and never see the key.
#[get("/filmot?<q>")]
pub async fn filmot_search(
    q: Option<String>,
    state: &State<AppState>,
) -> Result<Json<FilmotResponse>, ApiError> {
    let query = q.unwrap_or_default();
    let query = query.trim().to_string();
    if query.is_empty() {
        return Err(ApiError::Validation(
            "query parameter 'q' must not be blank".to_string(),
        ));
    }

    let Some(api_key) = FILMOT_API_KEY.as_ref() else {
        return Err(ApiError::Config(
            "FILMOT_API_KEY is not configured".to_string(),
        ));
    };

    let response = state
        .http
        .get("https://filmot.com/api/getsearchsubtitles")
        .query(&[
            ("key", api_key.as_str()),
            ("query", query.as_str()),
            ("format", "json"),
        ])
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        return Err(ApiError::Provider(format!(
            "Filmot returned {status} for query '{query}'"
        )));
    }

    let data: Value = response.json().await?;

    Ok(Json(FilmotResponse {
        success: true,
        query,
        data,
        timestamp: Utc::now().to_rfc3339(),
    }))
}
