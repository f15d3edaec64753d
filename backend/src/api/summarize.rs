use crate::config::SUMMARY_MODEL;
use crate::error::ApiError;
use crate::models::{ResearchRequest, ResearchResponse, SummarizeRequest, SummarizeResponse};
use crate::services::pipeline::{self, PipelineInput};
use crate::services::search_service::{DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT};
use crate::services::summary_service;
use crate::AppState;
use rocket::serde::json::Json;
use rocket::{post, State};

/// Summarize an already-enriched video list in one model call.
#[post("/summarize-videos", data = "<request>")]
pub async fn summarize_videos(
    request: Json<SummarizeRequest>,
    state: &State<AppState>,
) -> Result<Json<SummarizeResponse>, ApiError> {
    if request.videos.is_empty() {
        return Err(ApiError::Validation(
            "'videos' must be a non-empty array".to_string(),
        ));
    }

    let request = request.into_inner();
    let model = request.model.unwrap_or_else(|| SUMMARY_MODEL.clone());

    let summary = summary_service::summarize_videos(
        &state.llm,
        &request.videos,
        &request.query,
        &model,
        request.detailed_summary,
    )
    .await?;

    Ok(Json(SummarizeResponse {
        success: true,
        summary: summary.summary,
        total_results: summary.total_results,
        transcript_count: summary.transcript_count,
        model: summary.model,
    }))
}

/// Run the whole discovery-and-digest pipeline for one query.
#[post("/research", data = "<request>")]
pub async fn run_research(
    request: Json<ResearchRequest>,
    state: &State<AppState>,
) -> Result<Json<ResearchResponse>, ApiError> {
    let request = request.into_inner();
    let query = request.query.trim().to_string();
    if query.is_empty() {
        return Err(ApiError::Validation(
            "'query' must not be blank".to_string(),
        ));
    }

    let phrases: Vec<String> = request
        .phrases
        .iter()
        .map(|phrase| phrase.trim().to_string())
        .filter(|phrase| !phrase.is_empty())
        .collect();
    // With no explicit phrases the query itself is the single phrase.
    let phrases = if phrases.is_empty() {
        vec![query.clone()]
    } else {
        phrases
    };

    let outcome = pipeline::run_research(
        &state.es_client,
        &state.searcher,
        &state.llm,
        &state.transcripts,
        PipelineInput {
            query: query.clone(),
            phrases,
            per_phrase_limit: request
                .videos_per_phrase
                .unwrap_or(DEFAULT_SEARCH_LIMIT)
                .clamp(1, MAX_SEARCH_LIMIT),
            user_id: request.user_id,
            model: request.model.unwrap_or_else(|| SUMMARY_MODEL.clone()),
            detailed: request.detailed_summary,
        },
    )
    .await?;

    Ok(Json(ResearchResponse {
        success: true,
        query,
        videos: outcome.videos,
        summary: outcome.summary,
        history_id: outcome.history_id,
    }))
}
