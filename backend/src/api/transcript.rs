use crate::error::ApiError;
use crate::models::{TranscriptRequest, TranscriptResponse};
use crate::services::transcript_service;
use crate::utils::normalize_video_id;
use crate::AppState;
use log::error;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::{post, State};

/// Fetch one transcript. The body accepts a raw video id or a full
/// YouTube URL. Provider failures answer 500 with a structured body that
/// still names the video, so a batch caller can attribute the failure.
#[post("/transcript", data = "<request>")]
pub async fn get_transcript(
    request: Json<TranscriptRequest>,
    state: &State<AppState>,
) -> Result<Custom<Json<TranscriptResponse>>, ApiError> {
    let Some(video_id) = normalize_video_id(&request.video_id) else {
        return Err(ApiError::Validation(format!(
            "'{}' is not a YouTube video id or URL",
            request.video_id
        )));
    };

    match transcript_service::fetch_with_timeout(&state.transcripts, &video_id).await {
        Ok(captions) => Ok(Custom(
            Status::Ok,
            Json(TranscriptResponse {
                success: true,
                transcript: Some(captions.text),
                language: Some(captions.language),
                video_id,
                error: None,
            }),
        )),
        Err(e) => {
            error!("Transcript fetch for {video_id} failed: {e:?}");
            Ok(Custom(
                Status::InternalServerError,
                Json(TranscriptResponse {
                    success: false,
                    transcript: None,
                    language: None,
                    video_id,
                    error: Some(e.to_string()),
                }),
            ))
        }
    }
}
