use chrono::{DateTime, Utc};
use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::Responder;
use rocket::{response, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Cursor;

/// One discovered video, normalized from the search provider. The
/// `transcript` field stays empty until the enricher has attempted it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub video_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub published_at: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub search_phrase: String,
    #[serde(default)]
    pub phrase_index: usize,
    #[serde(default = "default_duplicate_count")]
    pub duplicate_count: u32,
}

fn default_duplicate_count() -> u32 {
    1
}

impl VideoRecord {
    pub fn new(video_id: impl Into<String>, title: impl Into<String>) -> Self {
        VideoRecord {
            video_id: video_id.into(),
            title: title.into(),
            description: String::new(),
            url: String::new(),
            thumbnail: String::new(),
            author: String::new(),
            published_at: String::new(),
            duration: String::new(),
            views: 0,
            transcript: None,
            search_phrase: String::new(),
            phrase_index: 0,
            duplicate_count: 1,
        }
    }
}

/// Result of one summarization call. `transcript_count` is the number of
/// input videos that carried a transcript at call time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    pub summary: String,
    pub total_results: usize,
    pub transcript_count: usize,
    pub model: String,
}

/// The stripped form of a summary that gets persisted into history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredSummary {
    pub summary: String,
    pub total_results: usize,
    pub transcript_count: usize,
}

impl From<&SummaryResult> for StoredSummary {
    fn from(summary: &SummaryResult) -> Self {
        StoredSummary {
            summary: summary.summary.clone(),
            total_results: summary.total_results,
            transcript_count: summary.transcript_count,
        }
    }
}

/// A persisted {query, results, summary} record. Template entries carry no
/// owner and are cloned into a per-user default on first listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub query: String,
    #[serde(default)]
    pub search_results: Vec<VideoRecord>,
    #[serde(default)]
    pub summary_data: Option<StoredSummary>,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Pro,
    Premium,
    Lifetime,
}

/// Per-user balance and subscription tier gating summary generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenLedger {
    pub user_id: String,
    pub tokens: i64,
    pub subscription: SubscriptionTier,
    pub last_daily_reset: DateTime<Utc>,
    #[serde(default)]
    pub subscription_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_tokens_earned: i64,
    #[serde(default)]
    pub total_tokens_used: i64,
}

// ---- API request/response types ----

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub success: bool,
    pub videos: Vec<VideoRecord>,
    pub count: usize,
    pub query: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSearchRequest {
    #[serde(default)]
    pub phrases: Vec<String>,
    pub videos_per_phrase: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateStats {
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSearchResponse {
    pub success: bool,
    pub videos: Vec<VideoRecord>,
    pub total_videos: usize,
    pub duplicate_stats: DuplicateStats,
    pub phrases: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptRequest {
    pub video_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptResponse {
    pub success: bool,
    pub transcript: Option<String>,
    pub language: Option<String>,
    pub video_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeRequest {
    #[serde(default)]
    pub videos: Vec<VideoRecord>,
    #[serde(default)]
    pub query: String,
    pub model: Option<String>,
    #[serde(default)]
    pub detailed_summary: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeResponse {
    pub success: bool,
    pub summary: String,
    pub total_results: usize,
    pub transcript_count: usize,
    pub model: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchRequest {
    pub query: String,
    #[serde(default)]
    pub phrases: Vec<String>,
    pub videos_per_phrase: Option<usize>,
    pub user_id: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub detailed_summary: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchResponse {
    pub success: bool,
    pub query: String,
    pub videos: Vec<VideoRecord>,
    pub summary: SummaryResult,
    pub history_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySaveRequest {
    pub user_id: Option<String>,
    pub query: String,
    #[serde(default)]
    pub search_results: Vec<VideoRecord>,
    #[serde(default)]
    pub summary_data: Option<StoredSummary>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPatch {
    pub user_id: Option<String>,
    pub query: Option<String>,
    pub search_results: Option<Vec<VideoRecord>>,
    pub summary_data: Option<StoredSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryListResponse {
    pub success: bool,
    pub entries: Vec<HistoryEntry>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMutationResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub success: bool,
    pub ledger: TokenLedger,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeResponse {
    pub success: bool,
    pub consumed: bool,
    pub tokens_remaining: i64,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub tier: SubscriptionTier,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilmotResponse {
    pub success: bool,
    pub query: String,
    pub data: Value,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    #[serde(skip)]
    pub status: Status,
    pub success: bool,
    pub error: String,
    pub message: String,
}

impl<'r> Responder<'r, 'static> for ErrorResponse {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status;
        let json =
            serde_json::to_string(&self).map_err(|_| Status::InternalServerError)?;
        Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}
