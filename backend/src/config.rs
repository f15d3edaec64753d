use crate::services::history_service::{HISTORY_INDEX, TEMPLATE_INDEX};
use crate::services::llm_service::LlmClient;
use crate::services::search_service::YouTubeSearchClient;
use crate::services::token_service::TOKENS_INDEX;
use crate::services::transcript_service::YouTubeTranscriptFetcher;
use crate::AppState;
use anyhow::Result;
use elasticsearch::{
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::IndicesCreateParts,
    Elasticsearch,
};
use env_logger::Builder;
use lazy_static::lazy_static;
use log::{error, info, LevelFilter};
use rocket_cors::{AllowedHeaders, AllowedOrigins, CorsOptions};
use serde_json::json;
use std::env;

lazy_static! {
    pub static ref YOUTUBE_API_KEY: String =
        env::var("YOUTUBE_API_KEY").expect("YOUTUBE_API_KEY environment variable must be set");
    pub static ref OPENROUTER_API_KEY: String = env::var("OPENROUTER_API_KEY")
        .expect("OPENROUTER_API_KEY environment variable must be set");
    pub static ref OPENROUTER_BASE_URL: String = env::var("OPENROUTER_BASE_URL")
        .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string());
    pub static ref SUMMARY_MODEL: String =
        env::var("SUMMARY_MODEL").unwrap_or_else(|_| "openai/gpt-4o-mini".to_string());
    pub static ref ELASTICSEARCH_URL: String =
        env::var("ELASTICSEARCH_URL").unwrap_or_else(|_| "http://localhost:9200".to_string());
    pub static ref FILMOT_API_KEY: Option<String> = env::var("FILMOT_API_KEY").ok();
}

pub fn init_logger() {
    Builder::new().filter_level(LevelFilter::Info).init();
    info!("Starting Rocket backend...");
}

pub fn load_environment() {
    dotenv::dotenv().ok();
}

/// Touch every required secret so a missing one aborts startup instead of
/// surfacing mid-request. No checked-in fallback values exist.
pub fn require_secrets() {
    let _ = YOUTUBE_API_KEY.len();
    let _ = OPENROUTER_API_KEY.len();
}

pub fn create_elasticsearch_client() -> Result<Elasticsearch> {
    let es_url = &*ELASTICSEARCH_URL;
    info!("Connecting to Elasticsearch at: {es_url}");

    let transport =
        TransportBuilder::new(SingleNodeConnectionPool::new(es_url.parse()?)).build()?;

    Ok(Elasticsearch::new(transport))
}

async fn create_index(es_client: &Elasticsearch, index: &str, mappings: serde_json::Value) {
    match es_client
        .indices()
        .create(IndicesCreateParts::Index(index))
        .body(json!({ "mappings": mappings }))
        .send()
        .await
    {
        Ok(response) => {
            if response.status_code().is_success() {
                info!("Elasticsearch index '{index}' created or already exists.");
            } else {
                let response_text = response.text().await.unwrap_or_default();
                if response_text.contains("resource_already_exists_exception") {
                    info!("Elasticsearch index '{index}' already exists.");
                } else {
                    error!("Failed to create Elasticsearch index '{index}': {response_text}");
                }
            }
        }
        Err(e) => {
            error!("Failed to connect to Elasticsearch to create index '{index}': {e:?}");
        }
    }
}

pub async fn create_storage_indices(es_client: &Elasticsearch) {
    create_index(
        es_client,
        HISTORY_INDEX,
        json!({
            "properties": {
                "userId": { "type": "keyword" },
                "query": { "type": "text" },
                "isDefault": { "type": "boolean" },
                "createdAt": { "type": "date" },
                "updatedAt": { "type": "date" },
                "searchResults": { "type": "object", "enabled": false },
                "summaryData": { "type": "object", "enabled": false }
            }
        }),
    )
    .await;

    create_index(
        es_client,
        TEMPLATE_INDEX,
        json!({
            "properties": {
                "query": { "type": "text" },
                "searchResults": { "type": "object", "enabled": false },
                "summaryData": { "type": "object", "enabled": false }
            }
        }),
    )
    .await;

    create_index(
        es_client,
        TOKENS_INDEX,
        json!({
            "properties": {
                "userId": { "type": "keyword" },
                "tokens": { "type": "long" },
                "subscription": { "type": "keyword" },
                "lastDailyReset": { "type": "date" },
                "subscriptionExpiresAt": { "type": "date" }
            }
        }),
    )
    .await;
}

pub async fn create_app_state() -> Result<AppState> {
    require_secrets();

    let es_client = create_elasticsearch_client()?;
    create_storage_indices(&es_client).await;

    Ok(AppState {
        es_client,
        searcher: YouTubeSearchClient::new(),
        transcripts: YouTubeTranscriptFetcher::new(),
        llm: LlmClient::new(
            OPENROUTER_BASE_URL.clone(),
            OPENROUTER_API_KEY.clone(),
        ),
        http: reqwest::Client::new(),
    })
}

pub fn create_cors() -> Result<rocket_cors::Cors> {
    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_headers(AllowedHeaders::all())
        .to_cors()
        .map_err(|e| anyhow::anyhow!("Failed to create CORS options: {}", e))?;

    Ok(cors)
}
