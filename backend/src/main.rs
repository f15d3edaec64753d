#[macro_use]
extern crate rocket;

mod api;
mod config;
mod error;
mod models;
mod services;
mod utils;

use elasticsearch::Elasticsearch;
use services::llm_service::LlmClient;
use services::search_service::YouTubeSearchClient;
use services::transcript_service::YouTubeTranscriptFetcher;

/// Shared clients handed to every route via Rocket's managed state.
pub struct AppState {
    pub es_client: Elasticsearch,
    pub searcher: YouTubeSearchClient,
    pub transcripts: YouTubeTranscriptFetcher,
    pub llm: LlmClient,
    pub http: reqwest::Client,
}

#[launch]
async fn rocket() -> _ {
    config::load_environment();
    config::init_logger();

    let state = config::create_app_state()
        .await
        .expect("failed to initialize application state");
    let cors = config::create_cors().expect("failed to build CORS fairing");

    rocket::build().manage(state).attach(cors).mount(
        "/api",
        routes![
            api::search_videos,
            api::batch_search,
            api::filmot_search,
            api::get_transcript,
            api::summarize_videos,
            api::run_research,
            api::list_history,
            api::get_history,
            api::save_history,
            api::update_history,
            api::delete_history,
            api::delete_all_history,
            api::get_tokens,
            api::stream_tokens,
            api::consume_token,
            api::purchase_subscription,
            api::cancel_subscription,
            api::gumroad_webhook_ping,
            api::gumroad_webhook,
        ],
    )
}
