use crate::error::ApiError;
use crate::models::{StoredSummary, SummaryResult, VideoRecord};
use crate::services::llm_service::ChatModel;
use crate::services::search_service::VideoSearcher;
use crate::services::summary_service::TRIGGER_SETTLE;
use crate::services::transcript_service::TranscriptFetcher;
use crate::services::{
    aggregator, history_service, relevance_service, summary_service, token_service,
    transcript_service,
};
use elasticsearch::Elasticsearch;
use log::{debug, info};
use tokio::sync::mpsc;

pub struct PipelineInput {
    pub query: String,
    pub phrases: Vec<String>,
    pub per_phrase_limit: usize,
    pub user_id: Option<String>,
    pub model: String,
    pub detailed: bool,
}

pub struct PipelineOutcome {
    pub videos: Vec<VideoRecord>,
    pub summary: SummaryResult,
    pub history_id: Option<String>,
}

/// The full discovery-and-digest flow: aggregate phrase searches, let the
/// model pick the relevant subset, enrich with transcripts, summarize, and
/// persist the run for signed-in users. A token is charged right before
/// the summarization step, never for a run that dies earlier.
pub async fn run_research<S, L, F>(
    es_client: &Elasticsearch,
    searcher: &S,
    llm: &L,
    fetcher: &F,
    input: PipelineInput,
) -> Result<PipelineOutcome, ApiError>
where
    S: VideoSearcher,
    L: ChatModel,
    F: TranscriptFetcher,
{
    // Refuse the whole run up front when the caller cannot afford the
    // summary; the authoritative charge still happens later.
    if let Some(user_id) = input.user_id.as_deref() {
        if !token_service::can_consume(es_client, user_id).await? {
            return Err(ApiError::OutOfTokens);
        }
    }

    let outcome = aggregator::aggregate(searcher, &input.phrases, input.per_phrase_limit).await;

    let ids = relevance_service::filter_relevant(llm, &outcome.videos, &input.query, &input.model)
        .await;
    // An empty id list means filtering failed or nothing matched; proceed
    // with the unfiltered set instead of producing nothing.
    let candidates = if ids.is_empty() {
        outcome.videos
    } else {
        relevance_service::get_filtered_videos(&outcome.videos, &ids)
    };

    let total = candidates.len();
    let (trigger, mut fire_rx) = summary_service::SummaryTrigger::new(TRIGGER_SETTLE);

    // The drain task feeds the trigger one observation per snapshot; the
    // enricher emits exactly one snapshot per attempted video, so the
    // snapshot count doubles as the attempt count.
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<Vec<VideoRecord>>();
    let drain_trigger = trigger.clone();
    let progress_log = tokio::spawn(async move {
        let mut attempted = 0;
        while let Some(snapshot) = progress_rx.recv().await {
            attempted += 1;
            let with_transcripts = snapshot
                .iter()
                .filter(|video| video.transcript.is_some())
                .count();
            debug!(
                "Transcript progress: {attempted}/{total} attempted, {with_transcripts} with transcripts"
            );
            drain_trigger.observe(attempted, total, false);
        }
    });

    let enriched = transcript_service::enrich_videos(fetcher, candidates, Some(progress_tx)).await;
    let _ = progress_log.await;

    // Never charge for a run that cannot produce a summary at all.
    if enriched.iter().all(|video| video.transcript.is_none()) {
        return Err(ApiError::NoTranscriptsAvailable);
    }

    if let Some(user_id) = input.user_id.as_deref() {
        if !token_service::consume(es_client, user_id).await? {
            return Err(ApiError::OutOfTokens);
        }
    }

    // Summarization waits for the settle timer armed by the last
    // observation, so a burst of trailing snapshots triggers it once.
    if total > 0 {
        let _ = fire_rx.recv().await;
    }

    let summary = summary_service::summarize_videos(
        llm,
        &enriched,
        &input.query,
        &input.model,
        input.detailed,
    )
    .await;
    trigger.finish(summary.is_ok());
    let summary = summary?;

    let history_id = history_service::save_history(
        es_client,
        input.user_id.as_deref(),
        &input.query,
        &enriched,
        Some(StoredSummary::from(&summary)),
    )
    .await?;

    info!(
        "Research run for '{}' finished: {} videos, {} transcripts",
        input.query,
        summary.total_results,
        summary.transcript_count
    );

    Ok(PipelineOutcome {
        videos: enriched,
        summary,
        history_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm_service::ChatRequest;
    use crate::services::transcript_service::FetchedCaptions;
    use async_trait::async_trait;

    /// Returns the same two videos for every phrase, so two phrases
    /// exercise the dedupe path.
    struct StubSearcher;

    #[async_trait]
    impl VideoSearcher for StubSearcher {
        async fn search(&self, _phrase: &str, _limit: usize) -> Result<Vec<VideoRecord>, ApiError> {
            Ok(vec![
                VideoRecord::new("aaaaaaaaaaa", "first video"),
                VideoRecord::new("bbbbbbbbbbb", "second video"),
            ])
        }
    }

    /// Answers the relevance call with an id array and the summary call
    /// with prose; the two are told apart by their token budgets.
    struct StubModel;

    #[async_trait]
    impl ChatModel for StubModel {
        async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
            if request.max_tokens <= 512 {
                Ok("[1, 2]".to_string())
            } else {
                Ok("a digest".to_string())
            }
        }
    }

    struct StubFetcher;

    #[async_trait]
    impl TranscriptFetcher for StubFetcher {
        async fn fetch(&self, video_id: &str) -> Result<FetchedCaptions, ApiError> {
            Ok(FetchedCaptions {
                text: format!("transcript for {video_id}"),
                language: "English".to_string(),
            })
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl TranscriptFetcher for FailingFetcher {
        async fn fetch(&self, _video_id: &str) -> Result<FetchedCaptions, ApiError> {
            Err(ApiError::Provider("no captions".to_string()))
        }
    }

    fn input() -> PipelineInput {
        PipelineInput {
            query: "cat feeding".to_string(),
            phrases: vec!["how much to feed a cat".to_string(), "cat diet".to_string()],
            per_phrase_limit: 5,
            user_id: None,
            model: "test-model".to_string(),
            detailed: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn anonymous_run_summarizes_without_touching_the_store() {
        let es_client = Elasticsearch::default();

        let outcome = run_research(&es_client, &StubSearcher, &StubModel, &StubFetcher, input())
            .await
            .unwrap();

        assert_eq!(outcome.summary.summary, "a digest");
        assert!(outcome.history_id.is_none(), "anonymous runs save nothing");
        // both phrases returned the same two videos
        assert_eq!(outcome.videos.len(), 2);
        assert_eq!(outcome.videos[0].duplicate_count, 2);
        assert!(outcome.videos.iter().all(|v| v.transcript.is_some()));
        assert_eq!(outcome.summary.transcript_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_without_any_transcript_is_rejected_before_summarizing() {
        let es_client = Elasticsearch::default();

        let result =
            run_research(&es_client, &StubSearcher, &StubModel, &FailingFetcher, input()).await;
        assert!(matches!(result, Err(ApiError::NoTranscriptsAvailable)));
    }
}
