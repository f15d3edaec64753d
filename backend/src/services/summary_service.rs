use crate::error::ApiError;
use crate::models::{SummaryResult, VideoRecord};
use crate::services::llm_service::{ChatModel, ChatRequest};
use log::info;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const SUMMARY_TEMPERATURE: f32 = 0.7;
const SUMMARY_MAX_TOKENS: u32 = 4096;

/// Settle delay before an automatic summarization fires, so a burst of
/// trailing progress updates does not trigger it repeatedly.
pub const TRIGGER_SETTLE: Duration = Duration::from_secs(2);

const SUMMARY_SYSTEM_PROMPT: &str = "You are a research assistant. You are given \
transcripts of several YouTube videos and a user request. Produce one coherent \
summary across all of them, citing video titles where a point comes from a \
specific video.";

const DETAILED_SUMMARY_SUFFIX: &str = "\n\nGo deeper than a surface summary: \
cover every major theme, include concrete examples and figures mentioned in \
the transcripts, and note where the videos disagree with each other.";

/// Summarize every video that carries a transcript in a single model call.
/// Callers are expected to pass the full candidate set; `total_results`
/// reflects that set, `transcript_count` only the summarizable part.
pub async fn summarize_videos<L: ChatModel>(
    llm: &L,
    videos: &[VideoRecord],
    user_query: &str,
    model: &str,
    detailed: bool,
) -> Result<SummaryResult, ApiError> {
    let with_transcripts: Vec<&VideoRecord> = videos
        .iter()
        .filter(|video| video.transcript.is_some())
        .collect();

    if with_transcripts.is_empty() {
        // No model call is made for an unsummarizable set.
        return Err(ApiError::NoTranscriptsAvailable);
    }

    let query = if detailed {
        format!("{user_query}{DETAILED_SUMMARY_SUFFIX}")
    } else {
        user_query.to_string()
    };

    // One request with everything concatenated. Very large batches can
    // exceed the model's context window; chunking is out of scope here.
    let prompt = build_summary_prompt(&with_transcripts, &query);

    info!(
        "Summarizing {} of {} videos with model {model}",
        with_transcripts.len(),
        videos.len()
    );

    let summary = llm
        .chat(ChatRequest {
            model: model.to_string(),
            system: Some(SUMMARY_SYSTEM_PROMPT.to_string()),
            user: prompt,
            temperature: SUMMARY_TEMPERATURE,
            max_tokens: SUMMARY_MAX_TOKENS,
        })
        .await?;

    Ok(SummaryResult {
        summary,
        total_results: videos.len(),
        transcript_count: with_transcripts.len(),
        model: model.to_string(),
    })
}

fn build_summary_prompt(videos: &[&VideoRecord], query: &str) -> String {
    let mut prompt = format!("User request: {query}\n\n");
    for (index, video) in videos.iter().enumerate() {
        prompt.push_str(&format!(
            "--- Video {} ---\nTitle: {}\nChannel: {}\nTranscript:\n{}\n\n",
            index + 1,
            video.title,
            video.author,
            video.transcript.as_deref().unwrap_or(""),
        ));
    }
    prompt
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Idle,
    Waiting,
    Summarizing,
    Done,
}

struct TriggerInner {
    state: TriggerState,
    // Bumped on every observation; a pending settle timer only fires if
    // its generation is still current.
    generation: u64,
}

/// Auto-trigger for summarization. `observe` is called with the current
/// enrichment progress; once every video has been attempted (and no
/// summary exists yet) a cancellable settle timer is armed, and its expiry
/// emits one fire signal on the channel returned by `new`.
#[derive(Clone)]
pub struct SummaryTrigger {
    inner: Arc<Mutex<TriggerInner>>,
    settle: Duration,
    fire_tx: mpsc::UnboundedSender<()>,
}

impl SummaryTrigger {
    pub fn new(settle: Duration) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (fire_tx, fire_rx) = mpsc::unbounded_channel();
        (
            SummaryTrigger {
                inner: Arc::new(Mutex::new(TriggerInner {
                    state: TriggerState::Idle,
                    generation: 0,
                })),
                settle,
                fire_tx,
            },
            fire_rx,
        )
    }

    pub fn state(&self) -> TriggerState {
        self.inner.lock().unwrap().state
    }

    pub fn observe(&self, with_transcripts: usize, total: usize, has_summary: bool) {
        let mut inner = self.inner.lock().unwrap();
        // Any new observation cancels a pending settle timer.
        inner.generation += 1;

        if has_summary {
            inner.state = TriggerState::Done;
            return;
        }
        if matches!(inner.state, TriggerState::Summarizing | TriggerState::Done) {
            return;
        }
        if total == 0 {
            inner.state = TriggerState::Idle;
            return;
        }

        inner.state = TriggerState::Waiting;
        if with_transcripts < total {
            return;
        }

        // Every video has been attempted: arm the settle timer.
        let generation = inner.generation;
        drop(inner);

        let inner_handle = Arc::clone(&self.inner);
        let fire_tx = self.fire_tx.clone();
        let settle = self.settle;
        tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            let mut inner = inner_handle.lock().unwrap();
            if inner.generation == generation && inner.state == TriggerState::Waiting {
                inner.state = TriggerState::Summarizing;
                let _ = fire_tx.send(());
            }
        });
    }

    /// Record the outcome of the summarization the trigger fired.
    pub fn finish(&self, succeeded: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = if succeeded {
            TriggerState::Done
        } else {
            TriggerState::Idle
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatModel for CountingModel {
        async fn chat(&self, _request: ChatRequest) -> Result<String, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("a summary".to_string())
        }
    }

    fn video(id: &str, transcript: Option<&str>) -> VideoRecord {
        let mut video = VideoRecord::new(id, format!("title {id}"));
        video.transcript = transcript.map(str::to_string);
        video
    }

    #[tokio::test]
    async fn fails_without_transcripts_and_makes_no_call() {
        let model = CountingModel {
            calls: AtomicUsize::new(0),
        };
        let videos = vec![video("aaaaaaaaaaa", None), video("bbbbbbbbbbb", None)];

        let result = summarize_videos(&model, &videos, "q", "test-model", false).await;
        assert!(matches!(result, Err(ApiError::NoTranscriptsAvailable)));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);

        let result = summarize_videos(&model, &[], "q", "test-model", false).await;
        assert!(matches!(result, Err(ApiError::NoTranscriptsAvailable)));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn counts_reflect_inputs() {
        let model = CountingModel {
            calls: AtomicUsize::new(0),
        };
        let videos = vec![
            video("aaaaaaaaaaa", Some("first transcript")),
            video("bbbbbbbbbbb", None),
            video("ccccccccccc", Some("third transcript")),
        ];

        let summary = summarize_videos(&model, &videos, "q", "test-model", true)
            .await
            .unwrap();
        assert_eq!(summary.total_results, 3);
        assert_eq!(summary.transcript_count, 2);
        assert_eq!(summary.model, "test-model");
        assert!(summary.transcript_count <= summary.total_results);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_fires_after_settle_delay() {
        let (trigger, mut fire_rx) = SummaryTrigger::new(Duration::from_secs(2));

        trigger.observe(1, 3, false);
        assert_eq!(trigger.state(), TriggerState::Waiting);

        trigger.observe(3, 3, false);
        // paused time: recv drives the sleep forward
        fire_rx.recv().await.expect("trigger should fire");
        assert_eq!(trigger.state(), TriggerState::Summarizing);

        trigger.finish(true);
        assert_eq!(trigger.state(), TriggerState::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn reobservation_cancels_pending_timer() {
        let (trigger, mut fire_rx) = SummaryTrigger::new(Duration::from_secs(2));

        trigger.observe(3, 3, false);
        tokio::time::advance(Duration::from_secs(1)).await;
        // a re-run of the observation before the delay elapses re-arms it
        trigger.observe(3, 3, false);
        tokio::time::advance(Duration::from_millis(1500)).await;
        tokio::task::yield_now().await;
        assert!(fire_rx.try_recv().is_err(), "cancelled timer must not fire");

        tokio::time::advance(Duration::from_millis(600)).await;
        tokio::task::yield_now().await;
        assert!(fire_rx.try_recv().is_ok(), "re-armed timer fires once");
        assert_eq!(trigger.state(), TriggerState::Summarizing);
    }

    #[tokio::test(start_paused = true)]
    async fn no_fire_when_summary_exists_or_incomplete() {
        let (trigger, mut fire_rx) = SummaryTrigger::new(Duration::from_secs(2));

        trigger.observe(2, 3, false);
        tokio::time::advance(Duration::from_secs(3)).await;
        tokio::task::yield_now().await;
        assert!(fire_rx.try_recv().is_err());

        trigger.observe(3, 3, true);
        assert_eq!(trigger.state(), TriggerState::Done);
        tokio::time::advance(Duration::from_secs(3)).await;
        tokio::task::yield_now().await;
        assert!(fire_rx.try_recv().is_err());
    }
}
