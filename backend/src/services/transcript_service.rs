use crate::error::ApiError;
use crate::models::VideoRecord;
use crate::utils::{default_thumbnail_url, watch_url};
use async_trait::async_trait;
use log::{error, info};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use yt_transcript_rs::api::YouTubeTranscriptApi;

pub const TRANSCRIPT_TIMEOUT: Duration = Duration::from_secs(10);
/// Pacing between consecutive provider requests, to stay under rate limits.
const REQUEST_PACING: Duration = Duration::from_millis(100);

const TRANSCRIPT_LANGUAGES: &[&str] = &["en"];

/// A transcript normalized to plain text at the adapter boundary; nothing
/// past this point ever sees the provider's snippet structure.
#[derive(Debug, Clone)]
pub struct FetchedCaptions {
    pub text: String,
    pub language: String,
}

#[async_trait]
pub trait TranscriptFetcher: Send + Sync {
    async fn fetch(&self, video_id: &str) -> Result<FetchedCaptions, ApiError>;
}

pub struct YouTubeTranscriptFetcher;

impl Default for YouTubeTranscriptFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl YouTubeTranscriptFetcher {
    pub fn new() -> Self {
        YouTubeTranscriptFetcher
    }
}

#[async_trait]
impl TranscriptFetcher for YouTubeTranscriptFetcher {
    async fn fetch(&self, video_id: &str) -> Result<FetchedCaptions, ApiError> {
        let api = YouTubeTranscriptApi::new(None, None, None)
            .map_err(|e| ApiError::Provider(format!("failed to create transcript api: {e}")))?;

        let fetched = api
            .fetch_transcript(video_id, TRANSCRIPT_LANGUAGES, false)
            .await
            .map_err(|e| {
                ApiError::Provider(format!("transcript fetch for {video_id} failed: {e}"))
            })?;

        Ok(FetchedCaptions {
            text: fetched.text(),
            language: fetched.language.clone(),
        })
    }
}

/// Fetch one transcript under the usual deadline. Used by the transcript
/// endpoint; the enricher applies the same timeout per item.
pub async fn fetch_with_timeout<F: TranscriptFetcher>(
    fetcher: &F,
    video_id: &str,
) -> Result<FetchedCaptions, ApiError> {
    match timeout(TRANSCRIPT_TIMEOUT, fetcher.fetch(video_id)).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::ProviderTimeout(format!(
            "transcript fetch for {video_id} exceeded {}s",
            TRANSCRIPT_TIMEOUT.as_secs()
        ))),
    }
}

/// Attach transcripts one video at a time, strictly in input order. After
/// every attempt a full snapshot of the list goes out on `progress`, so a
/// consumer can render partial results. One failed fetch leaves that
/// video's transcript empty and the batch continues. Videos that already
/// carry a transcript are left untouched.
pub async fn enrich_videos<F: TranscriptFetcher>(
    fetcher: &F,
    mut videos: Vec<VideoRecord>,
    progress: Option<mpsc::UnboundedSender<Vec<VideoRecord>>>,
) -> Vec<VideoRecord> {
    let total = videos.len();

    for index in 0..total {
        if index > 0 {
            sleep(REQUEST_PACING).await;
        }

        backfill_defaults(&mut videos[index]);

        if videos[index].transcript.is_none() {
            let video_id = videos[index].video_id.clone();
            match fetch_with_timeout(fetcher, &video_id).await {
                Ok(captions) => {
                    videos[index].transcript = Some(captions.text);
                }
                Err(e) => {
                    error!("Failed to fetch transcript for video ID {video_id}: {e:?}");
                }
            }
        }

        if let Some(sender) = &progress {
            // Receiver going away must not abort the batch.
            let _ = sender.send(videos.clone());
        }
    }

    let with_transcripts = videos.iter().filter(|v| v.transcript.is_some()).count();
    info!("Enriched {with_transcripts}/{total} videos with transcripts");

    videos
}

/// Guarantee display defaults while enriching, so downstream consumers
/// never have to handle missing fields.
pub fn backfill_defaults(video: &mut VideoRecord) {
    let video_id = video.video_id.clone();
    if video.thumbnail.is_empty() {
        video.thumbnail = default_thumbnail_url(&video_id);
    }
    if video.url.is_empty() {
        video.url = watch_url(&video_id);
    }
    if video.author.trim().is_empty() {
        video.author = "Unknown Channel".to_string();
    }
    if video.duration.is_empty() {
        video.duration = "N/A".to_string();
    }
    if video.published_at.is_empty() {
        video.published_at = "N/A".to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fails for ids listed in `failing`, succeeds otherwise.
    struct StubFetcher {
        failing: Vec<String>,
    }

    #[async_trait]
    impl TranscriptFetcher for StubFetcher {
        async fn fetch(&self, video_id: &str) -> Result<FetchedCaptions, ApiError> {
            if self.failing.iter().any(|id| id == video_id) {
                return Err(ApiError::Provider("no captions".to_string()));
            }
            Ok(FetchedCaptions {
                text: format!("transcript for {video_id}"),
                language: "English".to_string(),
            })
        }
    }

    fn video(id: &str) -> VideoRecord {
        VideoRecord::new(id, format!("title {id}"))
    }

    #[tokio::test(start_paused = true)]
    async fn one_snapshot_per_processed_item() {
        let fetcher = StubFetcher {
            failing: vec!["yyyyyyyyyyy".to_string()],
        };
        let (tx, mut rx) = mpsc::unbounded_channel();

        let videos = vec![video("xxxxxxxxxxx"), video("yyyyyyyyyyy")];
        let enriched = enrich_videos(&fetcher, videos, Some(tx)).await;

        assert_eq!(
            enriched[0].transcript.as_deref(),
            Some("transcript for xxxxxxxxxxx")
        );
        assert_eq!(enriched[1].transcript, None);

        let mut snapshots = Vec::new();
        while let Ok(snapshot) = rx.try_recv() {
            snapshots.push(snapshot);
        }
        assert_eq!(snapshots.len(), 2);
        // first snapshot: only the first video processed
        assert!(snapshots[0][0].transcript.is_some());
        assert!(snapshots[0][1].transcript.is_none());
        // every snapshot carries the whole list
        assert_eq!(snapshots[0].len(), 2);
        assert_eq!(snapshots[1].len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn existing_transcripts_survive_provider_failures() {
        let fetcher = StubFetcher {
            failing: vec!["xxxxxxxxxxx".to_string(), "yyyyyyyyyyy".to_string()],
        };

        let mut first = video("xxxxxxxxxxx");
        first.transcript = Some("already fetched".to_string());
        let videos = vec![first, video("yyyyyyyyyyy")];

        let enriched = enrich_videos(&fetcher, videos, None).await;
        assert_eq!(enriched[0].transcript.as_deref(), Some("already fetched"));
        assert_eq!(enriched[1].transcript, None);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_continues_without_a_receiver() {
        let fetcher = StubFetcher { failing: vec![] };
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let enriched = enrich_videos(&fetcher, vec![video("xxxxxxxxxxx")], Some(tx)).await;
        assert!(enriched[0].transcript.is_some());
    }

    #[test]
    fn backfill_fills_only_missing_fields() {
        let mut video = video("abc123def45");
        video.author = "Real Channel".to_string();
        backfill_defaults(&mut video);

        assert_eq!(video.author, "Real Channel");
        assert_eq!(
            video.thumbnail,
            "https://i.ytimg.com/vi/abc123def45/hqdefault.jpg"
        );
        assert_eq!(video.url, "https://www.youtube.com/watch?v=abc123def45");
        assert_eq!(video.duration, "N/A");
        assert_eq!(video.published_at, "N/A");
    }
}
