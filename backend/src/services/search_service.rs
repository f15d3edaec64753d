use crate::config::YOUTUBE_API_KEY;
use crate::error::ApiError;
use crate::models::VideoRecord;
use crate::utils::format_iso8601_duration;
use async_trait::async_trait;
use log::{error, warn};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::{sleep, timeout};

pub const DEFAULT_SEARCH_LIMIT: usize = 8;
pub const MAX_SEARCH_LIMIT: usize = 25;

const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);
const SEARCH_ATTEMPTS: u64 = 2;

/// Seam for the external video search provider, so the aggregator and the
/// pipeline can be exercised against a stub.
#[async_trait]
pub trait VideoSearcher: Send + Sync {
    async fn search(&self, phrase: &str, limit: usize) -> Result<Vec<VideoRecord>, ApiError>;
}

pub struct YouTubeSearchClient {
    http: Client,
}

impl Default for YouTubeSearchClient {
    fn default() -> Self {
        Self::new()
    }
}

impl YouTubeSearchClient {
    pub fn new() -> Self {
        YouTubeSearchClient {
            http: Client::new(),
        }
    }

    // Documentation: https://developers.google.com/youtube/v3/docs/search
    async fn search_once(&self, phrase: &str, limit: usize) -> Result<Vec<VideoRecord>, ApiError> {
        let api_key = &*YOUTUBE_API_KEY;
        let max_results = limit.to_string();

        let response = self
            .http
            .get("https://www.googleapis.com/youtube/v3/search")
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("maxResults", max_results.as_str()),
                ("q", phrase),
                ("key", api_key.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Provider(format!(
                "YouTube search returned {status}: {body}"
            )));
        }

        let payload: Value = response.json().await?;
        let mut videos = parse_search_items(&payload);

        if videos.is_empty() {
            return Ok(videos);
        }

        // Second call for duration/view counts; its failure only degrades
        // the records, it never fails the search.
        let ids: Vec<String> = videos.iter().map(|v| v.video_id.clone()).collect();
        match self.fetch_video_stats(&ids).await {
            Ok(stats) => apply_video_stats(&mut videos, &stats),
            Err(e) => warn!("Failed to fetch video statistics: {e:?}"),
        }

        Ok(videos)
    }

    // Documentation: https://developers.google.com/youtube/v3/docs/videos
    async fn fetch_video_stats(&self, ids: &[String]) -> Result<Value, ApiError> {
        let api_key = &*YOUTUBE_API_KEY;
        let joined = ids.join(",");

        let response = self
            .http
            .get("https://www.googleapis.com/youtube/v3/videos")
            .query(&[
                ("part", "contentDetails,statistics"),
                ("id", joined.as_str()),
                ("key", api_key.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ApiError::Provider(format!(
                "YouTube videos endpoint returned {status}"
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl VideoSearcher for YouTubeSearchClient {
    /// Search with a hard timeout per attempt and linear backoff between
    /// attempts. Exhausted retries degrade to an empty list so a single
    /// phrase can never sink a whole aggregation run.
    async fn search(&self, phrase: &str, limit: usize) -> Result<Vec<VideoRecord>, ApiError> {
        let phrase = phrase.trim();
        if phrase.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit.clamp(1, MAX_SEARCH_LIMIT);

        for attempt in 1..=SEARCH_ATTEMPTS {
            match timeout(SEARCH_TIMEOUT, self.search_once(phrase, limit)).await {
                Ok(Ok(videos)) => return Ok(videos),
                Ok(Err(e)) => error!("Search attempt {attempt} for '{phrase}' failed: {e:?}"),
                Err(_) => error!("Search attempt {attempt} for '{phrase}' timed out"),
            }
            if attempt < SEARCH_ATTEMPTS {
                sleep(Duration::from_millis(attempt * 2000)).await;
            }
        }

        Ok(Vec::new())
    }
}

/// Normalize the provider's search items. Records without a video id are
/// dropped; missing optional fields default to empty string / 0.
pub fn parse_search_items(payload: &Value) -> Vec<VideoRecord> {
    let empty = vec![];
    let items = payload
        .get("items")
        .and_then(|v| v.as_array())
        .unwrap_or(&empty);

    let mut videos = Vec::new();
    for item in items {
        let video_id = item["id"]["videoId"].as_str().unwrap_or("").to_string();
        if video_id.is_empty() {
            continue;
        }
        let snippet = &item["snippet"];

        let mut video = VideoRecord::new(
            video_id.clone(),
            snippet["title"].as_str().unwrap_or("").to_string(),
        );
        video.description = snippet["description"].as_str().unwrap_or("").to_string();
        video.author = snippet["channelTitle"].as_str().unwrap_or("").to_string();
        video.published_at = snippet["publishedAt"].as_str().unwrap_or("").to_string();
        video.thumbnail = snippet["thumbnails"]["high"]["url"]
            .as_str()
            .or_else(|| snippet["thumbnails"]["default"]["url"].as_str())
            .unwrap_or("")
            .to_string();
        video.url = format!("https://www.youtube.com/watch?v={video_id}");

        videos.push(video);
    }
    videos
}

/// Merge duration/view counts from the videos endpoint into the records.
pub fn apply_video_stats(videos: &mut [VideoRecord], payload: &Value) {
    let mut by_id: HashMap<&str, (&str, u64)> = HashMap::new();

    if let Some(items) = payload.get("items").and_then(|v| v.as_array()) {
        for item in items {
            let Some(id) = item["id"].as_str() else {
                continue;
            };
            let duration = item["contentDetails"]["duration"].as_str().unwrap_or("");
            let views = item["statistics"]["viewCount"]
                .as_str()
                .unwrap_or("0")
                .parse()
                .unwrap_or(0);
            by_id.insert(id, (duration, views));
        }
    }

    for video in videos.iter_mut() {
        if let Some((duration, views)) = by_id.get(video.video_id.as_str()) {
            video.duration = format_iso8601_duration(duration);
            video.views = *views;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn search_payload() -> Value {
        json!({
            "items": [
                {
                    "id": { "videoId": "abc123def45" },
                    "snippet": {
                        "title": "Cat feeding basics",
                        "description": "How much to feed",
                        "channelTitle": "Cat Channel",
                        "publishedAt": "2024-05-01T00:00:00Z",
                        "thumbnails": { "high": { "url": "https://img/abc.jpg" } }
                    }
                },
                // playlist hits carry no videoId and must be dropped
                { "id": { "playlistId": "PL123" }, "snippet": { "title": "list" } },
                { "id": { "videoId": "zzz999zzz99" }, "snippet": {} }
            ]
        })
    }

    #[test]
    fn parses_and_drops_idless_items() {
        let videos = parse_search_items(&search_payload());
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].video_id, "abc123def45");
        assert_eq!(videos[0].title, "Cat feeding basics");
        assert_eq!(videos[0].author, "Cat Channel");
        assert_eq!(videos[0].url, "https://www.youtube.com/watch?v=abc123def45");
        // missing optional fields default to empty string, never null
        assert_eq!(videos[1].title, "");
        assert_eq!(videos[1].description, "");
    }

    #[test]
    fn merges_stats_by_id() {
        let mut videos = parse_search_items(&search_payload());
        let stats = json!({
            "items": [
                {
                    "id": "abc123def45",
                    "contentDetails": { "duration": "PT10M5S" },
                    "statistics": { "viewCount": "12345" }
                }
            ]
        });
        apply_video_stats(&mut videos, &stats);
        assert_eq!(videos[0].duration, "10:05");
        assert_eq!(videos[0].views, 12345);
        assert_eq!(videos[1].views, 0);
    }
}
