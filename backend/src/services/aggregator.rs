use crate::models::VideoRecord;
use crate::services::search_service::VideoSearcher;
use futures::future::join_all;
use log::info;
use std::collections::HashMap;

pub struct AggregateOutcome {
    pub videos: Vec<VideoRecord>,
    /// Number of per-phrase results that were merged into an existing
    /// record instead of producing a new one.
    pub duplicate_count: usize,
}

/// Run one search per phrase, all started together, and merge the results
/// in phrase-submission order. Per-phrase failures have already been
/// absorbed to an empty list by the adapter, so aggregation itself cannot
/// fail.
pub async fn aggregate<S: VideoSearcher>(
    searcher: &S,
    phrases: &[String],
    per_phrase_limit: usize,
) -> AggregateOutcome {
    let searches = phrases
        .iter()
        .map(|phrase| searcher.search(phrase, per_phrase_limit));

    let per_phrase: Vec<Vec<VideoRecord>> = join_all(searches)
        .await
        .into_iter()
        .map(|result| result.unwrap_or_default())
        .collect();

    let outcome = merge_phrase_results(phrases, per_phrase);
    info!(
        "Aggregated {} phrases into {} unique videos ({} duplicates merged)",
        phrases.len(),
        outcome.videos.len(),
        outcome.duplicate_count
    );
    outcome
}

/// Merge in ascending phrase index. First writer wins on
/// `search_phrase`/`phrase_index`; repeats only bump `duplicate_count`.
/// Output order is order of first occurrence.
pub fn merge_phrase_results(
    phrases: &[String],
    per_phrase: Vec<Vec<VideoRecord>>,
) -> AggregateOutcome {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<VideoRecord> = Vec::new();
    let mut duplicate_count = 0;

    for (phrase_index, videos) in per_phrase.into_iter().enumerate() {
        let phrase = phrases.get(phrase_index).cloned().unwrap_or_default();
        for mut video in videos {
            match seen.get(&video.video_id) {
                Some(&position) => {
                    merged[position].duplicate_count += 1;
                    duplicate_count += 1;
                }
                None => {
                    video.search_phrase = phrase.clone();
                    video.phrase_index = phrase_index;
                    video.duplicate_count = 1;
                    seen.insert(video.video_id.clone(), merged.len());
                    merged.push(video);
                }
            }
        }
    }

    AggregateOutcome {
        videos: merged,
        duplicate_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use async_trait::async_trait;
    use std::collections::HashMap as Map;

    struct StubSearcher {
        by_phrase: Map<String, Vec<VideoRecord>>,
    }

    #[async_trait]
    impl VideoSearcher for StubSearcher {
        async fn search(&self, phrase: &str, _limit: usize) -> Result<Vec<VideoRecord>, ApiError> {
            Ok(self.by_phrase.get(phrase).cloned().unwrap_or_default())
        }
    }

    fn video(id: &str) -> VideoRecord {
        VideoRecord::new(id, format!("title {id}"))
    }

    #[tokio::test]
    async fn dedupes_across_phrases_first_writer_wins() {
        let mut by_phrase = Map::new();
        by_phrase.insert(
            "phrase A".to_string(),
            vec![video("abc123def45"), video("unique000001")],
        );
        by_phrase.insert("phrase B".to_string(), vec![video("abc123def45")]);
        let searcher = StubSearcher { by_phrase };

        let phrases = vec!["phrase A".to_string(), "phrase B".to_string()];
        let outcome = aggregate(&searcher, &phrases, 10).await;

        assert_eq!(outcome.videos.len(), 2);
        let first = &outcome.videos[0];
        assert_eq!(first.video_id, "abc123def45");
        assert_eq!(first.duplicate_count, 2);
        assert_eq!(first.search_phrase, "phrase A");
        assert_eq!(first.phrase_index, 0);
        assert_eq!(outcome.duplicate_count, 1);
    }

    #[test]
    fn output_has_unique_ids_and_conserves_counts() {
        let phrases: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let per_phrase = vec![
            vec![video("v1"), video("v2")],
            vec![video("v2"), video("v3"), video("v1")],
            vec![video("v3")],
        ];
        let total_returned: usize = per_phrase.iter().map(|p| p.len()).sum();

        let outcome = merge_phrase_results(&phrases, per_phrase);

        let mut ids: Vec<&str> = outcome.videos.iter().map(|v| v.video_id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), outcome.videos.len(), "ids must be unique");

        let count_sum: u32 = outcome.videos.iter().map(|v| v.duplicate_count).sum();
        assert_eq!(count_sum as usize, total_returned);
        assert!(outcome.videos.iter().all(|v| v.duplicate_count >= 1));

        // order of first occurrence across ascending phrase index
        let order: Vec<&str> = outcome.videos.iter().map(|v| v.video_id.as_str()).collect();
        assert_eq!(order, vec!["v1", "v2", "v3"]);
    }

    #[tokio::test]
    async fn failing_phrase_contributes_nothing() {
        let mut by_phrase = Map::new();
        by_phrase.insert("good".to_string(), vec![video("abc123def45")]);
        // "bad" is absent, mimicking an adapter that absorbed an error
        let searcher = StubSearcher { by_phrase };

        let phrases = vec!["bad".to_string(), "good".to_string()];
        let outcome = aggregate(&searcher, &phrases, 5).await;

        assert_eq!(outcome.videos.len(), 1);
        assert_eq!(outcome.videos[0].phrase_index, 1);
        assert_eq!(outcome.videos[0].search_phrase, "good");
    }
}
