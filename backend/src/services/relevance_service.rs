use crate::models::VideoRecord;
use crate::services::llm_service::{ChatModel, ChatRequest};
use crate::utils::strip_code_fences;
use log::{error, info};
use serde_json::json;
use std::collections::HashSet;

const FILTER_TEMPERATURE: f32 = 0.3;
const FILTER_MAX_TOKENS: u32 = 512;
const DESCRIPTION_SNIPPET_CHARS: usize = 200;

const FILTER_SYSTEM_PROMPT: &str = "You select which YouTube search results are \
relevant to a user's query. Respond with ONLY a JSON array of result ids, \
nothing else.";

/// Ask the model which candidates are relevant. Returns 1-based positions
/// into `videos`. An unusable model response degrades to an empty list,
/// which callers treat as "no filtering occurred".
pub async fn filter_relevant<L: ChatModel>(
    llm: &L,
    videos: &[VideoRecord],
    user_query: &str,
    model: &str,
) -> Vec<usize> {
    if videos.is_empty() {
        return Vec::new();
    }

    let prompt = build_filter_prompt(videos, user_query);
    let response = llm
        .chat(ChatRequest {
            model: model.to_string(),
            system: Some(FILTER_SYSTEM_PROMPT.to_string()),
            user: prompt,
            temperature: FILTER_TEMPERATURE,
            max_tokens: FILTER_MAX_TOKENS,
        })
        .await;

    match response {
        Ok(text) => {
            let ids = parse_id_array(&text, videos.len());
            info!(
                "Relevance filter kept {} of {} candidates",
                ids.len(),
                videos.len()
            );
            ids
        }
        Err(e) => {
            error!("Relevance filter call failed: {e:?}");
            Vec::new()
        }
    }
}

pub fn build_filter_prompt(videos: &[VideoRecord], user_query: &str) -> String {
    let candidates: Vec<_> = videos
        .iter()
        .enumerate()
        .map(|(index, video)| {
            let description: String = video
                .description
                .chars()
                .take(DESCRIPTION_SNIPPET_CHARS)
                .collect();
            json!({
                "id": index + 1,
                "title": video.title,
                "description": description,
                "videoId": video.video_id,
            })
        })
        .collect();

    format!(
        "User query: {user_query}\n\n\
         Candidate videos:\n{}\n\n\
         Return a JSON array of the ids of the relevant videos. For a narrow \
         query pick few (roughly 1-10); for a broad query pick more (up to 30). \
         No prose, no markdown, just the array.",
        serde_json::to_string_pretty(&candidates).unwrap_or_default()
    )
}

/// Parse the model's reply into 1-based ids. Markdown fences are stripped
/// first; a parse failure or a non-array yields an empty list. Ids outside
/// `[1, len]` are discarded.
pub fn parse_id_array(raw: &str, len: usize) -> Vec<usize> {
    let cleaned = strip_code_fences(raw);
    match serde_json::from_str::<Vec<i64>>(cleaned) {
        Ok(ids) => ids
            .into_iter()
            .filter(|&id| id >= 1 && id as usize <= len)
            .map(|id| id as usize)
            .collect(),
        Err(e) => {
            error!("Failed to parse relevance filter response as a JSON array: {e}");
            Vec::new()
        }
    }
}

/// Keep the videos whose 1-based position is in `ids`, preserving the
/// original relative order of `videos`.
pub fn get_filtered_videos(videos: &[VideoRecord], ids: &[usize]) -> Vec<VideoRecord> {
    let wanted: HashSet<usize> = ids.iter().copied().collect();
    videos
        .iter()
        .enumerate()
        .filter(|(index, _)| wanted.contains(&(index + 1)))
        .map(|(_, video)| video.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn videos(n: usize) -> Vec<VideoRecord> {
        (0..n)
            .map(|i| VideoRecord::new(format!("id{i:08}xyz"), format!("title {i}")))
            .collect()
    }

    #[test]
    fn parses_fenced_array() {
        assert_eq!(parse_id_array("```json\n[1,3,5]\n```", 10), vec![1, 3, 5]);
        assert_eq!(parse_id_array("[2, 4]", 10), vec![2, 4]);
    }

    #[test]
    fn unusable_responses_yield_empty() {
        assert_eq!(
            parse_id_array("the relevant videos are 1 and 3", 10),
            Vec::<usize>::new()
        );
        assert_eq!(parse_id_array("{\"ids\": [1]}", 10), Vec::<usize>::new());
        assert_eq!(parse_id_array("", 10), Vec::<usize>::new());
    }

    #[test]
    fn out_of_range_ids_are_discarded() {
        assert_eq!(parse_id_array("[0, 1, 2, 99]", 2), vec![1, 2]);
    }

    #[test]
    fn filtered_videos_preserve_order_and_bound() {
        let all = videos(5);
        let picked = get_filtered_videos(&all, &[4, 2, 2, 9]);
        assert!(picked.len() <= 4);
        assert_eq!(picked.len(), 2);
        // original relative order, not the order of ids
        assert_eq!(picked[0].video_id, all[1].video_id);
        assert_eq!(picked[1].video_id, all[3].video_id);
    }

    #[test]
    fn prompt_uses_one_based_ids() {
        let all = videos(2);
        let prompt = build_filter_prompt(&all, "cat feeding tips");
        assert!(prompt.contains("\"id\": 1"));
        assert!(prompt.contains("\"id\": 2"));
        assert!(prompt.contains("cat feeding tips"));
    }
}
