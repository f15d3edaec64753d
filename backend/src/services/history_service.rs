use crate::error::ApiError;
use crate::models::{HistoryEntry, HistoryPatch, StoredSummary, VideoRecord};
use chrono::Utc;
use elasticsearch::{DeleteByQueryParts, Elasticsearch, GetParts, IndexParts, SearchParts};
use log::{error, info, warn};
use serde_json::{json, Value};

pub const HISTORY_INDEX: &str = "search_history";
pub const TEMPLATE_INDEX: &str = "history_templates";
pub const DEFAULT_TEMPLATE_ID: &str = "default";

/// Persisted entries never carry more than this many videos.
pub const MAX_STORED_RESULTS: usize = 10;

const LIST_FETCH_SIZE: usize = 1000;

/// Apply storage-size discipline before persisting: cap the video list and
/// keep only the stripped summary fields.
pub fn prepare_for_storage(mut entry: HistoryEntry) -> HistoryEntry {
    entry.search_results.truncate(MAX_STORED_RESULTS);
    entry
}

fn new_entry_id(user_id: &str) -> String {
    format!("{}_{}", Utc::now().timestamp_millis(), user_id)
}

/// Build a fresh entry under storage discipline. The summary arrives
/// already stripped to its stored form.
pub fn new_history_entry(
    user_id: &str,
    query: &str,
    search_results: &[VideoRecord],
    summary: Option<StoredSummary>,
) -> HistoryEntry {
    let now = Utc::now().to_rfc3339();
    prepare_for_storage(HistoryEntry {
        id: new_entry_id(user_id),
        user_id: Some(user_id.to_string()),
        query: query.to_string(),
        search_results: search_results.to_vec(),
        summary_data: summary,
        is_default: false,
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Persist a {query, results, summary} record for a signed-in user.
/// Signed-out callers are a no-op, history is a signed-in-only feature.
pub async fn save_history(
    es_client: &Elasticsearch,
    user_id: Option<&str>,
    query: &str,
    search_results: &[VideoRecord],
    summary: Option<StoredSummary>,
) -> Result<Option<String>, ApiError> {
    let Some(user_id) = user_id else {
        return Ok(None);
    };

    let entry = new_history_entry(user_id, query, search_results, summary);
    index_entry(es_client, &entry).await?;
    info!("Saved history entry {} for user {user_id}", entry.id);
    Ok(Some(entry.id))
}

async fn index_entry(es_client: &Elasticsearch, entry: &HistoryEntry) -> Result<(), ApiError> {
    let response = es_client
        .index(IndexParts::IndexId(HISTORY_INDEX, &entry.id))
        .body(json!(entry))
        .send()
        .await?;

    if !response.status_code().is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Provider(format!(
            "failed to index history entry {}: {body}",
            entry.id
        )));
    }
    Ok(())
}

/// All entries for a user, newest first. Sorting happens in memory after
/// the fetch so the store needs no composite index; `limit` applies after
/// the sort. A user with no history gets the default template cloned in.
pub async fn list_history(
    es_client: &Elasticsearch,
    user_id: Option<&str>,
    limit: usize,
) -> Result<Vec<HistoryEntry>, ApiError> {
    let Some(user_id) = user_id else {
        return Ok(Vec::new());
    };

    let response = es_client
        .search(SearchParts::Index(&[HISTORY_INDEX]))
        .body(json!({
            "size": LIST_FETCH_SIZE,
            "query": {
                "term": { "userId": user_id }
            }
        }))
        .send()
        .await?;

    let payload: Value = response.json().await?;
    let mut entries = parse_entry_hits(&payload);

    if entries.is_empty() {
        if let Some(default_entry) = clone_default_template(es_client, user_id).await {
            entries.push(default_entry);
        }
    }

    Ok(newest_first(entries, limit))
}

/// Newest first by `createdAt`, then the limit. Sorting happens here so
/// the store needs no composite index.
fn newest_first(mut entries: Vec<HistoryEntry>, limit: usize) -> Vec<HistoryEntry> {
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    entries.truncate(limit);
    entries
}

fn parse_entry_hits(payload: &Value) -> Vec<HistoryEntry> {
    let mut entries = Vec::new();
    if let Some(hits) = payload["hits"]["hits"].as_array() {
        for hit in hits {
            if let Some(source) = hit.get("_source") {
                match serde_json::from_value::<HistoryEntry>(source.clone()) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => warn!("Skipping malformed history document: {e}"),
                }
            }
        }
    }
    entries
}

/// Clone the ownerless seed template into a per-user default entry.
async fn clone_default_template(es_client: &Elasticsearch, user_id: &str) -> Option<HistoryEntry> {
    let response = es_client
        .get(GetParts::IndexId(TEMPLATE_INDEX, DEFAULT_TEMPLATE_ID))
        .send()
        .await
        .ok()?;

    if !response.status_code().is_success() {
        return None;
    }

    let payload: Value = response.json().await.ok()?;
    let source = payload.get("_source")?;
    let template: HistoryEntry = serde_json::from_value(source.clone()).ok()?;

    let now = Utc::now().to_rfc3339();
    let entry = prepare_for_storage(HistoryEntry {
        id: new_entry_id(user_id),
        user_id: Some(user_id.to_string()),
        is_default: true,
        created_at: now.clone(),
        updated_at: now,
        ..template
    });

    match index_entry(es_client, &entry).await {
        Ok(()) => {
            info!("Cloned default history template for user {user_id}");
            Some(entry)
        }
        Err(e) => {
            error!("Failed to clone default template for user {user_id}: {e:?}");
            None
        }
    }
}

pub async fn get_history(
    es_client: &Elasticsearch,
    id: &str,
) -> Result<Option<HistoryEntry>, ApiError> {
    let response = es_client
        .get(GetParts::IndexId(HISTORY_INDEX, id))
        .send()
        .await?;

    if !response.status_code().is_success() {
        return Ok(None);
    }

    let payload: Value = response.json().await?;
    match payload.get("_source") {
        Some(source) => Ok(serde_json::from_value(source.clone()).ok()),
        None => Ok(None),
    }
}

/// Owner decision shared by update and delete: `Ok(false)` when the caller
/// is signed out or the entry is missing, an authorization error on an
/// ownership mismatch (never a silent success).
pub fn authorize_mutation(
    entry: Option<&HistoryEntry>,
    user_id: Option<&str>,
) -> Result<bool, ApiError> {
    let Some(user_id) = user_id else {
        return Ok(false);
    };
    let Some(entry) = entry else {
        return Ok(false);
    };
    if entry.user_id.as_deref() != Some(user_id) {
        return Err(ApiError::Authorization(format!(
            "history entry {} is not owned by the calling user",
            entry.id
        )));
    }
    Ok(true)
}

/// Apply an update patch, re-applying storage discipline to the results.
pub fn apply_patch(mut entry: HistoryEntry, patch: HistoryPatch) -> HistoryEntry {
    if let Some(query) = patch.query {
        entry.query = query;
    }
    if let Some(results) = patch.search_results {
        entry.search_results = results;
    }
    if let Some(summary) = patch.summary_data {
        entry.summary_data = Some(summary);
    }
    entry.updated_at = Utc::now().to_rfc3339();
    prepare_for_storage(entry)
}

pub async fn update_history(
    es_client: &Elasticsearch,
    id: &str,
    patch: HistoryPatch,
    user_id: Option<&str>,
) -> Result<bool, ApiError> {
    let Some(entry) = get_history(es_client, id).await? else {
        return Ok(false);
    };
    if !authorize_mutation(Some(&entry), user_id)? {
        return Ok(false);
    }

    let updated = apply_patch(entry, patch);
    index_entry(es_client, &updated).await?;
    info!("Updated history entry {id}");
    Ok(true)
}

pub async fn delete_history(
    es_client: &Elasticsearch,
    id: &str,
    user_id: Option<&str>,
) -> Result<bool, ApiError> {
    let entry = get_history(es_client, id).await?;
    if !authorize_mutation(entry.as_ref(), user_id)? {
        return Ok(false);
    }

    let response = es_client
        .delete(elasticsearch::DeleteParts::IndexId(HISTORY_INDEX, id))
        .send()
        .await?;

    Ok(response.status_code().is_success())
}

/// Query for a bulk clear: the user's own entries, minus default ones,
/// which survive a clear-all.
fn delete_all_query(user_id: &str) -> Value {
    json!({
        "query": {
            "bool": {
                "must": [
                    { "term": { "userId": user_id } }
                ],
                "must_not": [
                    { "term": { "isDefault": true } }
                ]
            }
        }
    })
}

/// Delete every non-default entry for a user; returns the deleted count.
pub async fn delete_all_history(
    es_client: &Elasticsearch,
    user_id: Option<&str>,
) -> Result<u64, ApiError> {
    let Some(user_id) = user_id else {
        return Ok(0);
    };

    let response = es_client
        .delete_by_query(DeleteByQueryParts::Index(&[HISTORY_INDEX]))
        .body(delete_all_query(user_id))
        .send()
        .await?;

    let payload: Value = response.json().await?;
    let deleted = payload["deleted"].as_u64().unwrap_or(0);
    info!("Deleted {deleted} history entries for user {user_id}");
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SummaryResult;

    fn entry(id: &str, user_id: Option<&str>, videos: usize) -> HistoryEntry {
        HistoryEntry {
            id: id.to_string(),
            user_id: user_id.map(str::to_string),
            query: "cats".to_string(),
            search_results: (0..videos)
                .map(|i| VideoRecord::new(format!("vid{i:08}"), format!("title {i}")))
                .collect(),
            summary_data: None,
            is_default: false,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn storage_caps_results_at_ten() {
        let prepared = prepare_for_storage(entry("e1", Some("u1"), 15));
        assert_eq!(prepared.search_results.len(), MAX_STORED_RESULTS);
        // the first ten survive, in order
        assert_eq!(prepared.search_results[0].video_id, "vid00000000");
        assert_eq!(prepared.search_results[9].video_id, "vid00000009");
    }

    #[test]
    fn stored_summary_is_stripped() {
        let summary = SummaryResult {
            summary: "text".to_string(),
            total_results: 5,
            transcript_count: 3,
            model: "test-model".to_string(),
        };
        let stored = StoredSummary::from(&summary);
        assert_eq!(stored.summary, "text");
        assert_eq!(stored.total_results, 5);
        assert_eq!(stored.transcript_count, 3);
    }

    #[test]
    fn mutation_requires_matching_owner() {
        let owned = entry("e1", Some("u1"), 0);

        assert!(authorize_mutation(Some(&owned), Some("u1")).unwrap());
        assert!(matches!(
            authorize_mutation(Some(&owned), Some("u2")),
            Err(ApiError::Authorization(_))
        ));
        // signed-out and missing-entry cases are quiet no-ops
        assert!(!authorize_mutation(Some(&owned), None).unwrap());
        assert!(!authorize_mutation(None, Some("u1")).unwrap());
    }

    #[test]
    fn patch_reapplies_storage_discipline() {
        let patched = apply_patch(
            entry("e1", Some("u1"), 2),
            HistoryPatch {
                user_id: None,
                query: Some("dogs".to_string()),
                search_results: Some(
                    (0..12)
                        .map(|i| VideoRecord::new(format!("new{i:08}"), "t"))
                        .collect(),
                ),
                summary_data: None,
            },
        );
        assert_eq!(patched.query, "dogs");
        assert_eq!(patched.search_results.len(), MAX_STORED_RESULTS);
        assert_ne!(patched.updated_at, "2024-01-01T00:00:00Z");
    }

    #[test]
    fn saved_entry_keeps_the_submitted_summary() {
        let summary = StoredSummary {
            summary: "digest".to_string(),
            total_results: 4,
            transcript_count: 2,
        };
        let videos = vec![VideoRecord::new("abc123def45", "t")];

        let saved = new_history_entry("u1", "cats", &videos, Some(summary.clone()));
        assert_eq!(saved.summary_data, Some(summary));
        assert_eq!(saved.user_id.as_deref(), Some("u1"));
        assert!(!saved.is_default);

        let without = new_history_entry("u1", "cats", &videos, None);
        assert_eq!(without.summary_data, None);
    }

    #[test]
    fn bulk_clear_query_spares_default_entries() {
        let query = delete_all_query("u1");
        assert_eq!(query["query"]["bool"]["must"][0]["term"]["userId"], "u1");
        assert_eq!(
            query["query"]["bool"]["must_not"][0]["term"]["isDefault"],
            true
        );
    }

    #[test]
    fn listing_sorts_newest_first_then_limits() {
        let mut a = entry("e1", Some("u1"), 0);
        a.created_at = "2024-01-01T00:00:00Z".to_string();
        let mut b = entry("e2", Some("u1"), 0);
        b.created_at = "2024-03-01T00:00:00Z".to_string();
        let mut c = entry("e3", Some("u1"), 0);
        c.created_at = "2024-02-01T00:00:00Z".to_string();

        let sorted = newest_first(vec![a, b, c], 2);
        assert_eq!(sorted.len(), 2);
        assert_eq!(sorted[0].id, "e2");
        assert_eq!(sorted[1].id, "e3");
    }

    #[test]
    fn list_parsing_skips_malformed_documents() {
        let payload = json!({
            "hits": { "hits": [
                { "_source": entry("e1", Some("u1"), 1) },
                { "_source": { "bogus": true } },
                { "_source": entry("e2", Some("u1"), 0) }
            ]}
        });
        let entries = parse_entry_hits(&payload);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "e1");
    }
}
