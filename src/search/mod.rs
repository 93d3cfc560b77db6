//! Context search: semantic mode with keyword fallback.
//!
//! Semantic mode embeds the query and ranks stored chunks by cosine
//! similarity, grouping by item. When no provider is active or semantic
//! search returns nothing, keyword mode scores items by token hits
//! (`2 × value_hits + key_hits`) within a session. Exact-key retrieval
//! never goes through here.

use crate::embeddings::EmbeddingPipeline;
use crate::error::{Error, Result};
use crate::model::{Category, Priority};
use crate::storage::SqliteStorage;
use serde::Serialize;
use tokio::sync::Mutex;

/// Default similarity threshold (cosine similarity, higher is better).
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Default result cap.
pub const DEFAULT_LIMIT: usize = 10;

/// Which strategy produced the results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Semantic,
    Keyword,
}

/// One search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub key: String,
    pub value: String,
    pub category: Category,
    pub priority: Priority,
    pub channel: String,
    pub session_id: String,
    /// Cosine similarity (semantic) or token-hit score (keyword).
    pub score: f32,
}

/// A completed search with its mode and optional setup tip.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub mode: SearchMode,
    pub results: Vec<SearchResult>,
    /// Present when keyword fallback ran without a provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tip: Option<String>,
}

/// Search parameters.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    /// Session scope; `None` means all sessions (semantic mode only).
    pub session_id: Option<String>,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub channel: Option<String>,
    pub limit: usize,
    pub threshold: f32,
}

impl SearchRequest {
    #[must_use]
    pub fn new(query: String, session_id: Option<String>) -> Self {
        Self {
            query,
            session_id,
            category: None,
            priority: None,
            channel: None,
            limit: DEFAULT_LIMIT,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Run a search: semantic when a provider answers, keyword otherwise.
///
/// # Errors
///
/// Returns `Validation` when keyword fallback is needed without a
/// session scope.
pub async fn search(
    storage: &Mutex<SqliteStorage>,
    pipeline: &EmbeddingPipeline,
    request: &SearchRequest,
) -> Result<SearchResponse> {
    if let Some(query_vec) = pipeline.embed_query(&request.query).await {
        let matches = {
            let guard = storage.lock().await;
            guard.semantic_search(
                &query_vec,
                request.session_id.as_deref(),
                request.limit,
                request.threshold,
                request.category,
                request.priority,
                request.channel.as_deref(),
            )?
        };

        if !matches.is_empty() {
            let results = matches
                .into_iter()
                .map(|m| SearchResult {
                    key: m.key,
                    value: m.value,
                    category: m.category,
                    priority: m.priority,
                    channel: m.channel,
                    session_id: m.session_id,
                    score: m.similarity,
                })
                .collect();

            return Ok(SearchResponse {
                mode: SearchMode::Semantic,
                results,
                tip: None,
            });
        }
    }

    keyword_search(storage, request).await
}

/// Keyword fallback: token-hit scoring over one session's items.
async fn keyword_search(
    storage: &Mutex<SqliteStorage>,
    request: &SearchRequest,
) -> Result<SearchResponse> {
    let Some(ref session_id) = request.session_id else {
        return Err(Error::InvalidArgument(
            "keyword search needs a session scope; pass session_id or set up an embedding provider"
                .to_string(),
        ));
    };

    let tokens = tokenize(&request.query);
    if tokens.is_empty() {
        return Ok(SearchResponse {
            mode: SearchMode::Keyword,
            results: Vec::new(),
            tip: Some(keyword_tip()),
        });
    }

    let items = {
        let guard = storage.lock().await;
        guard.list_context_items(
            session_id,
            request.category,
            request.priority,
            request.channel.as_deref(),
            Some(10_000),
        )?
    };

    let mut scored: Vec<SearchResult> = items
        .into_iter()
        .filter_map(|item| {
            let key_lower = item.key.to_lowercase();
            let value_lower = item.value.to_lowercase();

            let mut key_hits = 0u32;
            let mut value_hits = 0u32;
            for token in &tokens {
                if key_lower.contains(token) {
                    key_hits += 1;
                }
                if value_lower.contains(token) {
                    value_hits += 1;
                }
            }

            let score = 2 * value_hits + key_hits;
            (score > 0).then(|| SearchResult {
                key: item.key,
                value: item.value,
                category: item.category,
                priority: item.priority,
                channel: item.channel,
                session_id: item.session_id,
                score: score as f32,
            })
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(request.limit);

    Ok(SearchResponse {
        mode: SearchMode::Keyword,
        results: scored,
        tip: Some(keyword_tip()),
    })
}

/// Lowercased query tokens, dropping anything 2 chars or shorter.
fn tokenize(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(ToString::to_string)
        .collect()
}

fn keyword_tip() -> String {
    "Keyword match only. Install Ollama with an embedding model (e.g. `ollama pull \
     nomic-embed-text`) for semantic search."
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Session;
    use std::sync::Arc;
    use tokio::sync::watch;

    async fn setup() -> (Arc<Mutex<SqliteStorage>>, EmbeddingPipeline, Session) {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let session = Session::new("S".to_string(), Some("/p".to_string()), "general".to_string());
        storage.create_session(&session, "agent").unwrap();
        let shared = Arc::new(Mutex::new(storage));
        let (_tx, rx) = watch::channel(false);
        let pipeline = EmbeddingPipeline::new(Arc::clone(&shared), rx);
        (shared, pipeline, session)
    }

    #[test]
    fn test_tokenize_drops_short_tokens() {
        assert_eq!(tokenize("fix the JWT auth"), vec!["the", "jwt", "auth"]);
        assert_eq!(tokenize("a an of"), Vec::<String>::new());
        assert_eq!(tokenize("snake_case-words"), vec!["snake", "case", "words"]);
    }

    #[tokio::test]
    async fn test_keyword_fallback_scoring() {
        let (storage, pipeline, session) = setup().await;

        {
            let mut guard = storage.lock().await;
            guard
                .save_context_item(
                    &session.id,
                    "auth-decision",
                    "JWT tokens expire after one hour",
                    Category::Decision,
                    Priority::High,
                    "general",
                    &[],
                    "agent",
                )
                .unwrap();
            guard
                .save_context_item(
                    &session.id,
                    "jwt-note",
                    "unrelated content",
                    Category::Note,
                    Priority::Normal,
                    "general",
                    &[],
                    "agent",
                )
                .unwrap();
        }

        let request = SearchRequest::new("jwt tokens".to_string(), Some(session.id.clone()));
        let response = search(&storage, &pipeline, &request).await.unwrap();

        assert_eq!(response.mode, SearchMode::Keyword);
        assert!(response.tip.is_some());
        assert_eq!(response.results.len(), 2);
        // Value hits weigh double: the decision (both tokens in value,
        // score 4) beats the key-only match (score 1)
        assert_eq!(response.results[0].key, "auth-decision");
        assert!(response.results[0].score > response.results[1].score);
    }

    #[tokio::test]
    async fn test_keyword_requires_session_scope() {
        let (storage, pipeline, _session) = setup().await;

        let request = SearchRequest::new("anything".to_string(), None);
        let err = search(&storage, &pipeline, &request).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_empty_query_returns_empty() {
        let (storage, pipeline, session) = setup().await;
        let request = SearchRequest::new("a of".to_string(), Some(session.id));
        let response = search(&storage, &pipeline, &request).await.unwrap();
        assert!(response.results.is_empty());
    }
}
