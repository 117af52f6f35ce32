use crate::error::RagError;
use crate::models::{
    CacheEntry, ChatMessage, ChatRole, ChatSession, Chunk, CitedSource, RecommendationRecord,
    SearchFilters, SearchResult, UserContextSummary,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Persisted document chunks with their embedding vectors.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_chunk(&self, chunk: &Chunk, embedding: &[f32]) -> Result<(), RagError>;

    async fn content_exists(&self, content: &str) -> Result<bool, RagError>;

    /// Nearest-neighbor search ordered by ascending cosine distance,
    /// scored as 1 - distance. Absent filters are omitted from the
    /// predicate entirely.
    async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>, RagError>;
}

/// Query-hash keyed embedding cache. TTL-agnostic: freshness is judged
/// by the caller against `created_at`.
#[async_trait]
pub trait QueryEmbeddingCache: Send + Sync {
    async fn find(&self, query_hash: &str) -> Result<Option<CacheEntry>, RagError>;

    /// Insert-or-update on hash conflict. Conflicts refresh the stored
    /// query text only; the existing embedding is kept as-is.
    async fn upsert(
        &self,
        query_hash: &str,
        query_text: &str,
        embedding: &[f32],
    ) -> Result<(), RagError>;

    async fn delete(&self, query_hash: &str) -> Result<(), RagError>;

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, RagError>;
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn find_session(&self, session_id: &str) -> Result<Option<ChatSession>, RagError>;

    async fn create_message(
        &self,
        session_id: &str,
        role: ChatRole,
        content: &str,
    ) -> Result<ChatMessage, RagError>;
}

#[async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn create(
        &self,
        user_id: &str,
        content: &str,
        sources: &[CitedSource],
        context: &str,
        is_safe: bool,
        refusal_reason: Option<&str>,
    ) -> Result<RecommendationRecord, RagError>;
}

/// Supplies the externally computed user summary injected into prompts.
/// The engine never assembles this itself; deployments without profile
/// storage wire [`NoUserContext`].
#[async_trait]
pub trait UserContextProvider: Send + Sync {
    async fn summarize(&self, user_id: &str) -> Result<Option<UserContextSummary>, RagError>;
}

pub struct NoUserContext;

#[async_trait]
impl UserContextProvider for NoUserContext {
    async fn summarize(&self, _user_id: &str) -> Result<Option<UserContextSummary>, RagError> {
        Ok(None)
    }
}
