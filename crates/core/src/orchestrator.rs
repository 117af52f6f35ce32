use crate::embeddings::{content_hash, TextEmbedder};
use crate::error::RagError;
use crate::generation::TextGenerator;
use crate::models::{
    ChatMessage, ChatRole, ChatSession, CitedSource, RecommendationRecord, SearchFilters,
    SearchResult,
};
use crate::prompt::{
    build_chat_prompt, build_context_block, build_recommendation_prompt, build_user_context_block,
};
use crate::safety::{SafetyScreen, REFUSAL_MESSAGE, REFUSAL_REASON_MEDICAL};
use crate::traits::{
    ChatStore, DocumentStore, QueryEmbeddingCache, RecommendationStore, UserContextProvider,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_TOP_K: usize = 1;
pub const MAX_TOP_K: usize = 20;
pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Cache entries older than this are considered stale and recomputed.
    pub query_embedding_ttl_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            query_embedding_ttl_days: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub session_id: String,
    pub content: String,
    pub top_k: Option<usize>,
    #[serde(flatten)]
    pub filters: SearchFilters,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationPayload {
    pub query: String,
    pub top_k: Option<usize>,
    #[serde(flatten)]
    pub filters: SearchFilters,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub user_message: ChatMessage,
    pub assistant_message: ChatMessage,
    pub sources: Vec<CitedSource>,
}

/// Composes cleaner-produced documents, the embedding and generation
/// clients, and the backing stores into the three retrieval flows:
/// plain search, grounded chat, and screened recommendations.
///
/// All collaborators are injected at construction; the engine holds no
/// process-wide state.
pub struct RagEngine<E, G, S, U>
where
    E: TextEmbedder,
    G: TextGenerator,
    S: DocumentStore + QueryEmbeddingCache + ChatStore + RecommendationStore,
    U: UserContextProvider,
{
    embedder: E,
    generator: G,
    store: S,
    user_context: U,
    safety: SafetyScreen,
    config: EngineConfig,
}

impl<E, G, S, U> RagEngine<E, G, S, U>
where
    E: TextEmbedder,
    G: TextGenerator,
    S: DocumentStore + QueryEmbeddingCache + ChatStore + RecommendationStore,
    U: UserContextProvider,
{
    pub fn new(
        embedder: E,
        generator: G,
        store: S,
        user_context: U,
        config: EngineConfig,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            embedder,
            generator,
            store,
            user_context,
            safety: SafetyScreen::new()?,
            config,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Plain vector search with the query-embedding cache in front of
    /// the embedding provider.
    pub async fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>, RagError> {
        let cleaned = query.trim();
        if cleaned.is_empty() {
            return Err(RagError::Validation("Query is required".to_string()));
        }
        let top_k = clamp_top_k(top_k);
        let embedding = self.cached_query_embedding(cleaned).await?;
        self.store.search(&embedding, top_k, filters).await
    }

    /// Session-scoped chat: ownership check, message persistence,
    /// retrieval identical to plain search, prompt selection, and the
    /// generation call.
    pub async fn chat(
        &self,
        user_id: Option<&str>,
        payload: &ChatPayload,
    ) -> Result<ChatResponse, RagError> {
        let content = payload.content.trim();
        if content.is_empty() {
            return Err(RagError::Validation(
                "Message content cannot be empty".to_string(),
            ));
        }

        let session = self
            .store
            .find_session(&payload.session_id)
            .await?
            .ok_or_else(|| RagError::NotFound("Session not found".to_string()))?;
        assert_session_access(&session, user_id)?;

        let user_message = self
            .store
            .create_message(&session.id, ChatRole::User, content)
            .await?;

        let summary = match user_id {
            Some(user_id) => self.user_context.summarize(user_id).await?,
            None => None,
        };

        let embedding = self.cached_query_embedding(content).await?;
        let results = self
            .store
            .search(&embedding, clamp_top_k(payload.top_k), &payload.filters)
            .await?;

        let context = build_context_block(&results);
        let user_context = build_user_context_block(summary.as_ref());
        let prompt = build_chat_prompt(content, &context, &user_context);
        let answer = self.generator.generate(&prompt).await?;

        let assistant_message = self
            .store
            .create_message(&session.id, ChatRole::Assistant, &answer)
            .await?;

        Ok(ChatResponse {
            user_message,
            assistant_message,
            sources: results.iter().map(CitedSource::from).collect(),
        })
    }

    /// Screened recommendation: unsafe queries are refused before any
    /// provider call and still persisted for auditability.
    pub async fn recommend(
        &self,
        user_id: &str,
        payload: &RecommendationPayload,
    ) -> Result<RecommendationRecord, RagError> {
        let query = payload.query.trim();
        if query.is_empty() {
            return Err(RagError::Validation("Query is required".to_string()));
        }

        let summary = self.user_context.summarize(user_id).await?;
        let context_json = serde_json::to_string(&summary)?;

        if self.safety.is_unsafe(query) {
            return self
                .store
                .create(
                    user_id,
                    REFUSAL_MESSAGE,
                    &[],
                    &context_json,
                    false,
                    Some(REFUSAL_REASON_MEDICAL),
                )
                .await;
        }

        let embedding = self.embedder.embed(query).await?;
        let results = self
            .store
            .search(&embedding, clamp_top_k(payload.top_k), &payload.filters)
            .await?;

        let context = build_context_block(&results);
        let prompt = build_recommendation_prompt(query, &context, &context_json);
        let answer = self.generator.generate(&prompt).await?;

        let sources: Vec<CitedSource> = results.iter().map(CitedSource::from).collect();
        self.store
            .create(user_id, &answer, &sources, &context_json, true, None)
            .await
    }

    /// Maintenance purge of cache entries past the TTL.
    pub async fn purge_expired_cache(&self, now: DateTime<Utc>) -> Result<u64, RagError> {
        let cutoff = now - Duration::days(self.config.query_embedding_ttl_days);
        self.store.purge_expired(cutoff).await
    }

    /// Cache-fronted query embedding: a fresh hit returns the stored
    /// vector; an expired hit is evicted first; a miss embeds and
    /// upserts. Concurrent misses may both embed, the upsert's conflict
    /// handling keeps a single surviving row.
    async fn cached_query_embedding(&self, query: &str) -> Result<Vec<f32>, RagError> {
        let query_hash = content_hash(query);
        let ttl = Duration::days(self.config.query_embedding_ttl_days);

        if let Some(entry) = self.store.find(&query_hash).await? {
            if Utc::now() - entry.created_at <= ttl {
                return Ok(entry.embedding);
            }
            self.store.delete(&query_hash).await?;
        }

        let embedding = self.embedder.embed(query).await?;
        self.store.upsert(&query_hash, query, &embedding).await?;
        Ok(embedding)
    }
}

fn clamp_top_k(top_k: Option<usize>) -> usize {
    top_k.unwrap_or(DEFAULT_TOP_K).clamp(MIN_TOP_K, MAX_TOP_K)
}

fn assert_session_access(session: &ChatSession, user_id: Option<&str>) -> Result<(), RagError> {
    if let Some(owner) = &session.user_id {
        return match user_id {
            None => Err(RagError::Unauthorized("Unauthorized".to_string())),
            Some(caller) if caller != owner => Err(RagError::Forbidden(
                "You do not have access to this session".to_string(),
            )),
            Some(_) => Ok(()),
        };
    }

    if !session.is_guest {
        return Err(RagError::Forbidden(
            "You do not have access to this session".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::TextEmbedder;
    use crate::generation::TextGenerator;
    use crate::models::{Chunk, ChunkMetadata};
    use crate::stores::MemoryStore;
    use crate::traits::{DocumentStore, NoUserContext};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingEmbedder {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TextEmbedder for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // deterministic toy embedding keyed on text length
            let length = text.len() as f32;
            Ok(vec![1.0, length / (length + 1.0)])
        }
    }

    #[derive(Default)]
    struct CountingGenerator {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TextGenerator for CountingGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, RagError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("generated answer".to_string())
        }
    }

    fn engine_with(
        embed_calls: Arc<AtomicUsize>,
        generate_calls: Arc<AtomicUsize>,
    ) -> RagEngine<CountingEmbedder, CountingGenerator, MemoryStore, NoUserContext> {
        RagEngine::new(
            CountingEmbedder { calls: embed_calls },
            CountingGenerator {
                calls: generate_calls,
            },
            MemoryStore::new(),
            NoUserContext,
            EngineConfig::default(),
        )
        .expect("engine constructs")
    }

    async fn seed_documents<S: DocumentStore>(store: &S) {
        let chunk = Chunk {
            content: "Protein is essential for muscle repair.".to_string(),
            metadata: ChunkMetadata {
                source: "nutrition_book".to_string(),
                chapter: Some("Chapter 1: Protein Basics".to_string()),
                topic: Some("protein".to_string()),
                language: "en".to_string(),
            },
        };
        store.insert_chunk(&chunk, &[1.0, 0.9]).await.unwrap();
    }

    #[tokio::test]
    async fn empty_query_is_a_validation_error() {
        let engine = engine_with(Arc::default(), Arc::default());
        let result = engine.search("   ", None, &SearchFilters::default()).await;
        assert!(matches!(result, Err(RagError::Validation(_))));
    }

    #[tokio::test]
    async fn repeated_search_hits_the_cache() {
        let embed_calls = Arc::new(AtomicUsize::new(0));
        let engine = engine_with(embed_calls.clone(), Arc::default());
        seed_documents(engine.store()).await;

        let first = engine
            .search("kebutuhan protein harian", None, &SearchFilters::default())
            .await
            .unwrap();
        let second = engine
            .search("kebutuhan protein harian", None, &SearchFilters::default())
            .await
            .unwrap();

        assert_eq!(embed_calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.len(), second.len());
    }

    #[tokio::test]
    async fn distinct_queries_embed_separately() {
        let embed_calls = Arc::new(AtomicUsize::new(0));
        let engine = engine_with(embed_calls.clone(), Arc::default());
        seed_documents(engine.store()).await;

        engine
            .search("protein", None, &SearchFilters::default())
            .await
            .unwrap();
        engine
            .search("fiber", None, &SearchFilters::default())
            .await
            .unwrap();

        assert_eq!(embed_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn chat_against_foreign_session_is_forbidden() {
        let generate_calls = Arc::new(AtomicUsize::new(0));
        let engine = engine_with(Arc::default(), generate_calls.clone());
        engine.store().insert_session(ChatSession {
            id: "session-1".to_string(),
            user_id: Some("owner".to_string()),
            is_guest: false,
        });

        let payload = ChatPayload {
            session_id: "session-1".to_string(),
            content: "how much protein do I need".to_string(),
            top_k: None,
            filters: SearchFilters::default(),
        };
        let result = engine.chat(Some("intruder"), &payload).await;

        assert!(matches!(result, Err(RagError::Forbidden(_))));
        assert!(engine.store().messages_for("session-1").is_empty());
        assert_eq!(generate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn chat_without_identity_on_owned_session_is_unauthorized() {
        let engine = engine_with(Arc::default(), Arc::default());
        engine.store().insert_session(ChatSession {
            id: "session-1".to_string(),
            user_id: Some("owner".to_string()),
            is_guest: false,
        });

        let payload = ChatPayload {
            session_id: "session-1".to_string(),
            content: "hello".to_string(),
            top_k: None,
            filters: SearchFilters::default(),
        };
        let result = engine.chat(None, &payload).await;
        assert!(matches!(result, Err(RagError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let engine = engine_with(Arc::default(), Arc::default());
        let payload = ChatPayload {
            session_id: "missing".to_string(),
            content: "hello".to_string(),
            top_k: None,
            filters: SearchFilters::default(),
        };
        let result = engine.chat(None, &payload).await;
        assert!(matches!(result, Err(RagError::NotFound(_))));
    }

    #[tokio::test]
    async fn guest_session_accepts_anonymous_chat() {
        let engine = engine_with(Arc::default(), Arc::default());
        seed_documents(engine.store()).await;
        engine.store().insert_session(ChatSession {
            id: "guest-session".to_string(),
            user_id: None,
            is_guest: true,
        });

        let payload = ChatPayload {
            session_id: "guest-session".to_string(),
            content: "how much protein do I need daily?".to_string(),
            top_k: None,
            filters: SearchFilters::default(),
        };
        let response = engine.chat(None, &payload).await.unwrap();

        assert_eq!(response.user_message.role, ChatRole::User);
        assert_eq!(response.assistant_message.role, ChatRole::Assistant);
        assert_eq!(response.assistant_message.content, "generated answer");
        assert_eq!(response.sources.len(), 1);
        assert_eq!(engine.store().messages_for("guest-session").len(), 2);
    }

    #[tokio::test]
    async fn unsafe_recommendation_refuses_without_provider_calls() {
        let embed_calls = Arc::new(AtomicUsize::new(0));
        let generate_calls = Arc::new(AtomicUsize::new(0));
        let engine = engine_with(embed_calls.clone(), generate_calls.clone());

        let payload = RecommendationPayload {
            query: "what dosage of supplements should I take".to_string(),
            top_k: None,
            filters: SearchFilters::default(),
        };
        let record = engine.recommend("user-1", &payload).await.unwrap();

        assert!(!record.is_safe);
        assert_eq!(record.content, REFUSAL_MESSAGE);
        assert_eq!(record.refusal_reason.as_deref(), Some(REFUSAL_REASON_MEDICAL));
        assert!(record.sources.is_empty());
        assert_eq!(embed_calls.load(Ordering::SeqCst), 0);
        assert_eq!(generate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn safe_recommendation_cites_sources() {
        let engine = engine_with(Arc::default(), Arc::default());
        seed_documents(engine.store()).await;

        let payload = RecommendationPayload {
            query: "protein intake for strength training".to_string(),
            top_k: Some(3),
            filters: SearchFilters::default(),
        };
        let record = engine.recommend("user-1", &payload).await.unwrap();

        assert!(record.is_safe);
        assert_eq!(record.content, "generated answer");
        assert_eq!(record.sources.len(), 1);
        assert!(record.refusal_reason.is_none());
    }

    #[tokio::test]
    async fn purge_removes_entries_past_ttl() {
        let engine = engine_with(Arc::default(), Arc::default());
        seed_documents(engine.store()).await;
        engine
            .search("protein", None, &SearchFilters::default())
            .await
            .unwrap();

        // a cutoff in the future expires everything written so far
        let purged = engine
            .purge_expired_cache(Utc::now() + Duration::days(31))
            .await
            .unwrap();
        assert_eq!(purged, 1);
    }
}
