use crate::error::RagError;
use crate::models::{
    CacheEntry, ChatMessage, ChatRole, ChatSession, Chunk, CitedSource, RecommendationRecord,
    SearchFilters, SearchResult,
};
use crate::traits::{ChatStore, DocumentStore, QueryEmbeddingCache, RecommendationStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// In-memory backend for development and tests. Brute-force cosine
/// search; suitable for small corpora only.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<Vec<StoredChunk>>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    sessions: Mutex<HashMap<String, ChatSession>>,
    messages: Mutex<Vec<ChatMessage>>,
    recommendations: Mutex<Vec<RecommendationRecord>>,
}

struct StoredChunk {
    id: String,
    chunk: Chunk,
    embedding: Vec<f32>,
    created_at: DateTime<Utc>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_session(&self, session: ChatSession) {
        self.sessions
            .lock()
            .expect("sessions lock")
            .insert(session.id.clone(), session);
    }

    pub fn document_count(&self) -> usize {
        self.documents.lock().expect("documents lock").len()
    }

    pub fn messages_for(&self, session_id: &str) -> Vec<ChatMessage> {
        self.messages
            .lock()
            .expect("messages lock")
            .iter()
            .filter(|message| message.session_id == session_id)
            .cloned()
            .collect()
    }

    pub fn recommendations(&self) -> Vec<RecommendationRecord> {
        self.recommendations
            .lock()
            .expect("recommendations lock")
            .clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_chunk(&self, chunk: &Chunk, embedding: &[f32]) -> Result<(), RagError> {
        self.documents
            .lock()
            .expect("documents lock")
            .push(StoredChunk {
                id: Uuid::new_v4().to_string(),
                chunk: chunk.clone(),
                embedding: embedding.to_vec(),
                created_at: Utc::now(),
            });
        Ok(())
    }

    async fn content_exists(&self, content: &str) -> Result<bool, RagError> {
        Ok(self
            .documents
            .lock()
            .expect("documents lock")
            .iter()
            .any(|stored| stored.chunk.content == content))
    }

    async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>, RagError> {
        let documents = self.documents.lock().expect("documents lock");
        let mut results: Vec<SearchResult> = documents
            .iter()
            .filter(|stored| matches_filters(&stored.chunk, filters))
            .map(|stored| {
                let metadata = &stored.chunk.metadata;
                SearchResult {
                    id: stored.id.clone(),
                    title: metadata
                        .chapter
                        .clone()
                        .or_else(|| metadata.topic.clone()),
                    content: stored.chunk.content.clone(),
                    chapter: metadata.chapter.clone(),
                    topic: metadata.topic.clone(),
                    language: Some(metadata.language.clone()),
                    source: Some(metadata.source.clone()),
                    created_at: stored.created_at,
                    score: cosine_similarity(embedding, &stored.embedding),
                }
            })
            .collect();

        results.sort_by(|left, right| right.score.total_cmp(&left.score));
        results.truncate(limit);
        Ok(results)
    }
}

fn matches_filters(chunk: &Chunk, filters: &SearchFilters) -> bool {
    let metadata = &chunk.metadata;
    if let Some(source) = &filters.source {
        if &metadata.source != source {
            return false;
        }
    }
    if let Some(language) = &filters.language {
        if &metadata.language != language {
            return false;
        }
    }
    if let Some(topic) = &filters.topic {
        if metadata.topic.as_ref() != Some(topic) {
            return false;
        }
    }
    if let Some(chapter) = &filters.chapter {
        if metadata.chapter.as_ref() != Some(chapter) {
            return false;
        }
    }
    true
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl QueryEmbeddingCache for MemoryStore {
    async fn find(&self, query_hash: &str) -> Result<Option<CacheEntry>, RagError> {
        Ok(self
            .cache
            .lock()
            .expect("cache lock")
            .get(query_hash)
            .cloned())
    }

    async fn upsert(
        &self,
        query_hash: &str,
        query_text: &str,
        embedding: &[f32],
    ) -> Result<(), RagError> {
        let mut cache = self.cache.lock().expect("cache lock");
        match cache.get_mut(query_hash) {
            Some(entry) => {
                // conflict refreshes the text only, never the embedding
                entry.query_text = query_text.to_string();
            }
            None => {
                cache.insert(
                    query_hash.to_string(),
                    CacheEntry {
                        id: Uuid::new_v4().to_string(),
                        query_hash: query_hash.to_string(),
                        query_text: query_text.to_string(),
                        embedding: embedding.to_vec(),
                        created_at: Utc::now(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn delete(&self, query_hash: &str) -> Result<(), RagError> {
        self.cache.lock().expect("cache lock").remove(query_hash);
        Ok(())
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, RagError> {
        let mut cache = self.cache.lock().expect("cache lock");
        let before = cache.len();
        cache.retain(|_, entry| entry.created_at >= cutoff);
        Ok((before - cache.len()) as u64)
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn find_session(&self, session_id: &str) -> Result<Option<ChatSession>, RagError> {
        Ok(self
            .sessions
            .lock()
            .expect("sessions lock")
            .get(session_id)
            .cloned())
    }

    async fn create_message(
        &self,
        session_id: &str,
        role: ChatRole,
        content: &str,
    ) -> Result<ChatMessage, RagError> {
        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.messages
            .lock()
            .expect("messages lock")
            .push(message.clone());
        Ok(message)
    }
}

#[async_trait]
impl RecommendationStore for MemoryStore {
    async fn create(
        &self,
        user_id: &str,
        content: &str,
        sources: &[CitedSource],
        context: &str,
        is_safe: bool,
        refusal_reason: Option<&str>,
    ) -> Result<RecommendationRecord, RagError> {
        let record = RecommendationRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            content: content.to_string(),
            sources: sources.to_vec(),
            context: context.to_string(),
            is_safe,
            refusal_reason: refusal_reason.map(str::to_string),
            created_at: Utc::now(),
        };
        self.recommendations
            .lock()
            .expect("recommendations lock")
            .push(record.clone());
        Ok(record)
    }
}
