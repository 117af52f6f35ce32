//! Retrieval core for a nutrition knowledge base: text cleaning and
//! chunking for ingestion, embedding and generation clients, a
//! query-embedding cache, pgvector-backed search, and the engine that
//! composes them into search, chat, and recommendation flows.

pub mod chunking;
pub mod cleaning;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod retry;
pub mod safety;
pub mod stores;
pub mod traits;

pub use chunking::{Chunker, ChunkingConfig};
pub use cleaning::TextCleaner;
pub use embeddings::{content_hash, EmbeddingConfig, HttpEmbeddingClient, ProviderFamily, TextEmbedder};
pub use error::{IngestError, RagError};
pub use generation::{GenerationConfig, HttpGenerationClient, TextGenerator};
pub use ingest::{IngestionPipeline, IngestionReport};
pub use models::{
    CacheEntry, ChatMessage, ChatRole, ChatSession, Chunk, ChunkMetadata, CitedSource,
    IngestOptions, RecommendationRecord, SearchFilters, SearchResult, UserContextSummary,
};
pub use orchestrator::{
    ChatPayload, ChatResponse, EngineConfig, RagEngine, RecommendationPayload,
};
pub use retry::RetryPolicy;
pub use safety::{SafetyScreen, REFUSAL_MESSAGE, REFUSAL_REASON_MEDICAL};
pub use stores::{MemoryStore, PostgresStore};
pub use traits::{
    ChatStore, DocumentStore, NoUserContext, QueryEmbeddingCache, RecommendationStore,
    UserContextProvider,
};
