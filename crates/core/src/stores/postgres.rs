use crate::error::RagError;
use crate::models::{
    CacheEntry, ChatMessage, ChatRole, ChatSession, Chunk, CitedSource, RecommendationRecord,
    SearchFilters, SearchResult,
};
use crate::traits::{ChatStore, DocumentStore, QueryEmbeddingCache, RecommendationStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use uuid::Uuid;

/// Postgres backend over three logical tables: embedded document chunks
/// (pgvector column), the query-embedding cache (unique hash key), and
/// recommendation/chat records. Cache races resolve through the
/// database's own `ON CONFLICT` handling.
pub struct PostgresStore {
    client: Client,
}

impl PostgresStore {
    /// Connects and drives the connection on a background task.
    pub async fn connect(database_url: &str) -> Result<Self, RagError> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(error) = connection.await {
                eprintln!("postgres connection error: {error}");
            }
        });
        Ok(Self { client })
    }

    /// Creates the vector extension and tables if absent.
    pub async fn ensure_schema(&self, dimensions: usize) -> Result<(), RagError> {
        self.client
            .batch_execute("CREATE EXTENSION IF NOT EXISTS vector")
            .await?;
        let statements = format!(
            "CREATE TABLE IF NOT EXISTS nutrition_documents (\
                 id TEXT PRIMARY KEY,\
                 title TEXT,\
                 content TEXT NOT NULL,\
                 chapter TEXT,\
                 topic TEXT,\
                 language TEXT,\
                 source TEXT,\
                 embedding vector({dimensions}) NOT NULL,\
                 created_at TIMESTAMPTZ NOT NULL DEFAULT now()\
             );\
             CREATE TABLE IF NOT EXISTS query_embedding_cache (\
                 id TEXT PRIMARY KEY,\
                 query_hash TEXT NOT NULL UNIQUE,\
                 query_text TEXT NOT NULL,\
                 embedding vector({dimensions}) NOT NULL,\
                 created_at TIMESTAMPTZ NOT NULL DEFAULT now()\
             );\
             CREATE TABLE IF NOT EXISTS chat_sessions (\
                 id TEXT PRIMARY KEY,\
                 user_id TEXT,\
                 is_guest BOOLEAN NOT NULL DEFAULT FALSE\
             );\
             CREATE TABLE IF NOT EXISTS chat_messages (\
                 id TEXT PRIMARY KEY,\
                 session_id TEXT NOT NULL REFERENCES chat_sessions(id),\
                 role TEXT NOT NULL,\
                 content TEXT NOT NULL,\
                 created_at TIMESTAMPTZ NOT NULL DEFAULT now()\
             );\
             CREATE TABLE IF NOT EXISTS recommendations (\
                 id TEXT PRIMARY KEY,\
                 user_id TEXT NOT NULL,\
                 content TEXT NOT NULL,\
                 sources JSONB NOT NULL DEFAULT '[]',\
                 context TEXT NOT NULL,\
                 is_safe BOOLEAN NOT NULL,\
                 refusal_reason TEXT,\
                 created_at TIMESTAMPTZ NOT NULL DEFAULT now()\
             )"
        );
        self.client.batch_execute(&statements).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn insert_chunk(&self, chunk: &Chunk, embedding: &[f32]) -> Result<(), RagError> {
        let metadata = &chunk.metadata;
        let title = metadata.chapter.clone().or_else(|| metadata.topic.clone());
        let vector = Vector::from(embedding.to_vec());
        self.client
            .execute(
                "INSERT INTO nutrition_documents \
                 (id, title, content, chapter, topic, language, source, embedding) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                &[
                    &Uuid::new_v4().to_string(),
                    &title,
                    &chunk.content,
                    &metadata.chapter,
                    &metadata.topic,
                    &metadata.language,
                    &metadata.source,
                    &vector,
                ],
            )
            .await?;
        Ok(())
    }

    async fn content_exists(&self, content: &str) -> Result<bool, RagError> {
        let row = self
            .client
            .query_opt(
                "SELECT 1 FROM nutrition_documents WHERE content = $1 LIMIT 1",
                &[&content],
            )
            .await?;
        Ok(row.is_some())
    }

    async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>, RagError> {
        let vector = Vector::from(embedding.to_vec());
        let mut sql = String::from(
            "SELECT id, title, content, chapter, topic, language, source, created_at, \
             1 - (embedding <=> $1) AS score \
             FROM nutrition_documents WHERE 1=1",
        );
        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&vector];

        for (column, value) in [
            ("source", &filters.source),
            ("language", &filters.language),
            ("topic", &filters.topic),
            ("chapter", &filters.chapter),
        ] {
            if let Some(value) = value {
                params.push(value);
                sql.push_str(&format!(" AND {column} = ${}", params.len()));
            }
        }

        let limit = limit as i64;
        params.push(&limit);
        sql.push_str(&format!(
            " ORDER BY embedding <=> $1 LIMIT ${}",
            params.len()
        ));

        let rows = self.client.query(sql.as_str(), &params).await?;
        Ok(rows
            .iter()
            .map(|row| SearchResult {
                id: row.get("id"),
                title: row.get("title"),
                content: row.get("content"),
                chapter: row.get("chapter"),
                topic: row.get("topic"),
                language: row.get("language"),
                source: row.get("source"),
                created_at: row.get("created_at"),
                score: row.get("score"),
            })
            .collect())
    }
}

#[async_trait]
impl QueryEmbeddingCache for PostgresStore {
    async fn find(&self, query_hash: &str) -> Result<Option<CacheEntry>, RagError> {
        let row = self
            .client
            .query_opt(
                "SELECT id, query_hash, query_text, embedding, created_at \
                 FROM query_embedding_cache WHERE query_hash = $1 LIMIT 1",
                &[&query_hash],
            )
            .await?;
        Ok(row.map(|row| {
            let embedding: Vector = row.get("embedding");
            CacheEntry {
                id: row.get("id"),
                query_hash: row.get("query_hash"),
                query_text: row.get("query_text"),
                embedding: embedding.to_vec(),
                created_at: row.get("created_at"),
            }
        }))
    }

    async fn upsert(
        &self,
        query_hash: &str,
        query_text: &str,
        embedding: &[f32],
    ) -> Result<(), RagError> {
        let vector = Vector::from(embedding.to_vec());
        // conflict refreshes the text only; the embedding stays as first
        // written, so concurrent identical queries cannot clobber it
        self.client
            .execute(
                "INSERT INTO query_embedding_cache (id, query_hash, query_text, embedding) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (query_hash) DO UPDATE SET query_text = EXCLUDED.query_text",
                &[&Uuid::new_v4().to_string(), &query_hash, &query_text, &vector],
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, query_hash: &str) -> Result<(), RagError> {
        self.client
            .execute(
                "DELETE FROM query_embedding_cache WHERE query_hash = $1",
                &[&query_hash],
            )
            .await?;
        Ok(())
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, RagError> {
        let deleted = self
            .client
            .execute(
                "DELETE FROM query_embedding_cache WHERE created_at < $1",
                &[&cutoff],
            )
            .await?;
        Ok(deleted)
    }
}

#[async_trait]
impl ChatStore for PostgresStore {
    async fn find_session(&self, session_id: &str) -> Result<Option<ChatSession>, RagError> {
        let row = self
            .client
            .query_opt(
                "SELECT id, user_id, is_guest FROM chat_sessions WHERE id = $1",
                &[&session_id],
            )
            .await?;
        Ok(row.map(|row| ChatSession {
            id: row.get("id"),
            user_id: row.get("user_id"),
            is_guest: row.get("is_guest"),
        }))
    }

    async fn create_message(
        &self,
        session_id: &str,
        role: ChatRole,
        content: &str,
    ) -> Result<ChatMessage, RagError> {
        let id = Uuid::new_v4().to_string();
        let role_label = match role {
            ChatRole::User => "USER",
            ChatRole::Assistant => "ASSISTANT",
        };
        let row = self
            .client
            .query_one(
                "INSERT INTO chat_messages (id, session_id, role, content) \
                 VALUES ($1, $2, $3, $4) RETURNING created_at",
                &[&id, &session_id, &role_label, &content],
            )
            .await?;
        Ok(ChatMessage {
            id,
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl RecommendationStore for PostgresStore {
    async fn create(
        &self,
        user_id: &str,
        content: &str,
        sources: &[CitedSource],
        context: &str,
        is_safe: bool,
        refusal_reason: Option<&str>,
    ) -> Result<RecommendationRecord, RagError> {
        let id = Uuid::new_v4().to_string();
        let sources_json = serde_json::to_value(sources)?;
        let row = self
            .client
            .query_one(
                "INSERT INTO recommendations \
                 (id, user_id, content, sources, context, is_safe, refusal_reason) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING created_at",
                &[
                    &id,
                    &user_id,
                    &content,
                    &sources_json,
                    &context,
                    &is_safe,
                    &refusal_reason,
                ],
            )
            .await?;
        Ok(RecommendationRecord {
            id,
            user_id: user_id.to_string(),
            content: content.to_string(),
            sources: sources.to_vec(),
            context: context.to_string(),
            is_safe,
            refusal_reason: refusal_reason.map(str::to_string),
            created_at: row.get("created_at"),
        })
    }
}
