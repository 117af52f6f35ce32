use crate::chunking::{Chunker, ChunkingConfig};
use crate::cleaning::TextCleaner;
use crate::embeddings::{content_hash, TextEmbedder};
use crate::error::IngestError;
use crate::models::IngestOptions;
use crate::traits::DocumentStore;
use std::collections::HashSet;
use std::path::Path;

/// Outcome of one ingestion run. Per-chunk embedding or insert failures
/// do not abort the run; they are reported here instead.
#[derive(Debug, Default, Clone)]
pub struct IngestionReport {
    pub chunk_count: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub failures: Vec<String>,
}

/// File-to-store pipeline: clean, chunk, deduplicate by content hash,
/// embed, insert.
pub struct IngestionPipeline<E, S>
where
    E: TextEmbedder,
    S: DocumentStore,
{
    cleaner: TextCleaner,
    chunker: Chunker,
    embedder: E,
    store: S,
}

impl<E, S> IngestionPipeline<E, S>
where
    E: TextEmbedder,
    S: DocumentStore,
{
    pub fn new(config: ChunkingConfig, embedder: E, store: S) -> Result<Self, regex::Error> {
        Ok(Self {
            cleaner: TextCleaner::new()?,
            chunker: Chunker::new(config)?,
            embedder,
            store,
        })
    }

    pub async fn ingest_file(
        &self,
        path: &Path,
        options: &IngestOptions,
    ) -> Result<IngestionReport, IngestError> {
        let raw = tokio::fs::read_to_string(path).await?;
        self.ingest_text(&raw, options).await
    }

    pub async fn ingest_text(
        &self,
        raw: &str,
        options: &IngestOptions,
    ) -> Result<IngestionReport, IngestError> {
        let cleaned = self.cleaner.clean(raw);
        let chunks = self
            .chunker
            .chunk(&cleaned, &options.source, &options.language);

        let mut report = IngestionReport {
            chunk_count: chunks.len(),
            ..IngestionReport::default()
        };

        // Dedup against both earlier chunks of this run and rows already
        // in the store.
        let mut seen_hashes: HashSet<String> = HashSet::new();

        for (index, chunk) in chunks.iter().enumerate() {
            let hash = content_hash(&chunk.content);
            if !seen_hashes.insert(hash) {
                report.duplicates += 1;
                continue;
            }
            match self.store.content_exists(&chunk.content).await {
                Ok(true) => {
                    report.duplicates += 1;
                    continue;
                }
                Ok(false) => {}
                Err(error) => {
                    report
                        .failures
                        .push(format!("chunk {index}: lookup failed: {error}"));
                    continue;
                }
            }

            if options.dry_run {
                report.inserted += 1;
                continue;
            }

            let embedding = match self.embedder.embed(&chunk.content).await {
                Ok(embedding) => embedding,
                Err(error) => {
                    report
                        .failures
                        .push(format!("chunk {index}: embedding failed: {error}"));
                    continue;
                }
            };
            match self.store.insert_chunk(chunk, &embedding).await {
                Ok(()) => report.inserted += 1,
                Err(error) => report
                    .failures
                    .push(format!("chunk {index}: insert failed: {error}")),
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use crate::stores::MemoryStore;
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default, Clone)]
    struct StubEmbedder {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl TextEmbedder for StubEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, RagError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RagError::Upstream {
                    provider: "embedding",
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    fn pipeline(
        embedder: StubEmbedder,
    ) -> IngestionPipeline<StubEmbedder, MemoryStore> {
        IngestionPipeline::new(ChunkingConfig::default(), embedder, MemoryStore::new())
            .expect("pipeline constructs")
    }

    #[tokio::test]
    async fn ingests_a_small_document() {
        let pipeline = pipeline(StubEmbedder::default());
        let report = pipeline
            .ingest_text(
                "Chapter 1: Protein Basics\n\nProtein supports muscle repair. Adults need protein every day.",
                &IngestOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(report.inserted, report.chunk_count);
        assert!(report.chunk_count >= 1);
        assert!(report.failures.is_empty());
        assert_eq!(pipeline.store.document_count(), report.inserted);
    }

    #[tokio::test]
    async fn empty_input_yields_an_empty_report() {
        let pipeline = pipeline(StubEmbedder::default());
        let report = pipeline
            .ingest_text("", &IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(report.chunk_count, 0);
        assert_eq!(report.inserted, 0);
    }

    #[tokio::test]
    async fn reingestion_skips_existing_content() {
        let embedder = StubEmbedder::default();
        let pipeline = pipeline(embedder.clone());
        let text = "Fiber aids digestion. Vegetables are rich in fiber.";

        let first = pipeline
            .ingest_text(text, &IngestOptions::default())
            .await
            .unwrap();
        let second = pipeline
            .ingest_text(text, &IngestOptions::default())
            .await
            .unwrap();

        assert_eq!(first.inserted, first.chunk_count);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, second.chunk_count);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), first.inserted);
    }

    #[tokio::test]
    async fn dry_run_touches_neither_embedder_nor_store() {
        let embedder = StubEmbedder::default();
        let pipeline = pipeline(embedder.clone());
        let options = IngestOptions {
            dry_run: true,
            ..IngestOptions::default()
        };

        let report = pipeline
            .ingest_text("Calcium strengthens bones. Dairy contains calcium.", &options)
            .await
            .unwrap();

        assert!(report.inserted >= 1);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.store.document_count(), 0);
    }

    #[tokio::test]
    async fn embedding_failures_are_reported_not_fatal() {
        let embedder = StubEmbedder {
            fail: true,
            ..StubEmbedder::default()
        };
        let pipeline = pipeline(embedder);
        let report = pipeline
            .ingest_text("Iron carries oxygen in the blood.", &IngestOptions::default())
            .await
            .unwrap();

        assert_eq!(report.inserted, 0);
        assert_eq!(report.failures.len(), report.chunk_count);
    }

    #[tokio::test]
    async fn reads_from_a_file_on_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Vitamin C supports the immune system.").unwrap();

        let pipeline = pipeline(StubEmbedder::default());
        let report = pipeline
            .ingest_file(file.path(), &IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(report.inserted, 1);
    }
}
