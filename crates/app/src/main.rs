mod http;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use nutrition_rag_core::{
    EmbeddingConfig, EngineConfig, GenerationConfig, HttpEmbeddingClient, HttpGenerationClient,
    IngestOptions, IngestionPipeline, NoUserContext, PostgresStore, ProviderFamily, RagEngine,
    RetryPolicy, SearchFilters,
};
use nutrition_rag_core::chunking::ChunkingConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "nutrition-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Postgres connection string (postgres://...).
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Embedding endpoint URL.
    #[arg(long, env = "EMBEDDING_API_ENDPOINT")]
    embedding_endpoint: String,

    /// Embedding API key.
    #[arg(long, env = "EMBEDDING_API_KEY")]
    embedding_api_key: String,

    /// Embedding model identifier.
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "text-embedding-004")]
    embedding_model: String,

    /// Embedding provider family; inferred from the endpoint when unset.
    #[arg(long, env = "EMBEDDING_PROVIDER", value_enum)]
    embedding_provider: Option<ProviderArg>,

    /// Generation endpoint URL.
    #[arg(long, env = "GENERATION_API_ENDPOINT")]
    generation_endpoint: String,

    /// Generation model identifier.
    #[arg(long, env = "GENERATION_MODEL", default_value = "llama3")]
    generation_model: String,

    /// Optional bearer token for the generation endpoint.
    #[arg(long, env = "GENERATION_API_KEY")]
    generation_api_key: Option<String>,

    /// Embedding vector dimensionality, used when creating the schema.
    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value_t = 768)]
    embedding_dimensions: usize,

    /// Days a cached query embedding stays fresh.
    #[arg(long, env = "QUERY_CACHE_TTL_DAYS", default_value_t = 30)]
    cache_ttl_days: i64,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProviderArg {
    Gemini,
    Openai,
    Prompt,
}

impl From<ProviderArg> for ProviderFamily {
    fn from(value: ProviderArg) -> Self {
        match value {
            ProviderArg::Gemini => ProviderFamily::Gemini,
            ProviderArg::Openai => ProviderFamily::OpenAi,
            ProviderArg::Prompt => ProviderFamily::Prompt,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Clean, chunk, embed, and store a plain-text document.
    Ingest {
        /// Path to the text file to ingest.
        #[arg(long)]
        input: PathBuf,
        /// Source label stored with every chunk.
        #[arg(long, default_value = "nutrition_book")]
        source: String,
        /// Language tag stored with every chunk.
        #[arg(long, default_value = "en")]
        language: String,
        /// Clean and chunk only; skip embedding and storage.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Vector search over the stored chunks.
    Search {
        /// Search query.
        #[arg(long)]
        query: String,
        /// Number of results to return (clamped to 1..=20).
        #[arg(long)]
        top_k: Option<usize>,
        /// Restrict to one source label.
        #[arg(long)]
        source: Option<String>,
        /// Restrict to one language tag.
        #[arg(long)]
        language: Option<String>,
        /// Restrict to one topic label.
        #[arg(long)]
        topic: Option<String>,
        /// Restrict to one chapter label.
        #[arg(long)]
        chapter: Option<String>,
    },
    /// Serve the HTTP API.
    Serve {
        /// Address to bind (host:port).
        #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8080")]
        bind: String,
    },
    /// Delete query-embedding cache entries past their TTL.
    PurgeCache,
    /// Run a fixed set of nutrition queries and print the top hits.
    Eval,
}

const EVAL_QUERIES: &[&str] = &[
    "kebutuhan protein harian untuk orang dewasa",
    "sumber karbohidrat kompleks",
    "berapa kalori yang dibutuhkan per hari",
    "manfaat serat untuk pencernaan",
    "vitamin dan mineral penting",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "nutrition-rag boot"
    );

    let embedder = HttpEmbeddingClient::new(
        EmbeddingConfig {
            endpoint: cli.embedding_endpoint.clone(),
            api_key: cli.embedding_api_key.clone(),
            model: cli.embedding_model.clone(),
            family: cli.embedding_provider.map(ProviderFamily::from),
        },
        RetryPolicy::linear(3, Duration::from_millis(500)),
    )?;

    let store = PostgresStore::connect(&cli.database_url).await?;
    store.ensure_schema(cli.embedding_dimensions).await?;

    let generation = GenerationConfig {
        endpoint: cli.generation_endpoint,
        model: cli.generation_model,
        api_key: cli.generation_api_key,
    };
    let engine_config = EngineConfig {
        query_embedding_ttl_days: cli.cache_ttl_days,
    };

    match cli.command {
        Command::Ingest {
            input,
            source,
            language,
            dry_run,
        } => {
            let pipeline = IngestionPipeline::new(ChunkingConfig::default(), embedder, store)?;
            let options = IngestOptions {
                source,
                language,
                dry_run,
            };
            let report = pipeline.ingest_file(&input, &options).await?;

            for failure in &report.failures {
                warn!(%failure, "chunk not ingested");
            }
            println!(
                "{} chunks, {} inserted, {} duplicates, {} failures{}",
                report.chunk_count,
                report.inserted,
                report.duplicates,
                report.failures.len(),
                if dry_run { " (dry run)" } else { "" }
            );
        }
        Command::Search {
            query,
            top_k,
            source,
            language,
            topic,
            chapter,
        } => {
            let engine = build_engine(generation, engine_config, embedder, store)?;
            let filters = SearchFilters {
                source,
                language,
                topic,
                chapter,
            };
            let results = engine.search(&query, top_k, &filters).await?;
            print_results(&results);
        }
        Command::Serve { bind } => {
            let engine = build_engine(generation, engine_config, embedder, store)?;
            http::serve(&bind, engine).await?;
        }
        Command::PurgeCache => {
            let engine = build_engine(generation, engine_config, embedder, store)?;
            let purged = engine.purge_expired_cache(Utc::now()).await?;
            println!("{purged} expired cache entries purged");
        }
        Command::Eval => {
            let engine = build_engine(generation, engine_config, embedder, store)?;
            for query in EVAL_QUERIES {
                let results = engine.search(query, Some(3), &SearchFilters::default()).await?;
                println!("query: {query}");
                print_results(&results);
            }
        }
    }

    Ok(())
}

fn build_engine(
    generation: GenerationConfig,
    config: EngineConfig,
    embedder: HttpEmbeddingClient,
    store: PostgresStore,
) -> anyhow::Result<RagEngine<HttpEmbeddingClient, HttpGenerationClient, PostgresStore, NoUserContext>>
{
    let generator = HttpGenerationClient::new(generation)?;
    let engine = RagEngine::new(embedder, generator, store, NoUserContext, config)?;
    Ok(engine)
}

fn print_results(results: &[nutrition_rag_core::SearchResult]) {
    if results.is_empty() {
        println!("  no results");
        return;
    }
    for result in results {
        println!(
            "  score={:.4} chapter={} topic={}",
            result.score,
            result.chapter.as_deref().unwrap_or("-"),
            result.topic.as_deref().unwrap_or("-"),
        );
        println!("  {}", result.content);
    }
}
