//! Mimir Search CLI - embedding providers and hybrid retrieval from the shell
//!
//! Commands:
//! - `models` - List models of configured providers
//! - `status` - Probe every registered provider
//! - `embed` - Embed a query text and summarize the vector
//! - `search` - Load a directory of text files and search it

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use mimir_config::{ConfigLoader, ConfigOverrides, EmbeddingProviderType, LogFormat, MimirConfig};
use mimir_search::{
    EmbeddingService, MemoryStore, ProviderRegistry, SearchRequest, SearchService, SearchType,
};

/// Tenant used for documents loaded by the CLI
const CLI_TENANT: i64 = 1;

/// File extensions loaded by `search --docs`
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "rst"];

/// Mimir Search - embedding providers and hybrid retrieval
#[derive(Parser)]
#[command(name = "mimir-search")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Workspace root used to find `.mimir/config.toml`
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Default embedding model
    #[arg(long, global = true, env = "MIMIR_DEFAULT_EMBEDDING_MODEL")]
    default_model: Option<String>,

    /// Preferred provider for default model selection (voyage, openai, ollama)
    #[arg(long, global = true)]
    provider: Option<EmbeddingProviderType>,

    /// Ollama server URL
    #[arg(long, global = true, env = "OLLAMA_BASE_URL")]
    ollama_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List models of configured providers
    Models,

    /// Show configuration status of every provider
    Status,

    /// Embed a text and print a summary of the vector
    Embed {
        /// Text to embed
        text: String,

        /// Embedding model (default: configured or preferred provider's first model)
        #[arg(short, long)]
        model: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search a directory of text files
    Search {
        /// Search query
        query: String,

        /// Directory of documents to load
        #[arg(short, long)]
        docs: PathBuf,

        /// Search strategy
        #[arg(short = 't', long = "type", value_enum, default_value = "hybrid")]
        search_type: SearchTypeArg,

        /// Maximum number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Embedding model for semantic and hybrid search
        #[arg(short, long)]
        model: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SearchTypeArg {
    Lexical,
    Semantic,
    Hybrid,
}

impl From<SearchTypeArg> for SearchType {
    fn from(arg: SearchTypeArg) -> Self {
        match arg {
            SearchTypeArg::Lexical => SearchType::Lexical,
            SearchTypeArg::Semantic => SearchType::Semantic,
            SearchTypeArg::Hybrid => SearchType::Hybrid,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        default_model: cli.default_model.clone(),
        preferred_provider: cli.provider,
        ollama_url: cli.ollama_url.clone(),
        log_level: cli.verbose.then(|| "debug".to_string()),
        ..Default::default()
    };
    let config = ConfigLoader::new()
        .load(&cli.root, Some(&overrides))
        .context("Failed to load configuration")?;

    init_logging(&config)?;

    match cli.command {
        Commands::Models => cmd_models(&config).await,
        Commands::Status => cmd_status(&config).await,
        Commands::Embed { text, model, json } => cmd_embed(&config, text, model, json).await,
        Commands::Search {
            query,
            docs,
            search_type,
            limit,
            model,
            json,
        } => cmd_search(&config, query, docs, search_type.into(), limit, model, json).await,
    }
}

/// Install the tracing subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(config: &MimirConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = match config.logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install logger: {e}"))
}

fn build_services(config: &MimirConfig) -> Result<(Arc<MemoryStore>, SearchService)> {
    let registry = ProviderRegistry::from_settings(&config.embedding)
        .context("Failed to initialize embedding providers")?;
    let store = Arc::new(MemoryStore::new());
    let embeddings = Arc::new(EmbeddingService::new(
        store.clone(),
        Arc::new(registry),
        config.embedding.clone(),
    ));
    let search = SearchService::new(embeddings, store.clone(), config.search.clone());
    Ok((store, search))
}

/// List models of configured providers
async fn cmd_models(config: &MimirConfig) -> Result<()> {
    let (_, search) = build_services(config)?;
    let embeddings = search.embeddings();

    let models = embeddings.list_models().await;
    let default = embeddings.default_model().await.map(|m| m.model_id);

    if models.is_empty() {
        println!("No embedding provider is configured.");
        println!("  Set VOYAGE_API_KEY or OPENAI_API_KEY, or start Ollama (ollama serve).");
        return Ok(());
    }

    println!("Embedding Models");
    println!("================");
    for model in &models {
        let marker = if default.as_deref() == Some(model.model_id.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{} {:<28} {:<8} {:>5} dims  {:>6} tokens",
            marker, model.model_id, model.provider, model.dimensions, model.max_tokens
        );
    }
    if let Some(default) = default {
        println!("\n  Default: {}", default);
    }
    Ok(())
}

/// Show provider status
async fn cmd_status(config: &MimirConfig) -> Result<()> {
    let registry = ProviderRegistry::from_settings(&config.embedding)
        .context("Failed to initialize embedding providers")?;

    println!("Provider Status");
    println!("===============");
    println!("  Preferred: {}", config.embedding.preferred_provider);

    for status in registry.statuses().await {
        let state = if status.configured {
            "configured"
        } else {
            "not configured"
        };
        println!("\n  {}: {}", status.provider, state);
        println!("    Models: {}", status.model_count);
        if let Some(latency) = status.latency_ms {
            println!("    Check latency: {}ms", latency);
        }
        if let Some(error) = status.error {
            println!("    Error: {}", error);
        }
    }
    Ok(())
}

/// Embed a text
async fn cmd_embed(
    config: &MimirConfig,
    text: String,
    model: Option<String>,
    json_output: bool,
) -> Result<()> {
    let (_, search) = build_services(config)?;

    let start = Instant::now();
    let (model_id, vector) = search
        .embeddings()
        .embed_query_text(&text, model.as_deref())
        .await
        .context("Embedding failed")?;
    let elapsed = start.elapsed();

    if json_output {
        let output = serde_json::json!({
            "model": model_id,
            "dimensions": vector.len(),
            "vector": vector,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let head: Vec<String> = vector.iter().take(8).map(|v| format!("{v:.4}")).collect();
        println!(
            "Embedded {} chars with {} in {:.0}ms",
            text.chars().count(),
            model_id,
            elapsed.as_millis()
        );
        println!("  Dimensions: {}", vector.len());
        println!("  Head: [{}, ...]", head.join(", "));
    }
    Ok(())
}

/// Load documents and search them
async fn cmd_search(
    config: &MimirConfig,
    query: String,
    docs: PathBuf,
    search_type: SearchType,
    limit: usize,
    model: Option<String>,
    json_output: bool,
) -> Result<()> {
    let (store, search) = build_services(config)?;

    let titles = load_documents(&store, &docs)?;
    if titles.is_empty() {
        warn!("No text documents found in {}", docs.display());
    }

    if search_type != SearchType::Lexical && !titles.is_empty() {
        let ids: Vec<i64> = (1..=titles.len() as i64).collect();
        let start = Instant::now();
        let outcome = search
            .embeddings()
            .embed_batch(CLI_TENANT, &ids, model.as_deref())
            .await
            .context("Failed to embed documents")?;
        info!(
            "Embedded {} documents in {:.2}s ({} failed)",
            outcome.created,
            start.elapsed().as_secs_f64(),
            outcome.failed
        );
        for error in &outcome.errors {
            warn!("{}", error);
        }
    }

    let mut request = SearchRequest::new(query.clone(), search_type).with_limit(limit);
    request.model = model;

    let start = Instant::now();
    let response = search
        .search(CLI_TENANT, &request)
        .await
        .context("Search failed")?;
    let search_time = start.elapsed();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!(
        "Search [{}]: \"{}\" ({} results in {:.0}ms)\n",
        response.search_type,
        query,
        response.items.len(),
        search_time.as_millis()
    );
    for item in &response.items {
        let title = usize::try_from(item.artifact_id - 1)
            .ok()
            .and_then(|i| titles.get(i))
            .map(String::as_str)
            .unwrap_or("?");
        println!("{}. {} (#{})", item.rank, title, item.artifact_id);

        let via: Vec<String> = item
            .found_via
            .iter()
            .map(|s| format!("{s:?}").to_lowercase())
            .collect();
        match item.similarity {
            Some(similarity) => println!(
                "   Score: {:.5} (similarity {:.3}, via: {})",
                item.score,
                similarity,
                via.join(", ")
            ),
            None => println!("   Score: {:.5} (via: {})", item.score, via.join(", ")),
        }
        if let Some(snippet) = &item.snippet {
            // Show first 100 chars of snippet
            let preview: String = snippet.chars().take(100).collect();
            println!("   Preview: {}...", preview.replace('\n', " "));
        }
        println!();
    }
    Ok(())
}

/// Load every text file under `dir` as one artifact, ids from 1 in path order.
///
/// Returns the display titles indexed by `artifact_id - 1`.
fn load_documents(store: &MemoryStore, dir: &Path) -> Result<Vec<String>> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        let is_text = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| TEXT_EXTENSIONS.contains(&e.to_lowercase().as_str()));
        if entry.file_type().is_file() && is_text {
            paths.push(entry.into_path());
        }
    }

    let mut titles = Vec::with_capacity(paths.len());
    for (index, path) in paths.iter().enumerate() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let title = path
            .strip_prefix(dir)
            .unwrap_or(path)
            .display()
            .to_string();
        let artifact_type = if path.extension().is_some_and(|e| e == "txt") {
            "note"
        } else {
            "document"
        };
        store.insert_artifact(CLI_TENANT, index as i64 + 1, artifact_type, &title, content);
        titles.push(title);
    }

    info!("Loaded {} documents from {}", titles.len(), dir.display());
    Ok(titles)
}
