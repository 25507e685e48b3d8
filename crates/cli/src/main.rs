use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use lookalike_indexer::{BuildStats, IndexBuilder};
use lookalike_vector_store::{
    decode_image_bytes, default_store_path_for, EmbeddingModel, EmbeddingStore, EncoderFingerprint,
    ImageEncoder, MatchResult, QueryEngine, RankedMatch, DEFAULT_STORE_FILE_NAME,
};
use serde::Serialize;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::upload::UploadPolicy;

mod upload;

#[derive(Parser)]
#[command(name = "lookalike")]
#[command(about = "Find the most visually similar image in a reference collection", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// Override embedding backend in this process
    #[arg(long, global = true, value_enum)]
    embed_mode: Option<EmbedMode>,

    /// Override embedding model id
    #[arg(long, global = true)]
    model: Option<String>,

    /// Model directory (overrides LOOKALIKE_MODEL_DIR)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Use the int8 quantized vision model
    #[arg(long, global = true)]
    quantized: bool,

    /// Try the CUDA execution provider, falling back to CPU
    #[arg(long, global = true)]
    cuda: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed every image in a directory and write the store
    Index(IndexArgs),

    /// Find the stored image most similar to a query image
    Query(QueryArgs),

    /// Summarise a store file
    Inspect(InspectArgs),
}

#[derive(Args)]
struct IndexArgs {
    /// Directory of reference images (not searched recursively)
    source_dir: PathBuf,

    /// Store file to write (defaults to embeddings.json next to the directory)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct QueryArgs {
    /// Query image (jpeg, png or gif, at most 5 MiB)
    image: PathBuf,

    /// Store file built by `lookalike index`
    #[arg(long, short = 's', default_value = DEFAULT_STORE_FILE_NAME)]
    store: PathBuf,

    /// Number of ranked matches to list
    #[arg(long, short = 'n', default_value_t = 1)]
    limit: usize,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct InspectArgs {
    /// Store file to describe
    #[arg(default_value = DEFAULT_STORE_FILE_NAME)]
    store: PathBuf,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Copy, Clone, ValueEnum)]
enum EmbedMode {
    Fast,
    Stub,
}

impl EmbedMode {
    const fn as_str(self) -> &'static str {
        match self {
            EmbedMode::Fast => "fast",
            EmbedMode::Stub => "stub",
        }
    }
}

#[derive(Serialize)]
struct QueryOutput<'a> {
    query: &'a Path,
    store: &'a Path,
    #[serde(rename = "match")]
    best: MatchResult,
    matches: Vec<RankedMatch>,
}

#[derive(Serialize)]
struct InspectOutput<'a> {
    store: &'a Path,
    records: usize,
    dimension: Option<usize>,
    encoder: Option<&'a EncoderFingerprint>,
    identifiers: Vec<&'a str>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    if let Some(mode) = cli.embed_mode {
        env::set_var("LOOKALIKE_EMBEDDING_MODE", mode.as_str());
    }
    if let Some(model) = &cli.model {
        env::set_var("LOOKALIKE_MODEL", model);
    }
    if let Some(dir) = &cli.model_dir {
        env::set_var("LOOKALIKE_MODEL_DIR", dir);
    }
    if cli.quantized {
        env::set_var("LOOKALIKE_QUANTIZED", "1");
    }
    if cli.cuda {
        env::set_var("LOOKALIKE_USE_CUDA", "1");
    }

    // Keep stdout clean for JSON parsing
    let json_output = match &cli.command {
        Commands::Index(args) => args.json,
        Commands::Query(args) => args.json,
        Commands::Inspect(args) => args.json,
    };
    if json_output {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    // ORT is extremely noisy
    if !cli.verbose {
        builder.filter_module("ort", log::LevelFilter::Off);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Index(args) => run_index(args).await?,
        Commands::Query(args) => run_query(args).await?,
        Commands::Inspect(args) => run_inspect(args).await?,
    }

    Ok(())
}

async fn run_index(args: IndexArgs) -> Result<()> {
    let target = args
        .output
        .clone()
        .unwrap_or_else(|| default_store_path_for(&args.source_dir));

    let encoder: Arc<dyn ImageEncoder> =
        Arc::new(EmbeddingModel::from_env().context("Failed to load image encoder")?);
    let stats = IndexBuilder::new(&args.source_dir, encoder)
        .build_and_save(&target)
        .await
        .with_context(|| format!("Failed to index {}", args.source_dir.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_index_summary(&stats, &target);
    }
    Ok(())
}

fn print_index_summary(stats: &BuildStats, target: &Path) {
    eprintln!(
        "Indexed {} of {} images ({} skipped) in {}ms -> {}",
        stats.embedded,
        stats.discovered,
        stats.skipped,
        stats.time_ms,
        target.display()
    );
    for failure in &stats.failures {
        eprintln!("  skipped {}: {}", failure.file, failure.reason);
    }
}

async fn run_query(args: QueryArgs) -> Result<()> {
    let (bytes, mime) = UploadPolicy::default().read(&args.image).await?;
    log::debug!("Query image {} ({mime})", args.image.display());

    let store = EmbeddingStore::load(&args.store)
        .await
        .with_context(|| format!("Failed to load store {}", args.store.display()))?;
    let encoder = EmbeddingModel::from_env().context("Failed to load image encoder")?;

    let engine = QueryEngine::new(&store);
    engine.check_encoder(&encoder)?;
    let image = decode_image_bytes(&bytes, &args.image)?;
    let vector = encoder
        .encode(image)
        .await
        .context("Failed to embed query image")?;

    let best = engine.query_vector(&vector)?;
    let matches = if args.limit > 1 {
        engine.top_matches(&vector, args.limit)?
    } else {
        Vec::new()
    };

    if args.json {
        let output = QueryOutput {
            query: &args.image,
            store: &args.store,
            best,
            matches,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if !matches.is_empty() {
        for (rank, m) in matches.iter().enumerate() {
            println!("{}. {}\t{:.4}", rank + 1, m.identifier, m.score);
        }
        return Ok(());
    }
    match &best.best_identifier {
        Some(identifier) => println!("{identifier}\t{:.4}", best.score),
        None => eprintln!("No match: {} is empty", args.store.display()),
    }
    Ok(())
}

async fn run_inspect(args: InspectArgs) -> Result<()> {
    let store = EmbeddingStore::load(&args.store)
        .await
        .with_context(|| format!("Failed to load store {}", args.store.display()))?;

    if args.json {
        let output = InspectOutput {
            store: &args.store,
            records: store.len(),
            dimension: store.dimension(),
            encoder: store.encoder(),
            identifiers: store.iter().map(|r| r.identifier.as_str()).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("store: {}", args.store.display());
    println!("records: {}", store.len());
    match store.dimension() {
        Some(dimension) => println!("dimension: {dimension}"),
        None => println!("dimension: unknown"),
    }
    match store.encoder() {
        Some(encoder) => println!("encoder: {encoder}"),
        None => println!("encoder: not recorded (legacy store)"),
    }
    Ok(())
}
