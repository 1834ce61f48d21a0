use corplink::autofill::autofill_file;
use corplink::config::{AiLevel, Config};
use corplink::db::Registry;
use corplink::llm::{AdvisoryService, LlmClient};
use corplink::pipeline;
use corplink::standardize::standardize;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "corplink")]
#[command(about = "Curate a registry of canonical company names from news mentions")]
#[command(version)]
struct Args {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the registry and the CSV files (overrides the config file)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// OpenAI API key (or set OPENAI_API_KEY env var)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Disable embedding-based matching and noise scoring
    #[arg(long, global = true)]
    no_semantic: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the registry schema
    Init,
    /// Classify the raw sentence file and write the review worklist
    Classify,
    /// Pre-fill empty review decisions with the LLM
    Autofill,
    /// Commit review decisions and propagate them into the dataset
    Standardize,
    /// Write the canonical id list
    ExportCanonicals,
    /// Classify, then autofill and standardize as the AI level allows
    Run {
        /// manual, assist or auto (overrides the config file)
        #[arg(long)]
        ai_level: Option<AiLevel>,
    },
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if args.no_semantic {
        config.semantic = false;
    }
    config.api_key = args
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());
    Ok(config)
}

fn advisory_service(config: &Config) -> Option<LlmClient> {
    config.api_key.as_ref().map(|key| {
        LlmClient::new(key.clone(), config.llm.base_url.clone(), config.llm.model.clone())
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = load_config(&args)?;

    match args.command {
        Commands::Init => {
            let path = config.registry_path();
            Registry::open(&path)
                .with_context(|| format!("cannot open registry {}", path.display()))?;
            info!("Registry ready at {}", path.display());
        }
        Commands::Classify => {
            let embedder = config.embedder()?;
            let report = pipeline::classify(&config, embedder.as_deref()).await?;
            println!(
                "Classified {} records, {} aliases to review",
                report.records_read - report.records_dropped,
                report.review_rows
            );
        }
        Commands::Autofill => {
            let service = advisory_service(&config)
                .context("autofill needs OPENAI_API_KEY or --api-key")?;
            let updated = autofill_file(&config, &service).await?;
            println!("Autofilled {} review rows", updated);
        }
        Commands::Standardize => {
            let report = standardize(&config)?;
            println!("{}", report);
        }
        Commands::ExportCanonicals => {
            let registry = Registry::open(config.registry_path())?;
            let count = registry.export_canonicals(config.canonical_list_path())?;
            println!("Exported {} canonicals", count);
        }
        Commands::Run { ai_level } => {
            if let Some(level) = ai_level {
                config.ai_level = level;
            }
            let embedder = config.embedder()?;
            let service = advisory_service(&config);
            let report = pipeline::run(
                &config,
                embedder.as_deref(),
                service.as_ref().map(|s| s as &dyn AdvisoryService),
            )
            .await?;
            if let Some(report) = report {
                println!("{}", report);
            }
        }
    }

    Ok(())
}
