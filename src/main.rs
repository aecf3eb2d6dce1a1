use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

use tinypenguin::ai_providers::LocalLlmProvider;
use tinypenguin::config::Config;
use tinypenguin::finetune::{self, DEFAULT_MIN_RATING, DEFAULT_OUTPUT_FILE};
use tinypenguin::{AiProvider, InteractionLog, NoRating, PromptRating, RatingProvider, TaskManager, ToolExecutor};

#[derive(Debug, Parser)]
#[command(name = "tinypenguin")]
#[command(about = "AI-powered Linux system administration with a local model")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API base URL (Ollama compatible)
    #[arg(long, global = true, env = "TINYLLAMA_URL")]
    url: Option<String>,

    /// Model name to use
    #[arg(long, global = true, env = "MODEL")]
    model: Option<String>,

    /// Enable tool calling (use --tools=false for text-only answers)
    #[arg(
        long,
        global = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    tools: Option<bool>,

    /// Debug output for diagnosing tool calling
    #[arg(long, global = true)]
    debug: bool,

    /// Do not prompt for a rating after each tool call
    #[arg(long, global = true)]
    no_rating: bool,

    #[arg(short = 'C', long = "config", global = true)]
    config_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a task with the given query
    Run {
        /// What you want done, e.g. "Create a new user named john"
        query: String,
    },
    /// Cancel a task by ID
    Cancel {
        #[arg(long)]
        task_id: String,
    },
    /// List all tasks
    List,
    /// List the models served by the endpoint
    Models,
    /// Convert the tool call log into fine-tuning JSONL
    Convert {
        /// Interaction log to read
        input: PathBuf,
        /// Where to write the examples
        #[arg(default_value = DEFAULT_OUTPUT_FILE)]
        output: PathBuf,
        /// Only include examples rated at least this high (unrated ones are kept)
        #[arg(long, default_value_t = DEFAULT_MIN_RATING)]
        min_rating: u8,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config_file.as_deref())?.with_overrides(
        cli.url.clone(),
        cli.model.clone(),
        cli.tools,
    );

    let log_level = if cli.debug {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting tinypenguin v{}", env!("CARGO_PKG_VERSION"));
    debug!("Endpoint {} with model {}", config.endpoint.url, config.endpoint.model);

    match cli.command {
        Commands::Run { query } => {
            let provider = LocalLlmProvider::with_timeout(&config.endpoint.url, config.request_timeout());
            let executor = ToolExecutor::new()
                .with_default_timeout(config.default_command_timeout())
                .with_max_output_bytes(config.tools.max_output_bytes);

            let log_path = config.tool_log_path(executor.get_working_directory());
            info!("Recording tool calls in {}", log_path.display());
            let log = InteractionLog::new(log_path).with_max_entries(config.logging.max_entries);

            let rater: Box<dyn RatingProvider> = if cli.no_rating || !std::io::stdin().is_terminal() {
                Box::new(NoRating)
            } else {
                Box::new(PromptRating::stdio())
            };

            let manager = TaskManager::new(Arc::new(provider), executor, log, rater, &config.endpoint.model)
                .with_tools_enabled(config.tools.enabled);

            if let Err(e) = manager.execute_task(&query).await {
                error!("Failed to run task: {:#}", e);
                return Err(e);
            }
        }

        Commands::Cancel { task_id } => {
            println!("Cancelling task: {}", task_id);
        }

        Commands::List => {
            println!("Listing tasks:");
        }

        Commands::Models => {
            let provider = LocalLlmProvider::with_timeout(&config.endpoint.url, config.request_timeout());
            let models = provider
                .list_models()
                .await
                .with_context(|| format!("Failed to list models at {}", provider.base_url()))?;

            if models.is_empty() {
                println!("No models available at {}", provider.base_url());
            }
            for model in models {
                println!("{}", model);
            }
        }

        Commands::Convert { input, output, min_rating } => {
            let summary = finetune::convert_log_file(&input, &output, min_rating).await?;

            println!("\n✅ Conversion complete!");
            println!("  ✅ Converted: {} examples", summary.converted);
            println!("  ⚠️  Skipped: {} entries", summary.skipped);
            println!("  📝 Old format (reconstructed): {} entries", summary.reconstructed);
            println!("  📄 Output file: {}", output.display());
            println!("  ⭐ Minimum rating filter: {}+", min_rating);
        }
    }

    Ok(())
}
