pub mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "aim-engine")]
#[command(about = "Select and synthesize LLM serving configurations from recipes", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Config file (JSON or YAML)
    #[arg(long, global = true)]
    pub config: Option<String>,
    /// Directory containing models/ and recipes/
    #[arg(long, global = true)]
    pub config_dir: Option<String>,
    /// Local model cache directory
    #[arg(long, global = true)]
    pub cache_dir: Option<String>,
    /// Skip hardware probing and assume this many GPUs at every tier
    #[arg(long, global = true)]
    pub assume_gpus: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a model to a launch configuration
    Resolve {
        /// HuggingFace model id, e.g. Qwen/Qwen3-32B
        model: String,
        /// Number of GPUs (1-8, auto-selected when omitted)
        #[arg(long)]
        gpu_count: Option<u32>,
        /// Precision: fp16, bf16, fp8, int8, int4 (auto-selected when omitted)
        #[arg(long)]
        precision: Option<String>,
        /// Serving backend: vllm or sglang
        #[arg(long, default_value = "vllm")]
        backend: String,
        /// Port for the inference endpoint
        #[arg(long)]
        port: Option<u16>,
        /// Do not merge cache environment and volumes
        #[arg(long)]
        no_cache: bool,
        /// Also print the docker run arguments
        #[arg(long)]
        docker: bool,
        /// Save the result to a JSON file
        #[arg(long)]
        output: Option<String>,
    },
    /// List models in the catalog
    Models,
    /// List recipe ids for a model
    Recipes {
        model: String,
    },
    /// Show every enabled configuration for a model
    Configs {
        model: String,
    },
    /// Show GPU counts visible to the runtime, container and host
    Probe,
    /// Show local model cache statistics
    Cache {
        /// Also list cached models older than this many days
        #[arg(long)]
        stale_days: Option<i64>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(&cli.global)?;

    match cli.command {
        Commands::Resolve {
            model,
            gpu_count,
            precision,
            backend,
            port,
            no_cache,
            docker,
            output,
        } => commands::resolve(
            &config,
            cli.global.assume_gpus,
            &model,
            gpu_count,
            precision.as_deref(),
            &backend,
            port,
            no_cache,
            docker,
            output,
        ),
        Commands::Models => commands::models(&config),
        Commands::Recipes { model } => commands::recipes(&config, &model),
        Commands::Configs { model } => commands::configs(&config, &model),
        Commands::Probe => commands::probe(&config, cli.global.assume_gpus),
        Commands::Cache { stale_days } => commands::cache(&config, stale_days),
    }
}
