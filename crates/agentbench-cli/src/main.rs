mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use cmd::orchestrate::OrchestrateArgs;
use cmd::run::PipelineArgs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "agentbench",
    about = "Benchmark AI coding-agent sessions across configuration profiles",
    version,
    propagate_version = true
)]
struct Cli {
    /// Benchmark root (default: nearest ancestor containing benchmark.yaml)
    #[arg(long, global = true, env = "AGENTBENCH_ROOT")]
    root: Option<PathBuf>,

    /// Scenario registry file (default: <root>/benchmark.yaml)
    #[arg(long, global = true, env = "AGENTBENCH_REGISTRY")]
    registry: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full pipeline: setup, sessions, persist results, analysis
    #[command(alias = "benchmark")]
    Run(PipelineArgs),

    /// Run the pipeline for a single scenario
    Scenario {
        /// Scenario id from the registry
        id: String,
        #[command(flatten)]
        args: PipelineArgs,
    },

    /// Materialize sample directories only
    Setup {
        /// Only this scenario
        #[arg(long)]
        scenario: Option<String>,
    },

    /// Validate samples against the latest (or given) results file
    Analyze {
        /// Results file to analyse instead of the newest one
        #[arg(long)]
        results: Option<PathBuf>,
    },

    /// List registered scenarios
    List,

    /// Show samples, agent binary and latest artifacts
    Status,

    /// Run the file-change task orchestrator
    Orchestrate(OrchestrateArgs),

    /// Inspect the merged settings
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run(_) | Commands::Scenario { .. } | Commands::Orchestrate(_) => {
            tracing::Level::INFO
        }
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = cli
        .registry
        .as_deref()
        .map(cmd::from_cwd)
        .transpose()
        .and_then(|registry| dispatch(cli.command, &root, registry.as_deref(), cli.json));

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn dispatch(command: Commands, root: &Path, registry: Option<&Path>, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Run(args) => cmd::run::run(root, registry, args, json),
        Commands::Scenario { id, mut args } => {
            args.scenario = Some(id);
            cmd::run::run(root, registry, args, json)
        }
        Commands::Setup { scenario } => cmd::setup::run(root, registry, scenario.as_deref(), json),
        Commands::Analyze { results } => cmd::analyze::run(root, registry, results.as_deref(), json),
        Commands::List => cmd::list::run(root, registry, json),
        Commands::Status => cmd::status::run(root, registry, json),
        Commands::Orchestrate(args) => cmd::orchestrate::run(root, args, json),
        Commands::Config { subcommand } => cmd::config::run(root, registry, subcommand, json),
    }
}
