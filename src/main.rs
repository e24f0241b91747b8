use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tracewalk_core::config::{AppConfig, GraphConfig, ModelConfig, OracleKind};
use tracewalk_core::traits::{
    DecisionOracle, EvaluationOracle, ExecutionOracle, LlmClient, StepMatcher,
};

use tracewalk_agent::{
    initialize_graph, ActionGraph, ExecutionReport, GeneratedPath, LlmDecisionOracle,
    LlmExecutionOracle, LlmStepJudge, LlmStepMatcher, OracleModel, PathGenerator,
    SequenceIngester, StepExecutor,
};

#[derive(Parser)]
#[command(name = "tracewalk", version, about = "Build action graphs from example traces and walk them with an LLM")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "tracewalk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the action graph and print its structure
    Graph {
        /// JSON file holding an array of action sequences
        #[arg(long)]
        sequences: PathBuf,
    },
    /// Generate a path through the action graph for a query
    Path {
        #[arg(long)]
        sequences: PathBuf,
        /// What the path should accomplish
        #[arg(long)]
        query: String,
    },
    /// Execute a trace step by step with retry-until-success
    Run {
        /// JSON file: {"initial_state": "...", "steps": ["...", ...]}
        #[arg(long)]
        trace: PathBuf,
    },
    /// Generate a path, then execute its steps
    Plan {
        #[arg(long)]
        sequences: PathBuf,
        #[arg(long)]
        query: String,
        /// Initial state handed to the first step
        #[arg(long, default_value = "")]
        state: String,
    },
    /// Ask whether two step labels describe the same action
    Match { first: String, second: String },
    /// Show current configuration
    Config,
}

#[derive(Deserialize)]
struct TraceFile {
    #[serde(default)]
    initial_state: String,
    steps: Vec<String>,
}

#[derive(Serialize)]
struct PlanOutput<'a> {
    path: &'a GeneratedPath,
    steps: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    execution: Option<&'a ExecutionReport>,
}

/// Collaborators built from config and handed to the core.
struct Oracles {
    decision: Arc<dyn DecisionOracle>,
    execution: Arc<dyn ExecutionOracle>,
    evaluation: Arc<dyn EvaluationOracle>,
    matcher: Arc<dyn StepMatcher>,
}

impl Oracles {
    fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let llm: Arc<dyn LlmClient> = Arc::new(tracewalk_llm::build_client(config)?);
        let model = |kind: OracleKind| {
            OracleModel::new(Arc::clone(&llm), config.model_for(kind).clone(), kind)
        };

        Ok(Self {
            decision: Arc::new(LlmDecisionOracle::new(model(OracleKind::Decision))),
            execution: Arc::new(LlmExecutionOracle::new(model(OracleKind::Execution))),
            evaluation: Arc::new(LlmStepJudge::new(model(OracleKind::Evaluation))),
            matcher: Arc::new(LlmStepMatcher::new(model(OracleKind::Matcher))),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tracewalk=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Graph { sequences } => {
            // Graph building needs no model access
            let graph_config = if cli.config.exists() {
                load_config(&cli.config)?.graph
            } else {
                GraphConfig::default()
            };
            let graph = build_graph(&sequences, &graph_config)?;
            print!("{}", graph);
        }
        Commands::Path { sequences, query } => {
            let config = load_config(&cli.config)?;
            let oracles = Oracles::from_config(&config)?;
            let graph = build_graph(&sequences, &config.graph)?;
            let path = generate_path(&graph, &oracles, &config, &query).await?;
            print_json(&path)?;
        }
        Commands::Run { trace } => {
            let config = load_config(&cli.config)?;
            let oracles = Oracles::from_config(&config)?;
            let raw = std::fs::read_to_string(&trace)
                .with_context(|| format!("reading trace file {}", trace.display()))?;
            let trace: TraceFile = serde_json::from_str(&raw)
                .with_context(|| format!("parsing trace file {}", trace.display()))?;
            let report = executor(&oracles, &config)
                .execute(&trace.steps, &trace.initial_state)
                .await?;
            print_json(&report)?;
        }
        Commands::Plan {
            sequences,
            query,
            state,
        } => {
            let config = load_config(&cli.config)?;
            let oracles = Oracles::from_config(&config)?;
            let graph = build_graph(&sequences, &config.graph)?;
            let path = generate_path(&graph, &oracles, &config, &query).await?;
            let steps = path.steps(&graph)?;

            let report = if path.is_complete() {
                Some(executor(&oracles, &config).execute(&steps, &state).await?)
            } else {
                warn!(outcome = ?path.outcome, "Path incomplete, skipping execution");
                None
            };

            print_json(&PlanOutput {
                path: &path,
                steps: &steps,
                execution: report.as_ref(),
            })?;
        }
        Commands::Match { first, second } => {
            let config = load_config(&cli.config)?;
            let oracles = Oracles::from_config(&config)?;
            let verdict = oracles.matcher.same_step(&first, &second).await?;
            print_json(&verdict)?;
        }
        Commands::Config => {
            print_json(&redacted(load_config(&cli.config)?))?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        info!(path = %path.display(), "Loading config");
        return Ok(AppConfig::load(path)?);
    }

    warn!(path = %path.display(), "No config file found, falling back to OPENAI_API_KEY");
    let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
        anyhow::anyhow!(
            "no config at {} and OPENAI_API_KEY is not set",
            path.display()
        )
    })?;
    let mut config = AppConfig::parse("[model]\nmodel_id = \"gpt-4o\"\n")?;
    config.model.api_key = Some(api_key);
    Ok(config)
}

fn build_graph(sequences: &Path, config: &GraphConfig) -> anyhow::Result<ActionGraph> {
    let raw = std::fs::read_to_string(sequences)
        .with_context(|| format!("reading sequences file {}", sequences.display()))?;
    let sequences: Vec<Vec<String>> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing sequences file {}", sequences.display()))?;

    let mut graph = initialize_graph(config)?;
    SequenceIngester::new(&mut graph).ingest(&sequences)?;
    Ok(graph)
}

async fn generate_path(
    graph: &ActionGraph,
    oracles: &Oracles,
    config: &AppConfig,
    query: &str,
) -> anyhow::Result<GeneratedPath> {
    let path = PathGenerator::new(graph, Arc::clone(&oracles.decision))
        .with_timeout(config.executor.oracle_timeout())
        .generate(query)
        .await?;
    Ok(path)
}

fn executor(oracles: &Oracles, config: &AppConfig) -> StepExecutor {
    StepExecutor::new(
        Arc::clone(&oracles.execution),
        Arc::clone(&oracles.evaluation),
        config.executor.clone(),
    )
}

fn redacted(mut config: AppConfig) -> AppConfig {
    fn hide(model: &mut ModelConfig) {
        if model.api_key.is_some() {
            model.api_key = Some("<redacted>".into());
        }
    }

    hide(&mut config.model);
    config.fallback_models.iter_mut().for_each(hide);
    for model in [
        &mut config.oracles.decision,
        &mut config.oracles.execution,
        &mut config.oracles.evaluation,
        &mut config.oracles.matcher,
    ]
    .into_iter()
    .flatten()
    {
        hide(model);
    }
    config
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
