//! ljqo CLI - pick a join order for a query description
//!
//! Usage:
//!   ljqo optimize <query.json> [--algorithm <algorithm>] [--config <file>] [--seed <n>]
//!   ljqo graph <query.json>
//!
//! Examples:
//!   ljqo optimize star.json
//!   ljqo optimize star.json --algorithm sdp --seed 42 -v
//!   RUST_LOG=ljqo=trace ljqo optimize chain.toml --left-deep

use clap::{Parser, Subcommand, ValueEnum};
use ljqo::config::Settings;
use ljqo::model::QueryGraph;
use ljqo::planner::join_optimizer::{CardinalityOracle, JoinGraph, JoinEvaluator};
use ljqo::planner::{JoinPlan, JoinSearch, Strategy};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ljqo")]
#[command(about = "ljqo - randomized join-order search")]
#[command(version)]
struct Cli {
    /// Log search progress (repeat for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find a join order for a query
    Optimize {
        /// Path to the query description (.json or .toml)
        file: PathBuf,

        /// Search algorithm
        #[arg(short, long, default_value = "auto")]
        algorithm: AlgorithmArg,

        /// Settings file (defaults to LJQO_CONFIG, ./ljqo.toml, then the user config dir)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Seed for reproducible runs
        #[arg(short, long)]
        seed: Option<u64>,

        /// Restrict the two-phase search to left-deep trees
        #[arg(long)]
        left_deep: bool,
    },

    /// Print the join graph of a query
    Graph {
        /// Path to the query description (.json or .toml)
        file: PathBuf,
    },
}

#[derive(Clone, ValueEnum)]
enum AlgorithmArg {
    /// Exhaustive below the configured threshold, randomized above it
    Auto,
    Exhaustive,
    Twopo,
    Sdp,
}

impl AlgorithmArg {
    fn strategy(&self) -> Option<Strategy> {
        match self {
            AlgorithmArg::Auto => None,
            AlgorithmArg::Exhaustive => Some(Strategy::Exhaustive),
            AlgorithmArg::Twopo => Some(Strategy::TwoPhase),
            AlgorithmArg::Sdp => Some(Strategy::SampleDp),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Optimize {
            file,
            algorithm,
            config,
            seed,
            left_deep,
        } => cmd_optimize(file, algorithm, config, seed, left_deep),
        Commands::Graph { file } => cmd_graph(file),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ljqo={},warn", level)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_query(file: &PathBuf) -> Option<QueryGraph> {
    match QueryGraph::from_file(file) {
        Ok(query) => Some(query),
        Err(e) => {
            eprintln!("Error loading query '{}': {}", file.display(), e);
            None
        }
    }
}

fn cmd_optimize(
    file: PathBuf,
    algorithm: AlgorithmArg,
    config: Option<PathBuf>,
    seed: Option<u64>,
    left_deep: bool,
) -> ExitCode {
    let settings = match config {
        Some(path) => Settings::from_file(&path),
        None => Settings::load(),
    };
    let mut settings = match settings {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if seed.is_some() {
        settings.seed = seed;
    }
    if left_deep {
        settings.twopo.bushy_space = false;
    }

    let Some(query) = load_query(&file) else {
        return ExitCode::FAILURE;
    };
    let oracle = match CardinalityOracle::new(&query) {
        Ok(oracle) => oracle,
        Err(e) => {
            eprintln!("Invalid query: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut search = JoinSearch::new(oracle, &settings);
    if let Some(strategy) = algorithm.strategy() {
        search = search.with_strategy(strategy);
    }

    match search.run() {
        Ok(outcome) => {
            println!("Strategy: {}", outcome.strategy);
            println!("Plan:     {}", render(&outcome.plan, &query));
            println!("Cost:     {:.2}", outcome.plan.cost);
            println!("Rows:     {:.0}", outcome.plan.handle.rows);
            println!(
                "Shape:    {}",
                if outcome.plan.is_left_deep() {
                    "left-deep"
                } else {
                    "bushy"
                }
            );
            println!();
            println!("Joins created: {}", outcome.stats.joins_created);
            println!("Joins reused:  {}", outcome.stats.joins_reused);
            println!("Joins refused: {}", outcome.stats.joins_refused);
            if outcome.stats.states_built > 0 {
                println!("States built:  {}", outcome.stats.states_built);
                println!("Uphill moves:  {}", outcome.stats.uphill_moves);
            }
            if outcome.stats.samples > 0 {
                println!(
                    "Samples:       {} ({} incomplete)",
                    outcome.stats.samples, outcome.stats.failed_samples
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Optimization error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Plan with relation names instead of ids.
fn render<H>(plan: &JoinPlan<H>, query: &QueryGraph) -> String {
    match (plan.left(), plan.right()) {
        (Some(left), Some(right)) => format!("({} ⋈ {})", render(left, query), render(right, query)),
        _ => plan
            .as_relation()
            .and_then(|rel| query.relation_name(rel))
            .unwrap_or("?")
            .to_string(),
    }
}

fn cmd_graph(file: PathBuf) -> ExitCode {
    let Some(query) = load_query(&file) else {
        return ExitCode::FAILURE;
    };
    let oracle = match CardinalityOracle::new(&query) {
        Ok(oracle) => oracle,
        Err(e) => {
            eprintln!("Invalid query: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut eval = JoinEvaluator::new(oracle);
    let graph = match JoinGraph::build(&mut eval) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("Join graph error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("File: {}", file.display());
    println!();
    println!("Relations:");
    for (id, relation) in query.relations.iter().enumerate() {
        println!("  {:>3}  {} ({} rows)", id, relation.name, relation.rows);
    }
    println!();
    println!("Edges:");
    for edge in graph.edges() {
        let name = |rel| query.relation_name(rel).unwrap_or("?");
        let kind = if eval.has_join_predicate(edge.a, edge.b) {
            "predicate"
        } else if eval.has_ordering_restriction(edge.a, edge.b) {
            "restriction"
        } else {
            "cross product"
        };
        println!("  {} - {} ({})", name(edge.a), name(edge.b), kind);
    }

    let components = graph.components().len();
    if components > 1 {
        println!();
        println!("Components: {}", components);
    }
    ExitCode::SUCCESS
}
