//! DagMC CLI

mod run;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dm_inference::{Mcmc, Monitor, run_chains};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "dagmc")]
#[command(about = "DagMC - Metropolis-Hastings MCMC over model graphs")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Burn in, sample and summarize
    Run {
        /// Run configuration (JSON or YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the configured seed.
        #[arg(long)]
        seed: Option<u64>,

        /// Independent chains (chain 0 is monitored).
        #[arg(long, default_value = "1")]
        chains: usize,

        /// Threads (0 = auto).
        #[arg(long, default_value = "0")]
        threads: usize,
    },

    /// Build the model and chain, report the initial state without sampling
    Check {
        /// Run configuration (JSON or YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print version
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Run { config, output, seed, chains, threads } => {
            cmd_run(&config, output.as_deref(), seed, chains, threads)
        }
        Commands::Check { config, output } => cmd_check(&config, output.as_deref()),
        Commands::Version => {
            println!("dagmc {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn cmd_run(
    config: &Path,
    output: Option<&Path>,
    seed: Option<u64>,
    chains: usize,
    threads: usize,
) -> Result<()> {
    if chains == 0 {
        anyhow::bail!("--chains must be >= 1");
    }
    if threads > 0 {
        // Best-effort; if a global pool already exists, keep going.
        let _ = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global();
    }

    tracing::info!(path = %config.display(), "loading run configuration");
    let mut cfg = run::read_run_config(config)?;
    if let Some(seed) = seed {
        cfg.mcmc.seed = seed;
    }
    cfg.mcmc.tuning_interval = cfg.tuning_interval();

    let model = run::build_model(&cfg)?;
    let moves = run::build_moves(&cfg, &model)?;
    let trace = run::build_monitor(&cfg, &model)?;
    let sink = trace.sink();
    let monitors: Vec<Box<dyn Monitor>> = vec![Box::new(trace)];

    let strategy = Mcmc::new(&model, &moves, &monitors, cfg.mcmc.clone())?.strategy_description();
    tracing::info!(chains, burnin = cfg.burnin, generations = cfg.generations, "{}", strategy);

    let results = run_chains(&model, &moves, &monitors, &cfg.mcmc, chains, cfg.burnin, cfg.generations)?;

    let trace = sink.lock().map_err(|_| anyhow::anyhow!("trace sink lock poisoned"))?;
    let mut posterior = serde_json::Map::new();
    for column in &trace.columns {
        if let Some((mean, sd)) = trace.mean_sd(column, 1) {
            posterior.insert(column.clone(), serde_json::json!({ "mean": mean, "sd": sd }));
        }
    }
    tracing::info!(samples = trace.len(), "sampling finished");

    let output_json = serde_json::json!({
        "strategy": strategy,
        "seed": cfg.mcmc.seed,
        "burnin": cfg.burnin,
        "generations": cfg.generations,
        "samples": trace.len(),
        "posterior": posterior,
        "chains": results,
    });

    write_json(output, output_json)
}

fn cmd_check(config: &Path, output: Option<&Path>) -> Result<()> {
    let cfg = run::read_run_config(config)?;
    let model = run::build_model(&cfg)?;
    let moves = run::build_moves(&cfg, &model)?;

    let mut mcmc = Mcmc::new(&model, &moves, &[], cfg.mcmc.clone())?;
    mcmc.initialize_sampler()?;
    let partition = mcmc.model().cached_partition();

    let output_json = serde_json::json!({
        "nodes": model.len(),
        "stochastic_nodes": model.ordered_stochastic_nodes().len(),
        "moves": moves.len(),
        "ln_probability": partition.total(),
        "ln_likelihood": partition.likelihood,
        "ln_prior": partition.prior,
        "strategy": mcmc.strategy_description(),
    });

    write_json(output, output_json)
}

fn write_json(output: Option<&Path>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
