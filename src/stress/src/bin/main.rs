use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tally_jobs::{JobContext, WorkerPool};
use tally_stress::{config::ConfRoot, scenario};
use tally_util::debug::error::ErrorFormatExt;

// === Clap === //

#[derive(Debug, Clone, Parser)]
#[command(about = "load generator for the tally job executor", long_about = None)]
struct CliArgs {
	#[arg(short = 'c', long = "config", global = true, name = "path to config")]
	config: Option<PathBuf>,

	/// Overrides the number of workers from the config file.
	#[arg(short = 'w', long = "workers", global = true)]
	workers: Option<usize>,

	#[command(subcommand)]
	command: CliCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum CliCommand {
	/// Floods a single executor with jobs from several submitting threads.
	Stress(CliStressCommand),

	/// Runs a chain of executors linked by their post jobs.
	Chain(CliChainCommand),
}

#[derive(Debug, Clone, Args)]
struct CliStressCommand {
	#[arg(long, default_value_t = 100_000)]
	units: usize,

	#[arg(long, default_value_t = 4)]
	threads: usize,

	#[arg(long, default_value_t = 5)]
	runs: usize,
}

#[derive(Debug, Clone, Args)]
struct CliChainCommand {
	#[arg(long, default_value_t = 64)]
	depth: usize,

	#[arg(long, default_value_t = 30)]
	timeout_secs: u64,
}

// === Driver === //

fn main() -> anyhow::Result<()> {
	// Setup debug services
	env_logger::init_from_env(env_logger::Env::new().default_filter_or("INFO"));

	// Parse arguments
	let cmd = CliArgs::parse();

	// Load config
	let mut conf = ConfRoot::load(cmd.config.as_deref())?;
	if let Some(workers) = cmd.workers {
		conf.pool.workers = Some(workers);
	}

	let pool = WorkerPool::new(&conf.pool).context("failed to create worker pool")?;
	log::info!("Running on {} worker(s)", pool.worker_count());

	let cx = JobContext::with_label("stress pool", Arc::new(pool));

	match &cmd.command {
		CliCommand::Stress(sub) => do_cli_stress_command(&cx, sub)?,
		CliCommand::Chain(sub) => do_cli_chain_command(&cx, sub)?,
	};

	Ok(())
}

fn do_cli_stress_command(cx: &JobContext, sub: &CliStressCommand) -> anyhow::Result<()> {
	for run in 1..=sub.runs {
		let report = match scenario::run_stress(cx, sub.units, sub.threads) {
			Ok(report) => report,
			Err(err) => {
				err.log();
				anyhow::bail!("stress run {run} of {} failed", sub.runs);
			}
		};

		log::info!(
			"Run {run}/{}: {} unit(s) from {} thread(s) in {:?} ({:.0} units/s)",
			sub.runs,
			report.units,
			report.threads,
			report.elapsed,
			report.units_per_sec(),
		);
	}

	Ok(())
}

fn do_cli_chain_command(cx: &JobContext, sub: &CliChainCommand) -> anyhow::Result<()> {
	let report = scenario::run_chain(cx, sub.depth, Duration::from_secs(sub.timeout_secs))
		.context("chain run failed")?;

	log::info!(
		"Chain of {} executor(s) completed in {:?}",
		report.depth,
		report.elapsed,
	);

	Ok(())
}
