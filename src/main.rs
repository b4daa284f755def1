mod cli;
mod dns;
mod domains;
mod logging;
mod merge;
mod monitor;
mod output;
mod pool;
mod probe;
mod queue;
mod resolver;
mod stats;
mod store;
mod transport;

use anyhow::Context;
use clap::Parser;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::cli::Cli;
use crate::monitor::Monitor;
use crate::pool::WorkerPool;
use crate::probe::{Probe, UdpResolver};
use crate::store::SqliteStore;
use crate::transport::MonitorConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);
	cli.validate()?;

	if let Some(path) = &cli.password_file {
		cli::read_password(path)?;
		debug!(action = "check", component = "credentials", "Credentials present, SQLite opens without authentication");
	}

	// Explicit resolvers from CLI flags and resolver file
	let mut explicit = Vec::new();
	for r in &cli.resolvers {
		explicit.push(resolver::parse_resolver(r)?);
	}
	if let Some(path) = &cli.resolver_file {
		explicit.extend(resolver::read_resolver_file(path)?);
	}
	let system = if explicit.is_empty() {
		resolver::system_resolvers()
	} else {
		Vec::new()
	};
	let resolvers = resolver::select_resolvers(explicit, system);

	// Domains used only when the domain table is still empty
	let seed_domains = match &cli.domain_file {
		Some(path) => domains::read_domain_file(path)?,
		None => domains::default_domains(),
	};

	let config = MonitorConfig {
		database: cli.database.clone(),
		table: cli.table.clone(),
		frequency: Duration::from_secs(cli.frequency),
		iterations: cli.iterations,
		workers: cli.parallel,
		timeout: Duration::from_millis(cli.timeout),
		seed: cli.seed,
		csv_output: cli.output.clone(),
		print_summary: cli.summary,
	};
	output::print_config_summary(&resolvers, &config);

	let store = SqliteStore::open(&config.database, &config.table, &seed_domains)
		.with_context(|| format!("unable to open database '{}'", config.database))?;
	let nameservers = resolvers.iter().map(|r| r.addr).collect();
	let probe = Probe::new(UdpResolver::new(nameservers, config.timeout));
	let pool = WorkerPool::new(config.workers, config.seed);
	let mut monitor = Monitor::load(store, probe, pool)
		.context("unable to load domains")?;

	let shutdown = tokio::signal::ctrl_c();
	tokio::pin!(shutdown);
	let mut stopping = false;
	let mut completed: u64 = 0;

	loop {
		// Batches run on a blocking thread; the next one starts only after this one is persisted
		let mut batch = tokio::task::spawn_blocking(move || {
			let summary = monitor.run_batch();
			(monitor, summary)
		});
		let (finished, summary) = if stopping {
			batch.await?
		} else {
			tokio::select! {
				joined = &mut batch => joined?,
				_ = &mut shutdown => {
					info!(action = "interrupt", component = "scheduler", "Interrupt received, finishing current batch");
					stopping = true;
					batch.await?
				}
			}
		};
		monitor = finished;
		completed += 1;

		if config.print_summary {
			output::print_stats_table(completed, monitor.records(), &summary);
		}
		if let Some(path) = &config.csv_output {
			if let Err(e) = output::write_csv(path, monitor.records()) {
				error!(action = "write", component = "csv", path = %path, error = %e, "Failed to write CSV snapshot");
			}
		}

		if stopping || config.is_last_batch(completed) {
			break;
		}

		tokio::select! {
			_ = tokio::time::sleep(config.frequency) => {}
			_ = &mut shutdown => {
				info!(action = "interrupt", component = "scheduler", "Interrupt received");
				break;
			}
		}
	}

	info!(action = "exit", component = "scheduler", batches = completed, "Stopped");
	Ok(())
}
