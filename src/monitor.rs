use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::domains::DomainTarget;
use crate::merge::{self, WriteKind};
use crate::pool::{BatchTally, Task, WorkerPool};
use crate::probe::{Probe, Resolve};
use crate::queue::WorkQueue;
use crate::stats::DomainStats;
use crate::store::{Store, StoreError};

/// Conditions that stop the monitor before the first batch
#[derive(Debug, Error)]
pub enum StartupError {
	#[error("no domains to query")]
	NoDomains,

	#[error(transparent)]
	Store(#[from] StoreError),
}

/// In-memory state of one measured domain
#[derive(Debug, Clone)]
pub struct DomainRecord {
	pub target: DomainTarget,
	/// Cumulative since the aggregate was first stored, never reset between batches
	pub stats: DomainStats,
	/// Set once a row for the domain exists in the store
	pub first_seen: Option<DateTime<Utc>>,
}

/// What happened during one batch
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchSummary {
	pub tally: BatchTally,
	pub inserted: usize,
	pub updated: usize,
	pub write_failures: usize,
	pub duration: Duration,
}

/// Runs measurement batches and persists their results.
///
/// Records are kept in one vector for the life of the process; the index of
/// a record is its identity in work queues and merge actions.
pub struct Monitor<S, R> {
	records: Vec<DomainRecord>,
	store: S,
	probe: Probe<R>,
	pool: WorkerPool,
}

impl<S, R> Monitor<S, R>
where
	S: Store,
	R: Resolve + Sync,
{
	/// Load the domain list and seed every aggregate from the store.
	pub fn load(store: S, probe: Probe<R>, pool: WorkerPool) -> Result<Self, StartupError> {
		let targets = store.load_domain_list()?;
		if targets.is_empty() {
			return Err(StartupError::NoDomains);
		}

		let mut records = Vec::with_capacity(targets.len());
		let mut resumed = 0;
		for target in targets {
			let record = match store.load_existing_stats(&target) {
				Ok(Some(persisted)) if persisted.stats.is_consistent() => {
					resumed += 1;
					DomainRecord { target, stats: persisted.stats, first_seen: Some(persisted.first_seen) }
				}
				Ok(Some(persisted)) => {
					warn!(
						action = "load",
						component = "monitor",
						domain = %target,
						count = persisted.stats.count,
						"Stored statistics are inconsistent, starting over"
					);
					DomainRecord { target, stats: DomainStats::default(), first_seen: Some(persisted.first_seen) }
				}
				Ok(None) => DomainRecord { target, stats: DomainStats::default(), first_seen: None },
				Err(e @ StoreError::Corrupt { .. }) => {
					warn!(action = "load", component = "monitor", domain = %target, error = %e, "Starting over");
					// A row exists, so later writes must update it
					DomainRecord { target, stats: DomainStats::default(), first_seen: Some(Utc::now()) }
				}
				Err(e) => return Err(e.into()),
			};
			records.push(record);
		}

		info!(
			action = "load",
			component = "monitor",
			domains = records.len(),
			resumed,
			workers = pool.workers(),
			"Monitor ready"
		);
		Ok(Self { records, store, probe, pool })
	}

	pub fn records(&self) -> &[DomainRecord] {
		&self.records
	}

	/// Probe every domain once, then write the aggregates that changed.
	///
	/// Write failures are logged and counted; the affected aggregates stay in
	/// memory and are written again after the next batch that improves them.
	/// A domain whose row disappeared is inserted again on that write.
	pub fn run_batch(&mut self) -> BatchSummary {
		let start = Instant::now();
		let baseline: Vec<u64> = self.records.iter().map(|r| r.stats.count).collect();

		let queue: WorkQueue<Task<'_>> = self.records.iter_mut()
			.map(|record| Task { target: &record.target, stats: &mut record.stats })
			.collect();
		let tally = self.pool.run(&queue, &self.probe);
		drop(queue);

		let mut summary = BatchSummary { tally, ..BatchSummary::default() };
		for action in merge::plan(&self.records, &baseline) {
			match self.store.apply(&action) {
				Ok(()) => match action.kind {
					WriteKind::Insert => {
						self.records[action.index].first_seen = Some(action.row.first_seen);
						summary.inserted += 1;
					}
					WriteKind::Update => summary.updated += 1,
				},
				Err(e) => {
					error!(
						action = "write",
						component = "store",
						domain = %action.row.name,
						error = %e,
						"Failed to persist statistics"
					);
					if matches!(e, StoreError::MissingRow(_)) {
						// The row was removed outside the monitor, so write it afresh next time
						self.records[action.index].first_seen = None;
					}
					summary.write_failures += 1;
				}
			}
		}
		summary.duration = start.elapsed();

		info!(
			action = "complete",
			component = "batch",
			attempted = summary.tally.attempted,
			succeeded = summary.tally.succeeded,
			failed = summary.tally.failed,
			inserted = summary.inserted,
			updated = summary.updated,
			write_failures = summary.write_failures,
			duration_ms = summary.duration.as_millis() as u64,
			"Batch finished"
		);
		summary
	}
}
