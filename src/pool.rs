use std::thread;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error};

use crate::domains::DomainTarget;
use crate::probe::{Probe, Resolve};
use crate::queue::WorkQueue;
use crate::stats::DomainStats;

/// One domain to probe in the current batch.
///
/// The task holds the only mutable reference to the domain's aggregate, so
/// whichever worker pops it is the sole writer until the batch ends.
pub struct Task<'a> {
	pub target: &'a DomainTarget,
	pub stats: &'a mut DomainStats,
}

/// Probe counts for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchTally {
	pub attempted: usize,
	pub succeeded: usize,
	pub failed: usize,
}

impl BatchTally {
	fn merge(self, other: BatchTally) -> BatchTally {
		BatchTally {
			attempted: self.attempted + other.attempted,
			succeeded: self.succeeded + other.succeeded,
			failed: self.failed + other.failed,
		}
	}
}

/// Fixed-size pool of OS threads that drains a work queue once.
#[derive(Debug, Clone)]
pub struct WorkerPool {
	workers: usize,
	seed: Option<u64>,
}

impl WorkerPool {
	/// A pool of `workers` threads (at least one).
	///
	/// With a seed, worker `i` draws its labels from `seed + i`, which makes
	/// the queried names reproducible for a given assignment of tasks.
	pub fn new(workers: usize, seed: Option<u64>) -> Self {
		Self { workers: workers.max(1), seed }
	}

	pub fn workers(&self) -> usize {
		self.workers
	}

	fn worker_rng(&self, worker: usize) -> StdRng {
		match self.seed {
			Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(worker as u64)),
			None => StdRng::from_entropy(),
		}
	}

	/// Probe every queued domain and fold the samples into their aggregates.
	///
	/// Blocks until all workers have exited, so every probe of the batch has
	/// finished when this returns.
	pub fn run<R>(&self, queue: &WorkQueue<Task<'_>>, probe: &Probe<R>) -> BatchTally
	where
		R: Resolve + Sync,
	{
		let start = Instant::now();
		let queued = queue.len();
		let tally = thread::scope(|s| {
			let handles: Vec<_> = (0..self.workers)
				.map(|worker| {
					let mut rng = self.worker_rng(worker);
					s.spawn(move || {
						let mut tally = BatchTally::default();
						while let Some(task) = queue.pop() {
							let sample = probe.measure(task.target, &mut rng);
							debug!(action = "sample", component = "worker", worker, domain = %sample.domain, latency_ms = ?sample.latency_ms, "Probe finished");
							tally.attempted += 1;
							if sample.latency_ms.is_some() {
								tally.succeeded += 1;
							} else {
								tally.failed += 1;
							}
							*task.stats = task.stats.incorporate(&sample);
						}
						debug!(action = "exit", component = "worker", worker, probes = tally.attempted, "Worker drained queue");
						tally
					})
				})
				.collect();

			handles.into_iter()
				.enumerate()
				.fold(BatchTally::default(), |acc, (worker, handle)| match handle.join() {
					Ok(tally) => acc.merge(tally),
					Err(_) => {
						error!(action = "join", component = "worker_pool", worker, "Worker panicked");
						acc
					}
				})
		});

		if !queue.is_empty() {
			// Only possible when every worker died early
			error!(action = "complete", component = "worker_pool", remaining = queue.len(), "Tasks left unprobed");
		}
		debug!(
			action = "complete",
			component = "worker_pool",
			workers = self.workers,
			queued,
			attempted = tally.attempted,
			duration_ms = start.elapsed().as_millis() as u64,
			"Worker pool finished"
		);
		tally
	}
}
