use chrono::{DateTime, Utc};

use crate::monitor::DomainRecord;

/// Whether a row is created or overwritten
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
	Insert,
	Update,
}

/// Full aggregate for one domain as it is persisted
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
	pub name: String,
	pub average_ms: f64,
	pub stddev_ms: f64,
	pub sum_ms: u64,
	pub sum_sq_ms: u64,
	pub count: u64,
	/// Not written by updates
	pub first_seen: DateTime<Utc>,
	pub last_seen: DateTime<Utc>,
}

/// One write the store has to perform after a batch
#[derive(Debug, Clone, PartialEq)]
pub struct MergeAction {
	/// Position of the domain in the monitor's record list
	pub index: usize,
	pub kind: WriteKind,
	pub row: AggregateRow,
}

/// Decide which rows to write after a batch.
///
/// `baseline_counts[i]` is the sample count of `records[i]` when the batch
/// started. Domains that gained no sample are skipped entirely. A domain
/// that was never persisted gets an insert whose first-seen time equals its
/// last-seen time, every other domain an update that keeps the first-seen
/// time already stored.
pub fn plan(records: &[DomainRecord], baseline_counts: &[u64]) -> Vec<MergeAction> {
	records.iter()
		.zip(baseline_counts)
		.enumerate()
		.filter_map(|(index, (record, &baseline))| {
			let stats = &record.stats;
			if stats.count <= baseline {
				return None;
			}
			let last_seen = stats.last_time?;
			let (kind, first_seen) = match record.first_seen {
				Some(first_seen) => (WriteKind::Update, first_seen),
				None => (WriteKind::Insert, last_seen),
			};
			Some(MergeAction {
				index,
				kind,
				row: AggregateRow {
					name: record.target.to_string(),
					average_ms: stats.average()?,
					stddev_ms: stats.stddev()?,
					sum_ms: stats.sum_ms,
					sum_sq_ms: stats.sum_sq_ms,
					count: stats.count,
					first_seen,
					last_seen,
				},
			})
		})
		.collect()
}
