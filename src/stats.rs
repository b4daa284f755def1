use chrono::{DateTime, Utc};

use crate::probe::SampleResult;

/// Running latency aggregate for one domain.
///
/// Only sums are kept, so mean and standard deviation are derived on demand
/// and the aggregate can grow for the whole life of the process. All
/// accumulators saturate instead of wrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DomainStats {
	pub sum_ms: u64,
	pub sum_sq_ms: u64,
	pub count: u64,
	pub last_time: Option<DateTime<Utc>>,
}

impl DomainStats {
	/// Fold one sample into the aggregate.
	///
	/// A failed sample leaves the aggregate untouched.
	#[must_use]
	pub fn incorporate(self, sample: &SampleResult) -> DomainStats {
		let Some(ms) = sample.latency_ms else {
			return self;
		};
		let ms = u64::from(ms);
		DomainStats {
			sum_ms: self.sum_ms.saturating_add(ms),
			sum_sq_ms: self.sum_sq_ms.saturating_add(ms * ms),
			count: self.count.saturating_add(1),
			last_time: Some(sample.observed_at),
		}
	}

	/// Mean latency in milliseconds, `None` before the first sample.
	pub fn average(&self) -> Option<f64> {
		if self.count == 0 {
			return None;
		}
		Some(self.sum_ms as f64 / self.count as f64)
	}

	/// Population standard deviation in milliseconds, `None` before the first sample.
	pub fn stddev(&self) -> Option<f64> {
		let avg = self.average()?;
		let variance = self.sum_sq_ms as f64 / self.count as f64 - avg * avg;
		// Rounding can push a zero variance slightly negative
		Some(variance.max(0.0).sqrt())
	}

	/// Check the invariants any valid aggregate satisfies.
	///
	/// An empty aggregate has zero sums, and by Cauchy-Schwarz
	/// `sum_sq * count >= sum²`. A persisted row failing this is corrupt.
	pub fn is_consistent(&self) -> bool {
		if self.count == 0 {
			return self.sum_ms == 0 && self.sum_sq_ms == 0;
		}
		let sum = u128::from(self.sum_ms);
		u128::from(self.sum_sq_ms) * u128::from(self.count) >= sum * sum
	}
}
