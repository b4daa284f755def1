use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for a single DNS resolver
#[derive(Debug, Clone)]
pub struct ResolverConfig {
	pub label: String,
	pub addr: SocketAddr,
}

/// Monitor configuration, built from the command line
#[derive(Debug, Clone)]
pub struct MonitorConfig {
	pub database: String,
	pub table: String,
	/// Pause between the end of one batch and the start of the next
	pub frequency: Duration,
	/// Number of batches to run, 0 for no limit
	pub iterations: u64,
	pub workers: usize,
	pub timeout: Duration,
	pub seed: Option<u64>,
	pub csv_output: Option<String>,
	pub print_summary: bool,
}

impl MonitorConfig {
	/// True when batch number `completed` (zero-based count of finished
	/// batches) should not be followed by another one.
	pub fn is_last_batch(&self, completed: u64) -> bool {
		self.iterations != 0 && completed >= self.iterations
	}
}
