use clap::Parser;

/// DNS latency monitor
#[derive(Parser, Debug)]
#[command(name = "dns-latency-monitor")]
#[command(about = "Periodically measure uncached DNS lookup latency per domain and store running statistics")]
pub struct Cli {
	/// SQLite database file holding domains and results
	#[arg(short = 'd', long = "database", default_value = "dnsquerydb.sqlite")]
	pub database: String,

	/// File whose first line is the database password
	#[arg(short = 'p', long = "password-file")]
	pub password_file: Option<String>,

	/// Seconds to wait between batches
	#[arg(short = 'f', long = "frequency", default_value = "10")]
	pub frequency: u64,

	/// Number of batches to run, 0 for infinite
	#[arg(short = 'i', long = "iterations", default_value = "0")]
	pub iterations: u64,

	/// Number of parallel queries
	#[arg(short = 'P', long = "parallel", default_value = "10")]
	pub parallel: usize,

	/// Table to store results into
	#[arg(short = 't', long = "table", default_value = "queries_result")]
	pub table: String,

	/// DNS resolver address (repeatable, e.g. 1.1.1.1 or 1.1.1.1:53)
	#[arg(short = 'r', long = "resolver")]
	pub resolvers: Vec<String>,

	/// File containing resolver addresses (one per line)
	#[arg(long = "resolver-file")]
	pub resolver_file: Option<String>,

	/// File of domains used to fill an empty domain table
	#[arg(long = "domain-file")]
	pub domain_file: Option<String>,

	/// Query timeout in milliseconds
	#[arg(long = "timeout", default_value = "2000")]
	pub timeout: u64,

	/// Random seed for reproducible query labels
	#[arg(short = 's', long = "seed")]
	pub seed: Option<u64>,

	/// CSV file rewritten with all aggregates after every batch
	#[arg(short = 'o', long = "output")]
	pub output: Option<String>,

	/// Print a table of all aggregates after every batch
	#[arg(long = "summary")]
	pub summary: bool,

	/// Enable debug logging
	#[arg(short = 'v', long = "verbose")]
	pub verbose: bool,
}

impl Cli {
	/// Reject values that would make the monitor misbehave.
	pub fn validate(&self) -> anyhow::Result<()> {
		if self.parallel == 0 {
			anyhow::bail!("--parallel must be greater than 0");
		}
		if self.timeout == 0 {
			anyhow::bail!("--timeout must be greater than 0");
		}
		Ok(())
	}
}

/// Read the password from the first line of `path`.
///
/// Returns an error if the file cannot be read or the line is empty.
pub fn read_password(path: &str) -> anyhow::Result<String> {
	let content = std::fs::read_to_string(path)
		.map_err(|e| anyhow::anyhow!("failed to read password file '{}': {}", path, e))?;
	let password = content.lines().next().unwrap_or("").trim_end_matches('\r').to_string();
	if password.is_empty() {
		anyhow::bail!("password not provided");
	}
	Ok(password)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let cli = Cli::parse_from(["dns-latency-monitor"]);
		assert_eq!(cli.database, "dnsquerydb.sqlite");
		assert_eq!(cli.frequency, 10);
		assert_eq!(cli.iterations, 0);
		assert_eq!(cli.parallel, 10);
		assert_eq!(cli.table, "queries_result");
		assert_eq!(cli.timeout, 2000);
		assert!(cli.password_file.is_none());
		assert!(cli.validate().is_ok());
	}

	#[test]
	fn test_short_flags() {
		let cli = Cli::parse_from([
			"dns-latency-monitor", "-d", "/tmp/x.sqlite", "-p", "passwd", "-f", "5",
			"-i", "3", "-P", "4", "-t", "latency", "-r", "9.9.9.9", "-r", "1.1.1.1",
		]);
		assert_eq!(cli.database, "/tmp/x.sqlite");
		assert_eq!(cli.password_file.as_deref(), Some("passwd"));
		assert_eq!(cli.frequency, 5);
		assert_eq!(cli.iterations, 3);
		assert_eq!(cli.parallel, 4);
		assert_eq!(cli.table, "latency");
		assert_eq!(cli.resolvers, vec!["9.9.9.9".to_string(), "1.1.1.1".to_string()]);
	}

	#[test]
	fn test_zero_parallel_rejected() {
		let cli = Cli::parse_from(["dns-latency-monitor", "-P", "0"]);
		assert!(cli.validate().is_err());
	}

	#[test]
	fn test_non_numeric_frequency_rejected() {
		assert!(Cli::try_parse_from(["dns-latency-monitor", "-f", "often"]).is_err());
	}

	#[test]
	fn test_read_password_first_line() {
		let path = std::env::temp_dir().join(format!("passwd-{}", std::process::id()));
		std::fs::write(&path, "s3cret\nignored\n").unwrap();
		let password = read_password(path.to_str().unwrap());
		std::fs::remove_file(&path).ok();
		assert_eq!(password.unwrap(), "s3cret");
	}

	#[test]
	fn test_read_password_empty_is_error() {
		let path = std::env::temp_dir().join(format!("passwd-empty-{}", std::process::id()));
		std::fs::write(&path, "\n").unwrap();
		let result = read_password(path.to_str().unwrap());
		std::fs::remove_file(&path).ok();
		assert_eq!(result.unwrap_err().to_string(), "password not provided");
	}

	#[test]
	fn test_read_password_missing_file() {
		assert!(read_password("/nonexistent/passwd").is_err());
	}
}
