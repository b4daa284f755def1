use comfy_table::{Table, ContentArrangement, presets::UTF8_FULL};

use anyhow::Result;

use crate::monitor::{BatchSummary, DomainRecord};
use crate::transport::{MonitorConfig, ResolverConfig};

/// Print a summary of the monitor configuration before the first batch.
pub fn print_config_summary(resolvers: &[ResolverConfig], config: &MonitorConfig) {
	println!("DNS Latency Monitor Configuration");
	println!("=================================");
	println!("Database:       {}", config.database);
	println!("Table:          {}", config.table);
	println!("Resolvers:      {}", resolvers.len());
	for r in resolvers {
		println!("  - {} ({})", r.label, r.addr);
	}
	println!("Frequency:      {} s", config.frequency.as_secs());
	let iterations = if config.iterations == 0 {
		"infinite".to_string()
	} else {
		config.iterations.to_string()
	};
	println!("Iterations:     {}", iterations);
	println!("Parallel:       {}", config.workers);
	println!("Timeout:        {} ms", config.timeout.as_millis());
	if let Some(seed) = config.seed {
		println!("Seed:           {}", seed);
	}
	println!();
}

fn format_ms(value: Option<f64>) -> String {
	value.map(|v| format!("{:.1} ms", v)).unwrap_or_else(|| "-".to_string())
}

/// Print every domain's aggregate after a batch.
pub fn print_stats_table(batch: u64, records: &[DomainRecord], summary: &BatchSummary) {
	let mut table = Table::new();
	table.load_preset(UTF8_FULL);
	table.set_content_arrangement(ContentArrangement::Dynamic);
	table.set_header(vec![
		"Domain", "Queries", "Average", "Std Dev", "Last Seen",
	]);

	for r in records {
		let s = &r.stats;
		table.add_row(vec![
			r.target.to_string(),
			s.count.to_string(),
			format_ms(s.average()),
			format_ms(s.stddev()),
			s.last_time
				.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
				.unwrap_or_else(|| "-".to_string()),
		]);
	}

	println!("\nBatch {} ({} ok, {} failed, {} ms)", batch,
		summary.tally.succeeded, summary.tally.failed, summary.duration.as_millis());
	println!("{table}");
}

/// Write every domain's aggregate to a CSV file, replacing its contents.
pub fn write_csv(path: &str, records: &[DomainRecord]) -> Result<()> {
	let mut writer = csv::Writer::from_path(path)?;
	write_records(&mut writer, records)?;
	writer.flush()?;
	Ok(())
}

fn write_records<W: std::io::Write>(writer: &mut csv::Writer<W>, records: &[DomainRecord]) -> Result<()> {
	writer.write_record([
		"name", "avg_in_ms", "stddev_in_ms", "sum_in_ms", "sum_sqrt_in_ms",
		"num_queries", "first_ts", "last_ts",
	])?;

	for r in records {
		let s = &r.stats;
		writer.write_record([
			r.target.to_string(),
			s.average().map(|v| format!("{:.2}", v)).unwrap_or_default(),
			s.stddev().map(|v| format!("{:.2}", v)).unwrap_or_default(),
			s.sum_ms.to_string(),
			s.sum_sq_ms.to_string(),
			s.count.to_string(),
			r.first_seen.map(|t| t.to_rfc3339()).unwrap_or_default(),
			s.last_time.map(|t| t.to_rfc3339()).unwrap_or_default(),
		])?;
	}
	Ok(())
}
