use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber, writing to stderr.
///
/// RUST_LOG takes precedence; otherwise `info`, or `debug` for this crate
/// when `verbose` is set.
pub fn init_logging(verbose: bool) {
	let default_directive = if verbose {
		"info,dns_latency_monitor=debug"
	} else {
		"info"
	};
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(default_directive));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(false)
		.init();
}
