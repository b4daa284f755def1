use std::net::{IpAddr, SocketAddr};

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::transport::ResolverConfig;

const DNS_PORT: u16 = 53;

/// Parse a nameserver address, with or without a port.
///
/// Accepts `192.0.2.1`, `192.0.2.1:5353`, `2001:db8::1` and
/// `[2001:db8::1]:5353`. Without a port, 53 is used. The label is the bare IP
/// unless the port is non-standard.
pub fn parse_resolver(input: &str) -> Result<ResolverConfig> {
	let trimmed = input.trim();
	if trimmed.is_empty() {
		bail!("empty resolver address");
	}

	let addr = match trimmed.parse::<SocketAddr>() {
		Ok(addr) => addr,
		Err(_) => {
			let ip: IpAddr = trimmed.parse()
				.with_context(|| format!("invalid resolver address '{}'", trimmed))?;
			SocketAddr::new(ip, DNS_PORT)
		}
	};

	let label = if addr.port() == DNS_PORT {
		addr.ip().to_string()
	} else {
		addr.to_string()
	};
	Ok(ResolverConfig { label, addr })
}

/// Read nameserver addresses from a file, one per line.
///
/// Blank lines and `#` comments are skipped. A bad line fails the whole file.
pub fn read_resolver_file(path: &str) -> Result<Vec<ResolverConfig>> {
	let content = std::fs::read_to_string(path)
		.with_context(|| format!("failed to read resolver file '{}'", path))?;
	content.lines()
		.enumerate()
		.map(|(i, line)| (i + 1, line.trim()))
		.filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
		.map(|(lineno, line)| {
			parse_resolver(line).with_context(|| format!("{}:{}", path, lineno))
		})
		.collect()
}

/// Read the nameservers the system resolver would use from /etc/resolv.conf.
///
/// Returns an empty vec if the file cannot be read.
pub fn system_resolvers() -> Vec<ResolverConfig> {
	match std::fs::read_to_string("/etc/resolv.conf") {
		Ok(content) => parse_resolv_conf(&content),
		Err(e) => {
			debug!(action = "read", component = "resolv_conf", error = %e, "No system resolver configuration");
			Vec::new()
		}
	}
}

/// Extract `nameserver` entries from resolv.conf content, in file order.
///
/// Scoped IPv6 addresses and other entries that do not parse are skipped.
fn parse_resolv_conf(content: &str) -> Vec<ResolverConfig> {
	content.lines()
		.filter_map(|line| {
			let mut parts = line.split_whitespace();
			match (parts.next(), parts.next()) {
				(Some("nameserver"), Some(addr)) => parse_resolver(addr).ok(),
				_ => None,
			}
		})
		.collect()
}

/// Return a list of well-known public resolvers, used when neither the
/// command line nor /etc/resolv.conf name one.
pub fn default_resolvers() -> Vec<ResolverConfig> {
	vec![
		ResolverConfig {
			label: "Cloudflare".to_string(),
			addr: SocketAddr::from(([1, 1, 1, 1], 53)),
		},
		ResolverConfig {
			label: "Google".to_string(),
			addr: SocketAddr::from(([8, 8, 8, 8], 53)),
		},
		ResolverConfig {
			label: "Quad9".to_string(),
			addr: SocketAddr::from(([9, 9, 9, 9], 53)),
		},
	]
}

/// Pick the nameservers a lookup is sent to.
///
/// Explicit resolvers win; otherwise the system configuration is used,
/// falling back to the public defaults when that is empty too.
pub fn select_resolvers(
	explicit: Vec<ResolverConfig>,
	system: Vec<ResolverConfig>,
) -> Vec<ResolverConfig> {
	if !explicit.is_empty() {
		return explicit;
	}
	if !system.is_empty() {
		return system;
	}
	default_resolvers()
}
