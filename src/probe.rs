use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::Name;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use crate::dns::{build_query, is_answered, parse_response, query_name, random_label};
use crate::domains::DomainTarget;

/// Why a single lookup produced no latency sample.
#[derive(Debug, Error)]
pub enum ProbeError {
	#[error("{name} is not a valid domain: {reason}")]
	MalformedDomain { name: String, reason: String },

	#[error("failed to encode DNS query: {0}")]
	Encode(String),

	#[error("no nameserver configured")]
	NoNameservers,

	#[error("query timed out")]
	Timeout,

	#[error("nameserver answered {0}")]
	Rcode(ResponseCode),

	#[error("socket error: {0}")]
	Io(#[from] io::Error),
}

/// Outcome of one probe attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleResult {
	pub domain: String,
	/// Whole milliseconds, absent when the lookup failed
	pub latency_ms: Option<u32>,
	pub observed_at: DateTime<Utc>,
}

impl SampleResult {
	pub fn success(domain: &str, latency_ms: u32, observed_at: DateTime<Utc>) -> Self {
		Self { domain: domain.to_string(), latency_ms: Some(latency_ms), observed_at }
	}

	pub fn failure(domain: &str, observed_at: DateTime<Utc>) -> Self {
		Self { domain: domain.to_string(), latency_ms: None, observed_at }
	}
}

/// A response and the round trip that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Answer {
	pub rcode: ResponseCode,
	/// Send to receive, against the nameserver that answered
	pub elapsed: Duration,
}

/// Something that can answer a single recursive A-record lookup.
///
/// Implementations must bound the time spent in `resolve_a`; the worker
/// calling it has no other way out.
pub trait Resolve {
	fn resolve_a(&self, name: &Name, txid: u16) -> Result<Answer, ProbeError>;
}

/// Resolves over plain UDP against an ordered list of nameservers.
///
/// The first nameserver that answers wins. A nameserver that times out or
/// errors hands the lookup to the next one within the same attempt, and only
/// the round trip to the answering nameserver counts as latency.
#[derive(Debug, Clone)]
pub struct UdpResolver {
	nameservers: Vec<SocketAddr>,
	timeout: Duration,
}

impl UdpResolver {
	pub fn new(nameservers: Vec<SocketAddr>, timeout: Duration) -> Self {
		Self { nameservers, timeout }
	}

	fn query_one(&self, server: SocketAddr, query: &[u8], txid: u16) -> Result<Answer, ProbeError> {
		// A dedicated socket per lookup so concurrent workers never read each other's answers
		let bind_addr = if server.is_ipv4() {
			"0.0.0.0:0"
		} else {
			"[::]:0"
		};
		let socket = UdpSocket::bind(bind_addr)?;
		let start = Instant::now();
		socket.send_to(query, server)?;

		// Use 4096-byte buffer to handle EDNS-extended responses
		let mut buf = vec![0u8; 4096];
		let deadline = start + self.timeout;
		loop {
			let remaining = deadline.saturating_duration_since(Instant::now());
			if remaining.is_zero() {
				return Err(ProbeError::Timeout);
			}
			socket.set_read_timeout(Some(remaining))?;

			match socket.recv_from(&mut buf) {
				Ok((len, src)) if src == server => {
					if let Some(rcode) = parse_response(&buf[..len], txid) {
						return Ok(Answer { rcode, elapsed: start.elapsed() });
					}
					// txid mismatch or parse error, keep waiting
				}
				Ok(_) => {}
				Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
					return Err(ProbeError::Timeout);
				}
				Err(e) => return Err(ProbeError::Io(e)),
			}
		}
	}
}

impl Resolve for UdpResolver {
	fn resolve_a(&self, name: &Name, txid: u16) -> Result<Answer, ProbeError> {
		let query = build_query(name, txid)?;
		let mut last_err = ProbeError::NoNameservers;
		for &server in &self.nameservers {
			match self.query_one(server, &query, txid) {
				Ok(answer) => return Ok(answer),
				Err(e) => {
					debug!(action = "query", component = "resolver", server = %server, error = %e, "Nameserver did not answer");
					last_err = e;
				}
			}
		}
		Err(last_err)
	}
}

/// Times single randomized-label lookups through a resolver.
pub struct Probe<R> {
	resolver: R,
}

impl<R: Resolve> Probe<R> {
	pub fn new(resolver: R) -> Self {
		Self { resolver }
	}

	#[cfg(test)]
	pub(crate) fn resolver(&self) -> &R {
		&self.resolver
	}

	/// Resolve a fresh random subdomain of `domain` and report the lookup's latency.
	///
	/// Never fails: every error is logged and reported as a sample without
	/// latency, so the batch carries on.
	pub fn measure<G: Rng>(&self, domain: &DomainTarget, rng: &mut G) -> SampleResult {
		let label = random_label(rng);
		let name = match query_name(&label, domain) {
			Ok(name) => name,
			Err(e) => {
				warn!(action = "probe", component = "probe", domain = %domain, error = %e, "Skipping malformed query name");
				return SampleResult::failure(domain.as_str(), Utc::now());
			}
		};
		let txid: u16 = rng.gen();

		match self.resolver.resolve_a(&name, txid) {
			Ok(Answer { rcode, elapsed }) if is_answered(rcode) => {
				let latency_ms = u32::try_from(elapsed.as_millis()).unwrap_or(u32::MAX);
				debug!(action = "probe", component = "probe", domain = %domain, query = %name, latency_ms, "Lookup answered");
				SampleResult::success(domain.as_str(), latency_ms, Utc::now())
			}
			Ok(Answer { rcode, .. }) => {
				let e = ProbeError::Rcode(rcode);
				warn!(action = "probe", component = "probe", domain = %domain, query = %name, error = %e, "Query failed");
				SampleResult::failure(domain.as_str(), Utc::now())
			}
			Err(e) => {
				warn!(action = "probe", component = "probe", domain = %domain, query = %name, error = %e, "Query failed");
				SampleResult::failure(domain.as_str(), Utc::now())
			}
		}
	}
}
