use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::{Name, RecordType};
use rand::Rng;

use crate::domains::DomainTarget;
use crate::probe::ProbeError;

/// Length of the random label prepended to every queried domain.
pub const LABEL_LEN: usize = 8;

/// Generate a random uppercase label used to defeat resolver caching.
///
/// Not cryptographically meaningful; the label only has to be unlikely to
/// repeat between batches.
pub fn random_label<R: Rng>(rng: &mut R) -> String {
	(0..LABEL_LEN)
		.map(|_| rng.gen_range(b'A'..=b'Z') as char)
		.collect()
}

/// Form `label.domain` and parse it as a DNS name.
pub fn query_name(label: &str, domain: &DomainTarget) -> Result<Name, ProbeError> {
	let fqdn = format!("{}.{}", label, domain);
	Name::from_ascii(&fqdn).map_err(|e| ProbeError::MalformedDomain {
		name: fqdn,
		reason: e.to_string(),
	})
}

/// Build a recursive A/IN query for `name` and serialize it for UDP.
pub fn build_query(name: &Name, txid: u16) -> Result<Vec<u8>, ProbeError> {
	let mut message = Message::new();
	message.set_id(txid);
	message.set_message_type(MessageType::Query);
	message.set_recursion_desired(true);
	message.add_query(Query::query(name.clone(), RecordType::A));

	message.to_vec()
		.map_err(|e| ProbeError::Encode(e.to_string()))
}

/// Parse a datagram received from a nameserver.
///
/// Returns `None` for anything that is not a response to `expected_txid`
/// so the caller can keep waiting for the real answer.
pub fn parse_response(bytes: &[u8], expected_txid: u16) -> Option<ResponseCode> {
	let message = Message::from_vec(bytes).ok()?;
	if message.id() != expected_txid || message.message_type() != MessageType::Response {
		return None;
	}
	Some(message.response_code())
}

/// Whether a response code means the lookup was answered.
///
/// A random label normally does not exist, so NXDOMAIN is as good an answer
/// as NOERROR for latency purposes.
pub fn is_answered(rcode: ResponseCode) -> bool {
	matches!(rcode, ResponseCode::NoError | ResponseCode::NXDomain)
}
