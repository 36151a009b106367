use std::fmt;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Serialize, Serializer};

/// Who is being queried in a check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKey {
	Target,
	/// Reference resolver, 1-based
	Reference(usize),
}

impl fmt::Display for ProviderKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProviderKey::Target => f.write_str("target"),
			ProviderKey::Reference(n) => write!(f, "reference{}", n),
		}
	}
}

impl Serialize for ProviderKey {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

/// A DoH endpoint to query
#[derive(Debug, Clone, Serialize)]
pub struct ProviderEndpoint {
	pub key: ProviderKey,
	pub label: String,
	pub url: String,
}

impl ProviderEndpoint {
	/// Human-readable name used in report messages, e.g. "Cloudflare (reference1)"
	pub fn display_name(&self) -> String {
		format!("{} ({})", self.label, self.key)
	}
}

/// DoH request encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
	Json,
	Wire,
}

impl Encoding {
	/// Accept header sent with requests in this encoding
	pub fn accept(self) -> &'static str {
		match self {
			Encoding::Json => "application/dns-json",
			Encoding::Wire => "application/dns-message",
		}
	}
}

impl fmt::Display for Encoding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Encoding::Json => f.write_str("json"),
			Encoding::Wire => f.write_str("wire"),
		}
	}
}

/// What a check asks each provider for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
	A,
	Aaaa,
	Https,
}

impl LookupKind {
	/// Record-type token used both as the JSON `type` parameter and for wire encoding
	pub fn token(self) -> &'static str {
		match self {
			LookupKind::A => "A",
			LookupKind::Aaaa => "AAAA",
			LookupKind::Https => "HTTPS",
		}
	}

	pub fn is_address(self) -> bool {
		matches!(self, LookupKind::A | LookupKind::Aaaa)
	}
}

/// Shape of an HTTP response body, chosen from its Content-Type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseShape {
	Json,
	Wire,
	Text,
	Unknown,
}

impl fmt::Display for ResponseShape {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			ResponseShape::Json => "json",
			ResponseShape::Wire => "wire",
			ResponseShape::Text => "text",
			ResponseShape::Unknown => "unknown",
		};
		f.write_str(s)
	}
}

/// Raw payload kept for audit; wire bytes serialize as base64
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum ResponseBody {
	Json(serde_json::Value),
	Wire(#[serde(serialize_with = "serialize_base64")] Vec<u8>),
	Text(String),
	Unknown,
}

impl ResponseBody {
	/// Textual rendering of the payload, if it has one
	pub fn as_text(&self) -> Option<String> {
		match self {
			ResponseBody::Json(value) => Some(value.to_string()),
			ResponseBody::Text(text) => Some(text.clone()),
			ResponseBody::Wire(_) | ResponseBody::Unknown => None,
		}
	}

	pub fn is_unknown(&self) -> bool {
		matches!(self, ResponseBody::Unknown)
	}
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
	serializer.serialize_str(&STANDARD.encode(bytes))
}

/// One single-encoding round trip against one provider
#[derive(Debug, Clone, Serialize)]
pub struct QueryAttempt {
	pub encoding: Encoding,
	pub http_status: Option<u16>,
	pub succeeded: bool,
	/// IP addresses, or the ECH config string for HTTPS lookups
	pub values: Vec<String>,
	/// Descriptive HTTPS record, present even when it carries no ECH parameter
	pub record: Option<String>,
	pub latency_ms: Option<u64>,
	pub shape: ResponseShape,
	pub content_type: Option<String>,
	pub payload: ResponseBody,
	pub error: Option<String>,
}

impl QueryAttempt {
	/// An attempt whose request could not be built; nothing was sent.
	pub fn not_sent(encoding: Encoding, error: String) -> Self {
		QueryAttempt {
			encoding,
			http_status: None,
			succeeded: false,
			values: Vec::new(),
			record: None,
			latency_ms: None,
			shape: ResponseShape::Unknown,
			content_type: None,
			payload: ResponseBody::Unknown,
			error: Some(error),
		}
	}

	/// An attempt that was sent but got no HTTP response back.
	pub fn transport_failure(encoding: Encoding, latency_ms: u64, error: String) -> Self {
		QueryAttempt {
			latency_ms: Some(latency_ms),
			..QueryAttempt::not_sent(encoding, error)
		}
	}
}

/// Reportable outcome for one endpoint across all of its attempts
#[derive(Debug, Clone, Serialize)]
pub struct ProviderResult {
	pub key: ProviderKey,
	pub label: String,
	pub url: String,
	/// Encoding of the winning attempt, if any attempt succeeded
	pub encoding: Option<Encoding>,
	pub http_status: Option<u16>,
	pub succeeded: bool,
	pub values: Vec<String>,
	pub record: Option<String>,
	pub latency_ms: Option<u64>,
	pub shape: ResponseShape,
	pub content_type: Option<String>,
	pub payload: ResponseBody,
	pub error: Option<String>,
	pub attempted_encodings: Vec<Encoding>,
	pub attempts: Vec<QueryAttempt>,
}

impl ProviderResult {
	/// Report the winning attempt, keeping every attempt for audit.
	pub fn from_attempt(
		endpoint: &ProviderEndpoint,
		winner: QueryAttempt,
		attempts: Vec<QueryAttempt>,
	) -> Self {
		let attempted_encodings = attempts.iter().map(|a| a.encoding).collect();
		ProviderResult {
			key: endpoint.key,
			label: endpoint.label.clone(),
			url: endpoint.url.clone(),
			encoding: Some(winner.encoding),
			http_status: winner.http_status,
			succeeded: winner.succeeded,
			values: winner.values,
			record: winner.record,
			latency_ms: winner.latency_ms,
			shape: winner.shape,
			content_type: winner.content_type,
			payload: winner.payload,
			error: winner.error,
			attempted_encodings,
			attempts,
		}
	}

	pub fn display_name(&self) -> String {
		format!("{} ({})", self.label, self.key)
	}
}

/// Probe configuration shared by all providers of one check
#[derive(Debug, Clone)]
pub struct ProbeConfig {
	pub timeout: Duration,
	/// A or AAAA for address checks
	pub address_kind: LookupKind,
	/// When set, address checks also compare ECH configs for this domain
	pub ech_domain: Option<String>,
}
