use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hickory_proto::op::ResponseCode;
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, warn};

use crate::dns::{build_query, parse_response};
use crate::error::{CodecError, RequestError, TransportError};
use crate::http::{HttpClient, HttpResponse};
use crate::json::{extract_addresses, extract_https_record, find_ech_config};
use crate::merge::combine_failures;
use crate::name::{encode_name, normalize};
use crate::transport::{
	Encoding, LookupKind, ProviderEndpoint, ProviderResult, QueryAttempt, ResponseBody,
	ResponseShape,
};

/// Encodings are always tried in this order
const ENCODING_ORDER: [Encoding; 2] = [Encoding::Json, Encoding::Wire];

const TEXT_SNIPPET_CHARS: usize = 200;

/// Build the GET URL for one encoding of a lookup.
///
/// JSON mode adds `name` and `type` parameters; wire mode adds a base64url
/// `dns` parameter holding a query with a random transaction ID.
pub fn prepare_request(
	endpoint: &ProviderEndpoint,
	encoding: Encoding,
	domain: &str,
	kind: LookupKind,
) -> Result<Url, RequestError> {
	let name = normalize(domain);
	let mut url = Url::parse(&endpoint.url).map_err(|e| RequestError::InvalidUrl {
		url: endpoint.url.clone(),
		reason: e.to_string(),
	})?;

	match encoding {
		Encoding::Json => {
			if name.is_empty() {
				return Err(CodecError::EmptyDomain.into());
			}
			// Same label rules as the wire encoder
			encode_name(&name)?;
			url.query_pairs_mut()
				.append_pair("name", &name)
				.append_pair("type", kind.token());
		}
		Encoding::Wire => {
			let query = build_query(&name, kind.token(), rand::random())?;
			url.query_pairs_mut()
				.append_pair("dns", &URL_SAFE_NO_PAD.encode(query));
		}
	}
	Ok(url)
}

/// Choose the decode path from the Content-Type header.
pub fn classify(content_type: Option<&str>) -> ResponseShape {
	let mime = content_type
		.and_then(|ct| ct.split(';').next())
		.map(|m| m.trim().to_ascii_lowercase())
		.unwrap_or_default();
	match mime.as_str() {
		"application/dns-json" | "application/json" | "text/json" => ResponseShape::Json,
		m if m.starts_with("text/") => ResponseShape::Text,
		_ => ResponseShape::Wire,
	}
}

/// Send one prepared request and decode the response.
///
/// Never fails: timeouts, network errors and decode errors all end up in
/// the attempt's `error`.
pub async fn send_attempt(
	client: &dyn HttpClient,
	encoding: Encoding,
	url: Url,
	kind: LookupKind,
	timeout: Duration,
) -> QueryAttempt {
	let headers = [("accept", encoding.accept())];

	let start = Instant::now();
	let outcome = tokio::time::timeout(timeout, client.get(url.as_str(), &headers, timeout)).await;
	let latency_ms = start.elapsed().as_millis() as u64;

	let response = match outcome {
		Ok(Ok(response)) => response,
		Ok(Err(e)) => {
			debug!(%encoding, %url, latency_ms, error = %e, "DoH request failed");
			return QueryAttempt::transport_failure(encoding, latency_ms, format!("transport: {}", e));
		}
		Err(_) => {
			debug!(%encoding, %url, latency_ms, "DoH request timed out");
			let e = TransportError::Timeout(timeout);
			return QueryAttempt::transport_failure(encoding, latency_ms, format!("transport: {}", e));
		}
	};

	debug!(
		%encoding, %url, status = response.status, latency_ms,
		content_type = response.content_type.as_deref().unwrap_or("-"),
		"DoH response"
	);
	decode_attempt(encoding, kind, response, latency_ms)
}

/// What one decode path pulled out of a body
#[derive(Debug, Default)]
struct Extracted {
	values: Vec<String>,
	record: Option<String>,
	/// Extra context for a miss, such as a truncated answer section or an rcode
	note: Option<String>,
}

fn decode_attempt(
	encoding: Encoding,
	kind: LookupKind,
	response: HttpResponse,
	latency_ms: u64,
) -> QueryAttempt {
	let shape = classify(response.content_type.as_deref());
	let ok = response.is_success();
	let status = response.status;

	let (payload, extracted) = match shape {
		ResponseShape::Json => match serde_json::from_slice::<Value>(&response.body) {
			Ok(value) => {
				let extracted = extract_from_json(&value, kind);
				(ResponseBody::Json(value), Ok(extracted))
			}
			Err(e) => (
				ResponseBody::Text(String::from_utf8_lossy(&response.body).into_owned()),
				Err(format!("json decode: {}", e)),
			),
		},
		ResponseShape::Text => {
			let text = String::from_utf8_lossy(&response.body).into_owned();
			let error = format!("text response: {}", snippet(&text));
			(ResponseBody::Text(text), Err(error))
		}
		ResponseShape::Wire | ResponseShape::Unknown => {
			let extracted = extract_from_wire(&response.body, kind);
			(ResponseBody::Wire(response.body), extracted)
		}
	};

	let mut attempt = QueryAttempt {
		encoding,
		http_status: Some(status),
		succeeded: false,
		values: Vec::new(),
		record: None,
		latency_ms: Some(latency_ms),
		shape,
		content_type: response.content_type,
		payload,
		error: None,
	};

	match extracted {
		Ok(extracted) => {
			attempt.succeeded = ok && !extracted.values.is_empty();
			if !attempt.succeeded {
				attempt.error = Some(miss_reason(status, ok, kind, extracted.note.as_deref()));
			}
			attempt.values = extracted.values;
			attempt.record = extracted.record;
		}
		Err(e) if ok => attempt.error = Some(e),
		Err(e) => attempt.error = Some(format!("HTTP {}: {}", status, e)),
	}
	attempt
}

fn extract_from_json(body: &Value, kind: LookupKind) -> Extracted {
	if kind.is_address() {
		return Extracted {
			values: extract_addresses(body),
			..Extracted::default()
		};
	}
	let record = extract_https_record(body);
	let values = record.iter()
		.map(|r| find_ech_config(r).unwrap_or_else(|| r.clone()))
		.collect();
	Extracted { values, record, note: None }
}

fn extract_from_wire(body: &[u8], kind: LookupKind) -> Result<Extracted, String> {
	let answers = parse_response(body).map_err(|e| format!("wire decode: {}", e))?;

	let mut notes = Vec::new();
	if let Some(e) = &answers.truncated {
		warn!(error = %e, "unreadable record in DNS answer section");
		notes.push(format!("wire decode: unreadable answer: {}", e));
	}
	let rcode = answers.header.response_code();
	if rcode != ResponseCode::NoError {
		notes.push(format!("rcode {}", rcode));
	}
	let note = if notes.is_empty() { None } else { Some(notes.join(", ")) };

	if kind.is_address() {
		return Ok(Extracted { values: answers.addresses, record: None, note });
	}
	let values = answers.https.as_ref()
		.and_then(|r| r.ech_base64())
		.into_iter()
		.collect();
	let record = answers.https.as_ref().map(|r| r.describe());
	Ok(Extracted { values, record, note })
}

fn miss_reason(status: u16, ok: bool, kind: LookupKind, note: Option<&str>) -> String {
	let base = if !ok {
		format!("HTTP {}", status)
	} else if kind.is_address() {
		format!("no {} records in answer", kind.token())
	} else {
		"no ECH parameter in HTTPS answer".to_string()
	};
	match note {
		Some(note) => format!("{} ({})", base, note),
		None => base,
	}
}

fn snippet(text: &str) -> String {
	let trimmed = text.trim();
	if trimmed.chars().count() <= TEXT_SNIPPET_CHARS {
		return trimmed.to_string();
	}
	let mut out: String = trimmed.chars().take(TEXT_SNIPPET_CHARS).collect();
	out.push_str("...");
	out
}

fn prepare_or_reject(
	endpoint: &ProviderEndpoint,
	encoding: Encoding,
	domain: &str,
	kind: LookupKind,
) -> Result<Url, QueryAttempt> {
	prepare_request(endpoint, encoding, domain, kind)
		.map_err(|e| QueryAttempt::not_sent(encoding, format!("request: {}", e)))
}

/// Query an endpoint for A or AAAA records.
///
/// Both encodings are always tried, even after a JSON success, so the report
/// shows how the endpoint behaves in each. The first successful attempt wins.
pub async fn query_addresses(
	client: &dyn HttpClient,
	endpoint: &ProviderEndpoint,
	domain: &str,
	kind: LookupKind,
	timeout: Duration,
) -> ProviderResult {
	let mut attempts = Vec::with_capacity(ENCODING_ORDER.len());
	for encoding in ENCODING_ORDER {
		let attempt = match prepare_or_reject(endpoint, encoding, domain, kind) {
			Ok(url) => send_attempt(client, encoding, url, kind, timeout).await,
			Err(rejected) => rejected,
		};
		attempts.push(attempt);
	}

	match attempts.iter().find(|a| a.succeeded).cloned() {
		Some(winner) => ProviderResult::from_attempt(endpoint, winner, attempts),
		None => combine_failures(endpoint, attempts, kind),
	}
}

/// Query an endpoint for an HTTPS record carrying an ECH parameter.
///
/// Stops at the first encoding that finds ECH. Both requests are built up
/// front; if either is invalid nothing is sent.
pub async fn query_ech(
	client: &dyn HttpClient,
	endpoint: &ProviderEndpoint,
	domain: &str,
	timeout: Duration,
) -> ProviderResult {
	let kind = LookupKind::Https;

	let mut prepared = Vec::with_capacity(ENCODING_ORDER.len());
	for encoding in ENCODING_ORDER {
		match prepare_or_reject(endpoint, encoding, domain, kind) {
			Ok(url) => prepared.push((encoding, url)),
			Err(rejected) => return combine_failures(endpoint, vec![rejected], kind),
		}
	}

	let mut attempts = Vec::with_capacity(prepared.len());
	for (encoding, url) in prepared {
		let attempt = send_attempt(client, encoding, url, kind, timeout).await;
		if attempt.succeeded {
			debug!(provider = %endpoint.display_name(), %encoding, "ECH found");
			attempts.push(attempt.clone());
			return ProviderResult::from_attempt(endpoint, attempt, attempts);
		}
		attempts.push(attempt);
	}
	combine_failures(endpoint, attempts, kind)
}

/// Dispatch on lookup kind.
pub async fn query_provider(
	client: &dyn HttpClient,
	endpoint: &ProviderEndpoint,
	domain: &str,
	kind: LookupKind,
	timeout: Duration,
) -> ProviderResult {
	if kind.is_address() {
		query_addresses(client, endpoint, domain, kind, timeout).await
	} else {
		query_ech(client, endpoint, domain, timeout).await
	}
}
