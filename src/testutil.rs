//! Test helpers: a scripted HTTP client and DNS fixtures

use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, Query};
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use reqwest::Url;
use serde_json::{json, Value};

use crate::dns::{CLASS_IN, TYPE_A, TYPE_AAAA, TYPE_HTTPS};
use crate::error::TransportError;
use crate::http::{HttpClient, HttpResponse};
use crate::merge::combine_failures;
use crate::name::encode_name;
use crate::transport::{
	Encoding, LookupKind, ProviderEndpoint, ProviderKey, ProviderResult, QueryAttempt,
};

/// Canned reply for one (host, encoding) route
#[derive(Debug, Clone)]
pub enum Reply {
	Respond(HttpResponse),
	Fail(String),
	/// Never answers within any test timeout
	Hang,
}

#[derive(Debug)]
struct Route {
	host: String,
	encoding: Encoding,
	reply: Reply,
}

/// HTTP client stub keyed on host and request encoding, counting every call.
/// Unrouted requests fail with a connection error.
#[derive(Debug, Default)]
pub struct StubClient {
	routes: Vec<Route>,
	calls: AtomicUsize,
	requests: Mutex<Vec<String>>,
}

impl StubClient {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn route(mut self, host: &str, encoding: Encoding, reply: Reply) -> Self {
		self.routes.push(Route {
			host: host.to_string(),
			encoding,
			reply,
		});
		self
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn requests(&self) -> Vec<String> {
		self.requests.lock().unwrap().clone()
	}
}

#[async_trait]
impl HttpClient for StubClient {
	async fn get(
		&self,
		url: &str,
		headers: &[(&str, &str)],
		_timeout: Duration,
	) -> Result<HttpResponse, TransportError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.requests.lock().unwrap().push(url.to_string());

		let encoding = if headers.iter().any(|(_, v)| *v == Encoding::Wire.accept()) {
			Encoding::Wire
		} else {
			Encoding::Json
		};
		let host = Url::parse(url)
			.ok()
			.and_then(|u| u.host_str().map(str::to_owned))
			.unwrap_or_default();
		let reply = self.routes.iter()
			.find(|r| r.host == host && r.encoding == encoding)
			.map(|r| r.reply.clone());

		match reply {
			Some(Reply::Respond(response)) => Ok(response),
			Some(Reply::Fail(message)) => Err(TransportError::Network(message)),
			Some(Reply::Hang) => {
				tokio::time::sleep(Duration::from_secs(60)).await;
				Err(TransportError::Network("stub hang elapsed".to_string()))
			}
			None => Err(TransportError::Network(format!("connection refused: {}", host))),
		}
	}
}

pub fn endpoint(key: ProviderKey, host: &str) -> ProviderEndpoint {
	ProviderEndpoint {
		key,
		label: host.to_string(),
		url: format!("https://{}/dns-query", host),
	}
}

pub fn reply(status: u16, content_type: &str, body: Vec<u8>) -> Reply {
	Reply::Respond(HttpResponse {
		status,
		content_type: Some(content_type.to_string()),
		body,
	})
}

pub fn json_reply(body: Value) -> Reply {
	reply(200, "application/dns-json", body.to_string().into_bytes())
}

pub fn wire_reply(bytes: Vec<u8>) -> Reply {
	reply(200, "application/dns-message", bytes)
}

/// JSON DoH body with one A/AAAA answer per address
pub fn json_addresses(ips: &[&str]) -> Value {
	let answers: Vec<Value> = ips.iter()
		.map(|ip| {
			let rtype = if ip.contains(':') { TYPE_AAAA } else { TYPE_A };
			json!({"name": "example.com.", "type": rtype, "TTL": 300, "data": ip})
		})
		.collect();
	json!({"Status": 0, "Answer": answers})
}

/// JSON DoH body with a single HTTPS answer
pub fn json_https(data: &str) -> Value {
	json!({
		"Status": 0,
		"Answer": [{"name": "example.com.", "type": TYPE_HTTPS, "TTL": 300, "data": data}]
	})
}

/// Wire response built by hickory, so owner names are compressed
pub fn address_response(domain: &str, ips: &[&str]) -> Vec<u8> {
	let name = Name::from_ascii(format!("{}.", domain)).unwrap();
	let qtype = match ips.first() {
		Some(ip) if ip.contains(':') => RecordType::AAAA,
		_ => RecordType::A,
	};

	let mut message = Message::new();
	message.set_id(0x2b2b);
	message.set_message_type(MessageType::Response);
	message.set_recursion_desired(true);
	message.set_recursion_available(true);
	message.add_query(Query::query(name.clone(), qtype));
	for ip in ips {
		let rdata = match ip.parse::<IpAddr>().unwrap() {
			IpAddr::V4(v4) => RData::A(A(v4)),
			IpAddr::V6(v6) => RData::AAAA(AAAA(v6)),
		};
		message.add_answer(Record::from_rdata(name.clone(), 300, rdata));
	}
	message.to_vec().unwrap()
}

/// Hand-assembled response; every answer owner name points at the question.
pub fn raw_response(domain: &str, qtype: u16, answers: &[(u16, Vec<u8>)]) -> Vec<u8> {
	let mut buf = vec![0x12, 0x34, 0x81, 0x80, 0, 1];
	buf.extend_from_slice(&(answers.len() as u16).to_be_bytes());
	buf.extend_from_slice(&[0, 0, 0, 0]);
	buf.extend_from_slice(&encode_name(domain).unwrap());
	buf.extend_from_slice(&qtype.to_be_bytes());
	buf.extend_from_slice(&CLASS_IN.to_be_bytes());
	for (rtype, rdata) in answers {
		buf.extend_from_slice(&[0xC0, 0x0C]);
		buf.extend_from_slice(&rtype.to_be_bytes());
		buf.extend_from_slice(&CLASS_IN.to_be_bytes());
		buf.extend_from_slice(&300u32.to_be_bytes());
		buf.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
		buf.extend_from_slice(rdata);
	}
	buf
}

/// HTTPS response with one record per (priority, target, params) entry
pub fn https_response(domain: &str, records: Vec<(u16, &str, Vec<(u16, Vec<u8>)>)>) -> Vec<u8> {
	let answers: Vec<(u16, Vec<u8>)> = records.into_iter()
		.map(|(priority, target, params)| {
			let mut rdata = priority.to_be_bytes().to_vec();
			rdata.extend_from_slice(&encode_name(target).unwrap());
			for (key, value) in params {
				rdata.extend_from_slice(&key.to_be_bytes());
				rdata.extend_from_slice(&(value.len() as u16).to_be_bytes());
				rdata.extend_from_slice(&value);
			}
			(TYPE_HTTPS, rdata)
		})
		.collect();
	raw_response(domain, TYPE_HTTPS, &answers)
}

/// Provider result that succeeded over JSON with the given values
pub fn provider_result(key: ProviderKey, host: &str, values: &[&str]) -> ProviderResult {
	let ep = endpoint(key, host);
	let mut attempt = QueryAttempt::not_sent(Encoding::Json, String::new());
	attempt.error = None;
	attempt.succeeded = true;
	attempt.http_status = Some(200);
	attempt.latency_ms = Some(10);
	attempt.values = values.iter().map(|v| v.to_string()).collect();
	ProviderResult::from_attempt(&ep, attempt.clone(), vec![attempt])
}

/// Provider result where every attempt failed with `error`
pub fn failed_result(key: ProviderKey, host: &str, error: &str) -> ProviderResult {
	let ep = endpoint(key, host);
	let attempt = QueryAttempt::transport_failure(Encoding::Json, 10, error.to_string());
	combine_failures(&ep, vec![attempt], LookupKind::A)
}
