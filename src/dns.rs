use std::net::{Ipv4Addr, Ipv6Addr};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::rdata::svcb::SvcParamKey;

use crate::error::CodecError;
use crate::name::{decode_name, encode_name, normalize};

pub const TYPE_A: u16 = 1;
pub const TYPE_AAAA: u16 = 28;
pub const TYPE_HTTPS: u16 = 65;
pub const CLASS_IN: u16 = 1;
/// SvcParam key carrying the ECH config list
pub const SVC_PARAM_ECH: u16 = 5;

const HEADER_LEN: usize = 12;
const FLAG_RECURSION_DESIRED: u16 = 0x0100;

/// Map a record-type token to its numeric QTYPE.
///
/// Accepts A, AAAA and HTTPS by name (any case) and any positive integer.
pub fn record_type_code(token: &str) -> Result<u16, CodecError> {
	match token.trim().to_ascii_uppercase().as_str() {
		"A" => Ok(TYPE_A),
		"AAAA" => Ok(TYPE_AAAA),
		"HTTPS" => Ok(TYPE_HTTPS),
		other => match other.parse::<u16>() {
			Ok(code) if code > 0 => Ok(code),
			_ => Err(CodecError::UnsupportedRecordType(token.to_string())),
		},
	}
}

/// Build a DNS query message with a single question.
///
/// Only the RD flag is set; the message carries no EDNS record.
pub fn build_query(domain: &str, record_type: &str, txid: u16) -> Result<Vec<u8>, CodecError> {
	let domain = normalize(domain);
	if domain.is_empty() {
		return Err(CodecError::EmptyDomain);
	}
	let qtype = record_type_code(record_type)?;
	let qname = encode_name(&domain)?;

	let mut query = Vec::with_capacity(HEADER_LEN + qname.len() + 4);
	query.extend_from_slice(&txid.to_be_bytes());
	query.extend_from_slice(&FLAG_RECURSION_DESIRED.to_be_bytes());
	// QDCOUNT=1, ANCOUNT=NSCOUNT=ARCOUNT=0
	query.extend_from_slice(&[0, 1, 0, 0, 0, 0, 0, 0]);
	query.extend_from_slice(&qname);
	query.extend_from_slice(&qtype.to_be_bytes());
	query.extend_from_slice(&CLASS_IN.to_be_bytes());
	Ok(query)
}

/// Bounds-checked reader over a DNS message
struct Cursor<'a> {
	buf: &'a [u8],
	pos: usize,
}

impl<'a> Cursor<'a> {
	fn new(buf: &'a [u8], pos: usize) -> Self {
		Cursor { buf, pos }
	}

	fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
		let end = self.pos.checked_add(n)
			.filter(|&end| end <= self.buf.len())
			.ok_or(CodecError::Truncated { offset: self.pos, needed: n })?;
		let slice = &self.buf[self.pos..end];
		self.pos = end;
		Ok(slice)
	}

	fn read_u16(&mut self) -> Result<u16, CodecError> {
		let b = self.take(2)?;
		Ok(u16::from_be_bytes([b[0], b[1]]))
	}

	fn read_name(&mut self) -> Result<String, CodecError> {
		let (name, consumed) = decode_name(self.buf, self.pos)?;
		self.pos += consumed;
		Ok(name)
	}
}

/// DNS message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
	pub id: u16,
	pub flags: u16,
	pub qdcount: u16,
	pub ancount: u16,
	pub nscount: u16,
	pub arcount: u16,
}

impl Header {
	fn read(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
		Ok(Header {
			id: cursor.read_u16()?,
			flags: cursor.read_u16()?,
			qdcount: cursor.read_u16()?,
			ancount: cursor.read_u16()?,
			nscount: cursor.read_u16()?,
			arcount: cursor.read_u16()?,
		})
	}

	pub fn response_code(&self) -> ResponseCode {
		ResponseCode::from_low((self.flags & 0x000F) as u8)
	}
}

/// One SvcParam key/value pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvcParam {
	pub key: u16,
	pub value: Vec<u8>,
}

/// Decoded SVCB/HTTPS rdata (RFC 9460)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvcbRecord {
	pub priority: u16,
	pub target: String,
	pub params: Vec<SvcParam>,
}

impl SvcbRecord {
	/// Decode rdata occupying `len` bytes at `start`; the target name may point
	/// back into the rest of the message.
	fn decode(buf: &[u8], start: usize, len: usize) -> Result<Self, CodecError> {
		let end = start + len;
		let mut cursor = Cursor::new(&buf[..end], start);
		let priority = cursor.read_u16()?;
		let target = cursor.read_name()?;
		let mut params = Vec::new();
		while cursor.pos < end {
			let key = cursor.read_u16()?;
			let value_len = cursor.read_u16()? as usize;
			let value = cursor.take(value_len)?;
			params.push(SvcParam { key, value: value.to_vec() });
		}
		Ok(SvcbRecord { priority, target, params })
	}

	/// Raw value of the ECH parameter, if present
	pub fn ech_config(&self) -> Option<&[u8]> {
		self.params.iter()
			.find(|p| p.key == SVC_PARAM_ECH)
			.map(|p| p.value.as_slice())
	}

	pub fn has_ech(&self) -> bool {
		self.ech_config().is_some()
	}

	pub fn ech_base64(&self) -> Option<String> {
		self.ech_config().map(|bytes| STANDARD.encode(bytes))
	}

	/// Descriptive one-line rendering: priority, target, param keys and the ECH value
	pub fn describe(&self) -> String {
		let target = if self.target.is_empty() { "." } else { self.target.as_str() };
		let keys: Vec<String> = self.params.iter()
			.map(|p| SvcParamKey::from(p.key).to_string())
			.collect();
		let mut out = format!("{} {} keys={}", self.priority, target, keys.join(","));
		if let Some(ech) = self.ech_base64() {
			out.push_str(" ech=");
			out.push_str(&ech);
		}
		out
	}
}

/// Answers extracted from a DNS response message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireAnswers {
	pub header: Header,
	/// Distinct A/AAAA addresses in text form
	pub addresses: Vec<String>,
	/// First HTTPS record carrying ECH, else the first HTTPS record seen
	pub https: Option<SvcbRecord>,
	/// First error met in the answer section: either parsing stopped there or
	/// a single unreadable record was skipped
	pub truncated: Option<CodecError>,
}

/// Parse a DNS response message.
///
/// The header and question section must parse; a malformed answer stops
/// parsing and the answers collected so far are returned with `truncated` set.
pub fn parse_response(buf: &[u8]) -> Result<WireAnswers, CodecError> {
	let mut cursor = Cursor::new(buf, 0);
	let header = Header::read(&mut cursor)?;

	for _ in 0..header.qdcount {
		cursor.read_name()?;
		// QTYPE + QCLASS
		cursor.take(4)?;
	}

	let mut addresses = Vec::new();
	let mut https_records = Vec::new();
	let mut truncated = None;
	for _ in 0..header.ancount {
		match read_answer(&mut cursor, &mut addresses, &mut https_records) {
			Ok(None) => {}
			// Bad rdata inside its declared length: skip that record only
			Ok(Some(e)) => {
				truncated.get_or_insert(e);
			}
			Err(e) => {
				truncated.get_or_insert(e);
				break;
			}
		}
	}

	let ech_index = https_records.iter().position(SvcbRecord::has_ech).unwrap_or(0);
	let https = if https_records.is_empty() {
		None
	} else {
		Some(https_records.swap_remove(ech_index))
	};

	Ok(WireAnswers { header, addresses, https, truncated })
}

/// Read one answer record. An outer error means the record framing is broken
/// and no later record can be located; `Ok(Some(_))` means only this record's
/// rdata was unreadable.
fn read_answer(
	cursor: &mut Cursor<'_>,
	addresses: &mut Vec<String>,
	https_records: &mut Vec<SvcbRecord>,
) -> Result<Option<CodecError>, CodecError> {
	cursor.read_name()?;
	let rtype = cursor.read_u16()?;
	// CLASS + TTL
	cursor.take(6)?;
	let rdlength = cursor.read_u16()? as usize;
	let rdata_start = cursor.pos;
	let rdata = cursor.take(rdlength)?;

	match (rtype, rdata.len()) {
		(TYPE_A, 4) => {
			let addr = Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3]);
			push_unique(addresses, addr.to_string());
		}
		(TYPE_AAAA, 16) => {
			let mut octets = [0u8; 16];
			octets.copy_from_slice(rdata);
			push_unique(addresses, Ipv6Addr::from(octets).to_string());
		}
		(TYPE_HTTPS, _) => match SvcbRecord::decode(cursor.buf, rdata_start, rdlength) {
			Ok(record) => https_records.push(record),
			Err(e) => return Ok(Some(e)),
		},
		_ => {}
	}
	Ok(None)
}

fn push_unique(values: &mut Vec<String>, value: String) {
	if !values.contains(&value) {
		values.push(value);
	}
}
