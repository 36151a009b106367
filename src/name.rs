//! DNS name encoding and compression-aware decoding (RFC 1035 §3.1, §4.1.4)

use crate::error::CodecError;

pub const MAX_LABEL_LEN: usize = 63;

const POINTER_MASK: u8 = 0xC0;

/// Normalize a domain for queries: trim whitespace, drop empty labels.
/// Case is preserved.
pub fn normalize(domain: &str) -> String {
	domain.trim()
		.split('.')
		.filter(|label| !label.is_empty())
		.collect::<Vec<_>>()
		.join(".")
}

/// Encode a domain name as a sequence of length-prefixed labels ending in the root label.
///
/// Empty labels are dropped, so "example.com." and "example..com" both encode
/// the same way. Labels longer than 63 bytes are rejected.
pub fn encode_name(domain: &str) -> Result<Vec<u8>, CodecError> {
	let mut out = Vec::with_capacity(domain.len() + 2);
	for label in domain.split('.').filter(|l| !l.is_empty()) {
		if label.len() > MAX_LABEL_LEN {
			return Err(CodecError::LabelTooLong(label.to_string()));
		}
		out.push(label.len() as u8);
		out.extend_from_slice(label.as_bytes());
	}
	out.push(0);
	Ok(out)
}

/// Decode a possibly compressed name starting at `offset`.
///
/// Returns the dotted name (empty for the root) and the number of bytes the
/// name occupies at `offset`. Once a compression pointer is followed, bytes
/// read at the pointer target no longer count: the encoded length ends with
/// the two pointer bytes.
///
/// The walk is capped at `buf.len()` steps so pointer cycles fail instead of
/// looping.
pub fn decode_name(buf: &[u8], offset: usize) -> Result<(String, usize), CodecError> {
	let mut labels: Vec<String> = Vec::new();
	let mut pos = offset;
	let mut consumed: Option<usize> = None;
	let mut steps = 0usize;

	loop {
		steps += 1;
		if steps > buf.len() {
			return Err(CodecError::malformed(pos, "compression loop"));
		}

		let len = *buf.get(pos)
			.ok_or(CodecError::malformed(pos, "name runs past end of buffer"))?;

		match len & POINTER_MASK {
			POINTER_MASK => {
				let low = *buf.get(pos + 1)
					.ok_or(CodecError::malformed(pos, "truncated compression pointer"))?;
				let target = (((len & !POINTER_MASK) as usize) << 8) | low as usize;
				if target >= buf.len() {
					return Err(CodecError::malformed(pos, "compression pointer out of bounds"));
				}
				if consumed.is_none() {
					consumed = Some(pos + 2 - offset);
				}
				pos = target;
			}
			0x00 => {
				if len == 0 {
					let consumed = consumed.unwrap_or_else(|| pos + 1 - offset);
					return Ok((labels.join("."), consumed));
				}
				let start = pos + 1;
				let end = start + len as usize;
				if end > buf.len() {
					return Err(CodecError::malformed(pos, "label runs past end of buffer"));
				}
				labels.push(String::from_utf8_lossy(&buf[start..end]).into_owned());
				pos = end;
			}
			// 0x40 and 0x80 prefixes: length field above 63
			_ => return Err(CodecError::malformed(pos, "label length exceeds 63")),
		}
	}
}
