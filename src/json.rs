use std::net::IpAddr;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::dns::TYPE_HTTPS;

fn answers(body: &Value) -> &[Value] {
	body.get("Answer")
		.and_then(Value::as_array)
		.map(Vec::as_slice)
		.unwrap_or(&[])
}

/// Record type of a JSON answer; resolvers disagree on number vs string.
fn answer_type(answer: &Value) -> Option<u64> {
	match answer.get("type")? {
		Value::Number(n) => n.as_u64(),
		Value::String(s) => s.trim().parse().ok(),
		_ => None,
	}
}

/// Collect the distinct IP literals found in the `data` fields of `Answer`.
///
/// CNAMEs and other non-address data are skipped. IPv6 addresses are
/// re-rendered canonically so they compare equal to wire-decoded ones.
pub fn extract_addresses(body: &Value) -> Vec<String> {
	let mut addresses: Vec<String> = Vec::new();
	for answer in answers(body) {
		let Some(data) = answer.get("data").and_then(Value::as_str) else {
			continue;
		};
		if let Ok(ip) = data.trim().parse::<IpAddr>() {
			let ip = ip.to_string();
			if !addresses.contains(&ip) {
				addresses.push(ip);
			}
		}
	}
	addresses
}

/// Return the first HTTPS answer whose data carries an `ech=` parameter.
pub fn extract_https_record(body: &Value) -> Option<String> {
	answers(body).iter()
		.filter(|answer| answer_type(answer) == Some(TYPE_HTTPS as u64))
		.filter_map(|answer| answer.get("data").and_then(Value::as_str))
		.find(|data| data.contains("ech="))
		.map(str::to_owned)
}

/// Find an ECH config token in free text.
///
/// Matches `ech=`, `echconfig=` and `echconfigbase64=` (any case) followed by
/// a quoted value (quotes may be JSON-escaped) or a bare base64 token.
pub fn find_ech_config(text: &str) -> Option<String> {
	static PATTERN: OnceLock<Regex> = OnceLock::new();
	let pattern = PATTERN.get_or_init(|| {
		Regex::new(r#"(?i)\bech(?:config(?:base64)?)?=(?:\\?"([^"\\]+)\\?"|([A-Za-z0-9+/_=-]+))"#)
			.expect("ECH pattern is valid")
	});
	let captures = pattern.captures(text)?;
	captures.get(1)
		.or_else(|| captures.get(2))
		.map(|m| m.as_str().to_string())
}
