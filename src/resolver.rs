use anyhow::{anyhow, Result};
use reqwest::Url;

use crate::transport::{ProviderEndpoint, ProviderKey};

/// Well-known DoH resolvers usable by name as references.
const PRESETS: [(&str, &str, &str); 3] = [
	("cloudflare", "Cloudflare", "https://cloudflare-dns.com/dns-query"),
	("google", "Google", "https://dns.google/dns-query"),
	("quad9", "Quad9", "https://dns.quad9.net/dns-query"),
];

/// Turn user input into a DoH URL.
///
/// Supports formats:
///   "https://doh.example/dns-query" -- used as given (http:// too)
///   "doh.example/custom"            -- https:// prefixed
///   "doh.example"                   -- https://doh.example/dns-query
fn normalize_url(input: &str) -> Result<Url> {
	let trimmed = input.trim();
	if trimmed.is_empty() {
		return Err(anyhow!("empty DoH endpoint"));
	}

	let lower = trimmed.to_ascii_lowercase();
	let candidate = if lower.starts_with("https://") || lower.starts_with("http://") {
		trimmed.to_string()
	} else if trimmed.contains('/') {
		format!("https://{}", trimmed)
	} else {
		format!("https://{}/dns-query", trimmed.trim_end_matches('.'))
	};

	let url = Url::parse(&candidate)
		.map_err(|e| anyhow!("invalid DoH endpoint '{}': {}", trimmed, e))?;
	if url.host_str().map_or(true, str::is_empty) {
		return Err(anyhow!("DoH endpoint '{}' has no host", trimmed));
	}
	Ok(url)
}

fn host_label(url: &Url) -> String {
	url.host_str().unwrap_or_default().to_string()
}

/// Parse the endpoint under test from a URL or bare domain.
pub fn parse_target(input: &str) -> Result<ProviderEndpoint> {
	let url = normalize_url(input)?;
	Ok(ProviderEndpoint {
		key: ProviderKey::Target,
		label: host_label(&url),
		url: url.to_string(),
	})
}

fn preset(name: &str, index: usize) -> Option<ProviderEndpoint> {
	PRESETS.iter()
		.find(|(key, _, _)| key.eq_ignore_ascii_case(name))
		.map(|(_, label, url)| ProviderEndpoint {
			key: ProviderKey::Reference(index),
			label: label.to_string(),
			url: url.to_string(),
		})
}

/// Parse a reference resolver; `index` is 1-based.
///
/// Supports formats:
///   "cloudflare"                     -- preset name (cloudflare, google, quad9)
///   "Mine=https://doh.example/q"     -- explicit label
///   "https://doh.example/dns-query"  -- labelled by host
pub fn parse_reference(input: &str, index: usize) -> Result<ProviderEndpoint> {
	let trimmed = input.trim();
	if let Some(endpoint) = preset(trimmed, index) {
		return Ok(endpoint);
	}

	// A '=' before any ':' or '/' separates a label from the URL
	let (label, rest) = match trimmed.split_once('=') {
		Some((label, rest)) if !label.contains([':', '/']) => (Some(label.trim()), rest),
		_ => (None, trimmed),
	};
	if label == Some("") {
		return Err(anyhow!("empty label in reference '{}'", trimmed));
	}

	let url = normalize_url(rest)?;
	Ok(ProviderEndpoint {
		key: ProviderKey::Reference(index),
		label: label.map_or_else(|| host_label(&url), str::to_string),
		url: url.to_string(),
	})
}

/// Parse all `--reference` values, falling back to the defaults when none are given.
pub fn parse_references(inputs: &[String]) -> Result<Vec<ProviderEndpoint>> {
	if inputs.is_empty() {
		return Ok(default_references());
	}
	inputs.iter()
		.enumerate()
		.map(|(i, input)| parse_reference(input, i + 1))
		.collect()
}

/// Cloudflare and Google, the two references used when none are given.
pub fn default_references() -> Vec<ProviderEndpoint> {
	["cloudflare", "google"].iter()
		.enumerate()
		.filter_map(|(i, name)| preset(name, i + 1))
		.collect()
}
