use crate::transport::{
	LookupKind, ProviderEndpoint, ProviderResult, QueryAttempt, ResponseBody, ResponseShape,
};

const DEFAULT_FAILURE: &str = "no usable answer from provider";

/// Merge failed attempts into one reportable failure.
///
/// Status and latency come from the latest attempt that has them; shape,
/// content type, payload and record from the earliest. Errors are joined
/// with " | ". For address lookups any partially extracted addresses are
/// kept as a union.
pub fn combine_failures(
	endpoint: &ProviderEndpoint,
	attempts: Vec<QueryAttempt>,
	kind: LookupKind,
) -> ProviderResult {
	let http_status = attempts.iter().rev().find_map(|a| a.http_status);
	let latency_ms = attempts.iter().rev().find_map(|a| a.latency_ms);
	let shape = attempts.iter()
		.map(|a| a.shape)
		.find(|s| *s != ResponseShape::Unknown)
		.unwrap_or(ResponseShape::Unknown);
	let content_type = attempts.iter().find_map(|a| a.content_type.clone());
	let payload = attempts.iter()
		.map(|a| &a.payload)
		.find(|p| !p.is_unknown())
		.cloned()
		.unwrap_or(ResponseBody::Unknown);
	let record = attempts.iter().find_map(|a| a.record.clone());

	let errors: Vec<&str> = attempts.iter()
		.filter_map(|a| a.error.as_deref())
		.filter(|e| !e.is_empty())
		.collect();
	let error = if errors.is_empty() {
		DEFAULT_FAILURE.to_string()
	} else {
		errors.join(" | ")
	};

	let mut values: Vec<String> = Vec::new();
	if kind.is_address() {
		for value in attempts.iter().flat_map(|a| a.values.iter()) {
			if !values.contains(value) {
				values.push(value.clone());
			}
		}
	}

	ProviderResult {
		key: endpoint.key,
		label: endpoint.label.clone(),
		url: endpoint.url.clone(),
		encoding: None,
		http_status,
		succeeded: false,
		values,
		record,
		latency_ms,
		shape,
		content_type,
		payload,
		error: Some(error),
		attempted_encodings: attempts.iter().map(|a| a.encoding).collect(),
		attempts,
	}
}
