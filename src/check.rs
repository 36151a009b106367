use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::compare::{compare_addresses, compare_ech, CheckStatus, EchComparison, ReferenceMatch};
use crate::http::HttpClient;
use crate::merge::combine_failures;
use crate::query::query_provider;
use crate::transport::{
	Encoding, LookupKind, ProbeConfig, ProviderEndpoint, ProviderResult, QueryAttempt,
};

/// Result of comparing a target's A/AAAA answers against reference resolvers
#[derive(Debug, Clone, Serialize)]
pub struct AddressReport {
	pub status: CheckStatus,
	pub message: String,
	pub domain: String,
	pub record_type: &'static str,
	pub target: ProviderResult,
	pub references: Vec<ProviderResult>,
	pub comparisons: Vec<ReferenceMatch>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub ech: Option<EchComparison>,
}

/// Result of looking for an ECH config across reference resolvers
#[derive(Debug, Clone, Serialize)]
pub struct EchReport {
	pub ech_enabled: bool,
	pub message: String,
	pub domain: String,
	pub results: Vec<ProviderResult>,
}

/// Query every endpoint concurrently and wait for all of them.
///
/// Results come back in endpoint order. A task that panics or is cancelled
/// is reported as a failed provider.
async fn query_all(
	client: &Arc<dyn HttpClient>,
	endpoints: &[ProviderEndpoint],
	domain: &str,
	kind: LookupKind,
	timeout: Duration,
) -> Vec<ProviderResult> {
	let mut handles = Vec::with_capacity(endpoints.len());
	for endpoint in endpoints {
		let client = Arc::clone(client);
		let endpoint = endpoint.clone();
		let domain = domain.to_string();

		handles.push(tokio::spawn(async move {
			query_provider(client.as_ref(), &endpoint, &domain, kind, timeout).await
		}));
	}

	let mut results = Vec::with_capacity(handles.len());
	for (endpoint, handle) in endpoints.iter().zip(handles) {
		match handle.await {
			Ok(result) => results.push(result),
			Err(e) => {
				warn!(provider = %endpoint.display_name(), error = %e, "provider task failed");
				let attempt = QueryAttempt::not_sent(
					Encoding::Json,
					format!("internal: provider task failed: {}", e),
				);
				results.push(combine_failures(endpoint, vec![attempt], kind));
			}
		}
	}
	results
}

/// Compare the target's address answers for `domain` against the references.
///
/// When the config names an ECH domain, the same endpoints are also asked
/// for its HTTPS record and the ECH configs compared. Both sets of queries
/// run at the same time.
pub async fn check_a_records(
	client: Arc<dyn HttpClient>,
	target: ProviderEndpoint,
	references: Vec<ProviderEndpoint>,
	domain: &str,
	config: &ProbeConfig,
) -> AddressReport {
	let kind = config.address_kind;
	info!(
		endpoint = %target.url, references = references.len(), domain, record_type = kind.token(),
		"starting address check"
	);

	let mut endpoints = Vec::with_capacity(references.len() + 1);
	endpoints.push(target);
	endpoints.extend(references);

	let addresses = query_all(&client, &endpoints, domain, kind, config.timeout);
	let ech = async {
		match config.ech_domain.as_deref() {
			Some(ech_domain) => {
				Some(query_all(&client, &endpoints, ech_domain, LookupKind::Https, config.timeout).await)
			}
			None => None,
		}
	};
	let (mut results, ech_results) = tokio::join!(addresses, ech);

	// Target is always first
	let target = results.remove(0);
	let references = results;
	let comparison = compare_addresses(&target, &references);

	let ech = ech_results.map(|mut ech_results| {
		let ech_target = ech_results.remove(0);
		compare_ech(ech_target, ech_results)
	});

	info!(status = %comparison.status, message = %comparison.message, "address check finished");
	AddressReport {
		status: comparison.status,
		message: comparison.message,
		domain: domain.to_string(),
		record_type: kind.token(),
		target,
		references,
		comparisons: comparison.matches,
		ech,
	}
}

/// Ask each reference resolver for `domain`'s HTTPS record and report whether
/// any of them publishes an ECH config.
pub async fn check_ech(
	client: Arc<dyn HttpClient>,
	references: Vec<ProviderEndpoint>,
	domain: &str,
	timeout: Duration,
) -> EchReport {
	info!(references = references.len(), domain, "starting ECH check");
	let results = query_all(&client, &references, domain, LookupKind::Https, timeout).await;

	let found: Vec<String> = results.iter()
		.filter(|r| r.succeeded)
		.map(|r| r.display_name())
		.collect();
	let ech_enabled = !found.is_empty();

	let message = if ech_enabled {
		format!("ECH config published for {} (seen by {})", domain, found.join(", "))
	} else if results.is_empty() {
		"no reference resolvers to query".to_string()
	} else if results.iter().all(|r| r.http_status.is_none()) {
		format!("no reference resolver could be reached for {}", domain)
	} else {
		format!("no ECH config found for {}", domain)
	};

	info!(ech_enabled, message = %message, "ECH check finished");
	EchReport {
		ech_enabled,
		message,
		domain: domain.to_string(),
		results,
	}
}
