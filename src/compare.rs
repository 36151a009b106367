use std::collections::HashSet;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::json::find_ech_config;
use crate::transport::{ProviderKey, ProviderResult};

/// Outcome of a comparison that may not be decidable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriState {
	True,
	False,
	Unknown,
}

impl TriState {
	pub fn as_bool(self) -> Option<bool> {
		match self {
			TriState::True => Some(true),
			TriState::False => Some(false),
			TriState::Unknown => None,
		}
	}
}

impl fmt::Display for TriState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TriState::True => f.write_str("yes"),
			TriState::False => f.write_str("no"),
			TriState::Unknown => f.write_str("unknown"),
		}
	}
}

// true / false / null on the wire
impl Serialize for TriState {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self.as_bool() {
			Some(b) => serializer.serialize_bool(b),
			None => serializer.serialize_none(),
		}
	}
}

/// Overall verdict of an address check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
	Success,
	Failure,
	PartialMatch,
}

impl fmt::Display for CheckStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CheckStatus::Success => f.write_str("success"),
			CheckStatus::Failure => f.write_str("failure"),
			CheckStatus::PartialMatch => f.write_str("partial_match"),
		}
	}
}

/// Whether the target's address set equals one reference's
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceMatch {
	pub reference: ProviderKey,
	pub label: String,
	pub matches: bool,
}

#[derive(Debug, Clone)]
pub struct AddressComparison {
	pub status: CheckStatus,
	pub message: String,
	pub matches: Vec<ReferenceMatch>,
}

/// Exact string set equality, ignoring order and duplicates.
pub fn ip_sets_equal(a: &[String], b: &[String]) -> bool {
	let left: HashSet<&str> = a.iter().map(String::as_str).collect();
	let right: HashSet<&str> = b.iter().map(String::as_str).collect();
	left == right
}

/// Derive the address check status from the target and reference results.
///
/// A failed target fails the whole check with the target's own error.
/// Otherwise every reference that also succeeded is compared by set
/// equality: all equal is a success, some equal is a partial match naming
/// the matching references, none equal is a failure.
pub fn compare_addresses(target: &ProviderResult, references: &[ProviderResult]) -> AddressComparison {
	let matches: Vec<ReferenceMatch> = references.iter()
		.map(|reference| ReferenceMatch {
			reference: reference.key,
			label: reference.label.clone(),
			matches: target.succeeded
				&& reference.succeeded
				&& ip_sets_equal(&target.values, &reference.values),
		})
		.collect();

	if !target.succeeded {
		let message = target.error.clone()
			.unwrap_or_else(|| "target resolver returned no answer".to_string());
		return AddressComparison { status: CheckStatus::Failure, message, matches };
	}

	if references.is_empty() {
		return AddressComparison {
			status: CheckStatus::Failure,
			message: "no reference resolvers to compare against".to_string(),
			matches,
		};
	}

	let matched: Vec<&ProviderResult> = references.iter()
		.zip(&matches)
		.filter(|(_, m)| m.matches)
		.map(|(r, _)| r)
		.collect();
	let unmatched: Vec<&ProviderResult> = references.iter()
		.zip(&matches)
		.filter(|(_, m)| !m.matches)
		.map(|(r, _)| r)
		.collect();

	let (status, message) = if unmatched.is_empty() {
		(CheckStatus::Success, "target answers match every reference resolver".to_string())
	} else if matched.is_empty() {
		(
			CheckStatus::Failure,
			"target answers do not match any reference resolver".to_string(),
		)
	} else {
		(
			CheckStatus::PartialMatch,
			format!(
				"target answers match {} but not {}",
				names(&matched),
				names(&unmatched),
			),
		)
	};

	AddressComparison { status, message, matches }
}

fn names(results: &[&ProviderResult]) -> String {
	results.iter()
		.map(|r| r.display_name())
		.collect::<Vec<_>>()
		.join(", ")
}

/// Normalized ECH config string for one provider.
///
/// A successful HTTPS lookup already carries it as its value. Otherwise try
/// to recover an `ech=` token from any textual payload the provider sent.
pub fn ech_config_string(result: &ProviderResult) -> Option<String> {
	if result.succeeded {
		if let Some(value) = result.values.first() {
			return Some(value.clone());
		}
	}

	std::iter::once(&result.payload)
		.chain(result.attempts.iter().map(|a| &a.payload))
		.filter_map(|payload| payload.as_text())
		.find_map(|text| find_ech_config(&text))
}

/// Three-valued ECH match of one reference against the target
#[derive(Debug, Clone, Serialize)]
pub struct EchMatch {
	pub reference: ProviderKey,
	pub label: String,
	pub matches: TriState,
}

#[derive(Debug, Clone, Serialize)]
pub struct EchComparison {
	pub target: ProviderResult,
	pub references: Vec<ProviderResult>,
	pub matches: Vec<EchMatch>,
	pub consistent: TriState,
	pub notes: Vec<String>,
}

fn ech_verdict(name: &str, target: Option<&str>, reference: Option<&str>) -> (TriState, String) {
	match (target, reference) {
		(None, None) => (
			TriState::Unknown,
			format!("{}: neither the target nor this reference returned an ECH config, cannot determine", name),
		),
		(None, Some(_)) => (
			TriState::False,
			format!("{}: reference publishes an ECH config but the target returned none", name),
		),
		(Some(_), None) => (
			TriState::Unknown,
			format!("{}: target returned an ECH config but this reference returned none, cannot determine", name),
		),
		(Some(t), Some(r)) if t == r => (
			TriState::True,
			format!("{}: ECH config matches the target", name),
		),
		(Some(_), Some(_)) => (
			TriState::False,
			format!("{}: ECH config differs from the target", name),
		),
	}
}

/// Compare the target's ECH config against each reference in order.
///
/// `consistent` is true only when every reference matched, false as soon as
/// one definitively differs, and unknown otherwise.
pub fn compare_ech(target: ProviderResult, references: Vec<ProviderResult>) -> EchComparison {
	let target_ech = ech_config_string(&target);
	let mut matches = Vec::with_capacity(references.len());
	let mut notes = Vec::with_capacity(references.len() + 1);

	if target_ech.is_none() && !target.succeeded {
		if let Some(err) = target.error.as_deref() {
			notes.push(format!("{}: {}", target.display_name(), err));
		}
	}

	for reference in &references {
		let reference_ech = ech_config_string(reference);
		let (verdict, note) = ech_verdict(
			&reference.display_name(),
			target_ech.as_deref(),
			reference_ech.as_deref(),
		);
		notes.push(note);
		matches.push(EchMatch {
			reference: reference.key,
			label: reference.label.clone(),
			matches: verdict,
		});
	}

	let consistent = if matches.iter().any(|m| m.matches == TriState::False) {
		TriState::False
	} else if !matches.is_empty() && matches.iter().all(|m| m.matches == TriState::True) {
		TriState::True
	} else {
		TriState::Unknown
	};

	EchComparison { target, references, matches, consistent, notes }
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testutil::{failed_result, provider_result};
	use crate::transport::{ResponseBody, ResponseShape};

	const ECH_A: &str = "AEX+DQBBpQAgACBkHb8ZOYxS4hk3PDLU1y3VQbcZu9iJdt1wCOZl6HCqXwAEAAEAAQAA";

	fn target(values: &[&str]) -> ProviderResult {
		provider_result(ProviderKey::Target, "target.test", values)
	}

	fn reference(n: usize, values: &[&str]) -> ProviderResult {
		provider_result(ProviderKey::Reference(n), &format!("ref{}.test", n), values)
	}

	fn strings(values: &[&str]) -> Vec<String> {
		values.iter().map(|v| v.to_string()).collect()
	}

	#[test]
	fn test_ip_sets_equal_ignores_order() {
		assert!(ip_sets_equal(
			&strings(&["1.1.1.1", "8.8.8.8"]),
			&strings(&["8.8.8.8", "1.1.1.1"]),
		));
		assert!(!ip_sets_equal(&strings(&["1.1.1.1"]), &strings(&["1.1.1.1", "8.8.8.8"])));
		assert!(ip_sets_equal(&[], &[]));
	}

	#[test]
	fn test_partial_match_names_matching_reference() {
		let result = compare_addresses(
			&target(&["93.184.216.34"]),
			&[reference(1, &["93.184.216.34"]), reference(2, &["1.2.3.4"])],
		);
		assert_eq!(result.status, CheckStatus::PartialMatch);
		assert!(result.message.contains("match ref1.test (reference1)"));
		assert!(result.message.contains("not ref2.test (reference2)"));
		assert!(result.matches[0].matches);
		assert!(!result.matches[1].matches);
	}

	#[test]
	fn test_all_match_is_success() {
		let result = compare_addresses(
			&target(&["93.184.216.34"]),
			&[reference(1, &["93.184.216.34"]), reference(2, &["93.184.216.34"])],
		);
		assert_eq!(result.status, CheckStatus::Success);
		assert!(result.matches.iter().all(|m| m.matches));
	}

	#[test]
	fn test_target_failure_uses_target_error() {
		let failed = failed_result(
			ProviderKey::Target,
			"target.test",
			"transport: request timed out after 5000 ms",
		);
		let result = compare_addresses(
			&failed,
			&[reference(1, &["93.184.216.34"]), reference(2, &["93.184.216.34"])],
		);
		assert_eq!(result.status, CheckStatus::Failure);
		assert_eq!(result.message, "transport: request timed out after 5000 ms");
		assert!(result.matches.iter().all(|m| !m.matches));
	}

	#[test]
	fn test_no_match_is_failure() {
		let result = compare_addresses(
			&target(&["10.0.0.1"]),
			&[reference(1, &["93.184.216.34"]), reference(2, &["1.2.3.4"])],
		);
		assert_eq!(result.status, CheckStatus::Failure);
		assert_eq!(result.message, "target answers do not match any reference resolver");
	}

	#[test]
	fn test_failed_reference_never_matches() {
		let mut failed = failed_result(ProviderKey::Reference(2), "ref2.test", "HTTP 500");
		// Partial values from a failed provider are not comparable
		failed.values = strings(&["93.184.216.34"]);
		let result = compare_addresses(
			&target(&["93.184.216.34"]),
			&[reference(1, &["93.184.216.34"]), failed],
		);
		assert_eq!(result.status, CheckStatus::PartialMatch);
	}

	#[test]
	fn test_no_references_is_failure() {
		let result = compare_addresses(&target(&["93.184.216.34"]), &[]);
		assert_eq!(result.status, CheckStatus::Failure);
		assert!(result.matches.is_empty());
	}

	#[test]
	fn test_tristate_serializes_as_nullable_bool() {
		let json = serde_json::to_string(&[TriState::True, TriState::False, TriState::Unknown]).unwrap();
		assert_eq!(json, "[true,false,null]");
	}

	#[test]
	fn test_ech_match_with_absent_reference_is_unknown() {
		let absent = failed_result(ProviderKey::Reference(2), "ref2.test", "no ECH parameter in HTTPS answer");
		let result = compare_ech(target(&[ECH_A]), vec![reference(1, &[ECH_A]), absent]);

		assert_eq!(result.matches[0].matches, TriState::True);
		assert_eq!(result.matches[1].matches, TriState::Unknown);
		assert_eq!(result.consistent, TriState::Unknown);
		assert_eq!(result.notes.len(), 2);
		assert!(result.notes[0].starts_with("ref1.test (reference1)"));
		assert!(result.notes[1].starts_with("ref2.test (reference2)"));
	}

	#[test]
	fn test_ech_all_match_is_consistent() {
		let result = compare_ech(target(&[ECH_A]), vec![reference(1, &[ECH_A]), reference(2, &[ECH_A])]);
		assert_eq!(result.consistent, TriState::True);
	}

	#[test]
	fn test_ech_target_missing_is_inconsistent() {
		let missing = failed_result(ProviderKey::Target, "target.test", "no ECH parameter in HTTPS answer");
		let absent = failed_result(ProviderKey::Reference(2), "ref2.test", "HTTP 500");
		let result = compare_ech(missing, vec![reference(1, &[ECH_A]), absent]);

		assert_eq!(result.matches[0].matches, TriState::False);
		assert_eq!(result.matches[1].matches, TriState::Unknown);
		assert_eq!(result.consistent, TriState::False);
		// Target error note comes first, then one per reference
		assert_eq!(result.notes.len(), 3);
		assert!(result.notes[0].starts_with("target.test (target)"));
	}

	#[test]
	fn test_ech_differing_configs() {
		let result = compare_ech(target(&["AAAA"]), vec![reference(1, &[ECH_A])]);
		assert_eq!(result.matches[0].matches, TriState::False);
		assert_eq!(result.consistent, TriState::False);
	}

	#[test]
	fn test_ech_without_references_is_unknown() {
		let result = compare_ech(target(&[ECH_A]), Vec::new());
		assert_eq!(result.consistent, TriState::Unknown);
	}

	#[test]
	fn test_ech_config_recovered_from_text_payload() {
		let mut failed = failed_result(ProviderKey::Target, "target.test", "text response: <html>");
		failed.shape = ResponseShape::Text;
		failed.payload = ResponseBody::Text(format!("1 . alpn=h2 ech=\"{}\"", ECH_A));
		assert_eq!(ech_config_string(&failed).as_deref(), Some(ECH_A));

		let result = compare_ech(failed, vec![reference(1, &[ECH_A])]);
		assert_eq!(result.matches[0].matches, TriState::True);
	}

	#[test]
	fn test_ech_config_absent_without_text() {
		let failed = failed_result(ProviderKey::Target, "target.test", "transport: refused");
		assert_eq!(ech_config_string(&failed), None);
	}
}
