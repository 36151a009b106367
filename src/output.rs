use std::io::Write;

use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use anyhow::Result;
use serde::Serialize;

use crate::check::{AddressReport, EchReport};
use crate::transport::{ProbeConfig, ProviderEndpoint, ProviderResult};

/// Print the endpoints and settings of a check before running it.
pub fn print_config_summary(
	target: Option<&ProviderEndpoint>,
	references: &[ProviderEndpoint],
	domain: &str,
	config: &ProbeConfig,
) {
	println!("DoH Probe Configuration");
	println!("=======================");
	if let Some(t) = target {
		println!("Target:         {} ({})", t.label, t.url);
	}
	println!("References:     {}", references.len());
	for r in references {
		println!("  - {} ({})", r.label, r.url);
	}
	println!("Domain:         {}", domain);
	if target.is_some() {
		println!("Record type:    {}", config.address_kind.token());
	}
	if let Some(ech) = &config.ech_domain {
		println!("ECH domain:     {}", ech);
	}
	println!("Timeout:        {} ms", config.timeout.as_millis());
	println!();
}

fn answer_cell(r: &ProviderResult) -> String {
	if r.succeeded {
		r.values.join(", ")
	} else {
		r.error.clone().unwrap_or_default()
	}
}

fn provider_table(results: &[&ProviderResult]) -> Table {
	let mut table = Table::new();
	table.load_preset(UTF8_FULL);
	table.set_content_arrangement(ContentArrangement::Dynamic);
	table.set_header(vec![
		"Provider", "Encoding", "HTTP", "Latency", "Tried", "Answer",
	]);

	for r in results {
		let encoding = r.encoding.map_or_else(|| "-".to_string(), |e| e.to_string());
		let status = r.http_status.map_or_else(|| "-".to_string(), |s| s.to_string());
		let latency = r.latency_ms.map_or_else(|| "-".to_string(), |ms| format!("{} ms", ms));
		let tried = r.attempted_encodings.iter()
			.map(|e| e.to_string())
			.collect::<Vec<_>>()
			.join(",");
		let answer = Cell::new(answer_cell(r))
			.fg(if r.succeeded { Color::Green } else { Color::Red });

		table.add_row(vec![
			Cell::new(r.display_name()),
			Cell::new(encoding),
			Cell::new(status),
			Cell::new(latency),
			Cell::new(tried),
			answer,
		]);
	}
	table
}

/// Print an address check as tables.
pub fn print_address_report(report: &AddressReport) {
	let mut results: Vec<&ProviderResult> = vec![&report.target];
	results.extend(report.references.iter());

	println!("{} Results for {}", report.record_type, report.domain);
	println!("====================\n");
	println!("{}", provider_table(&results));

	let mut verdict = Table::new();
	verdict.load_preset(UTF8_FULL);
	verdict.set_header(vec!["Reference", "Matches target"]);
	for m in &report.comparisons {
		verdict.add_row(vec![
			format!("{} ({})", m.label, m.reference),
			if m.matches { "yes" } else { "no" }.to_string(),
		]);
	}
	if !report.comparisons.is_empty() {
		println!("{verdict}");
	}

	println!("\nStatus: {}", report.status);
	println!("{}", report.message);

	if let Some(ech) = &report.ech {
		let mut results: Vec<&ProviderResult> = vec![&ech.target];
		results.extend(ech.references.iter());

		println!("\nECH Comparison");
		println!("==============\n");
		println!("{}", provider_table(&results));
		println!("Consistent: {}", ech.consistent);
		for note in &ech.notes {
			println!("  - {}", note);
		}
	}
}

/// Print an ECH check as a table.
pub fn print_ech_report(report: &EchReport) {
	let results: Vec<&ProviderResult> = report.results.iter().collect();

	println!("HTTPS Records for {}", report.domain);
	println!("======================\n");
	println!("{}", provider_table(&results));
	for r in &report.results {
		if let Some(record) = &r.record {
			println!("  {}: {}", r.display_name(), record);
		}
	}
	let verdict = if report.ech_enabled { "enabled" } else { "not detected" };
	println!("\nECH: {}", verdict);
	println!("{}", report.message);
}

/// Print any report as pretty JSON.
pub fn print_json<T: Serialize>(report: &T) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(report)?);
	Ok(())
}

const CSV_HEADER: [&str; 13] = [
	"check", "provider", "label", "url", "encoding", "selected",
	"http_status", "latency_ms", "succeeded", "shape", "content_type",
	"values", "error",
];

/// Write one CSV row per query attempt.
///
/// Each row is tagged with the record type of the check it came from.
pub fn write_attempts<W: Write>(writer: W, rows: &[(&str, &ProviderResult)]) -> Result<()> {
	let mut writer = csv::Writer::from_writer(writer);
	writer.write_record(CSV_HEADER)?;

	for (check, r) in rows {
		for a in &r.attempts {
			writer.write_record([
				check.to_string(),
				r.key.to_string(),
				r.label.clone(),
				r.url.clone(),
				a.encoding.to_string(),
				(r.encoding == Some(a.encoding)).to_string(),
				a.http_status.map(|s| s.to_string()).unwrap_or_default(),
				a.latency_ms.map(|ms| ms.to_string()).unwrap_or_default(),
				a.succeeded.to_string(),
				a.shape.to_string(),
				a.content_type.clone().unwrap_or_default(),
				a.values.join(";"),
				a.error.clone().unwrap_or_default(),
			])?;
		}
	}

	writer.flush()?;
	Ok(())
}

/// Write every attempt behind a report to a CSV file.
pub fn write_csv(path: &str, rows: &[(&str, &ProviderResult)]) -> Result<()> {
	let file = std::fs::File::create(path)?;
	write_attempts(file, rows)?;
	eprintln!("Attempts written to: {}", path);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testutil::{failed_result, provider_result};
	use crate::transport::ProviderKey;

	#[test]
	fn test_csv_one_row_per_attempt() {
		let ok = provider_result(ProviderKey::Target, "target.test", &["192.0.2.1", "192.0.2.2"]);
		let failed = failed_result(ProviderKey::Reference(1), "ref1.test", "transport: refused");

		let mut buf = Vec::new();
		write_attempts(&mut buf, &[("A", &ok), ("A", &failed)]).unwrap();
		let text = String::from_utf8(buf).unwrap();
		let lines: Vec<&str> = text.lines().collect();

		assert_eq!(lines.len(), 3);
		assert!(lines[0].starts_with("check,provider,label"));
		assert_eq!(
			lines[1],
			"A,target,target.test,https://target.test/dns-query,json,true,200,10,true,unknown,,192.0.2.1;192.0.2.2,",
		);
		assert!(lines[2].starts_with("A,reference1,ref1.test,"));
		assert!(lines[2].ends_with(",false,unknown,,,transport: refused"));
	}

	#[test]
	fn test_answer_cell_shows_error_on_failure() {
		let failed = failed_result(ProviderKey::Target, "target.test", "HTTP 503");
		assert_eq!(answer_cell(&failed), "HTTP 503");
		let ok = provider_result(ProviderKey::Target, "target.test", &["192.0.2.1"]);
		assert_eq!(answer_cell(&ok), "192.0.2.1");
	}
}
