mod check;
mod cli;
mod compare;
mod dns;
mod error;
mod http;
mod json;
mod merge;
mod name;
mod output;
mod query;
mod resolver;
#[cfg(test)]
mod testutil;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cli::{Cli, Command};
use crate::http::{HttpClient, ReqwestClient};
use crate::transport::{LookupKind, ProbeConfig, ProviderResult};

const DEFAULT_LOG_FILTER: &str = "doh_probe=info";

/// Directives from RUST_LOG when set, else info for this crate.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
	rust_log
		.filter(|directives| !directives.trim().is_empty())
		.and_then(|directives| EnvFilter::try_new(directives).ok())
		.unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	// Logs go to stderr so tables and JSON on stdout stay clean
	tracing_subscriber::registry()
		.with(fmt::layer().with_writer(std::io::stderr))
		.with(log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref()))
		.init();

	let timeout = Duration::from_millis(cli.timeout);
	let client: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new(timeout)?);

	match cli.command {
		Command::Check(args) => {
			let target = resolver::parse_target(&args.target)?;
			let references = resolver::parse_references(&args.references)?;
			let config = ProbeConfig {
				timeout,
				address_kind: args.record_type.into(),
				ech_domain: args.ech_domain,
			};

			if !cli.json {
				output::print_config_summary(Some(&target), &references, &args.domain, &config);
			}

			let report = check::check_a_records(client, target, references, &args.domain, &config).await;

			if cli.json {
				output::print_json(&report)?;
			} else {
				output::print_address_report(&report);
			}

			if let Some(path) = &cli.output {
				let mut rows: Vec<(&str, &ProviderResult)> = std::iter::once(&report.target)
					.chain(&report.references)
					.map(|r| (report.record_type, r))
					.collect();
				if let Some(ech) = &report.ech {
					let https = LookupKind::Https.token();
					rows.extend(std::iter::once(&ech.target).chain(&ech.references).map(|r| (https, r)));
				}
				output::write_csv(path, &rows)?;
			}
		}
		Command::Ech(args) => {
			let references = resolver::parse_references(&args.references)?;

			if !cli.json {
				let config = ProbeConfig {
					timeout,
					address_kind: LookupKind::Https,
					ech_domain: None,
				};
				output::print_config_summary(None, &references, &args.domain, &config);
			}

			let report = check::check_ech(client, references, &args.domain, timeout).await;

			if cli.json {
				output::print_json(&report)?;
			} else {
				output::print_ech_report(&report);
			}

			if let Some(path) = &cli.output {
				let https = LookupKind::Https.token();
				let rows: Vec<(&str, &ProviderResult)> = report.results.iter().map(|r| (https, r)).collect();
				output::write_csv(path, &rows)?;
			}
		}
	}

	Ok(())
}
