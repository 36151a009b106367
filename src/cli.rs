use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::transport::LookupKind;

/// DNS-over-HTTPS diagnostic probe
#[derive(Parser, Debug)]
#[command(name = "doh-probe", version)]
#[command(about = "Probe a DoH endpoint and compare its answers against reference resolvers")]
pub struct Cli {
	#[command(subcommand)]
	pub command: Command,

	/// Per-request timeout in milliseconds
	#[arg(short = 't', long = "timeout", env = "DOH_PROBE_TIMEOUT_MS", default_value = "5000", global = true)]
	pub timeout: u64,

	/// Print the report as JSON instead of a table
	#[arg(long = "json", global = true)]
	pub json: bool,

	/// Write every query attempt to a CSV file
	#[arg(short = 'o', long = "output", global = true)]
	pub output: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Compare a DoH endpoint's A/AAAA answers against reference resolvers
	Check(CheckArgs),
	/// Ask reference resolvers whether a domain publishes an ECH config
	Ech(EchArgs),
}

#[derive(Args, Debug)]
pub struct CheckArgs {
	/// DoH endpoint under test (URL, host/path, or bare domain)
	pub target: String,

	/// Domain to look up
	#[arg(short = 'd', long = "domain", env = "DOH_PROBE_DOMAIN", default_value = "example.com")]
	pub domain: String,

	/// Reference resolver (repeatable: preset name, label=url, or url)
	#[arg(short = 'r', long = "reference")]
	pub references: Vec<String>,

	/// Address record type to compare
	#[arg(long = "type", value_enum, default_value_t = AddressType::A)]
	pub record_type: AddressType,

	/// Also compare ECH configs published for this domain
	#[arg(long = "ech-domain")]
	pub ech_domain: Option<String>,
}

#[derive(Args, Debug)]
pub struct EchArgs {
	/// Domain whose HTTPS record is inspected
	#[arg(default_value = "crypto.cloudflare.com")]
	pub domain: String,

	/// Reference resolver (repeatable: preset name, label=url, or url)
	#[arg(short = 'r', long = "reference")]
	pub references: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
	A,
	Aaaa,
}

impl From<AddressType> for LookupKind {
	fn from(t: AddressType) -> Self {
		match t {
			AddressType::A => LookupKind::A,
			AddressType::Aaaa => LookupKind::Aaaa,
		}
	}
}
