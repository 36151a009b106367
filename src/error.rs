//! Error types for request construction, DNS decoding and transport

use std::time::Duration;

use thiserror::Error;

/// Errors raised while encoding a query or decoding a DNS wire message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
	#[error("empty domain name")]
	EmptyDomain,

	#[error("label exceeds 63 bytes: '{0}'")]
	LabelTooLong(String),

	#[error("malformed name at offset {offset}: {reason}")]
	MalformedName { offset: usize, reason: &'static str },

	#[error("unsupported record type '{0}'")]
	UnsupportedRecordType(String),

	#[error("truncated message: {needed} byte(s) needed at offset {offset}")]
	Truncated { offset: usize, needed: usize },
}

impl CodecError {
	pub(crate) fn malformed(offset: usize, reason: &'static str) -> Self {
		CodecError::MalformedName { offset, reason }
	}
}

/// Errors raised while building a DoH request, before anything is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
	#[error(transparent)]
	Codec(#[from] CodecError),

	#[error("invalid endpoint URL '{url}': {reason}")]
	InvalidUrl { url: String, reason: String },
}

/// Errors raised by an HTTP round trip.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
	#[error("request timed out after {} ms", .0.as_millis())]
	Timeout(Duration),

	#[error("{0}")]
	Network(String),
}

impl TransportError {
	/// Map a reqwest error, keeping the underlying cause chain in the message.
	pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
		if err.is_timeout() {
			return TransportError::Timeout(timeout);
		}
		let mut message = err.to_string();
		let mut source = std::error::Error::source(&err);
		while let Some(cause) = source {
			message.push_str(": ");
			message.push_str(&cause.to_string());
			source = cause.source();
		}
		TransportError::Network(message)
	}
}
