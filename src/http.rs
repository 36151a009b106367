//! HTTP GET capability used by the query executor

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use rustls::{ClientConfig, RootCertStore};

use crate::error::TransportError;

/// Status, content type and full body of an HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
	pub status: u16,
	pub content_type: Option<String>,
	pub body: Vec<u8>,
}

impl HttpResponse {
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

#[async_trait]
pub trait HttpClient: Send + Sync {
	/// Perform a GET, reading the whole body, bounded by `timeout`.
	async fn get(
		&self,
		url: &str,
		headers: &[(&str, &str)],
		timeout: Duration,
	) -> Result<HttpResponse, TransportError>;
}

/// reqwest-backed client over rustls with the webpki root set
pub struct ReqwestClient {
	client: Client,
}

impl ReqwestClient {
	pub fn new(timeout: Duration) -> Result<Self> {
		let mut root_store = RootCertStore::empty();
		root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

		let provider = Arc::new(rustls::crypto::ring::default_provider());
		let mut tls = ClientConfig::builder_with_provider(provider)
			.with_safe_default_protocol_versions()
			.map_err(|e| anyhow!("failed to configure TLS: {}", e))?
			.with_root_certificates(root_store)
			.with_no_client_auth();
		tls.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

		let client = Client::builder()
			.use_preconfigured_tls(tls)
			.timeout(timeout)
			.user_agent(concat!("doh-probe/", env!("CARGO_PKG_VERSION")))
			.build()
			.map_err(|e| anyhow!("failed to build HTTP client: {}", e))?;
		Ok(ReqwestClient { client })
	}
}

#[async_trait]
impl HttpClient for ReqwestClient {
	async fn get(
		&self,
		url: &str,
		headers: &[(&str, &str)],
		timeout: Duration,
	) -> Result<HttpResponse, TransportError> {
		let mut request = self.client.get(url).timeout(timeout);
		for (name, value) in headers {
			request = request.header(*name, *value);
		}

		let response = request.send()
			.await
			.map_err(|e| TransportError::from_reqwest(e, timeout))?;

		let status = response.status().as_u16();
		let content_type = response.headers()
			.get(CONTENT_TYPE)
			.and_then(|v| v.to_str().ok())
			.map(str::to_owned);
		let body = response.bytes()
			.await
			.map_err(|e| TransportError::from_reqwest(e, timeout))?;

		Ok(HttpResponse {
			status,
			content_type,
			body: body.to_vec(),
		})
	}
}
