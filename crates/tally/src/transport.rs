// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Delivery of encoded batches to the collector.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{Result, TallyError, TransportError};

/// Raw answer from the collector.
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
	pub status: u16,
	pub body: Vec<u8>,
	/// Value of the `Retry-After` header, when present and numeric.
	pub retry_after: Option<Duration>,
}

/// Sends one encoded batch and returns the collector's answer.
///
/// Implementations perform exactly one request per call. Retrying is the
/// caller's job.
#[async_trait]
pub trait Transport: Send + Sync {
	async fn send(
		&self,
		body: Bytes,
		write_key: &str,
	) -> std::result::Result<TransportResponse, TransportError>;
}

/// [`Transport`] that POSTs to `{endpoint}/v1/batch` with reqwest.
pub struct HttpTransport {
	client: Client,
	url: String,
}

impl HttpTransport {
	pub fn new(config: &ClientConfig) -> Result<Self> {
		let client = tally_common_http::builder()
			.timeout(config.request_timeout)
			.build()
			.map_err(|e| TallyError::Configuration(format!("failed to create HTTP client: {e}")))?;

		Ok(Self {
			client,
			url: config.batch_url(),
		})
	}
}

#[async_trait]
impl Transport for HttpTransport {
	async fn send(
		&self,
		body: Bytes,
		write_key: &str,
	) -> std::result::Result<TransportResponse, TransportError> {
		debug!(url = %self.url, bytes = body.len(), "Posting batch");

		let response = self
			.client
			.post(&self.url)
			.header(AUTHORIZATION, format!("Bearer {write_key}"))
			.header(CONTENT_TYPE, "application/json")
			.body(body)
			.send()
			.await?;

		let status = response.status().as_u16();
		let retry_after = tally_common_http::parse_retry_after(response.headers());
		// A failed body read still reports the status that arrived.
		let body = match response.bytes().await {
			Ok(body) => body.to_vec(),
			Err(e) => {
				warn!(status, error = %e, "Failed to read collector response body");
				Vec::new()
			}
		};

		Ok(TransportResponse {
			status,
			body,
			retry_after,
		})
	}
}
