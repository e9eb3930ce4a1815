// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tally_common_http::RetryConfig;
use tally_core::{effective_batch_size, BatchResponse};

use crate::error::{Result, SendError, TallyError};

/// Collector used when no endpoint is configured.
pub const DEFAULT_ENDPOINT: &str = "https://collector.tally.dev";
/// Upper bound on the delay between two delivery attempts.
pub const MAX_RETRY_DELAY: Duration = Duration::from_millis(16_000);

/// Invoked once per delivered batch, including partially accepted ones.
pub type SuccessCallback = Arc<dyn Fn(&BatchResponse) + Send + Sync>;
/// Invoked once per batch that failed terminally.
pub type ErrorCallback = Arc<dyn Fn(&SendError) + Send + Sync>;

/// Immutable settings captured when the client is built.
#[derive(Clone)]
pub struct ClientConfig {
	/// Collector base URL, without the `/v1/batch` path.
	pub endpoint: String,
	/// Bearer credential sent with every request.
	pub write_key: String,
	/// Interval between timer-driven flushes.
	pub flush_interval: Duration,
	/// Events per batch. Clamped to `1..=100`.
	pub max_batch_size: usize,
	/// Pending events kept before the oldest is evicted. At least one.
	pub max_queue_size: usize,
	pub retry: RetryConfig,
	/// Drain the queue when the client shuts down.
	pub flush_on_shutdown: bool,
	/// Wait for the collector's `Retry-After` on 429 instead of the current backoff,
	/// capped at the retry `max_delay`.
	pub honor_retry_after: bool,
	/// Timeout for a single HTTP request.
	pub request_timeout: Duration,
	pub on_success: Option<SuccessCallback>,
	pub on_error: Option<ErrorCallback>,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			endpoint: DEFAULT_ENDPOINT.to_string(),
			write_key: String::new(),
			flush_interval: Duration::from_millis(2000),
			max_batch_size: 20,
			max_queue_size: 1000,
			retry: RetryConfig {
				max_attempts: 5,
				initial_delay: Duration::from_millis(1000),
				max_delay: MAX_RETRY_DELAY,
			},
			flush_on_shutdown: true,
			honor_retry_after: false,
			request_timeout: Duration::from_secs(10),
			on_success: None,
			on_error: None,
		}
	}
}

impl ClientConfig {
	/// Checks the settings and normalizes the endpoint and limits.
	pub fn validate(mut self) -> Result<Self> {
		if self.write_key.trim().is_empty() {
			return Err(TallyError::Configuration(
				"write key must not be empty".to_string(),
			));
		}

		let endpoint = self.endpoint.trim().trim_end_matches('/').to_string();
		let url = reqwest::Url::parse(&endpoint).map_err(|e| {
			TallyError::Configuration(format!("invalid endpoint {endpoint:?}: {e}"))
		})?;
		if !matches!(url.scheme(), "http" | "https") {
			return Err(TallyError::Configuration(format!(
				"endpoint must use http or https, got {}",
				url.scheme()
			)));
		}
		self.endpoint = endpoint;

		self.max_batch_size = effective_batch_size(self.max_batch_size);
		self.max_queue_size = self.max_queue_size.max(1);
		self.retry.max_delay = self.retry.max_delay.min(MAX_RETRY_DELAY);
		Ok(self)
	}

	/// Full URL of the batch endpoint.
	pub fn batch_url(&self) -> String {
		format!("{}/v1/batch", self.endpoint)
	}
}

impl fmt::Debug for ClientConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ClientConfig")
			.field("endpoint", &self.endpoint)
			.field("write_key", &"[REDACTED]")
			.field("flush_interval", &self.flush_interval)
			.field("max_batch_size", &self.max_batch_size)
			.field("max_queue_size", &self.max_queue_size)
			.field("retry", &self.retry)
			.field("flush_on_shutdown", &self.flush_on_shutdown)
			.field("honor_retry_after", &self.honor_retry_after)
			.field("request_timeout", &self.request_timeout)
			.field("on_success", &self.on_success.is_some())
			.field("on_error", &self.on_error.is_some())
			.finish()
	}
}
