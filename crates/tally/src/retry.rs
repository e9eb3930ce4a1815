// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Driving one batch through bounded retries.
//!
//! Each attempt's result is classified into a [`DeliveryOutcome`]:
//!
//! | Response | Outcome | Next step |
//! |----------|---------|-----------|
//! | 2xx | `Accepted` | done |
//! | 400, 401 | `PermanentFailure` | fail immediately |
//! | 429 | `RateLimited` | wait, retry |
//! | other status | `TransientServerError` | wait, retry |
//! | no response | `NetworkError` | wait, retry |
//!
//! Waits follow a doubling backoff that restarts for every batch.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tally_common_http::RetryConfig;
use tally_core::{encode_batch, BatchResponse, Event};
use tracing::{debug, warn};

use crate::error::{SendError, TransportError};
use crate::transport::{Transport, TransportResponse};

/// Classified result of a single transport call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
	/// The collector took the batch. Some events may still have been rejected.
	Accepted(BatchResponse),
	/// The collector refused the request. Retrying cannot help.
	PermanentFailure { status: u16, body: String },
	RateLimited { retry_after: Option<Duration> },
	TransientServerError { status: u16 },
	NetworkError { cause: String },
}

impl DeliveryOutcome {
	/// Classifies a transport result for a batch of `batch_len` events.
	pub fn classify(
		result: Result<TransportResponse, TransportError>,
		batch_len: usize,
	) -> Self {
		let response = match result {
			Ok(response) => response,
			Err(e) => {
				return DeliveryOutcome::NetworkError {
					cause: e.to_string(),
				}
			}
		};

		match response.status {
			200..=299 => DeliveryOutcome::Accepted(BatchResponse::parse_or_accept_all(
				&response.body,
				batch_len,
			)),
			400 | 401 => DeliveryOutcome::PermanentFailure {
				status: response.status,
				body: String::from_utf8_lossy(&response.body).into_owned(),
			},
			429 => DeliveryOutcome::RateLimited {
				retry_after: response.retry_after,
			},
			status => DeliveryOutcome::TransientServerError { status },
		}
	}
}

/// Delivers batches through a [`Transport`], retrying transient failures.
pub(crate) struct RetryScheduler {
	transport: Arc<dyn Transport>,
	write_key: String,
	retry: RetryConfig,
	honor_retry_after: bool,
}

impl RetryScheduler {
	pub fn new(
		transport: Arc<dyn Transport>,
		write_key: String,
		retry: RetryConfig,
		honor_retry_after: bool,
	) -> Self {
		Self {
			transport,
			write_key,
			retry,
			honor_retry_after,
		}
	}

	/// Runs the attempt loop for `batch` until it is accepted, rejected, or
	/// out of attempts.
	///
	/// Sleeps between attempts on the calling task.
	pub async fn deliver(&self, batch: Vec<Event>) -> Result<BatchResponse, SendError> {
		let body = match encode_batch(&batch) {
			Ok(body) => Bytes::from(body),
			Err(e) => {
				return Err(SendError::new(
					format!("failed to encode batch: {e}"),
					None,
					batch,
				))
			}
		};

		let attempts = self.retry.attempts();
		let mut backoff = self.retry.backoff();
		let mut last_failure = String::new();
		let mut last_status = None;

		for attempt in 1..=attempts {
			let result = self.transport.send(body.clone(), &self.write_key).await;

			let wait = match DeliveryOutcome::classify(result, batch.len()) {
				DeliveryOutcome::Accepted(response) => {
					debug!(
						attempt,
						events = batch.len(),
						accepted = response.accepted,
						failed = response.failed,
						"Batch delivered"
					);
					return Ok(response);
				}
				DeliveryOutcome::PermanentFailure { status, body } => {
					return Err(SendError::new(
						format!("collector rejected batch with status {status}: {body}"),
						Some(status),
						batch,
					));
				}
				DeliveryOutcome::RateLimited { retry_after } => {
					last_status = Some(429);
					last_failure = "rate limited (429)".to_string();
					match retry_after.filter(|_| self.honor_retry_after) {
						// Never longer than the backoff cap.
						Some(delay) => delay.min(self.retry.max_delay),
						None => backoff.current(),
					}
				}
				DeliveryOutcome::TransientServerError { status } => {
					last_status = Some(status);
					last_failure = format!("server error ({status})");
					backoff.current()
				}
				DeliveryOutcome::NetworkError { cause } => {
					last_status = None;
					last_failure = cause;
					backoff.current()
				}
			};

			if attempt == attempts {
				break;
			}

			warn!(
				attempt,
				max_attempts = attempts,
				delay_ms = wait.as_millis() as u64,
				failure = %last_failure,
				"Batch delivery failed, retrying"
			);
			tokio::time::sleep(wait).await;
			backoff.advance();
		}

		Err(SendError::new(
			format!("batch delivery failed after {attempts} attempts: {last_failure}"),
			last_status,
			batch,
		))
	}
}


#[cfg(test)]
mod proptests {
	use super::*;
	use proptest::prelude::*;

	fn classify_status(status: u16) -> DeliveryOutcome {
		DeliveryOutcome::classify(
			Ok(TransportResponse {
				status,
				body: Vec::new(),
				retry_after: None,
			}),
			3,
		)
	}

	proptest! {
		#[test]
		fn success_statuses_accept_whole_batch(status in 200u16..300) {
			match classify_status(status) {
				DeliveryOutcome::Accepted(response) => {
					prop_assert_eq!(response.accepted, 3);
					prop_assert_eq!(response.failed, 0);
				}
				other => prop_assert!(false, "unexpected outcome: {:?}", other),
			}
		}

		#[test]
		fn server_errors_are_transient(status in 500u16..600) {
			prop_assert_eq!(
				classify_status(status),
				DeliveryOutcome::TransientServerError { status }
			);
		}
	}
}
