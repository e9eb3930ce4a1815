// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scripted transport shared by unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;

use crate::error::TransportError;
use crate::transport::{Transport, TransportResponse};

/// One request seen by [`MockTransport`].
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
	pub body: serde_json::Value,
	pub write_key: String,
	pub at: Instant,
}

impl RecordedRequest {
	/// The `event` names in the request's batch, in order.
	pub fn event_names(&self) -> Vec<String> {
		self.body["batch"]
			.as_array()
			.map(|batch| {
				batch
					.iter()
					.map(|e| e["event"].as_str().unwrap_or_default().to_string())
					.collect()
			})
			.unwrap_or_default()
	}
}

type Scripted = Result<TransportResponse, TransportError>;

/// Replies from a script, then with `200 {}` once the script runs out.
#[derive(Default)]
pub(crate) struct MockTransport {
	script: Mutex<VecDeque<Scripted>>,
	requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn push_status(&self, status: u16) {
		self.push_response(status, "");
	}

	pub fn push_response(&self, status: u16, body: &str) {
		self.push(Ok(TransportResponse {
			status,
			body: body.as_bytes().to_vec(),
			retry_after: None,
		}));
	}

	pub fn push_rate_limited(&self, retry_after: Option<Duration>) {
		self.push(Ok(TransportResponse {
			status: 429,
			body: Vec::new(),
			retry_after,
		}));
	}

	pub fn push_network_error(&self) {
		self.push(Err(TransportError::Network("connection refused".to_string())));
	}

	fn push(&self, reply: Scripted) {
		self.script.lock().unwrap().push_back(reply);
	}

	pub fn requests(&self) -> Vec<RecordedRequest> {
		self.requests.lock().unwrap().clone()
	}

	pub fn call_count(&self) -> usize {
		self.requests.lock().unwrap().len()
	}

	/// Event names per request.
	pub fn batches(&self) -> Vec<Vec<String>> {
		self.requests().iter().map(RecordedRequest::event_names).collect()
	}
}

#[async_trait]
impl Transport for MockTransport {
	async fn send(&self, body: Bytes, write_key: &str) -> Scripted {
		self.requests.lock().unwrap().push(RecordedRequest {
			body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
			write_key: write_key.to_string(),
			at: Instant::now(),
		});

		self.script
			.lock()
			.unwrap()
			.pop_front()
			.unwrap_or_else(|| {
				Ok(TransportResponse {
					status: 200,
					body: b"{}".to_vec(),
					retry_after: None,
				})
			})
	}
}
