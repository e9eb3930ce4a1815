// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Collector response body for a batch request.

use serde::{Deserialize, Serialize};

/// Per-event rejection reported by the collector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventError {
	/// Position of the event within the submitted batch.
	pub index: usize,
	pub message: String,
	pub code: String,
}

/// Decoded body of a successful batch request.
///
/// Every field is optional on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchResponse {
	pub status: String,
	pub accepted: usize,
	pub failed: usize,
	pub errors: Option<Vec<EventError>>,
}

impl Default for BatchResponse {
	fn default() -> Self {
		Self {
			status: "ok".to_string(),
			accepted: 0,
			failed: 0,
			errors: None,
		}
	}
}

impl BatchResponse {
	/// Response assumed when the collector's body cannot be decoded.
	pub fn all_accepted(count: usize) -> Self {
		Self {
			accepted: count,
			..Self::default()
		}
	}

	/// Decodes a response body, treating unparseable bodies as full acceptance
	/// of `batch_len` events.
	pub fn parse_or_accept_all(body: &[u8], batch_len: usize) -> Self {
		serde_json::from_slice(body).unwrap_or_else(|_| Self::all_accepted(batch_len))
	}

	/// True when some events in the batch were rejected.
	pub fn is_partial(&self) -> bool {
		self.failed > 0
	}

	pub fn event_errors(&self) -> &[EventError] {
		self.errors.as_deref().unwrap_or_default()
	}
}
