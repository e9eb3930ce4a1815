// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the Tally SDK.

use tally_core::Event;
use thiserror::Error;

/// Result type alias for SDK operations.
pub type Result<T> = std::result::Result<T, TallyError>;

/// Errors returned by the SDK.
#[derive(Debug, Clone, Error)]
pub enum TallyError {
	/// The client could not be constructed. The worker never started.
	#[error("configuration error: {0}")]
	Configuration(String),

	/// The client has been shut down.
	#[error("client is shutdown")]
	ClientShutdown,

	/// A batch could not be delivered.
	#[error(transparent)]
	Send(#[from] SendError),
}

/// A batch that reached a terminal failure.
///
/// Carries the undelivered events so callers and error callbacks can inspect
/// or re-submit them.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SendError {
	pub message: String,
	/// HTTP status of the last response, if the collector answered at all.
	pub status_code: Option<u16>,
	pub events: Vec<Event>,
}

impl SendError {
	pub fn new(message: impl Into<String>, status_code: Option<u16>, events: Vec<Event>) -> Self {
		Self {
			message: message.into(),
			status_code,
			events,
		}
	}
}

/// Failure of a single transport call, before any HTTP status was received
/// or while reading the response.
#[derive(Debug, Error)]
pub enum TransportError {
	/// Connection refused, DNS failure, timeout and similar.
	#[error("network error: {0}")]
	Network(String),

	/// The response body could not be read.
	#[error("failed to read response body: {0}")]
	Body(String),
}

impl From<reqwest::Error> for TransportError {
	fn from(e: reqwest::Error) -> Self {
		if e.is_body() || e.is_decode() {
			TransportError::Body(e.to_string())
		} else {
			TransportError::Network(e.to_string())
		}
	}
}
