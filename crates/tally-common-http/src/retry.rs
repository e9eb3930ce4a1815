// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Exponential backoff for retrying transient HTTP failures.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};

/// Retry limits for a single delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
	/// Total attempts including the first one. Zero is treated as one.
	pub max_attempts: u32,
	/// Delay before the first retry.
	pub initial_delay: Duration,
	/// Upper bound for any single delay.
	pub max_delay: Duration,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 5,
			initial_delay: Duration::from_millis(1000),
			max_delay: Duration::from_millis(16_000),
		}
	}
}

impl RetryConfig {
	pub fn attempts(&self) -> u32 {
		self.max_attempts.max(1)
	}

	/// A fresh backoff sequence starting at `initial_delay`.
	pub fn backoff(&self) -> Backoff {
		Backoff::new(self.initial_delay, self.max_delay)
	}
}

/// Doubling delay sequence, capped at a maximum.
#[derive(Debug, Clone)]
pub struct Backoff {
	current: Duration,
	max: Duration,
}

impl Backoff {
	pub fn new(initial: Duration, max: Duration) -> Self {
		Self {
			current: initial.min(max),
			max,
		}
	}

	/// The delay to wait before the next retry.
	pub fn current(&self) -> Duration {
		self.current
	}

	/// Doubles the delay, saturating at the cap.
	pub fn advance(&mut self) {
		self.current = self.current.saturating_mul(2).min(self.max);
	}
}

/// Reads a `Retry-After` header expressed in whole seconds.
///
/// HTTP-date values are not supported and yield `None`.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	headers
		.get(RETRY_AFTER)?
		.to_str()
		.ok()?
		.trim()
		.parse::<u64>()
		.ok()
		.map(Duration::from_secs)
}
