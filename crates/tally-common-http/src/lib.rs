// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared HTTP utilities for Tally.
//!
//! This crate provides:
//! - A pre-configured HTTP client builder with a consistent User-Agent header
//! - Exponential backoff bookkeeping for retrying transient failures

mod client;
mod retry;

pub use client::{builder, user_agent};
pub use retry::{parse_retry_after, Backoff, RetryConfig};
