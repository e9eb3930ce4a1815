// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! HTTP client builder with the Tally User-Agent header.

use reqwest::{Client, ClientBuilder};

/// Creates an HTTP client builder with the standard Tally User-Agent header.
///
/// # Example
/// ```ignore
/// let client = tally_common_http::builder()
///     .timeout(Duration::from_secs(10))
///     .build()?;
/// ```
pub fn builder() -> ClientBuilder {
	Client::builder().user_agent(user_agent())
}

/// Returns the standard User-Agent string.
///
/// Format: `tally-rust/{version}`
pub fn user_agent() -> String {
	format!("tally-rust/{}", env!("CARGO_PKG_VERSION"))
}
