// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rust SDK for delivering analytics events to a Tally collector.
//!
//! Events are queued in memory and delivered in batches by a single
//! background task. A batch is sent when it fills up, when the flush timer
//! fires, on [`TallyClient::flush`], and on [`TallyClient::shutdown`].
//! Failed deliveries are retried with exponential backoff.
//!
//! # Example
//!
//! ```ignore
//! use tally::{Properties, TallyClient};
//!
//! #[tokio::main]
//! async fn main() -> tally::Result<()> {
//!     let client = TallyClient::builder("wk_live_xxx")
//!         .endpoint("https://collector.example.com")
//!         .on_error(|err| eprintln!("dropped {} events: {err}", err.events.len()))
//!         .build()?;
//!
//!     client
//!         .enqueue_track("user_1", "Signed Up", Some(Properties::new().insert("plan", "pro")))
//!         .await;
//!
//!     // Bypasses the queue and waits for the collector.
//!     let response = client.identify("user_1", None).await?;
//!     assert!(!response.is_partial());
//!
//!     client.shutdown().await
//! }
//! ```

mod client;
mod config;
mod error;
mod retry;
mod transport;
mod worker;

#[cfg(test)]
mod testing;

pub use client::{TallyClient, TallyClientBuilder};
pub use config::{ClientConfig, ErrorCallback, SuccessCallback, DEFAULT_ENDPOINT, MAX_RETRY_DELAY};
pub use error::{Result, SendError, TallyError, TransportError};
pub use retry::DeliveryOutcome;
pub use transport::{HttpTransport, Transport, TransportResponse};

pub use tally_common_http::RetryConfig;
pub use tally_core::{
	BatchResponse, Context, Event, EventError, EventType, LibraryInfo, Properties,
	MAX_BATCH_BYTES, MAX_BATCH_EVENTS, MAX_EVENT_BYTES,
};
