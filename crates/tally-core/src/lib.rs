// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Tally analytics SDK.
//!
//! This crate has no I/O. It provides:
//! - [`Event`]: track, identify and group events with their canonical JSON form
//! - [`Properties`]: key/value payloads for properties and traits
//! - Batch splitting under the collector's count and byte limits
//! - [`BatchResponse`]: the collector's reply to a batch request

pub mod batch;
mod event;
mod properties;
mod response;

pub use batch::{
	effective_batch_size, encode_batch, next_batch_len, split_batch, Batches, MAX_BATCH_BYTES,
	MAX_BATCH_EVENTS, MAX_EVENT_BYTES,
};
pub use event::{Context, Event, EventType, LibraryInfo, SDK_NAME, SDK_VERSION};
pub use properties::Properties;
pub use response::{BatchResponse, EventError};
