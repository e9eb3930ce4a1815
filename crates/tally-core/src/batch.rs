// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Splitting pending events into size-bounded batches.

use serde::Serialize;

use crate::event::Event;

/// Largest accepted serialized event, in bytes.
pub const MAX_EVENT_BYTES: usize = 200 * 1024;
/// Largest accepted cumulative serialized batch, in bytes.
pub const MAX_BATCH_BYTES: usize = 10 * 1024 * 1024;
/// Largest accepted number of events in one batch.
pub const MAX_BATCH_EVENTS: usize = 100;

/// Clamps a configured batch size into `1..=MAX_BATCH_EVENTS`.
pub fn effective_batch_size(configured: usize) -> usize {
	configured.clamp(1, MAX_BATCH_EVENTS)
}

/// Returns how many events from the front of `events` form the next batch.
///
/// The batch holds at most `effective_batch_size(max_batch_size)` events and
/// its cumulative estimated size stays within [`MAX_BATCH_BYTES`]. The first
/// event is always taken, so a non-empty input never yields an empty batch.
pub fn next_batch_len<'a, I>(events: I, max_batch_size: usize) -> usize
where
	I: IntoIterator<Item = &'a Event>,
{
	let max_events = effective_batch_size(max_batch_size);
	let mut count = 0;
	let mut bytes = 0usize;

	for event in events.into_iter().take(max_events) {
		let size = event.estimate_size();
		if count > 0 && bytes.saturating_add(size) > MAX_BATCH_BYTES {
			break;
		}
		bytes = bytes.saturating_add(size);
		count += 1;
	}

	count
}

/// Splits `events` into the next batch and the remaining tail.
pub fn split_batch(events: &[Event], max_batch_size: usize) -> (&[Event], &[Event]) {
	events.split_at(next_batch_len(events, max_batch_size))
}

/// Iterator over consecutive batches of a slice, in order.
pub struct Batches<'a> {
	remaining: &'a [Event],
	max_batch_size: usize,
}

impl<'a> Batches<'a> {
	pub fn new(events: &'a [Event], max_batch_size: usize) -> Self {
		Self {
			remaining: events,
			max_batch_size,
		}
	}
}

impl<'a> Iterator for Batches<'a> {
	type Item = &'a [Event];

	fn next(&mut self) -> Option<Self::Item> {
		if self.remaining.is_empty() {
			return None;
		}
		let (batch, rest) = split_batch(self.remaining, self.max_batch_size);
		self.remaining = rest;
		Some(batch)
	}
}

#[derive(Serialize)]
struct BatchPayload<'a> {
	batch: &'a [Event],
}

/// Encodes events as a `{"batch": [...]}` request body.
pub fn encode_batch(events: &[Event]) -> serde_json::Result<Vec<u8>> {
	serde_json::to_vec(&BatchPayload { batch: events })
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::Properties;
	use proptest::prelude::*;

	fn track(name: &str) -> Event {
		Event::track(name).with_user_id("user")
	}

	/// An event whose serialized size is close to `bytes`.
	fn sized(bytes: usize) -> Event {
		Event::track("big").with_properties(Properties::new().insert("blob", "x".repeat(bytes)))
	}

	#[test]
	fn test_count_limit() {
		let events: Vec<_> = (0..5).map(|i| track(&format!("e{i}"))).collect();
		assert_eq!(next_batch_len(&events, 3), 3);
		assert_eq!(next_batch_len(&events[3..], 3), 2);
	}

	#[test]
	fn test_configured_size_is_capped_at_hard_ceiling() {
		let events: Vec<_> = (0..150).map(|i| track(&format!("e{i}"))).collect();
		assert_eq!(next_batch_len(&events, 500), MAX_BATCH_EVENTS);
		assert_eq!(effective_batch_size(0), 1);
	}

	#[test]
	fn test_byte_limit_splits_batches() {
		// Each event is just under 200 KiB, so 51 of them exceed 10 MiB.
		let events: Vec<_> = (0..60).map(|_| sized(MAX_EVENT_BYTES - 1024)).collect();
		let first = next_batch_len(&events, 100);

		let total: usize = events[..first].iter().map(Event::estimate_size).sum();
		assert!(total <= MAX_BATCH_BYTES);
		assert!(first < 60);
		assert!(first > 1);
	}

	#[test]
	fn test_first_event_always_included() {
		let events = vec![sized(MAX_BATCH_BYTES + 10), track("small")];
		let (batch, rest) = split_batch(&events, 20);
		assert_eq!(batch.len(), 1);
		assert_eq!(rest.len(), 1);
	}

	#[test]
	fn test_empty_input() {
		assert_eq!(next_batch_len(&[], 10), 0);
		assert_eq!(Batches::new(&[], 10).count(), 0);
	}

	#[test]
	fn test_five_events_batch_three() {
		let events: Vec<_> = (1..=5).map(|i| track(&format!("e{i}"))).collect();
		let batches: Vec<_> = Batches::new(&events, 3).collect();

		assert_eq!(batches.len(), 2);
		assert_eq!(batches[0], &events[0..3]);
		assert_eq!(batches[1], &events[3..5]);
	}

	#[test]
	fn test_encode_batch_shape() {
		let events = vec![track("a"), track("b")];
		let body: serde_json::Value = serde_json::from_slice(&encode_batch(&events).unwrap()).unwrap();

		let batch = body["batch"].as_array().unwrap();
		assert_eq!(batch.len(), 2);
		assert_eq!(batch[0]["event"], "a");
		assert_eq!(batch[1]["event"], "b");
	}

	proptest! {
		#[test]
		fn batches_preserve_order_and_bounds(count in 0usize..250, max in 0usize..150) {
			let events: Vec<_> = (0..count).map(|i| track(&format!("e{i}"))).collect();
			let batches: Vec<_> = Batches::new(&events, max).collect();

			let limit = effective_batch_size(max);
			prop_assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= limit));

			let flattened: Vec<Event> = batches.concat();
			prop_assert_eq!(flattened, events);
		}
	}
}
