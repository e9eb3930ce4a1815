// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Analytics events and their canonical wire form.
//!
//! An [`Event`] is built once by the producer and never changed after it is
//! handed to the client. Its JSON form uses camelCase keys and leaves out
//! every field that is absent or empty, so [`Event::estimate_size`] measures
//! exactly the bytes that end up in a batch request.

use std::fmt;
use std::io;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::properties::Properties;

/// Library name reported in [`Context::library`].
pub const SDK_NAME: &str = "tally-rust";
/// Library version reported in [`Context::library`].
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The kind of fact an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
	/// A user action with a name and optional properties.
	Track,
	/// Associates a user id with descriptive traits.
	Identify,
	/// Associates a user with an organization.
	Group,
}

impl fmt::Display for EventType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			EventType::Track => "track",
			EventType::Identify => "identify",
			EventType::Group => "group",
		};
		f.write_str(s)
	}
}

/// Name and version of the library that produced an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryInfo {
	pub name: String,
	pub version: String,
}

/// Optional metadata attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub library: Option<LibraryInfo>,
	#[serde(default, skip_serializing_if = "is_blank")]
	pub ip: Option<String>,
}

impl Context {
	/// Context naming this SDK as the producing library.
	pub fn library() -> Self {
		Self {
			library: Some(LibraryInfo {
				name: SDK_NAME.to_string(),
				version: SDK_VERSION.to_string(),
			}),
			ip: None,
		}
	}

	pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
		self.ip = Some(ip.into());
		self
	}

	/// True when serializing would produce `{}`.
	pub fn is_empty(&self) -> bool {
		self.library.is_none() && is_blank(&self.ip)
	}
}

/// One emitted analytics fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
	#[serde(rename = "type")]
	event_type: EventType,
	message_id: Uuid,
	#[serde(with = "timestamp_format")]
	timestamp: DateTime<Utc>,
	#[serde(rename = "event", default, skip_serializing_if = "is_blank")]
	event_name: Option<String>,
	#[serde(default, skip_serializing_if = "is_blank")]
	user_id: Option<String>,
	#[serde(default, skip_serializing_if = "is_blank")]
	group_id: Option<String>,
	#[serde(default, skip_serializing_if = "is_empty_payload")]
	properties: Option<Properties>,
	#[serde(default, skip_serializing_if = "is_empty_payload")]
	traits: Option<Properties>,
	#[serde(default, skip_serializing_if = "is_empty_context")]
	context: Option<Context>,
}

impl Event {
	/// Creates an event of the given type with a fresh message id and the
	/// current time. Never fails.
	pub fn new(event_type: EventType) -> Self {
		Self {
			event_type,
			message_id: Uuid::now_v7(),
			// Millisecond precision keeps the in-memory value equal to its wire form.
			timestamp: Utc::now().trunc_subsecs(3),
			event_name: None,
			user_id: None,
			group_id: None,
			properties: None,
			traits: None,
			context: None,
		}
	}

	/// A track event named `event_name`.
	pub fn track(event_name: impl Into<String>) -> Self {
		let mut event = Self::new(EventType::Track);
		event.event_name = Some(event_name.into());
		event
	}

	pub fn identify() -> Self {
		Self::new(EventType::Identify)
	}

	/// A group event associating the (optional) user with `group_id`.
	pub fn group(group_id: impl Into<String>) -> Self {
		Self::new(EventType::Group).with_group_id(group_id)
	}

	pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
		self.user_id = Some(user_id.into());
		self
	}

	pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
		self.group_id = Some(group_id.into());
		self
	}

	pub fn with_properties(mut self, properties: Properties) -> Self {
		self.properties = Some(properties);
		self
	}

	pub fn with_traits(mut self, traits: Properties) -> Self {
		self.traits = Some(traits);
		self
	}

	pub fn with_context(mut self, context: Context) -> Self {
		self.context = Some(context);
		self
	}

	pub fn event_type(&self) -> EventType {
		self.event_type
	}

	pub fn message_id(&self) -> Uuid {
		self.message_id
	}

	pub fn timestamp(&self) -> DateTime<Utc> {
		self.timestamp
	}

	pub fn event_name(&self) -> Option<&str> {
		self.event_name.as_deref()
	}

	pub fn user_id(&self) -> Option<&str> {
		self.user_id.as_deref()
	}

	pub fn group_id(&self) -> Option<&str> {
		self.group_id.as_deref()
	}

	pub fn properties(&self) -> Option<&Properties> {
		self.properties.as_ref()
	}

	pub fn traits(&self) -> Option<&Properties> {
		self.traits.as_ref()
	}

	pub fn context(&self) -> Option<&Context> {
		self.context.as_ref()
	}

	/// Byte length of the serialized event.
	///
	/// Counts the output of the same serializer the batch encoder uses,
	/// without allocating. An event that cannot be serialized reports
	/// `usize::MAX` so every size limit rejects it.
	pub fn estimate_size(&self) -> usize {
		let mut counter = ByteCounter(0);
		match serde_json::to_writer(&mut counter, self) {
			Ok(()) => counter.0,
			Err(_) => usize::MAX,
		}
	}

	/// Canonical JSON bytes for this event.
	pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
		serde_json::to_vec(self)
	}
}

struct ByteCounter(usize);

impl io::Write for ByteCounter {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.0 += buf.len();
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

fn is_blank(value: &Option<String>) -> bool {
	value.as_deref().map_or(true, str::is_empty)
}

// A missing payload and an empty one are different values but share a wire form.
fn is_empty_payload(value: &Option<Properties>) -> bool {
	value.as_ref().map_or(true, Properties::is_empty)
}

fn is_empty_context(value: &Option<Context>) -> bool {
	value.as_ref().map_or(true, Context::is_empty)
}

mod timestamp_format {
	use chrono::{DateTime, SecondsFormat, Utc};
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
		let raw = String::deserialize(deserializer)?;
		DateTime::parse_from_rfc3339(&raw)
			.map(|ts| ts.with_timezone(&Utc))
			.map_err(serde::de::Error::custom)
	}
}
