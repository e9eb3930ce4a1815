// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Public client handle.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tally_core::{BatchResponse, Context, Event, Properties};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{Result, SendError, TallyError};
use crate::transport::{HttpTransport, Transport};
use crate::worker::{Command, Worker};

/// Builder for constructing a [`TallyClient`].
pub struct TallyClientBuilder {
	config: ClientConfig,
	transport: Option<Arc<dyn Transport>>,
}

impl TallyClientBuilder {
	/// Creates a builder with default settings and the given write key.
	pub fn new(write_key: impl Into<String>) -> Self {
		Self::from_config(ClientConfig {
			write_key: write_key.into(),
			..Default::default()
		})
	}

	/// Starts from a complete configuration.
	pub fn from_config(config: ClientConfig) -> Self {
		Self {
			config,
			transport: None,
		}
	}

	/// Sets the collector base URL.
	///
	/// Example: `https://collector.example.com`
	pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.config.endpoint = endpoint.into();
		self
	}

	pub fn flush_interval(mut self, interval: Duration) -> Self {
		self.config.flush_interval = interval;
		self
	}

	/// Sets the number of events per batch. Values above 100 are capped.
	pub fn max_batch_size(mut self, size: usize) -> Self {
		self.config.max_batch_size = size;
		self
	}

	pub fn max_queue_size(mut self, size: usize) -> Self {
		self.config.max_queue_size = size;
		self
	}

	/// Sets the total number of delivery attempts per batch.
	pub fn retry_max_attempts(mut self, attempts: u32) -> Self {
		self.config.retry.max_attempts = attempts;
		self
	}

	/// Sets the first retry delay. Later delays double, up to 16 seconds.
	pub fn retry_initial_delay(mut self, delay: Duration) -> Self {
		self.config.retry.initial_delay = delay;
		self
	}

	pub fn flush_on_shutdown(mut self, enabled: bool) -> Self {
		self.config.flush_on_shutdown = enabled;
		self
	}

	/// Waits for the collector's `Retry-After` on 429 responses instead of
	/// the current backoff delay. Waits are still capped at 16 seconds.
	pub fn honor_retry_after(mut self, enabled: bool) -> Self {
		self.config.honor_retry_after = enabled;
		self
	}

	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.config.request_timeout = timeout;
		self
	}

	/// Called once for every delivered batch.
	pub fn on_success<F>(mut self, callback: F) -> Self
	where
		F: Fn(&BatchResponse) + Send + Sync + 'static,
	{
		self.config.on_success = Some(Arc::new(callback));
		self
	}

	/// Called once for every batch that failed terminally.
	pub fn on_error<F>(mut self, callback: F) -> Self
	where
		F: Fn(&SendError) + Send + Sync + 'static,
	{
		self.config.on_error = Some(Arc::new(callback));
		self
	}

	/// Replaces the default HTTP transport.
	pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);
		self
	}

	/// Validates the configuration and starts the worker.
	///
	/// Must be called from within a Tokio runtime.
	pub fn build(self) -> Result<TallyClient> {
		let config = self.config.validate()?;

		let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
			TallyError::Configuration("client must be built inside a Tokio runtime".to_string())
		})?;

		let transport = match self.transport {
			Some(transport) => transport,
			None => Arc::new(HttpTransport::new(&config)?),
		};

		let endpoint = config.endpoint.clone();
		let worker = Worker::new(config, transport);
		let pending = worker.pending();
		let commands = worker.spawn(&runtime);

		info!(endpoint = %endpoint, "Analytics client initialized");

		Ok(TallyClient {
			inner: Arc::new(ClientInner {
				commands,
				pending,
				closed: AtomicBool::new(false),
			}),
		})
	}
}

struct ClientInner {
	commands: mpsc::Sender<Command>,
	pending: Arc<AtomicUsize>,
	closed: AtomicBool,
}

/// Handle for submitting analytics events.
///
/// Cheap to clone. All clones share one background worker; when the last
/// clone is dropped the worker shuts down as if [`TallyClient::shutdown`]
/// had been called.
///
/// # Example
///
/// ```ignore
/// use tally::{Properties, TallyClient};
///
/// let client = TallyClient::builder("wk_live_xxx")
///     .endpoint("https://collector.example.com")
///     .build()?;
///
/// client
///     .enqueue_track("user_1", "Signed Up", Some(Properties::new().insert("plan", "pro")))
///     .await;
///
/// client.shutdown().await?;
/// ```
#[derive(Clone)]
pub struct TallyClient {
	inner: Arc<ClientInner>,
}

impl TallyClient {
	pub fn builder(write_key: impl Into<String>) -> TallyClientBuilder {
		TallyClientBuilder::new(write_key)
	}

	/// Queues an event for batched delivery.
	///
	/// Returns once the worker has admitted the event. If admission fills a
	/// batch, that flush completes first. Events submitted after shutdown
	/// are ignored.
	pub async fn enqueue(&self, event: Event) {
		let (done, admitted) = oneshot::channel();
		if self
			.inner
			.commands
			.send(Command::Enqueue { event, done })
			.await
			.is_err()
		{
			debug!("Ignoring event, client is shutdown");
			return;
		}
		let _ = admitted.await;
	}

	pub async fn enqueue_track(
		&self,
		user_id: impl Into<String>,
		event_name: impl Into<String>,
		properties: Option<Properties>,
	) {
		self.enqueue(track_event(user_id, event_name, properties))
			.await
	}

	pub async fn enqueue_identify(&self, user_id: impl Into<String>, traits: Option<Properties>) {
		self.enqueue(identify_event(user_id, traits)).await
	}

	pub async fn enqueue_group(
		&self,
		user_id: impl Into<String>,
		group_id: impl Into<String>,
		traits: Option<Properties>,
	) {
		self.enqueue(group_event(user_id, group_id, traits)).await
	}

	/// Delivers one event immediately, bypassing the queue, and returns the
	/// collector's response.
	pub async fn send(&self, event: Event) -> Result<BatchResponse> {
		let (reply, response) = oneshot::channel();
		self.inner
			.commands
			.send(Command::Send { event, reply })
			.await
			.map_err(|_| TallyError::ClientShutdown)?;
		response.await.map_err(|_| TallyError::ClientShutdown)?
	}

	pub async fn track(
		&self,
		user_id: impl Into<String>,
		event_name: impl Into<String>,
		properties: Option<Properties>,
	) -> Result<BatchResponse> {
		self.send(track_event(user_id, event_name, properties)).await
	}

	pub async fn identify(
		&self,
		user_id: impl Into<String>,
		traits: Option<Properties>,
	) -> Result<BatchResponse> {
		self.send(identify_event(user_id, traits)).await
	}

	pub async fn group(
		&self,
		user_id: impl Into<String>,
		group_id: impl Into<String>,
		traits: Option<Properties>,
	) -> Result<BatchResponse> {
		self.send(group_event(user_id, group_id, traits)).await
	}

	/// Delivers every pending event and waits until each batch has
	/// succeeded or failed terminally.
	pub async fn flush(&self) -> Result<()> {
		let (done, flushed) = oneshot::channel();
		self.inner
			.commands
			.send(Command::Flush { done })
			.await
			.map_err(|_| TallyError::ClientShutdown)?;
		flushed.await.map_err(|_| TallyError::ClientShutdown)?
	}

	/// Stops the timer, drains the queue if configured to, and rejects all
	/// later work.
	///
	/// Safe to call more than once. Every call returns only after the drain
	/// has finished, including calls racing with the first one.
	pub async fn shutdown(&self) -> Result<()> {
		self.inner.closed.store(true, Ordering::SeqCst);

		// Always goes through the worker so every caller waits for the drain.
		let (done, stopped) = oneshot::channel();
		if self
			.inner
			.commands
			.send(Command::Shutdown { done })
			.await
			.is_ok()
		{
			let _ = stopped.await;
		}

		debug!("Analytics client shutdown complete");
		Ok(())
	}

	/// Number of events not yet delivered, including a batch that is
	/// currently being sent or retried. Never blocks.
	pub fn queue_size(&self) -> usize {
		self.inner.pending.load(Ordering::SeqCst)
	}

	pub fn is_shutdown(&self) -> bool {
		self.inner.closed.load(Ordering::SeqCst)
	}
}

fn track_event(
	user_id: impl Into<String>,
	event_name: impl Into<String>,
	properties: Option<Properties>,
) -> Event {
	let mut event = Event::track(event_name)
		.with_user_id(user_id)
		.with_context(Context::library());
	if let Some(properties) = properties {
		event = event.with_properties(properties);
	}
	event
}

fn identify_event(user_id: impl Into<String>, traits: Option<Properties>) -> Event {
	let mut event = Event::identify()
		.with_user_id(user_id)
		.with_context(Context::library());
	if let Some(traits) = traits {
		event = event.with_traits(traits);
	}
	event
}

fn group_event(
	user_id: impl Into<String>,
	group_id: impl Into<String>,
	traits: Option<Properties>,
) -> Event {
	let mut event = Event::group(group_id)
		.with_user_id(user_id)
		.with_context(Context::library());
	if let Some(traits) = traits {
		event = event.with_traits(traits);
	}
	event
}
