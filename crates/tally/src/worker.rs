// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The background task that owns the pending queue.
//!
//! All queue mutations, flushes and immediate sends run inside one task,
//! one command at a time. Clients talk to it through [`Command`]s, each of
//! which carries a reply channel that is answered once the command has been
//! fully processed, including any flush it triggered.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tally_core::{next_batch_len, BatchResponse, Event, MAX_EVENT_BYTES};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{ClientConfig, ErrorCallback, SuccessCallback};
use crate::error::{Result, SendError, TallyError};
use crate::retry::RetryScheduler;
use crate::transport::Transport;

/// Capacity of the command channel between clients and the worker.
const COMMAND_BUFFER: usize = 1024;

/// Request sent from a client handle to the worker.
#[derive(Debug)]
pub(crate) enum Command {
	/// Queue an event. Answered after admission and any triggered flush.
	Enqueue {
		event: Event,
		done: oneshot::Sender<()>,
	},
	/// Drain the queue.
	Flush { done: oneshot::Sender<Result<()>> },
	/// Deliver one event right away, bypassing the queue.
	Send {
		event: Event,
		reply: oneshot::Sender<Result<BatchResponse>>,
	},
	Shutdown { done: oneshot::Sender<()> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerState {
	Running,
	/// Terminal. Commands are ignored or rejected.
	ShuttingDown,
}

pub(crate) struct Worker {
	scheduler: RetryScheduler,
	queue: VecDeque<Event>,
	/// Undelivered event count published for lock-free size queries.
	pending: Arc<AtomicUsize>,
	state: WorkerState,
	flush_interval: Duration,
	max_batch_size: usize,
	max_queue_size: usize,
	flush_on_shutdown: bool,
	on_success: Option<SuccessCallback>,
	on_error: Option<ErrorCallback>,
}

impl Worker {
	/// Creates a worker from a validated configuration.
	pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
		let scheduler = RetryScheduler::new(
			transport,
			config.write_key,
			config.retry,
			config.honor_retry_after,
		);

		Self {
			scheduler,
			queue: VecDeque::new(),
			pending: Arc::new(AtomicUsize::new(0)),
			state: WorkerState::Running,
			flush_interval: config.flush_interval,
			max_batch_size: config.max_batch_size,
			max_queue_size: config.max_queue_size,
			flush_on_shutdown: config.flush_on_shutdown,
			on_success: config.on_success,
			on_error: config.on_error,
		}
	}

	/// Shared counter mirroring the queue length.
	pub fn pending(&self) -> Arc<AtomicUsize> {
		Arc::clone(&self.pending)
	}

	/// Starts the worker on `runtime` and returns the command sender.
	pub fn spawn(self, runtime: &Handle) -> mpsc::Sender<Command> {
		let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
		runtime.spawn(self.run(rx));
		tx
	}

	async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
		info!(
			flush_interval_ms = self.flush_interval.as_millis() as u64,
			max_batch_size = self.max_batch_size,
			max_queue_size = self.max_queue_size,
			"Starting analytics worker"
		);

		let timer = tokio::time::sleep(self.flush_interval);
		tokio::pin!(timer);

		loop {
			tokio::select! {
				command = commands.recv() => match command {
					Some(command) => self.handle(command).await,
					None => {
						// Every client handle is gone.
						self.shutdown().await;
						break;
					}
				},
				() = &mut timer, if self.state == WorkerState::Running => {
					self.on_tick().await;
					// Rearmed only after the tick's work, so flush cycles never overlap.
					timer.as_mut().reset(Instant::now() + self.flush_interval);
				}
			}
		}

		info!("Analytics worker stopped");
	}

	async fn handle(&mut self, command: Command) {
		match command {
			Command::Enqueue { event, done } => {
				self.enqueue(event).await;
				let _ = done.send(());
			}
			Command::Flush { done } => {
				let result = match self.state {
					WorkerState::Running => {
						self.flush().await;
						Ok(())
					}
					WorkerState::ShuttingDown => Err(TallyError::ClientShutdown),
				};
				let _ = done.send(result);
			}
			Command::Send { event, reply } => {
				let result = self.send_now(event).await;
				let _ = reply.send(result);
			}
			Command::Shutdown { done } => {
				self.shutdown().await;
				let _ = done.send(());
			}
		}
	}

	async fn on_tick(&mut self) {
		if self.queue.is_empty() {
			return;
		}
		debug!(pending = self.queue.len(), "Timer flush");
		self.flush().await;
	}

	pub(crate) async fn enqueue(&mut self, event: Event) {
		if self.state == WorkerState::ShuttingDown {
			debug!(message_id = %event.message_id(), "Ignoring event, client is shutdown");
			return;
		}

		let size = event.estimate_size();
		if size > MAX_EVENT_BYTES {
			warn!(
				message_id = %event.message_id(),
				event_type = %event.event_type(),
				size,
				limit = MAX_EVENT_BYTES,
				"Dropping oversized event"
			);
			return;
		}

		while self.queue.len() >= self.max_queue_size {
			if let Some(evicted) = self.queue.pop_front() {
				warn!(
					message_id = %evicted.message_id(),
					event_type = %evicted.event_type(),
					"Dropped oldest event due to queue overflow"
				);
			}
		}

		self.queue.push_back(event);
		self.publish_len();

		if self.queue.len() >= self.max_batch_size {
			self.flush().await;
		}
	}

	/// Delivers every pending event, one batch at a time, oldest first.
	pub(crate) async fn flush(&mut self) {
		while !self.queue.is_empty() {
			let len = next_batch_len(&self.queue, self.max_batch_size);
			let batch: Vec<Event> = self.queue.drain(..len).collect();
			debug!(
				events = batch.len(),
				remaining = self.queue.len(),
				"Flushing batch"
			);

			// The published count keeps the batch until its delivery ends.
			let result = self.scheduler.deliver(batch).await;
			self.publish_len();
			self.report(&result);
		}
	}

	pub(crate) async fn send_now(&mut self, event: Event) -> Result<BatchResponse> {
		if self.state == WorkerState::ShuttingDown {
			return Err(TallyError::ClientShutdown);
		}

		let size = event.estimate_size();
		let result = if size > MAX_EVENT_BYTES {
			Err(SendError::new(
				format!("event is {size} bytes, limit is {MAX_EVENT_BYTES}"),
				None,
				vec![event],
			))
		} else {
			self.scheduler.deliver(vec![event]).await
		};

		self.report(&result);
		result.map_err(TallyError::from)
	}

	pub(crate) async fn shutdown(&mut self) {
		if self.state == WorkerState::ShuttingDown {
			return;
		}

		info!(
			pending = self.queue.len(),
			flush_on_shutdown = self.flush_on_shutdown,
			"Shutting down analytics worker"
		);

		if self.flush_on_shutdown {
			self.flush().await;
		}

		if !self.queue.is_empty() {
			warn!(
				discarded = self.queue.len(),
				"Discarding undelivered events on shutdown"
			);
			self.queue.clear();
			self.publish_len();
		}

		self.state = WorkerState::ShuttingDown;
	}

	fn publish_len(&self) {
		self.pending.store(self.queue.len(), Ordering::SeqCst);
	}

	/// Logs a terminal outcome and hands it to the matching callback.
	fn report(&self, result: &std::result::Result<BatchResponse, SendError>) {
		match result {
			Ok(response) => {
				if response.is_partial() {
					let codes: Vec<&str> = response
						.event_errors()
						.iter()
						.map(|e| e.code.as_str())
						.collect();
					warn!(
						accepted = response.accepted,
						failed = response.failed,
						codes = ?codes,
						"Collector rejected some events"
					);
				}
				if let Some(callback) = &self.on_success {
					invoke_callback("on_success", || callback(response));
				}
			}
			Err(err) => {
				error!(
					error = %err,
					status = ?err.status_code,
					events = err.events.len(),
					"Batch delivery failed"
				);
				if let Some(callback) = &self.on_error {
					invoke_callback("on_error", || callback(err));
				}
			}
		}
	}
}

/// Runs a user callback, containing any panic.
fn invoke_callback(name: &'static str, callback: impl FnOnce()) {
	if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(callback)) {
		let message = panic
			.downcast_ref::<&str>()
			.map(|s| s.to_string())
			.or_else(|| panic.downcast_ref::<String>().cloned())
			.unwrap_or_else(|| "non-string panic payload".to_string());
		error!(callback = name, panic = %message, "Callback panicked");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::MockTransport;
	use std::sync::Mutex;
	use tally_core::Properties;

	fn config() -> ClientConfig {
		ClientConfig {
			write_key: "wk_test".to_string(),
			..Default::default()
		}
		.validate()
		.unwrap()
	}

	fn track(name: &str) -> Event {
		Event::track(name).with_user_id("user_1")
	}

	#[tokio::test(start_paused = true)]
	async fn test_flush_splits_into_ordered_batches() {
		let transport = MockTransport::new();
		let mut worker = Worker::new(
			ClientConfig {
				max_batch_size: 3,
				..config()
			},
			transport.clone(),
		);

		// Below the threshold, nothing is sent yet.
		worker.enqueue(track("e1")).await;
		worker.enqueue(track("e2")).await;
		assert_eq!(transport.call_count(), 0);

		worker.queue.push_back(track("e3"));
		worker.queue.push_back(track("e4"));
		worker.queue.push_back(track("e5"));
		worker.flush().await;

		assert_eq!(
			transport.batches(),
			vec![vec!["e1", "e2", "e3"], vec!["e4", "e5"]]
		);
		assert!(worker.queue.is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn test_reaching_batch_size_flushes_before_returning() {
		let transport = MockTransport::new();
		let mut worker = Worker::new(
			ClientConfig {
				max_batch_size: 3,
				..config()
			},
			transport.clone(),
		);

		for i in 1..=5 {
			worker.enqueue(track(&format!("e{i}"))).await;
		}

		assert_eq!(transport.batches(), vec![vec!["e1", "e2", "e3"]]);
		assert_eq!(worker.pending.load(Ordering::SeqCst), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn test_overflow_evicts_oldest() {
		let transport = MockTransport::new();
		let mut worker = Worker::new(
			ClientConfig {
				max_batch_size: 100,
				max_queue_size: 3,
				..config()
			},
			transport.clone(),
		);

		for i in 0..5 {
			worker.enqueue(track(&format!("e{i}"))).await;
		}
		assert_eq!(worker.queue.len(), 3);
		assert_eq!(worker.pending.load(Ordering::SeqCst), 3);

		worker.flush().await;
		assert_eq!(transport.batches(), vec![vec!["e2", "e3", "e4"]]);
	}

	#[tokio::test(start_paused = true)]
	async fn test_oversized_event_is_dropped() {
		let transport = MockTransport::new();
		let mut worker = Worker::new(config(), transport.clone());

		let huge = Event::track("huge")
			.with_properties(Properties::new().insert("blob", "x".repeat(MAX_EVENT_BYTES)));
		worker.enqueue(huge).await;
		worker.enqueue(track("small")).await;
		worker.flush().await;

		assert_eq!(transport.batches(), vec![vec!["small"]]);
	}

	#[tokio::test(start_paused = true)]
	async fn test_failed_batch_is_not_requeued() {
		let transport = MockTransport::new();
		transport.push_status(400);
		let errors = Arc::new(Mutex::new(Vec::new()));
		let seen = errors.clone();

		let mut worker = Worker::new(
			ClientConfig {
				on_error: Some(Arc::new(move |err: &SendError| {
					seen.lock().unwrap().push((err.status_code, err.events.len()));
				})),
				..config()
			},
			transport.clone(),
		);

		worker.enqueue(track("a")).await;
		worker.enqueue(track("b")).await;
		worker.flush().await;
		worker.flush().await;

		assert_eq!(transport.call_count(), 1);
		assert_eq!(*errors.lock().unwrap(), vec![(Some(400), 2)]);
		assert_eq!(worker.pending.load(Ordering::SeqCst), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_success_callback_once_per_batch_with_partial_failure() {
		let transport = MockTransport::new();
		transport.push_response(
			200,
			r#"{"accepted":1,"failed":1,"errors":[{"index":0,"message":"bad","code":"invalid"}]}"#,
		);
		let responses = Arc::new(Mutex::new(Vec::new()));
		let seen = responses.clone();

		let mut worker = Worker::new(
			ClientConfig {
				max_batch_size: 2,
				on_success: Some(Arc::new(move |response: &BatchResponse| {
					seen.lock().unwrap().push(response.clone());
				})),
				..config()
			},
			transport.clone(),
		);

		for i in 0..4 {
			worker.enqueue(track(&format!("e{i}"))).await;
		}

		let responses = responses.lock().unwrap();
		assert_eq!(responses.len(), 2);
		assert_eq!(responses[0].failed, 1);
		assert_eq!(responses[0].event_errors()[0].code, "invalid");
	}

	#[tokio::test(start_paused = true)]
	async fn test_panicking_callback_does_not_abort_flush() {
		let transport = MockTransport::new();
		let mut worker = Worker::new(
			ClientConfig {
				max_batch_size: 1,
				max_queue_size: 10,
				on_success: Some(Arc::new(|_: &BatchResponse| panic!("callback bug"))),
				..config()
			},
			transport.clone(),
		);

		worker.queue.extend([track("a"), track("b"), track("c")]);
		worker.flush().await;

		assert_eq!(transport.call_count(), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn test_send_now_bypasses_queue() {
		let transport = MockTransport::new();
		let mut worker = Worker::new(config(), transport.clone());

		worker.enqueue(track("queued")).await;
		let response = worker.send_now(track("direct")).await;

		assert!(response.is_ok());
		assert_eq!(transport.batches(), vec![vec!["direct"]]);
		assert_eq!(worker.queue.len(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_send_now_rejects_oversized_without_transport() {
		let transport = MockTransport::new();
		let mut worker = Worker::new(config(), transport.clone());

		let huge = Event::track("huge")
			.with_properties(Properties::new().insert("blob", "x".repeat(MAX_EVENT_BYTES)));
		let result = worker.send_now(huge).await;

		assert!(matches!(result, Err(TallyError::Send(_))));
		assert_eq!(transport.call_count(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_shutdown_flushes_then_rejects() {
		let transport = MockTransport::new();
		let mut worker = Worker::new(config(), transport.clone());

		worker.enqueue(track("before")).await;
		worker.shutdown().await;
		assert_eq!(worker.state, WorkerState::ShuttingDown);
		assert_eq!(transport.batches(), vec![vec!["before"]]);

		worker.enqueue(track("after")).await;
		assert!(worker.queue.is_empty());

		let result = worker.send_now(track("after")).await;
		assert!(matches!(result, Err(TallyError::ClientShutdown)));
		assert_eq!(transport.call_count(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_shutdown_without_flush_discards() {
		let transport = MockTransport::new();
		let mut worker = Worker::new(
			ClientConfig {
				flush_on_shutdown: false,
				..config()
			},
			transport.clone(),
		);

		worker.enqueue(track("lost")).await;
		worker.shutdown().await;

		assert_eq!(transport.call_count(), 0);
		assert_eq!(worker.pending.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn test_invoke_callback_contains_panics() {
		invoke_callback("test", || panic!("boom"));
		invoke_callback("test", || std::panic::panic_any(42));
	}
}
