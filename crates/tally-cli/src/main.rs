// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tally CLI - send analytics events from the command line
//!
//! Useful for smoke-testing a collector and for emitting events from shell
//! scripts. By default the event is queued and delivered by the shutdown
//! flush; `--sync` waits for the collector and prints its response.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tally::{Event, Properties, TallyClient, DEFAULT_ENDPOINT};

#[derive(Parser, Debug)]
#[command(name = "tally", version, about, long_about = None)]
struct Args {
	/// Write key used to authenticate with the collector
	#[arg(long, env = "TALLY_WRITE_KEY", hide_env_values = true)]
	write_key: String,

	/// Collector base URL
	#[arg(long, env = "TALLY_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
	endpoint: String,

	/// Milliseconds between background flushes
	#[arg(long, env = "TALLY_FLUSH_INTERVAL_MS", default_value_t = 2000)]
	flush_interval_ms: u64,

	/// Events per batch (capped at 100)
	#[arg(long, env = "TALLY_MAX_BATCH_SIZE", default_value_t = 20)]
	max_batch_size: usize,

	/// Delivery attempts per batch
	#[arg(long, env = "TALLY_RETRY_MAX_ATTEMPTS", default_value_t = 5)]
	retry_max_attempts: u32,

	/// First retry delay in milliseconds
	#[arg(long, env = "TALLY_RETRY_INITIAL_DELAY_MS", default_value_t = 1000)]
	retry_initial_delay_ms: u64,

	/// Wait for the collector's Retry-After on 429 responses
	#[arg(long, env = "TALLY_HONOR_RETRY_AFTER")]
	honor_retry_after: bool,

	/// Send immediately and print the collector's response
	#[arg(long, global = true)]
	sync: bool,

	#[arg(long, env = "TALLY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
	log_format: LogFormat,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Record an action performed by a user
	Track {
		/// Event name, e.g. "Signed Up"
		event: String,
		#[arg(long, short)]
		user_id: String,
		/// JSON object of event properties
		#[arg(long, short)]
		properties: Option<String>,
	},
	/// Attach traits to a user
	Identify {
		#[arg(long, short)]
		user_id: String,
		/// JSON object of user traits
		#[arg(long, short)]
		traits: Option<String>,
	},
	/// Associate a user with a group
	Group {
		#[arg(long, short)]
		group_id: String,
		#[arg(long, short)]
		user_id: Option<String>,
		/// JSON object of group traits
		#[arg(long, short)]
		traits: Option<String>,
	},
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
	Compact,
	Pretty,
	Json,
}

fn init_tracing(format: LogFormat) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let registry = tracing_subscriber::registry().with(filter);

	// stdout is reserved for the collector response.
	match format {
		LogFormat::Compact => registry
			.with(fmt::layer().compact().with_writer(std::io::stderr))
			.init(),
		LogFormat::Pretty => registry
			.with(fmt::layer().with_writer(std::io::stderr))
			.init(),
		LogFormat::Json => registry
			.with(fmt::layer().json().with_writer(std::io::stderr))
			.init(),
	}
}

fn parse_payload(flag: &str, raw: Option<&str>) -> Result<Option<Properties>> {
	let Some(raw) = raw else {
		return Ok(None);
	};

	let value: serde_json::Value =
		serde_json::from_str(raw).with_context(|| format!("--{flag} is not valid JSON"))?;
	if !value.is_object() {
		anyhow::bail!("--{flag} must be a JSON object");
	}
	Ok(Some(Properties::from(value)))
}

fn build_event(command: &Command) -> Result<Event> {
	let event = match command {
		Command::Track {
			event,
			user_id,
			properties,
		} => {
			let event = Event::track(event.as_str()).with_user_id(user_id.as_str());
			match parse_payload("properties", properties.as_deref())? {
				Some(properties) => event.with_properties(properties),
				None => event,
			}
		}
		Command::Identify { user_id, traits } => {
			let event = Event::identify().with_user_id(user_id.as_str());
			match parse_payload("traits", traits.as_deref())? {
				Some(traits) => event.with_traits(traits),
				None => event,
			}
		}
		Command::Group {
			group_id,
			user_id,
			traits,
		} => {
			let mut event = Event::group(group_id.as_str());
			if let Some(user_id) = user_id {
				event = event.with_user_id(user_id.as_str());
			}
			match parse_payload("traits", traits.as_deref())? {
				Some(traits) => event.with_traits(traits),
				None => event,
			}
		}
	};

	Ok(event.with_context(tally::Context::library()))
}

#[tokio::main]
async fn main() -> Result<()> {
	let args = Args::parse();
	init_tracing(args.log_format);

	let event = build_event(&args.command)?;
	debug!(event_type = %event.event_type(), message_id = %event.message_id(), "Built event");

	send_event(&args, event).await
}

/// Delivers `event` and fails if the collector never accepted it, on either
/// the blocking or the queued path.
async fn send_event(args: &Args, event: Event) -> Result<()> {
	let failed = Arc::new(AtomicBool::new(false));
	let on_error_failed = failed.clone();

	let client = TallyClient::builder(args.write_key.as_str())
		.endpoint(args.endpoint.as_str())
		.flush_interval(Duration::from_millis(args.flush_interval_ms))
		.max_batch_size(args.max_batch_size)
		.retry_max_attempts(args.retry_max_attempts)
		.retry_initial_delay(Duration::from_millis(args.retry_initial_delay_ms))
		.honor_retry_after(args.honor_retry_after)
		.on_error(move |err| {
			on_error_failed.store(true, Ordering::SeqCst);
			tracing::error!(
				status = ?err.status_code,
				events = err.events.len(),
				"Delivery failed: {}",
				err.message
			)
		})
		.build()
		.context("failed to create analytics client")?;

	if args.sync {
		let response = client.send(event).await.context("delivery failed")?;
		println!("{}", serde_json::to_string_pretty(&response)?);
	} else {
		client.enqueue(event).await;
		info!(pending = client.queue_size(), "Event queued");
	}

	client.shutdown().await?;

	if failed.load(Ordering::SeqCst) {
		anyhow::bail!("event was not delivered");
	}
	Ok(())
}
