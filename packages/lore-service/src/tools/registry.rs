use std::{
	sync::{
		Arc,
		atomic::{AtomicU64, Ordering},
	},
	time::{Duration, Instant},
};

use ahash::AHashMap;
use serde::Serialize;
use serde_json::Value;

use crate::{Error, Result};
use super::{ToolExecutor, ToolKind, ToolResult};

#[derive(Default)]
struct ToolCounters {
	calls: AtomicU64,
	failures: AtomicU64,
	total_latency_ms: AtomicU64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ToolStats {
	pub calls: u64,
	pub failures: u64,
	pub total_latency_ms: u64,
	pub average_latency_ms: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ToolDescriptor {
	pub name: String,
	pub description: String,
	pub kind: ToolKind,
	pub input_schema: Value,
	pub stats: ToolStats,
}

struct Entry {
	executor: Arc<dyn ToolExecutor>,
	counters: ToolCounters,
}

/// Name-keyed tool table. Filled at startup, read-only afterwards.
pub struct ToolRegistry {
	entries: Vec<Entry>,
	index: AHashMap<String, usize>,
	timeout: Duration,
}
impl ToolRegistry {
	pub fn new(timeout: Duration) -> Self {
		Self { entries: Vec::new(), index: AHashMap::new(), timeout }
	}

	pub fn register(&mut self, executor: Arc<dyn ToolExecutor>) -> Result<()> {
		let name = executor.spec().name.clone();

		if name.trim().is_empty() {
			return Err(Error::Configuration { message: "Tool name must be non-empty.".to_string() });
		}
		if self.index.contains_key(&name) {
			return Err(Error::Configuration {
				message: format!("Tool {name} is already registered."),
			});
		}

		self.index.insert(name, self.entries.len());
		self.entries.push(Entry { executor, counters: ToolCounters::default() });

		Ok(())
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn contains(&self, name: &str) -> bool {
		self.index.contains_key(name)
	}

	/// Names in registration order.
	pub fn names(&self) -> Vec<&str> {
		self.entries.iter().map(|entry| entry.executor.spec().name.as_str()).collect()
	}

	pub fn specs(&self) -> Vec<&super::ToolSpec> {
		self.entries.iter().map(|entry| entry.executor.spec()).collect()
	}

	/// Runs `name` with `input`. Unknown names, invalid input, failures and
	/// timeouts all come back as an unsuccessful `ToolResult`.
	pub async fn dispatch(&self, name: &str, input: &Value) -> ToolResult {
		let Some(entry) = self.index.get(name).map(|idx| &self.entries[*idx]) else {
			tracing::warn!(tool = name, "Dispatch to unknown tool.");

			return ToolResult::failure("unknown tool").with_output(format!(
				"Error: unknown tool '{name}'. Available tools: {}.",
				self.names().join(", ")
			));
		};
		let started = Instant::now();

		entry.counters.calls.fetch_add(1, Ordering::Relaxed);

		let result = match entry.executor.spec().validate(input) {
			Err(message) => ToolResult::failure(message),
			Ok(()) => match tokio::time::timeout(self.timeout, entry.executor.execute(input)).await
			{
				Ok(result) => result,
				Err(_) => ToolResult::failure(format!(
					"Tool {name} timed out after {} ms.",
					self.timeout.as_millis()
				)),
			},
		};
		let elapsed_ms = started.elapsed().as_millis() as u64;

		entry.counters.total_latency_ms.fetch_add(elapsed_ms, Ordering::Relaxed);

		if !result.success {
			entry.counters.failures.fetch_add(1, Ordering::Relaxed);
		}

		tracing::debug!(tool = name, success = result.success, elapsed_ms, "Tool dispatched.");

		result
	}

	pub fn stats(&self, name: &str) -> Option<ToolStats> {
		self.index.get(name).map(|idx| snapshot_counters(&self.entries[*idx].counters))
	}

	pub fn catalog(&self) -> Vec<ToolDescriptor> {
		self.entries
			.iter()
			.map(|entry| {
				let spec = entry.executor.spec();

				ToolDescriptor {
					name: spec.name.clone(),
					description: spec.description.clone(),
					kind: spec.kind,
					input_schema: spec.input_schema(),
					stats: snapshot_counters(&entry.counters),
				}
			})
			.collect()
	}

	/// Tool listing rendered for the reasoning prompt.
	pub fn describe(&self) -> String {
		let mut out = String::new();

		for entry in &self.entries {
			let spec = entry.executor.spec();

			out.push_str(&format!(
				"- {}: {}\n  Input schema: {}\n",
				spec.name,
				spec.description,
				spec.input_schema()
			));
		}

		out
	}
}

fn snapshot_counters(counters: &ToolCounters) -> ToolStats {
	let calls = counters.calls.load(Ordering::Relaxed);
	let total_latency_ms = counters.total_latency_ms.load(Ordering::Relaxed);
	let average_latency_ms =
		if calls == 0 { 0.0 } else { total_latency_ms as f64 / calls as f64 };

	ToolStats {
		calls,
		failures: counters.failures.load(Ordering::Relaxed),
		total_latency_ms,
		average_latency_ms,
	}
}
