pub mod analysis;
pub mod file;
pub mod rag;
pub mod web;

mod registry;
mod schema;

pub use registry::{ToolDescriptor, ToolRegistry, ToolStats};
pub use schema::{ParamType, ToolKind, ToolParam, ToolSpec};

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{BoxFuture, Corpus, Providers, Result, Retriever};
use lore_config::Config;

/// Outcome of one tool call. Failures are data, never errors.
#[derive(Clone, Debug, Serialize)]
pub struct ToolResult {
	pub success: bool,
	pub output: String,
	pub data: Option<Value>,
	pub error_message: Option<String>,
	#[serde(skip_serializing_if = "Map::is_empty")]
	pub metadata: Map<String, Value>,
}
impl ToolResult {
	pub fn ok(output: impl Into<String>) -> Self {
		Self {
			success: true,
			output: output.into(),
			data: None,
			error_message: None,
			metadata: Map::new(),
		}
	}

	pub fn failure(message: impl Into<String>) -> Self {
		let message = message.into();

		Self {
			success: false,
			output: format!("Error: {message}"),
			data: None,
			error_message: Some(message),
			metadata: Map::new(),
		}
	}

	pub fn with_data(mut self, data: Value) -> Self {
		self.data = Some(data);

		self
	}

	pub fn with_output(mut self, output: impl Into<String>) -> Self {
		self.output = output.into();

		self
	}

	pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
		self.metadata.insert(key.to_string(), value.into());

		self
	}

	pub fn is_degraded(&self) -> bool {
		self.metadata.get("degraded").and_then(Value::as_bool).unwrap_or(false)
	}
}

pub trait ToolExecutor
where
	Self: Send + Sync,
{
	fn spec(&self) -> &ToolSpec;

	/// `input` has already been checked against `spec().params`.
	fn execute<'a>(&'a self, input: &'a Value) -> BoxFuture<'a, ToolResult>;
}

/// Registers every built-in tool the configuration enables.
pub fn builtin_registry(
	cfg: &Arc<Config>,
	providers: &Providers,
	corpus: &Arc<Corpus>,
	retriever: &Arc<Retriever>,
) -> Result<ToolRegistry> {
	let mut registry = ToolRegistry::new(Duration::from_millis(cfg.agent.timeout_ms));

	registry.register(Arc::new(rag::RagSearchTool::new(
		retriever.clone(),
		cfg.retrieval.top_k,
	)))?;
	registry.register(Arc::new(rag::ListDocumentsTool::new(corpus.clone())))?;

	if let Some(web_cfg) = cfg.providers.web_search.as_ref() {
		registry.register(Arc::new(web::WebSearchTool::new(
			providers.web_search.clone(),
			web_cfg.clone(),
		)))?;
	}

	let mut read_roots = cfg.tools.read_roots.clone();

	read_roots.extend(cfg.corpus.documents_root.iter().cloned());

	registry.register(Arc::new(file::ReadFileTool::new(read_roots.clone(), cfg.tools.max_read_lines)))?;
	registry.register(Arc::new(file::ListDirectoryTool::new(read_roots)))?;
	registry.register(Arc::new(file::WriteFileTool::new(
		cfg.tools.write_roots.clone(),
		cfg.tools.max_write_bytes,
	)))?;
	registry.register(Arc::new(analysis::AnalyzeCorpusTool::new(corpus.clone())))?;
	registry.register(Arc::new(analysis::SummarizeTool::new(
		providers.llm.clone(),
		cfg.providers.llm.clone(),
	)))?;

	Ok(registry)
}

/// Decodes validated input into the executor's typed form.
pub(crate) fn decode_input<T>(input: &Value) -> std::result::Result<T, ToolResult>
where
	T: serde::de::DeserializeOwned,
{
	let input = if input.is_null() { Value::Object(Map::new()) } else { input.clone() };

	serde_json::from_value(input).map_err(|err| ToolResult::failure(format!("Invalid input: {err}")))
}
