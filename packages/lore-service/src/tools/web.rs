use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::{ParamType, ToolExecutor, ToolKind, ToolParam, ToolResult, ToolSpec, decode_input};
use crate::{BoxFuture, WebSearchProvider};
use lore_config::WebSearchProviderConfig;

const DEFAULT_MAX_RESULTS: usize = 5;
const MAX_RESULTS_CAP: usize = 20;

#[derive(Deserialize)]
struct WebSearchInput {
	query: String,
	max_results: Option<usize>,
}

pub struct WebSearchTool {
	spec: ToolSpec,
	provider: Arc<dyn WebSearchProvider>,
	cfg: WebSearchProviderConfig,
}
impl WebSearchTool {
	pub fn new(provider: Arc<dyn WebSearchProvider>, cfg: WebSearchProviderConfig) -> Self {
		let spec = ToolSpec::new(
			"web_search",
			"Search the web for current information that the local documents do not cover.",
			ToolKind::ExternalSearch,
			vec![
				ToolParam::required("query", ParamType::String, "Search terms."),
				ToolParam::optional(
					"max_results",
					ParamType::Integer,
					"Maximum number of results to return.",
				),
			],
		);

		Self { spec, provider, cfg }
	}

	async fn run(&self, input: &Value) -> ToolResult {
		let input: WebSearchInput = match decode_input(input) {
			Ok(input) => input,
			Err(result) => return result,
		};
		let max_results = input.max_results.unwrap_or(DEFAULT_MAX_RESULTS).clamp(1, MAX_RESULTS_CAP);
		let results = match self.provider.search(&self.cfg, &input.query, max_results).await {
			Ok(results) => results,
			Err(err) => return ToolResult::failure(format!("Web search failed: {err}")),
		};

		if results.is_empty() {
			return ToolResult::ok(format!("No web results found for '{}'.", input.query))
				.with_data(Value::Array(Vec::new()));
		}

		let mut out = format!("Found {} web results:\n", results.len());

		for (idx, result) in results.iter().enumerate() {
			out.push_str(&format!("\n[{}] {}\nURL: {}\n", idx + 1, result.title, result.url));

			if !result.content.is_empty() {
				out.push_str(&format!("{}\n", result.content));
			}
		}

		let data = serde_json::to_value(&results).unwrap_or(Value::Null);

		ToolResult::ok(out).with_data(data)
	}
}
impl ToolExecutor for WebSearchTool {
	fn spec(&self) -> &ToolSpec {
		&self.spec
	}

	fn execute<'a>(&'a self, input: &'a Value) -> BoxFuture<'a, ToolResult> {
		Box::pin(self.run(input))
	}
}
