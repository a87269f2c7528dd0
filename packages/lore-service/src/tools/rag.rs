use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::{ParamType, ToolExecutor, ToolKind, ToolParam, ToolResult, ToolSpec, decode_input};
use crate::{BoxFuture, Corpus, RetrievalMethod, Retriever};

const MAX_TOP_K: u32 = 50;

#[derive(Deserialize)]
struct RagSearchInput {
	query: String,
	top_k: Option<u32>,
	method: Option<String>,
}

/// Retrieval over the local corpus through the fusion engine.
pub struct RagSearchTool {
	spec: ToolSpec,
	retriever: Arc<Retriever>,
	default_top_k: u32,
}
impl RagSearchTool {
	pub fn new(retriever: Arc<Retriever>, default_top_k: u32) -> Self {
		let spec = ToolSpec::new(
			"rag_search",
			"Search the local document collection for passages relevant to a query. Use it first for questions about the indexed documents.",
			ToolKind::Retrieval,
			vec![
				ToolParam::required("query", ParamType::String, "What to search for."),
				ToolParam::optional("top_k", ParamType::Integer, "Number of passages to return."),
				ToolParam::optional("method", ParamType::String, "Retrieval method.").one_of(&[
					"hybrid", "lexical", "bm25", "vector",
				]),
			],
		);

		Self { spec, retriever, default_top_k }
	}

	async fn run(&self, input: &Value) -> ToolResult {
		let input: RagSearchInput = match decode_input(input) {
			Ok(input) => input,
			Err(result) => return result,
		};
		let top_k = input.top_k.unwrap_or(self.default_top_k).clamp(1, MAX_TOP_K);
		let method = input.method.as_deref().and_then(RetrievalMethod::parse).unwrap_or_default();
		let result = match self.retriever.retrieve(&input.query, top_k, method).await {
			Ok(result) => result,
			Err(err) => return ToolResult::failure(format!("Retrieval failed: {err}")),
		};
		let data: Vec<Value> = result
			.items
			.iter()
			.map(|hit| {
				serde_json::json!({
					"id": hit.chunk.id,
					"source_name": hit.chunk.source_name,
					"chunk_index": hit.chunk.chunk_index,
					"score": hit.fused_score,
					"pre_rerank_score": hit.pre_rerank_score,
					"text": hit.chunk.text,
				})
			})
			.collect();
		let output = if result.items.is_empty() {
			format!("No relevant passages found for '{}'.", input.query)
		} else {
			let mut out = format!("Found {} relevant passages:\n", result.items.len());

			for (idx, hit) in result.items.iter().enumerate() {
				out.push_str(&format!(
					"\n[{}] (source: {}, score: {:.3})\n{}\n",
					idx + 1,
					hit.chunk.source_name,
					hit.fused_score,
					hit.chunk.text
				));
			}

			out
		};

		ToolResult::ok(output)
			.with_data(Value::Array(data))
			.with_metadata("method", method.as_str())
			.with_metadata("degraded", result.degraded)
	}
}
impl ToolExecutor for RagSearchTool {
	fn spec(&self) -> &ToolSpec {
		&self.spec
	}

	fn execute<'a>(&'a self, input: &'a Value) -> BoxFuture<'a, ToolResult> {
		Box::pin(self.run(input))
	}
}

/// Lists the sources in the current corpus snapshot.
pub struct ListDocumentsTool {
	spec: ToolSpec,
	corpus: Arc<Corpus>,
}
impl ListDocumentsTool {
	pub fn new(corpus: Arc<Corpus>) -> Self {
		let spec = ToolSpec::new(
			"list_documents",
			"List the documents in the local collection with their chunk counts.",
			ToolKind::Retrieval,
			Vec::new(),
		);

		Self { spec, corpus }
	}
}
impl ToolExecutor for ListDocumentsTool {
	fn spec(&self) -> &ToolSpec {
		&self.spec
	}

	fn execute<'a>(&'a self, _input: &'a Value) -> BoxFuture<'a, ToolResult> {
		let sources = self.corpus.snapshot().sources();

		Box::pin(async move {
			if sources.is_empty() {
				return ToolResult::ok("The document collection is empty.")
					.with_data(Value::Array(Vec::new()));
			}

			let mut out = format!("{} documents:\n", sources.len());

			for source in &sources {
				out.push_str(&format!("- {} ({} chunks)\n", source.source_name, source.chunk_count));
			}

			let data = serde_json::to_value(&sources).unwrap_or(Value::Null);

			ToolResult::ok(out).with_data(data)
		})
	}
}
