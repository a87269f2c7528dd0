use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::{ParamType, ToolExecutor, ToolKind, ToolParam, ToolResult, ToolSpec, decode_input};
use crate::{BoxFuture, Corpus, CorpusSnapshot, LlmProvider};
use lore_config::LlmProviderConfig;
use lore_providers::llm::ChatMessage;

const TOP_TERMS: usize = 10;
const SHORT_CHUNK_TERMS: u32 = 5;
const DEFAULT_SUMMARY_WORDS: u32 = 100;
const SUMMARY_TEMPERATURE: f32 = 0.3;

#[derive(Deserialize)]
struct AnalyzeInput {
	analysis_type: Option<String>,
}

/// Structure and content statistics for the current corpus snapshot.
pub struct AnalyzeCorpusTool {
	spec: ToolSpec,
	corpus: Arc<Corpus>,
}
impl AnalyzeCorpusTool {
	pub fn new(corpus: Arc<Corpus>) -> Self {
		let spec = ToolSpec::new(
			"analyze_corpus",
			"Report statistics about the document collection: sources, chunk sizes, frequent terms and quality issues.",
			ToolKind::Analysis,
			vec![
				ToolParam::optional("analysis_type", ParamType::String, "Which report to build.")
					.one_of(&["structure", "content", "all"]),
			],
		);

		Self { spec, corpus }
	}

	fn run(&self, input: &Value) -> ToolResult {
		let input: AnalyzeInput = match decode_input(input) {
			Ok(input) => input,
			Err(result) => return result,
		};
		let analysis_type = input.analysis_type.as_deref().unwrap_or("all");
		let snapshot = self.corpus.snapshot();
		let mut output = String::new();
		let mut data = serde_json::Map::new();

		if matches!(analysis_type, "structure" | "all") {
			structure_report(&snapshot, &mut output, &mut data);
		}
		if matches!(analysis_type, "content" | "all") {
			content_report(&snapshot, &mut output, &mut data);
		}

		ToolResult::ok(output.trim_end().to_string()).with_data(Value::Object(data))
	}
}
impl ToolExecutor for AnalyzeCorpusTool {
	fn spec(&self) -> &ToolSpec {
		&self.spec
	}

	fn execute<'a>(&'a self, input: &'a Value) -> BoxFuture<'a, ToolResult> {
		let result = self.run(input);

		Box::pin(async move { result })
	}
}

fn structure_report(
	snapshot: &CorpusSnapshot,
	output: &mut String,
	data: &mut serde_json::Map<String, Value>,
) {
	let sources = snapshot.sources();

	output.push_str(&format!(
		"Structure: {} chunks across {} sources (snapshot v{}).\n",
		snapshot.len(),
		sources.len(),
		snapshot.version
	));

	for source in &sources {
		output.push_str(&format!("- {}: {} chunks\n", source.source_name, source.chunk_count));
	}

	data.insert("chunk_count".to_string(), Value::from(snapshot.len()));
	data.insert("snapshot_version".to_string(), Value::from(snapshot.version));
	data.insert("sources".to_string(), serde_json::to_value(&sources).unwrap_or(Value::Null));
}

fn content_report(
	snapshot: &CorpusSnapshot,
	output: &mut String,
	data: &mut serde_json::Map<String, Value>,
) {
	let stats = snapshot.lexical().stats();
	let top_terms = stats.top_terms(TOP_TERMS);
	let short_chunks: Vec<&str> = snapshot
		.chunks()
		.iter()
		.enumerate()
		.filter(|(idx, _)| stats.chunk_length(*idx) < SHORT_CHUNK_TERMS)
		.map(|(_, chunk)| chunk.id.as_str())
		.collect();
	let mut issues = Vec::new();

	if snapshot.is_empty() {
		issues.push("The collection is empty.".to_string());
	}
	if !short_chunks.is_empty() {
		issues.push(format!(
			"{} chunks have fewer than {SHORT_CHUNK_TERMS} terms.",
			short_chunks.len()
		));
	}

	output.push_str(&format!(
		"Content: average chunk length {:.1} terms, vocabulary of {} terms.\n",
		stats.average_length(),
		stats.vocabulary_size()
	));

	if !top_terms.is_empty() {
		let rendered: Vec<String> =
			top_terms.iter().map(|(term, df)| format!("{term} ({df})")).collect();

		output.push_str(&format!("Most widespread terms: {}.\n", rendered.join(", ")));
	}

	if issues.is_empty() {
		output.push_str("No issues found.\n");
	} else {
		for issue in &issues {
			output.push_str(&format!("Issue: {issue}\n"));
		}
	}

	data.insert("average_chunk_terms".to_string(), Value::from(stats.average_length()));
	data.insert("vocabulary_size".to_string(), Value::from(stats.vocabulary_size()));
	data.insert(
		"top_terms".to_string(),
		Value::Array(
			top_terms
				.into_iter()
				.map(|(term, df)| serde_json::json!({ "term": term, "document_frequency": df }))
				.collect(),
		),
	);
	data.insert("short_chunks".to_string(), Value::from(short_chunks));
	data.insert("issues".to_string(), Value::from(issues));
}

#[derive(Deserialize)]
struct SummarizeInput {
	text: String,
	max_words: Option<u32>,
}

pub struct SummarizeTool {
	spec: ToolSpec,
	llm: Arc<dyn LlmProvider>,
	cfg: LlmProviderConfig,
}
impl SummarizeTool {
	pub fn new(llm: Arc<dyn LlmProvider>, cfg: LlmProviderConfig) -> Self {
		let spec = ToolSpec::new(
			"summarize",
			"Summarize a piece of text.",
			ToolKind::Analysis,
			vec![
				ToolParam::required("text", ParamType::String, "Text to summarize."),
				ToolParam::optional("max_words", ParamType::Integer, "Upper bound on summary length."),
			],
		);

		Self { spec, llm, cfg }
	}

	async fn run(&self, input: &Value) -> ToolResult {
		let input: SummarizeInput = match decode_input(input) {
			Ok(input) => input,
			Err(result) => return result,
		};
		let max_words = input.max_words.unwrap_or(DEFAULT_SUMMARY_WORDS).max(1);
		let messages = [
			ChatMessage::system(format!(
				"Summarize the user's text in at most {max_words} words. Keep facts, names and numbers exact. Reply with the summary only."
			)),
			ChatMessage::user(input.text),
		];

		match self.llm.generate(&self.cfg, &messages, SUMMARY_TEMPERATURE).await {
			Ok(summary) => ToolResult::ok(summary.trim().to_string()),
			Err(err) => ToolResult::failure(format!("Summarization failed: {err}")),
		}
	}
}
impl ToolExecutor for SummarizeTool {
	fn spec(&self) -> &ToolSpec {
		&self.spec
	}

	fn execute<'a>(&'a self, input: &'a Value) -> BoxFuture<'a, ToolResult> {
		Box::pin(self.run(input))
	}
}
