use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub corpus: Corpus,
	pub providers: Providers,
	#[serde(default)]
	pub lexical: Lexical,
	pub retrieval: Retrieval,
	#[serde(default)]
	pub agent: Agent,
	#[serde(default)]
	pub tools: Tools,
	#[serde(default)]
	pub security: Security,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Corpus {
	/// JSONL file with one pre-chunked record per line.
	pub path: PathBuf,
	/// Directory the document analysis and listing tools inspect.
	pub documents_root: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub vector: VectorProviderConfig,
	pub rerank: ProviderConfig,
	pub llm: LlmProviderConfig,
	pub web_search: Option<WebSearchProviderConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct VectorProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	/// Request path; `{collection}` is substituted with `collection`.
	pub path: String,
	pub collection: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub max_tokens: Option<u32>,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WebSearchProviderConfig {
	pub api_base: String,
	#[serde(default = "default_web_search_path")]
	pub path: String,
	pub timeout_ms: u64,
	pub language: Option<String>,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Lexical {
	pub k1: f32,
	pub b: f32,
}
impl Default for Lexical {
	fn default() -> Self {
		Self { k1: 1.5, b: 0.75 }
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Retrieval {
	pub top_k: u32,
	/// Lower bound on how many candidates each source is asked for.
	pub candidate_k: u32,
	#[serde(default = "default_vector_weight")]
	pub vector_weight: f32,
	#[serde(default = "default_lexical_weight")]
	pub lexical_weight: f32,
	#[serde(default)]
	pub rerank: RetrievalRerank,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RetrievalRerank {
	pub enabled: bool,
	pub top_n: u32,
}
impl Default for RetrievalRerank {
	fn default() -> Self {
		Self { enabled: false, top_n: 10 }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Agent {
	pub max_iterations: u32,
	pub temperature: f32,
	pub enable_reflection: bool,
	pub enable_planning: bool,
	/// Classify each question first and answer knowledge-base and direct
	/// questions without the reasoning loop.
	pub enable_routing: bool,
	pub timeout_ms: u64,
	pub history_turns: u32,
	/// Observation marker that ends the loop early.
	pub final_answer_signal: Option<String>,
	pub stream_buffer: usize,
}
impl Default for Agent {
	fn default() -> Self {
		Self {
			max_iterations: 5,
			temperature: 0.7,
			enable_reflection: false,
			enable_planning: true,
			enable_routing: true,
			timeout_ms: 30_000,
			history_turns: 3,
			final_answer_signal: None,
			stream_buffer: 32,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Tools {
	pub read_roots: Vec<PathBuf>,
	pub write_roots: Vec<PathBuf>,
	pub max_read_lines: u32,
	pub max_write_bytes: u64,
}
impl Default for Tools {
	fn default() -> Self {
		Self {
			read_roots: vec![PathBuf::from("./documents")],
			write_roots: vec![PathBuf::from("./output")],
			max_read_lines: 100,
			max_write_bytes: 1_048_576,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Security {
	pub bind_localhost_only: bool,
}
impl Default for Security {
	fn default() -> Self {
		Self { bind_localhost_only: true }
	}
}

fn default_web_search_path() -> String {
	"/search".to_string()
}

fn default_vector_weight() -> f32 {
	0.6
}

fn default_lexical_weight() -> f32 {
	0.4
}
