mod error;

pub use error::{Error, Result};

use std::{
	collections::VecDeque,
	env, fs,
	path::{Path, PathBuf},
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use color_eyre::eyre;
use uuid::Uuid;

use lore_config::{
	Agent, Config, Corpus, EmbeddingProviderConfig, Lexical, LlmProviderConfig, ProviderConfig,
	Providers as ProviderConfigs, Retrieval, RetrievalRerank, Security, Service, Tools,
	VectorProviderConfig, WebSearchProviderConfig,
};
use lore_domain::Chunk;
use lore_providers::{
	llm::{ChatMessage, TextStream},
	vector::Neighbor,
	web_search::WebResult,
};
use lore_service::{
	BoxFuture, EmbeddingProvider, LlmProvider, Providers, RerankProvider, VectorProvider,
	WebSearchProvider,
};

pub const TEST_DIMENSIONS: u32 = 4;

/// Fully populated configuration pointing every provider at an unroutable
/// address. Routing, planning and reflection are off so scripted replies line up
/// with think and synthesis calls only.
pub fn test_config() -> Config {
	Config {
		service: Service {
			http_bind: "127.0.0.1:0".to_string(),
			admin_bind: "127.0.0.1:0".to_string(),
			log_level: "debug".to_string(),
		},
		corpus: Corpus { path: PathBuf::from("lore-test-chunks.jsonl"), documents_root: None },
		providers: ProviderConfigs {
			embedding: EmbeddingProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:9".to_string(),
				api_key: "test-key".to_string(),
				path: "/embeddings".to_string(),
				model: "test-embedding".to_string(),
				dimensions: TEST_DIMENSIONS,
				timeout_ms: 1_000,
				default_headers: Default::default(),
			},
			vector: VectorProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:9".to_string(),
				api_key: "test-key".to_string(),
				path: "/collections/{collection}/points/search".to_string(),
				collection: "lore_test".to_string(),
				timeout_ms: 1_000,
				default_headers: Default::default(),
			},
			rerank: ProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:9".to_string(),
				api_key: "test-key".to_string(),
				path: "/rerank".to_string(),
				model: "test-rerank".to_string(),
				timeout_ms: 1_000,
				default_headers: Default::default(),
			},
			llm: LlmProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:9".to_string(),
				api_key: "test-key".to_string(),
				path: "/chat/completions".to_string(),
				model: "test-llm".to_string(),
				temperature: 0.0,
				max_tokens: None,
				timeout_ms: 1_000,
				default_headers: Default::default(),
			},
			web_search: Some(WebSearchProviderConfig {
				api_base: "http://127.0.0.1:9".to_string(),
				path: "/search".to_string(),
				timeout_ms: 1_000,
				language: None,
				default_headers: Default::default(),
			}),
		},
		lexical: Lexical::default(),
		retrieval: Retrieval {
			top_k: 5,
			candidate_k: 10,
			vector_weight: 0.6,
			lexical_weight: 0.4,
			rerank: RetrievalRerank { enabled: false, top_n: 10 },
		},
		agent: Agent {
			max_iterations: 3,
			temperature: 0.0,
			enable_reflection: false,
			enable_planning: false,
			enable_routing: false,
			timeout_ms: 2_000,
			history_turns: 3,
			final_answer_signal: None,
			stream_buffer: 4,
		},
		tools: Tools {
			read_roots: Vec::new(),
			write_roots: Vec::new(),
			max_read_lines: 100,
			max_write_bytes: 1_024,
		},
		security: Security::default(),
	}
}

/// Small corpus with stable ids `a`..`e`.
pub fn sample_chunks() -> Vec<Chunk> {
	[
		("a", "cats are mammals", "animals.md", 0),
		("b", "dogs are mammals", "animals.md", 1),
		("c", "the sky is blue on a clear day", "weather.md", 0),
		("d", "rust enforces ownership and borrowing at compile time", "rust.md", 0),
		("e", "cats and dogs can live together", "animals.md", 2),
	]
	.into_iter()
	.map(|(id, text, source_name, chunk_index)| chunk(id, text, source_name, chunk_index))
	.collect()
}

pub fn chunk(id: &str, text: &str, source_name: &str, chunk_index: u32) -> Chunk {
	Chunk {
		id: id.to_string(),
		text: text.to_string(),
		source_name: source_name.to_string(),
		chunk_index,
		metadata: Default::default(),
	}
}

/// `sample_chunks` as JSONL, the on-disk corpus format.
pub fn sample_jsonl() -> String {
	sample_chunks()
		.into_iter()
		.map(|chunk| {
			serde_json::json!({
				"id": chunk.id,
				"text": chunk.text,
				"source_name": chunk.source_name,
				"chunk_index": chunk.chunk_index,
			})
			.to_string()
		})
		.collect::<Vec<_>>()
		.join("\n")
}

/// Providers that never touch the network. The vector provider answers with
/// nothing until replaced.
pub fn test_providers(llm: Arc<dyn LlmProvider>) -> Providers {
	Providers::new(
		Arc::new(StaticEmbedding),
		Arc::new(StaticVectorProvider::new(Vec::new())),
		Arc::new(ReversingRerank),
		llm,
		Arc::new(RecordingWebSearch::new(Vec::new())),
	)
}

/// Unique directory under the system temp dir, removed on drop.
pub struct TempDir {
	path: PathBuf,
}
impl TempDir {
	pub fn new(prefix: &str) -> Result<Self> {
		let path = env::temp_dir().join(format!("{prefix}_{}", Uuid::new_v4().simple()));

		fs::create_dir_all(&path).map_err(|source| Error::Io { path: path.clone(), source })?;

		Ok(Self { path })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn write(&self, relative: &str, contents: &str) -> Result<PathBuf> {
		let path = self.path.join(relative);

		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.map_err(|source| Error::Io { path: parent.to_path_buf(), source })?;
		}

		fs::write(&path, contents).map_err(|source| Error::Io { path: path.clone(), source })?;

		Ok(path)
	}
}
impl Drop for TempDir {
	fn drop(&mut self) {
		let _ = fs::remove_dir_all(&self.path);
	}
}

enum Reply {
	Text(String),
	Fail(String),
}

/// LLM that answers from a queue. Every call, streaming or not, consumes the
/// next reply; an exhausted queue is an error.
pub struct ScriptedLlm {
	replies: Mutex<VecDeque<Reply>>,
	prompts: Mutex<Vec<Vec<ChatMessage>>>,
	generate_calls: AtomicUsize,
	stream_calls: AtomicUsize,
	delay: Option<Duration>,
}
impl ScriptedLlm {
	pub fn new<I, S>(replies: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			replies: Mutex::new(replies.into_iter().map(|reply| Reply::Text(reply.into())).collect()),
			prompts: Mutex::new(Vec::new()),
			generate_calls: AtomicUsize::new(0),
			stream_calls: AtomicUsize::new(0),
			delay: None,
		}
	}

	/// Sleeps before every reply.
	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);

		self
	}

	pub fn then_reply(self, reply: &str) -> Self {
		self.push(Reply::Text(reply.to_string()));

		self
	}

	/// Queues a failing reply after the ones already scripted.
	pub fn then_fail(self, message: &str) -> Self {
		self.push(Reply::Fail(message.to_string()));

		self
	}

	pub fn generate_calls(&self) -> usize {
		self.generate_calls.load(Ordering::SeqCst)
	}

	pub fn stream_calls(&self) -> usize {
		self.stream_calls.load(Ordering::SeqCst)
	}

	pub fn total_calls(&self) -> usize {
		self.generate_calls() + self.stream_calls()
	}

	pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
		self.prompts.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	fn push(&self, reply: Reply) {
		self.replies.lock().unwrap_or_else(|err| err.into_inner()).push_back(reply);
	}

	fn next_reply(&self, messages: &[ChatMessage]) -> eyre::Result<String> {
		self.prompts.lock().unwrap_or_else(|err| err.into_inner()).push(messages.to_vec());

		match self.replies.lock().unwrap_or_else(|err| err.into_inner()).pop_front() {
			Some(Reply::Text(text)) => Ok(text),
			Some(Reply::Fail(message)) => Err(eyre::eyre!(message)),
			None => Err(eyre::eyre!("Scripted LLM has no replies left.")),
		}
	}

	async fn pause(&self) {
		if let Some(delay) = self.delay {
			tokio::time::sleep(delay).await;
		}
	}
}
impl LlmProvider for ScriptedLlm {
	fn generate<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
		_temperature: f32,
	) -> BoxFuture<'a, eyre::Result<String>> {
		self.generate_calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			self.pause().await;

			self.next_reply(messages)
		})
	}

	fn generate_stream<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
		_temperature: f32,
	) -> BoxFuture<'a, eyre::Result<TextStream>> {
		self.stream_calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			self.pause().await;

			let reply = self.next_reply(messages)?;
			let fragments = reply
				.split_inclusive(' ')
				.map(|fragment| Ok(fragment.to_string()))
				.collect::<Vec<eyre::Result<String>>>();
			let stream: TextStream = Box::pin(futures::stream::iter(fragments));

			Ok(stream)
		})
	}
}

/// Same vector for every query.
pub struct StaticEmbedding;
impl EmbeddingProvider for StaticEmbedding {
	fn embed_query<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		_query: &'a str,
	) -> BoxFuture<'a, eyre::Result<Vec<f32>>> {
		let dim = (cfg.dimensions as usize).max(1);

		Box::pin(async move { Ok(vec![1.0; dim]) })
	}
}

/// Returns a fixed neighbor list, truncated to `k`.
pub struct StaticVectorProvider {
	neighbors: Vec<Neighbor>,
	calls: AtomicUsize,
}
impl StaticVectorProvider {
	pub fn new(neighbors: Vec<Neighbor>) -> Self {
		Self { neighbors, calls: AtomicUsize::new(0) }
	}

	pub fn from_pairs(pairs: &[(&str, f32)]) -> Self {
		Self::new(
			pairs
				.iter()
				.map(|(chunk_id, similarity)| Neighbor {
					chunk_id: chunk_id.to_string(),
					similarity: *similarity,
				})
				.collect(),
		)
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl VectorProvider for StaticVectorProvider {
	fn nearest_neighbors<'a>(
		&'a self,
		_cfg: &'a VectorProviderConfig,
		_vector: &'a [f32],
		k: u32,
	) -> BoxFuture<'a, eyre::Result<Vec<Neighbor>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let neighbors = self.neighbors.iter().take(k as usize).cloned().collect();

		Box::pin(async move { Ok(neighbors) })
	}
}

/// Fails every call, standing in for an unreachable service.
pub struct FailingProvider;
impl VectorProvider for FailingProvider {
	fn nearest_neighbors<'a>(
		&'a self,
		_cfg: &'a VectorProviderConfig,
		_vector: &'a [f32],
		_k: u32,
	) -> BoxFuture<'a, eyre::Result<Vec<Neighbor>>> {
		Box::pin(async move { Err(eyre::eyre!("Vector provider unavailable.")) })
	}
}
impl EmbeddingProvider for FailingProvider {
	fn embed_query<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		_query: &'a str,
	) -> BoxFuture<'a, eyre::Result<Vec<f32>>> {
		Box::pin(async move { Err(eyre::eyre!("Embedding provider unavailable.")) })
	}
}
impl RerankProvider for FailingProvider {
	fn rerank<'a>(
		&'a self,
		_cfg: &'a ProviderConfig,
		_query: &'a str,
		_docs: &'a [String],
	) -> BoxFuture<'a, eyre::Result<Vec<f32>>> {
		Box::pin(async move { Err(eyre::eyre!("Rerank provider unavailable.")) })
	}
}
impl WebSearchProvider for FailingProvider {
	fn search<'a>(
		&'a self,
		_cfg: &'a WebSearchProviderConfig,
		_query: &'a str,
		_max_results: usize,
	) -> BoxFuture<'a, eyre::Result<Vec<WebResult>>> {
		Box::pin(async move { Err(eyre::eyre!("Web search provider unavailable.")) })
	}
}

/// Scores documents by position so the last one ranks first.
pub struct ReversingRerank;
impl RerankProvider for ReversingRerank {
	fn rerank<'a>(
		&'a self,
		_cfg: &'a ProviderConfig,
		_query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, eyre::Result<Vec<f32>>> {
		let scores = (0..docs.len()).map(|idx| idx as f32).collect();

		Box::pin(async move { Ok(scores) })
	}
}

pub struct RecordingWebSearch {
	results: Vec<WebResult>,
	queries: Mutex<Vec<String>>,
}
impl RecordingWebSearch {
	pub fn new(results: Vec<WebResult>) -> Self {
		Self { results, queries: Mutex::new(Vec::new()) }
	}

	pub fn queries(&self) -> Vec<String> {
		self.queries.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
impl WebSearchProvider for RecordingWebSearch {
	fn search<'a>(
		&'a self,
		_cfg: &'a WebSearchProviderConfig,
		query: &'a str,
		max_results: usize,
	) -> BoxFuture<'a, eyre::Result<Vec<WebResult>>> {
		self.queries.lock().unwrap_or_else(|err| err.into_inner()).push(query.to_string());

		let results = self.results.iter().take(max_results).cloned().collect();

		Box::pin(async move { Ok(results) })
	}
}
