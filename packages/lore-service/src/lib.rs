pub mod agent;
pub mod assistant;
pub mod corpus;
pub mod history;
pub mod retrieval;
pub mod time_serde;
pub mod tools;

mod error;

pub use agent::{
	AgentController, AgentRequest, AgentResponse, EventKind, StreamEvent, ThoughtStep,
};
pub use assistant::{AnswerResponse, Assistant, Intent, IntentAnalysis, Route};
pub use corpus::{Corpus, CorpusSnapshot, RebuildJob, RebuildProgress, RebuildState, SourceSummary};
pub use error::{Error, Result};
pub use history::{HistoryMessage, HistoryStore, InMemoryHistoryStore, Role};
pub use retrieval::{FusedHit, RetrievalMethod, RetrievalResult, RetrieveRequest, Retriever};
pub use tools::{
	ParamType, ToolDescriptor, ToolExecutor, ToolKind, ToolParam, ToolRegistry, ToolResult,
	ToolSpec, ToolStats,
};

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::sync::mpsc;

use lore_config::{
	Config, EmbeddingProviderConfig, LlmProviderConfig, ProviderConfig, VectorProviderConfig,
	WebSearchProviderConfig,
};
use lore_domain::{Chunk, UnicodeTokenizer};
use lore_lexical::Bm25Params;
use lore_providers::{
	embedding,
	llm::{self, ChatMessage, TextStream},
	rerank, vector,
	vector::Neighbor,
	web_search::{self, WebResult},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Turns query text into the vector the similarity service is searched with.
pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed_query<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		query: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>>;
}

pub trait VectorProvider
where
	Self: Send + Sync,
{
	fn nearest_neighbors<'a>(
		&'a self,
		cfg: &'a VectorProviderConfig,
		vector: &'a [f32],
		k: u32,
	) -> BoxFuture<'a, color_eyre::Result<Vec<Neighbor>>>;
}

pub trait RerankProvider
where
	Self: Send + Sync,
{
	fn rerank<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>>;
}

/// Text generation. A complete reply and a fragment stream are separate calls.
pub trait LlmProvider
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
		temperature: f32,
	) -> BoxFuture<'a, color_eyre::Result<String>>;

	fn generate_stream<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
		temperature: f32,
	) -> BoxFuture<'a, color_eyre::Result<TextStream>>;
}

pub trait WebSearchProvider
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		cfg: &'a WebSearchProviderConfig,
		query: &'a str,
		max_results: usize,
	) -> BoxFuture<'a, color_eyre::Result<Vec<WebResult>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub vector: Arc<dyn VectorProvider>,
	pub rerank: Arc<dyn RerankProvider>,
	pub llm: Arc<dyn LlmProvider>,
	pub web_search: Arc<dyn WebSearchProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		vector: Arc<dyn VectorProvider>,
		rerank: Arc<dyn RerankProvider>,
		llm: Arc<dyn LlmProvider>,
		web_search: Arc<dyn WebSearchProvider>,
	) -> Self {
		Self { embedding, vector, rerank, llm, web_search }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self {
			embedding: provider.clone(),
			vector: provider.clone(),
			rerank: provider.clone(),
			llm: provider.clone(),
			web_search: provider,
		}
	}
}

pub struct LoreService {
	pub cfg: Arc<Config>,
	pub providers: Providers,
	pub corpus: Arc<Corpus>,
	pub history: Arc<dyn HistoryStore>,
	retriever: Arc<Retriever>,
	tools: Arc<ToolRegistry>,
	agent: Arc<AgentController>,
	assistant: Assistant,
	rebuild: Arc<RebuildJob>,
}
impl LoreService {
	/// Loads the corpus from `corpus.path` and wires the HTTP-backed providers.
	pub async fn new(cfg: Config) -> Result<Self> {
		Self::with_providers(cfg, Providers::default()).await
	}

	pub async fn with_providers(cfg: Config, providers: Providers) -> Result<Self> {
		let records = corpus::read_records(&cfg.corpus.path).await?;
		let chunks = records.into_iter().map(|record| record.into_chunk()).collect();

		Self::with_chunks(cfg, providers, chunks)
	}

	pub fn with_chunks(cfg: Config, providers: Providers, chunks: Vec<Chunk>) -> Result<Self> {
		let params = Bm25Params { k1: cfg.lexical.k1, b: cfg.lexical.b };
		let corpus = Arc::new(Corpus::new(
			cfg.corpus.path.clone(),
			Arc::new(UnicodeTokenizer),
			params,
		));

		corpus.replace(corpus.build_snapshot(chunks)?);

		Self::with_corpus(cfg, providers, corpus, Arc::new(InMemoryHistoryStore::default()))
	}

	pub fn with_corpus(
		cfg: Config,
		providers: Providers,
		corpus: Arc<Corpus>,
		history: Arc<dyn HistoryStore>,
	) -> Result<Self> {
		let cfg = Arc::new(cfg);
		let retriever = Arc::new(Retriever::new(cfg.clone(), providers.clone(), corpus.clone()));
		let tools = Arc::new(tools::builtin_registry(&cfg, &providers, &corpus, &retriever)?);
		let agent = Arc::new(AgentController::new(
			cfg.clone(),
			providers.llm.clone(),
			tools.clone(),
			history.clone(),
		)?);
		let assistant = Assistant::new(
			cfg.clone(),
			providers.llm.clone(),
			retriever.clone(),
			agent.clone(),
			history.clone(),
		);
		let rebuild = Arc::new(RebuildJob::new(corpus.clone()));

		tracing::info!(
			chunk_count = corpus.snapshot().len(),
			tool_count = tools.len(),
			"Service initialized."
		);

		Ok(Self { cfg, providers, corpus, history, retriever, tools, agent, assistant, rebuild })
	}

	pub async fn retrieve(&self, req: RetrieveRequest) -> Result<RetrievalResult> {
		let top_k = req.top_k.unwrap_or(self.cfg.retrieval.top_k);

		if top_k == 0 {
			return Err(Error::InvalidRequest {
				message: "top_k must be greater than zero.".to_string(),
			});
		}

		self.retriever.retrieve(&req.query, top_k, req.method).await
	}

	pub async fn run_agent(&self, req: AgentRequest) -> Result<AgentResponse> {
		validate_agent_request(&req)?;

		let response = self.agent.run(&req).await;

		if response.success {
			persist_turn(self.history.as_ref(), &req, &response.answer).await;
		}

		Ok(response)
	}

	/// Classifies the question and answers it on the cheapest route: one
	/// retrieval pass, a direct reply, or the reasoning loop.
	pub async fn answer(&self, req: AgentRequest) -> Result<AnswerResponse> {
		validate_agent_request(&req)?;

		let answered = self.assistant.answer(&req).await;

		if answered.response.success {
			persist_turn(self.history.as_ref(), &req, &answered.response.answer).await;
		}

		Ok(answered)
	}

	/// Starts a streaming run. Dropping the receiver cancels the run.
	pub fn stream_agent(&self, req: AgentRequest) -> Result<mpsc::Receiver<StreamEvent>> {
		validate_agent_request(&req)?;

		let (tx, rx) = mpsc::channel(self.cfg.agent.stream_buffer);
		let agent = self.agent.clone();
		let history = self.history.clone();

		tokio::spawn(async move {
			let response = agent.run_streaming(&req, tx).await;

			if response.success {
				persist_turn(history.as_ref(), &req, &response.answer).await;
			}
		});

		Ok(rx)
	}

	pub fn tools(&self) -> &ToolRegistry {
		&self.tools
	}

	pub fn tool_catalog(&self) -> Vec<ToolDescriptor> {
		self.tools.catalog()
	}

	pub fn start_rebuild(&self) -> Result<RebuildProgress> {
		self.rebuild.start(self.corpus.path().to_path_buf())
	}

	pub fn rebuild_progress(&self) -> RebuildProgress {
		self.rebuild.progress()
	}

	pub fn rebuild_job(&self) -> &Arc<RebuildJob> {
		&self.rebuild
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed_query<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		query: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>> {
		Box::pin(embedding::embed_query(cfg, query))
	}
}
impl VectorProvider for DefaultProviders {
	fn nearest_neighbors<'a>(
		&'a self,
		cfg: &'a VectorProviderConfig,
		vector: &'a [f32],
		k: u32,
	) -> BoxFuture<'a, color_eyre::Result<Vec<Neighbor>>> {
		Box::pin(vector::nearest_neighbors(cfg, vector, k))
	}
}
impl RerankProvider for DefaultProviders {
	fn rerank<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>> {
		Box::pin(rerank::rerank(cfg, query, docs))
	}
}
impl LlmProvider for DefaultProviders {
	fn generate<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
		temperature: f32,
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(llm::generate(cfg, messages, temperature))
	}

	fn generate_stream<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
		temperature: f32,
	) -> BoxFuture<'a, color_eyre::Result<TextStream>> {
		Box::pin(llm::generate_stream(cfg, messages, temperature))
	}
}
impl WebSearchProvider for DefaultProviders {
	fn search<'a>(
		&'a self,
		cfg: &'a WebSearchProviderConfig,
		query: &'a str,
		max_results: usize,
	) -> BoxFuture<'a, color_eyre::Result<Vec<WebResult>>> {
		Box::pin(web_search::search(cfg, query, max_results))
	}
}

fn validate_agent_request(req: &AgentRequest) -> Result<()> {
	if req.query.trim().is_empty() {
		return Err(Error::InvalidRequest { message: "query must be non-empty.".to_string() });
	}
	if req.conversation_id.as_deref().map(|id| id.trim().is_empty()).unwrap_or(false) {
		return Err(Error::InvalidRequest {
			message: "conversation_id must be non-empty when provided.".to_string(),
		});
	}

	Ok(())
}

async fn persist_turn(history: &dyn HistoryStore, req: &AgentRequest, answer: &str) {
	let Some(conversation_id) = req.conversation_id.as_deref() else {
		return;
	};

	for (role, text) in [(Role::User, req.query.as_str()), (Role::Assistant, answer)] {
		if let Err(err) = history.append(conversation_id, role, text).await {
			tracing::warn!(error = %err, conversation_id, "Failed to persist conversation turn.");

			return;
		}
	}
}
