//! Routes a question to the cheapest path that can answer it: one retrieval
//! pass, a direct reply, or the full reasoning loop.

pub mod intent;

pub use intent::{Intent, IntentAnalysis, Route, parse_intent};

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use uuid::Uuid;

use crate::{
	AgentController, AgentRequest, AgentResponse, Error, FusedHit, HistoryMessage, HistoryStore,
	LlmProvider, Result, RetrievalMethod, Retriever, ThoughtStep,
	agent::{self, NO_ANSWER},
	history,
};
use lore_config::Config;
use lore_providers::llm::ChatMessage;

const ROUTING_TEMPERATURE: f32 = 0.1;
const RETRIEVAL_SYSTEM: &str = "\
Answer the question using only the numbered passages below. Cite passages as [n].
If the passages do not contain the answer, say that the document collection has no information on it.";
const DIRECT_SYSTEM: &str =
	"Answer the question directly and concisely. Use the conversation so far when the question refers to it.";

#[derive(Clone, Debug, Serialize)]
pub struct AnswerResponse {
	pub route: Route,
	/// Absent when routing is disabled.
	pub intent: Option<IntentAnalysis>,
	#[serde(flatten)]
	pub response: AgentResponse,
}

pub struct Assistant {
	cfg: Arc<Config>,
	llm: Arc<dyn LlmProvider>,
	retriever: Arc<Retriever>,
	agent: Arc<AgentController>,
	history: Arc<dyn HistoryStore>,
}
impl Assistant {
	pub fn new(
		cfg: Arc<Config>,
		llm: Arc<dyn LlmProvider>,
		retriever: Arc<Retriever>,
		agent: Arc<AgentController>,
		history: Arc<dyn HistoryStore>,
	) -> Self {
		Self { cfg, llm, retriever, agent, history }
	}

	pub async fn answer(&self, req: &AgentRequest) -> AnswerResponse {
		if !self.cfg.agent.enable_routing {
			return AnswerResponse {
				route: Route::Agent,
				intent: None,
				response: self.agent.run(req).await,
			};
		}

		let history = history::recent_turns(
			self.history.as_ref(),
			req.conversation_id.as_deref(),
			self.cfg.agent.history_turns,
		)
		.await;
		let analysis = self.classify(&req.query, &history).await;
		let route = analysis.intent.route();

		tracing::info!(
			intent = analysis.intent.as_str(),
			route = route.as_str(),
			confidence = analysis.confidence,
			"Question routed."
		);

		let response = match route {
			Route::Agent => self.agent.run(req).await,
			Route::Retrieval => self.answer_from_corpus(&req.query).await,
			Route::Direct => self.answer_directly(&req.query, &history).await,
		};

		AnswerResponse { route, intent: Some(analysis), response }
	}

	async fn classify(&self, query: &str, history: &[HistoryMessage]) -> IntentAnalysis {
		let names = self.agent.tools().names();
		let messages = intent::intent_messages(query, &names, history, &agent::current_time());
		let reply = match self.generate("intent", &messages, ROUTING_TEMPERATURE).await {
			Ok(reply) => reply,
			Err(err) => {
				tracing::warn!(error = %err, "Intent classification failed. Using the reasoning loop.");

				return IntentAnalysis::fallback(query, format!("Classification failed: {err}"));
			},
		};

		parse_intent(&reply).unwrap_or_else(|| {
			tracing::warn!("Intent reply had no JSON object. Using the reasoning loop.");

			IntentAnalysis::fallback(query, "Classification reply was not JSON.")
		})
	}

	async fn answer_from_corpus(&self, query: &str) -> AgentResponse {
		let run_id = Uuid::new_v4();
		let top_k = self.cfg.retrieval.top_k;
		let result = match self.retriever.retrieve(query, top_k, RetrievalMethod::Hybrid).await {
			Ok(result) => result,
			Err(err) => return failed(run_id, err),
		};
		let passages = render_passages(&result.items);
		let messages = vec![
			ChatMessage::system(RETRIEVAL_SYSTEM),
			ChatMessage::user(format!("Passages:\n{passages}\n\nQuestion: {query}")),
		];
		let answer = match self.generate("synthesis", &messages, self.cfg.agent.temperature).await {
			Ok(answer) => answer,
			Err(err) => return failed(run_id, err),
		};
		let step = ThoughtStep {
			step: 1,
			thought: "Answer from one retrieval pass over the document collection.".to_string(),
			tool: Some("rag_search".to_string()),
			tool_input: Some(serde_json::json!({ "query": query, "top_k": top_k })),
			observation: Some(passages),
			success: Some(true),
			reflection: None,
			final_answer: None,
		};

		AgentResponse {
			run_id,
			success: true,
			answer: or_no_answer(answer),
			steps: vec![step],
			tools_used: vec!["rag_search".to_string()],
			iterations: 1,
			plan: Vec::new(),
			degraded: result.degraded,
			error: None,
		}
	}

	async fn answer_directly(&self, query: &str, history: &[HistoryMessage]) -> AgentResponse {
		let run_id = Uuid::new_v4();
		let mut messages = vec![ChatMessage::system(DIRECT_SYSTEM)];

		for message in history {
			messages.push(ChatMessage {
				role: message.role.as_str().to_string(),
				content: message.text.clone(),
			});
		}

		messages.push(ChatMessage::user(query));

		match self.generate("synthesis", &messages, self.cfg.agent.temperature).await {
			Ok(answer) => AgentResponse {
				run_id,
				success: true,
				answer: or_no_answer(answer),
				steps: Vec::new(),
				tools_used: Vec::new(),
				iterations: 0,
				plan: Vec::new(),
				degraded: false,
				error: None,
			},
			Err(err) => failed(run_id, err),
		}
	}

	async fn generate(
		&self,
		operation: &'static str,
		messages: &[ChatMessage],
		temperature: f32,
	) -> Result<String> {
		let timeout_ms = self.cfg.agent.timeout_ms;
		let call = self.llm.generate(&self.cfg.providers.llm, messages, temperature);

		match tokio::time::timeout(Duration::from_millis(timeout_ms), call).await {
			Ok(out) => out.map_err(Error::from),
			Err(_) => Err(Error::Timeout { operation: operation.to_string(), timeout_ms }),
		}
	}
}

fn render_passages(items: &[FusedHit]) -> String {
	if items.is_empty() {
		return "(no passages found)".to_string();
	}

	items
		.iter()
		.enumerate()
		.map(|(idx, hit)| {
			format!("[{}] (source: {})\n{}", idx + 1, hit.chunk.source_name, hit.chunk.text)
		})
		.collect::<Vec<_>>()
		.join("\n\n")
}

fn or_no_answer(answer: String) -> String {
	let answer = answer.trim();

	if answer.is_empty() { NO_ANSWER.to_string() } else { answer.to_string() }
}

fn failed(run_id: Uuid, err: Error) -> AgentResponse {
	tracing::error!(%run_id, error = %err, "Single-pass answer failed.");

	AgentResponse {
		run_id,
		success: false,
		answer: String::new(),
		steps: Vec::new(),
		tools_used: Vec::new(),
		iterations: 0,
		plan: Vec::new(),
		degraded: false,
		error: Some(err.to_string()),
	}
}
