mod events;
mod parse;
mod prompt;

pub use events::{EventKind, StreamEvent};
pub use parse::{ParsedAction, ParsedTurn, Reflection, parse_plan, parse_reflection, parse_turn};

pub(crate) use parse::extract_json_object;
pub(crate) use prompt::current_time;

use std::{
	future::Future,
	sync::Arc,
	time::{Duration, Instant},
};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{Error, HistoryMessage, HistoryStore, LlmProvider, Result, ToolRegistry, history};
use lore_config::Config;
use lore_providers::llm::ChatMessage;
use prompt::PromptContext;

pub(crate) const NO_ANSWER: &str = "I could not find an answer to that question.";

#[derive(Clone, Debug, Deserialize)]
pub struct AgentRequest {
	pub query: String,
	#[serde(default)]
	pub conversation_id: Option<String>,
}

/// One think/act/observe iteration of a run.
#[derive(Clone, Debug, Serialize)]
pub struct ThoughtStep {
	pub step: u32,
	pub thought: String,
	pub tool: Option<String>,
	pub tool_input: Option<Value>,
	pub observation: Option<String>,
	pub success: Option<bool>,
	pub reflection: Option<String>,
	/// Answer drafted by the think step, used as a hint for synthesis.
	pub final_answer: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AgentResponse {
	pub run_id: Uuid,
	pub success: bool,
	pub answer: String,
	pub steps: Vec<ThoughtStep>,
	pub tools_used: Vec<String>,
	pub iterations: u32,
	pub plan: Vec<String>,
	pub degraded: bool,
	pub error: Option<String>,
}

/// Drives the ReAct loop. Holds no per-run state, so one controller serves
/// concurrent runs.
pub struct AgentController {
	cfg: Arc<Config>,
	llm: Arc<dyn LlmProvider>,
	tools: Arc<ToolRegistry>,
	history: Arc<dyn HistoryStore>,
}
impl AgentController {
	pub fn new(
		cfg: Arc<Config>,
		llm: Arc<dyn LlmProvider>,
		tools: Arc<ToolRegistry>,
		history: Arc<dyn HistoryStore>,
	) -> Result<Self> {
		if cfg.agent.max_iterations < 1 {
			return Err(Error::Configuration {
				message: "agent.max_iterations must be at least 1.".to_string(),
			});
		}

		Ok(Self { cfg, llm, tools, history })
	}

	pub fn tools(&self) -> &ToolRegistry {
		&self.tools
	}

	/// Runs to completion and returns the synthesized answer in one piece.
	pub async fn run(&self, req: &AgentRequest) -> AgentResponse {
		self.execute(req, Emitter { tx: None }).await
	}

	/// Runs while pushing every state transition into `tx`. Sends wait for
	/// capacity; a closed receiver cancels the run.
	pub async fn run_streaming(
		&self,
		req: &AgentRequest,
		tx: mpsc::Sender<StreamEvent>,
	) -> AgentResponse {
		self.execute(req, Emitter { tx: Some(&tx) }).await
	}

	async fn execute(&self, req: &AgentRequest, emitter: Emitter<'_>) -> AgentResponse {
		let mut run = RunState::new(Uuid::new_v4());
		let started = Instant::now();

		tracing::info!(
			run_id = %run.run_id,
			streaming = emitter.tx.is_some(),
			max_iterations = self.cfg.agent.max_iterations,
			"Agent run started."
		);

		let outcome = self.drive(req, emitter, &mut run).await;
		let elapsed_ms = started.elapsed().as_millis() as u64;

		match outcome {
			Ok(answer) => {
				tracing::info!(
					run_id = %run.run_id,
					iterations = run.iterations,
					tool_calls = run.tools_used.len(),
					degraded = run.degraded,
					elapsed_ms,
					"Agent run finished."
				);

				run.finish(answer)
			},
			Err(Error::Cancelled) => {
				tracing::info!(run_id = %run.run_id, elapsed_ms, "Agent run cancelled by the consumer.");

				run.fail(Error::Cancelled)
			},
			Err(err) => {
				tracing::error!(run_id = %run.run_id, error = %err, elapsed_ms, "Agent run failed.");

				let message = serde_json::json!({ "message": err.to_string() });

				if emitter.emit(EventKind::Error, run.step, message).await.is_err() {
					tracing::debug!(run_id = %run.run_id, "Consumer left before the error event.");
				}

				run.fail(err)
			},
		}
	}

	async fn drive(
		&self,
		req: &AgentRequest,
		emitter: Emitter<'_>,
		run: &mut RunState,
	) -> Result<String> {
		let agent_cfg = &self.cfg.agent;
		let history = self.recent_history(req).await;
		let tools = self.tools.describe();
		let now = prompt::current_time();

		if agent_cfg.enable_planning {
			run.plan = self.plan(&req.query, emitter, run.run_id).await?;

			if !run.plan.is_empty() {
				emitter.emit(EventKind::Thinking, 0, serde_json::json!({ "plan": run.plan })).await?;
			}
		}

		let ctx = PromptContext {
			query: &req.query,
			tools: &tools,
			history: &history,
			plan: &run.plan,
			now: &now,
		};

		for iteration in 1..=agent_cfg.max_iterations {
			let started = Instant::now();

			run.iterations = iteration;
			run.step = iteration;

			let reply =
				self.generate("think", &prompt::react_messages(&ctx, &run.steps), emitter).await?;
			let turn = parse::parse_turn(&reply);

			emitter
				.emit(EventKind::Thinking, iteration, serde_json::json!({ "thought": turn.thought }))
				.await?;

			let mut step = ThoughtStep {
				step: iteration,
				thought: turn.thought,
				tool: None,
				tool_input: None,
				observation: None,
				success: None,
				reflection: None,
				final_answer: turn.final_answer,
			};
			let Some(action) = turn.action else {
				tracing::debug!(run_id = %run.run_id, iteration, "No tool chosen.");

				run.steps.push(step);

				break;
			};

			emitter
				.emit(
					EventKind::Action,
					iteration,
					serde_json::json!({ "tool": action.tool, "input": action.input }),
				)
				.await?;

			let result = emitter
				.guard(async { Ok::<_, Error>(self.tools.dispatch(&action.tool, &action.input).await) })
				.await?;

			run.tools_used.push(action.tool.clone());
			run.degraded |= result.is_degraded();

			emitter
				.emit(
					EventKind::Observation,
					iteration,
					serde_json::json!({
						"tool": action.tool,
						"success": result.success,
						"output": result.output,
					}),
				)
				.await?;

			let signalled = agent_cfg
				.final_answer_signal
				.as_deref()
				.is_some_and(|signal| result.output.contains(signal));

			step.tool = Some(action.tool);
			step.tool_input = Some(action.input);
			step.observation = Some(result.output);
			step.success = Some(result.success);

			if agent_cfg.enable_reflection {
				step.reflection = self.reflect(&req.query, &step, iteration, emitter, run.run_id).await?;
			}

			tracing::debug!(
				run_id = %run.run_id,
				iteration,
				tool = step.tool.as_deref().unwrap_or_default(),
				success = result.success,
				elapsed_ms = started.elapsed().as_millis() as u64,
				"Iteration finished."
			);

			run.steps.push(step);

			if signalled {
				tracing::debug!(run_id = %run.run_id, iteration, "Final answer signal observed.");

				break;
			}
		}

		let answer_step = run.iterations + 1;

		run.step = answer_step;

		let messages = prompt::synthesis_messages(&ctx, &run.steps);
		let draft = run.steps.iter().rev().find_map(|step| step.final_answer.clone());
		let answer = self.synthesize(&messages, answer_step, draft, emitter).await?;

		emitter
			.emit(
				EventKind::Done,
				answer_step,
				serde_json::json!({
					"run_id": run.run_id,
					"iterations": run.iterations,
					"tools_used": run.tools_used,
					"degraded": run.degraded,
					"answer": answer,
				}),
			)
			.await?;

		Ok(answer)
	}

	async fn synthesize(
		&self,
		messages: &[ChatMessage],
		step: u32,
		draft: Option<String>,
		emitter: Emitter<'_>,
	) -> Result<String> {
		let mut answer = if emitter.tx.is_none() {
			self.generate("synthesis", messages, emitter).await?
		} else {
			self.generate_streamed(messages, step, emitter).await?
		};

		if answer.trim().is_empty() {
			answer = draft.unwrap_or_else(|| NO_ANSWER.to_string());

			emitter.emit(EventKind::Answer, step, serde_json::json!({ "content": answer })).await?;
		}

		Ok(answer.trim().to_string())
	}

	async fn generate_streamed(
		&self,
		messages: &[ChatMessage],
		step: u32,
		emitter: Emitter<'_>,
	) -> Result<String> {
		let llm_cfg = &self.cfg.providers.llm;
		let temperature = self.cfg.agent.temperature;
		let mut fragments = emitter
			.guard(self.bounded("synthesis", async {
				self.llm.generate_stream(llm_cfg, messages, temperature).await.map_err(Error::from)
			}))
			.await?;
		let mut answer = String::new();

		while let Some(fragment) =
			emitter.guard(self.bounded("synthesis", async { Ok::<_, Error>(fragments.next().await) })).await?
		{
			let fragment = fragment?;

			if fragment.is_empty() {
				continue;
			}

			answer.push_str(&fragment);

			emitter.emit(EventKind::Answer, step, serde_json::json!({ "content": fragment })).await?;
		}

		Ok(answer)
	}

	async fn plan(&self, query: &str, emitter: Emitter<'_>, run_id: Uuid) -> Result<Vec<String>> {
		let names = self.tools.names();

		match self.generate("planning", &prompt::planning_messages(query, &names), emitter).await {
			Ok(reply) => Ok(parse::parse_plan(&reply)),
			Err(Error::Cancelled) => Err(Error::Cancelled),
			Err(err) => {
				tracing::warn!(%run_id, error = %err, "Planning failed. Continuing without a plan.");

				Ok(Vec::new())
			},
		}
	}

	async fn reflect(
		&self,
		query: &str,
		step: &ThoughtStep,
		iteration: u32,
		emitter: Emitter<'_>,
		run_id: Uuid,
	) -> Result<Option<String>> {
		let reply =
			match self.generate("reflection", &prompt::reflection_messages(query, step), emitter).await {
				Ok(reply) => reply,
				Err(Error::Cancelled) => return Err(Error::Cancelled),
				Err(err) => {
					tracing::warn!(%run_id, iteration, error = %err, "Reflection failed. Skipping.");

					return Ok(None);
				},
			};
		let reflection = parse::parse_reflection(&reply);

		emitter
			.emit(
				EventKind::Reflection,
				iteration,
				serde_json::json!({
					"approved": reflection.approved,
					"advice": reflection.advice,
					"text": reflection.text,
				}),
			)
			.await?;

		Ok(Some(reflection.text))
	}

	async fn generate(
		&self,
		operation: &'static str,
		messages: &[ChatMessage],
		emitter: Emitter<'_>,
	) -> Result<String> {
		let llm_cfg = &self.cfg.providers.llm;
		let temperature = self.cfg.agent.temperature;

		emitter
			.guard(self.bounded(operation, async {
				self.llm.generate(llm_cfg, messages, temperature).await.map_err(Error::from)
			}))
			.await
	}

	async fn bounded<F, T>(&self, operation: &'static str, fut: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		let timeout_ms = self.cfg.agent.timeout_ms;

		match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
			Ok(out) => out,
			Err(_) => Err(Error::Timeout { operation: operation.to_string(), timeout_ms }),
		}
	}

	async fn recent_history(&self, req: &AgentRequest) -> Vec<HistoryMessage> {
		history::recent_turns(
			self.history.as_ref(),
			req.conversation_id.as_deref(),
			self.cfg.agent.history_turns,
		)
		.await
	}
}

#[derive(Clone, Copy)]
struct Emitter<'a> {
	tx: Option<&'a mpsc::Sender<StreamEvent>>,
}
impl Emitter<'_> {
	async fn emit(&self, kind: EventKind, step: u32, data: Value) -> Result<()> {
		let Some(tx) = self.tx else {
			return Ok(());
		};

		tx.send(StreamEvent::new(kind, step, data)).await.map_err(|_| Error::Cancelled)
	}

	/// Races `fut` against the consumer going away.
	async fn guard<F, T>(&self, fut: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		let Some(tx) = self.tx else {
			return fut.await;
		};

		tokio::select! {
			biased;
			_ = tx.closed() => Err(Error::Cancelled),
			out = fut => out,
		}
	}
}

struct RunState {
	run_id: Uuid,
	steps: Vec<ThoughtStep>,
	tools_used: Vec<String>,
	plan: Vec<String>,
	iterations: u32,
	/// Step number of the latest emitted event.
	step: u32,
	degraded: bool,
}
impl RunState {
	fn new(run_id: Uuid) -> Self {
		Self {
			run_id,
			steps: Vec::new(),
			tools_used: Vec::new(),
			plan: Vec::new(),
			iterations: 0,
			step: 0,
			degraded: false,
		}
	}

	fn finish(self, answer: String) -> AgentResponse {
		self.into_response(true, answer, None)
	}

	fn fail(self, err: Error) -> AgentResponse {
		self.into_response(false, String::new(), Some(err.to_string()))
	}

	fn into_response(self, success: bool, answer: String, error: Option<String>) -> AgentResponse {
		AgentResponse {
			run_id: self.run_id,
			success,
			answer,
			steps: self.steps,
			tools_used: self.tools_used,
			iterations: self.iterations,
			plan: self.plan,
			degraded: self.degraded,
			error,
		}
	}
}
