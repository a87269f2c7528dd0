use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use super::ThoughtStep;
use crate::HistoryMessage;
use lore_providers::llm::ChatMessage;

const MAX_OBSERVATION_CHARS: usize = 4_000;

const REACT_SYSTEM: &str = "\
You answer questions about a document collection. You may call tools to gather evidence.

Reply in exactly this format:
Thought: <your reasoning>
Action: <one tool name>
Action Input: <a JSON object matching the tool's input schema>

When you have enough evidence, or no tool can help, reply instead with:
Thought: <your reasoning>
Final Answer: <the answer>

Rules:
- Call at most one tool per reply.
- Check the conversation history first; answer from it directly when it already contains the answer.
- Base answers only on the conversation history and tool observations. Do not invent sources.
- Name the source file or URL an answer comes from when one was observed.";

const SYNTHESIS_SYSTEM: &str = "\
Write the final answer to the user's question using only the evidence gathered in the reasoning trace and the conversation history.
Cite source file names or URLs that appear in the observations.
If the evidence does not contain the answer, say so plainly.
Reply with the answer only.";

const PLANNING_SYSTEM: &str = "\
Break the task into a short plan of concrete steps that use the available tools.
Reply with one line per step, formatted as:
Step 1: <action>
Step 2: <action>";

const REFLECTION_SYSTEM: &str = "\
Review whether the latest observation helps answer the question without invented facts or sources.
Reply APPROVED if it does.
Otherwise reply RETRY: <one sentence on what to do next>.";

pub struct PromptContext<'a> {
	pub query: &'a str,
	pub tools: &'a str,
	pub history: &'a [HistoryMessage],
	pub plan: &'a [String],
	pub now: &'a str,
}

pub fn react_messages(ctx: &PromptContext<'_>, trace: &[ThoughtStep]) -> Vec<ChatMessage> {
	let system = format!("{REACT_SYSTEM}\n\nAvailable tools:\n{}\nCurrent time: {}", ctx.tools, ctx.now);
	let mut user = String::new();

	push_history(&mut user, ctx.history);
	push_plan(&mut user, ctx.plan);

	user.push_str(&format!("Question: {}\n", ctx.query));

	if !trace.is_empty() {
		user.push('\n');
		user.push_str(&render_trace(trace));
		user.push_str("\nContinue reasoning from the last observation.");
	}

	vec![ChatMessage::system(system), ChatMessage::user(user)]
}

pub fn synthesis_messages(ctx: &PromptContext<'_>, trace: &[ThoughtStep]) -> Vec<ChatMessage> {
	let mut user = String::new();

	push_history(&mut user, ctx.history);

	user.push_str(&format!("Question: {}\n\n", ctx.query));

	if trace.is_empty() {
		user.push_str("Reasoning trace: (empty)\n");
	} else {
		user.push_str("Reasoning trace:\n");
		user.push_str(&render_trace(trace));
	}

	vec![
		ChatMessage::system(format!("{SYNTHESIS_SYSTEM}\nCurrent time: {}", ctx.now)),
		ChatMessage::user(user),
	]
}

pub fn planning_messages(query: &str, tool_names: &[&str]) -> Vec<ChatMessage> {
	vec![
		ChatMessage::system(PLANNING_SYSTEM),
		ChatMessage::user(format!(
			"Task: {query}\nAvailable tools: {}",
			if tool_names.is_empty() { "none".to_string() } else { tool_names.join(", ") }
		)),
	]
}

pub fn reflection_messages(query: &str, step: &ThoughtStep) -> Vec<ChatMessage> {
	vec![
		ChatMessage::system(REFLECTION_SYSTEM),
		ChatMessage::user(format!("Question: {query}\n\n{}", render_step(step))),
	]
}

pub fn current_time() -> String {
	let now = OffsetDateTime::now_utc();

	now.format(&Rfc3339).unwrap_or_else(|_| now.unix_timestamp().to_string())
}

fn push_history(out: &mut String, history: &[HistoryMessage]) {
	if history.is_empty() {
		return;
	}

	out.push_str("Conversation history:\n");

	for message in history {
		out.push_str(&format!("{}: {}\n", message.role.as_str(), message.text));
	}

	out.push('\n');
}

fn push_plan(out: &mut String, plan: &[String]) {
	if plan.is_empty() {
		return;
	}

	out.push_str("Plan:\n");

	for (idx, step) in plan.iter().enumerate() {
		out.push_str(&format!("Step {}: {step}\n", idx + 1));
	}

	out.push('\n');
}

fn render_trace(trace: &[ThoughtStep]) -> String {
	trace.iter().map(render_step).collect::<Vec<_>>().join("\n")
}

fn render_step(step: &ThoughtStep) -> String {
	let mut out = format!("Thought: {}\n", step.thought);

	if let Some(tool) = step.tool.as_deref() {
		out.push_str(&format!("Action: {tool}\n"));

		if let Some(input) = step.tool_input.as_ref() {
			out.push_str(&format!("Action Input: {input}\n"));
		}
	}
	if let Some(observation) = step.observation.as_deref() {
		out.push_str(&format!("Observation: {}\n", clip(observation, MAX_OBSERVATION_CHARS)));
	}
	if let Some(reflection) = step.reflection.as_deref() {
		out.push_str(&format!("Reflection: {reflection}\n"));
	}
	if let Some(answer) = step.final_answer.as_deref() {
		out.push_str(&format!("Draft answer: {answer}\n"));
	}

	out
}

fn clip(text: &str, max_chars: usize) -> String {
	match text.char_indices().nth(max_chars) {
		Some((idx, _)) => format!("{}... [clipped]", &text[..idx]),
		None => text.to_string(),
	}
}
