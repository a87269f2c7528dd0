use serde::{Deserialize, Serialize};

use crate::{HistoryMessage, agent::extract_json_object};
use lore_providers::llm::ChatMessage;

const INTENT_SYSTEM: &str = "\
Classify the user's question so it can be routed. Do not answer it.

Reply with one JSON object only:
{
  \"intent\": \"<intent>\",
  \"confidence\": 0.9,
  \"reasoning\": \"<one sentence>\",
  \"suggested_tools\": [\"<tool>\"],
  \"sub_questions\": [\"<sub-question>\"],
  \"needs_realtime\": false,
  \"topic_keywords\": [\"<keyword>\"]
}

Intents:
- knowledge_base: concepts, tutorials or document content answerable from the local document collection.
- web_search: live or recent information such as weather, news, prices or current events.
- direct_answer: greetings, common knowledge, arithmetic or code that needs no lookup.
- conversation: refers back to earlier turns (\"what did you just say\").
- file_operation: reading, creating or changing files.
- multi_step: needs several steps, for example analyse documents and then write a report.
- trending: hot topics or trends.

Time words such as today, now or latest combined with changing information mean web_search.
Confidence is between 0 and 1.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
	KnowledgeBase,
	WebSearch,
	DirectAnswer,
	Conversation,
	FileOperation,
	MultiStep,
	Trending,
}
impl Intent {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::KnowledgeBase => "knowledge_base",
			Self::WebSearch => "web_search",
			Self::DirectAnswer => "direct_answer",
			Self::Conversation => "conversation",
			Self::FileOperation => "file_operation",
			Self::MultiStep => "multi_step",
			Self::Trending => "trending",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"knowledge_base" => Some(Self::KnowledgeBase),
			"web_search" => Some(Self::WebSearch),
			"direct_answer" => Some(Self::DirectAnswer),
			"conversation" => Some(Self::Conversation),
			"file_operation" => Some(Self::FileOperation),
			"multi_step" => Some(Self::MultiStep),
			"trending" => Some(Self::Trending),
			_ => None,
		}
	}

	/// Only questions that need tools beyond one retrieval pass reach the reasoning loop.
	pub fn route(self) -> Route {
		match self {
			Self::KnowledgeBase => Route::Retrieval,
			Self::DirectAnswer | Self::Conversation => Route::Direct,
			Self::WebSearch | Self::FileOperation | Self::MultiStep | Self::Trending => Route::Agent,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
	/// One retrieval pass, then one answer call.
	Retrieval,
	/// One answer call from the question and conversation history.
	Direct,
	Agent,
}
impl Route {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Retrieval => "retrieval",
			Self::Direct => "direct",
			Self::Agent => "agent",
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IntentAnalysis {
	pub intent: Intent,
	pub confidence: f32,
	pub reasoning: String,
	pub suggested_tools: Vec<String>,
	pub sub_questions: Vec<String>,
	pub needs_realtime: bool,
	pub topic_keywords: Vec<String>,
}
impl IntentAnalysis {
	/// Classification failed; the reasoning loop handles the question.
	pub fn fallback(query: &str, reason: impl Into<String>) -> Self {
		Self {
			intent: Intent::MultiStep,
			confidence: 0.5,
			reasoning: reason.into(),
			suggested_tools: vec!["rag_search".to_string()],
			sub_questions: vec![query.to_string()],
			needs_realtime: false,
			topic_keywords: Vec::new(),
		}
	}
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct RawAnalysis {
	intent: String,
	confidence: Option<f32>,
	reasoning: String,
	suggested_tools: Vec<String>,
	sub_questions: Vec<String>,
	needs_realtime: bool,
	topic_keywords: Vec<String>,
}

/// Reads the JSON object of a classification reply, inside a ```json fence or
/// bare. A missing or unknown intent becomes `multi_step`.
pub fn parse_intent(text: &str) -> Option<IntentAnalysis> {
	let body = text.find("```json").map(|idx| &text[idx + "```json".len()..]).unwrap_or(text);
	let raw: RawAnalysis = serde_json::from_str(extract_json_object(body)?).ok()?;

	Some(IntentAnalysis {
		intent: Intent::parse(&raw.intent).unwrap_or(Intent::MultiStep),
		confidence: raw.confidence.filter(|value| value.is_finite()).unwrap_or(0.5).clamp(0.0, 1.0),
		reasoning: raw.reasoning,
		suggested_tools: raw.suggested_tools,
		sub_questions: raw.sub_questions,
		needs_realtime: raw.needs_realtime,
		topic_keywords: raw.topic_keywords,
	})
}

pub fn intent_messages(
	query: &str,
	tool_names: &[&str],
	history: &[HistoryMessage],
	now: &str,
) -> Vec<ChatMessage> {
	let mut user = format!("Current time: {now}\nAvailable tools: {}\n\n", tool_names.join(", "));

	if history.is_empty() {
		user.push_str("Conversation history: (none)\n\n");
	} else {
		user.push_str("Conversation history:\n");

		for message in history {
			user.push_str(&format!("{}: {}\n", message.role.as_str(), message.text));
		}

		user.push('\n');
	}

	user.push_str(&format!("Question: {query}"));

	vec![ChatMessage::system(INTENT_SYSTEM), ChatMessage::user(user)]
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_a_fenced_reply() {
		let reply = "Here you go:\n```json\n{\"intent\": \"knowledge_base\", \"confidence\": 0.8, \"topic_keywords\": [\"cats\"]}\n```";
		let analysis = parse_intent(reply).expect("analysis expected");

		assert_eq!(analysis.intent, Intent::KnowledgeBase);
		assert_eq!(analysis.confidence, 0.8);
		assert_eq!(analysis.topic_keywords, vec!["cats".to_string()]);
		assert_eq!(analysis.intent.route(), Route::Retrieval);
	}

	#[test]
	fn unknown_intent_and_missing_fields_default_to_the_reasoning_loop() {
		let analysis = parse_intent("{\"intent\": \"poetry\"}").expect("analysis expected");

		assert_eq!(analysis.intent, Intent::MultiStep);
		assert_eq!(analysis.confidence, 0.5);
		assert_eq!(analysis.intent.route(), Route::Agent);
	}

	#[test]
	fn replies_without_json_do_not_parse() {
		assert!(parse_intent("It is probably a knowledge question.").is_none());
		assert!(parse_intent("{\"intent\": ").is_none());
	}

	#[test]
	fn routes_every_intent() {
		assert_eq!(Intent::DirectAnswer.route(), Route::Direct);
		assert_eq!(Intent::Conversation.route(), Route::Direct);
		assert_eq!(Intent::WebSearch.route(), Route::Agent);
		assert_eq!(Intent::FileOperation.route(), Route::Agent);
		assert_eq!(Intent::Trending.route(), Route::Agent);
	}
}
