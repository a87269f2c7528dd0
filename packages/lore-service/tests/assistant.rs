use std::sync::Arc;

use lore_config::Config;
use lore_service::{AgentRequest, HistoryStore, Intent, LoreService, Role, Route};
use lore_testkit::{ScriptedLlm, sample_chunks, test_config, test_providers};

fn routed_config() -> Config {
	let mut cfg = test_config();

	cfg.agent.enable_routing = true;

	cfg
}

fn service(cfg: Config, llm: Arc<ScriptedLlm>) -> LoreService {
	LoreService::with_chunks(cfg, test_providers(llm), sample_chunks())
		.expect("Failed to build service.")
}

fn request(query: &str) -> AgentRequest {
	AgentRequest { query: query.to_string(), conversation_id: None }
}

fn intent_reply(intent: &str) -> String {
	format!(
		"```json\n{{\"intent\": \"{intent}\", \"confidence\": 0.9, \"reasoning\": \"scripted\", \"topic_keywords\": [\"cats\"]}}\n```"
	)
}

#[tokio::test]
async fn knowledge_questions_take_one_retrieval_pass() {
	let llm = Arc::new(ScriptedLlm::new([
		intent_reply("knowledge_base"),
		"Cats are mammals [1].".to_string(),
	]));
	let service = service(routed_config(), llm.clone());
	let answered = service.answer(request("Are cats mammals?")).await.expect("Answer failed.");
	let response = &answered.response;

	assert_eq!(answered.route, Route::Retrieval);
	assert_eq!(
		answered.intent.as_ref().map(|analysis| analysis.intent),
		Some(Intent::KnowledgeBase)
	);
	assert!(response.success, "Answer failed: {:?}", response.error);
	assert_eq!(response.answer, "Cats are mammals [1].");
	assert_eq!(response.tools_used, vec!["rag_search".to_string()]);
	assert_eq!(response.iterations, 1);
	assert_eq!(llm.generate_calls(), 2);
	assert_eq!(llm.stream_calls(), 0);

	let prompts = llm.prompts();

	assert!(prompts[0][1].content.contains("Question: Are cats mammals?"));
	assert!(prompts[1][1].content.contains("[1] (source: animals.md)"));
	assert!(prompts[1][1].content.contains("cats are mammals"));
	// The single pass does not go through the tool registry.
	assert_eq!(service.tools().stats("rag_search").map(|stats| stats.calls), Some(0));
}

#[tokio::test]
async fn direct_questions_are_answered_from_history_without_tools() {
	let llm = Arc::new(ScriptedLlm::new([
		intent_reply("conversation"),
		"You asked about cats.".to_string(),
	]));
	let service = service(routed_config(), llm.clone());

	service.history.append("c1", Role::User, "Tell me about cats.").await.expect("Append failed.");
	service.history.append("c1", Role::Assistant, "Cats are mammals.").await.expect("Append failed.");

	let answered = service
		.answer(AgentRequest {
			query: "What did I just ask?".to_string(),
			conversation_id: Some("c1".to_string()),
		})
		.await
		.expect("Answer failed.");

	assert_eq!(answered.route, Route::Direct);
	assert!(answered.response.success);
	assert!(answered.response.tools_used.is_empty());
	assert_eq!(answered.response.answer, "You asked about cats.");
	assert_eq!(llm.generate_calls(), 2);

	let prompts = llm.prompts();
	let direct = &prompts[1];

	assert!(prompts[0][1].content.contains("user: Tell me about cats."));
	assert_eq!(direct[1].role, "user");
	assert_eq!(direct[1].content, "Tell me about cats.");
	assert_eq!(direct[2].role, "assistant");
	assert_eq!(
		direct.last().map(|message| message.content.as_str()),
		Some("What did I just ask?")
	);

	let recent = service.history.get_recent("c1", 10).await.expect("History read failed.");

	assert_eq!(recent.len(), 4);
}

#[tokio::test]
async fn multi_step_questions_reach_the_reasoning_loop() {
	let llm = Arc::new(ScriptedLlm::new([
		intent_reply("multi_step"),
		"Thought: I already know this.\nFinal Answer: Cats are mammals.".to_string(),
		"Cats are mammals.".to_string(),
	]));
	let service = service(routed_config(), llm.clone());
	let answered = service.answer(request("Compare cats and dogs.")).await.expect("Answer failed.");

	assert_eq!(answered.route, Route::Agent);
	assert!(answered.response.success);
	assert_eq!(answered.response.answer, "Cats are mammals.");
	assert_eq!(llm.generate_calls(), 3);
	assert!(llm.prompts()[2][0].content.starts_with("Write the final answer"));
}

#[tokio::test]
async fn web_questions_reach_the_reasoning_loop() {
	let llm = Arc::new(ScriptedLlm::new([
		intent_reply("web_search"),
		"Final Answer: Sunny.".to_string(),
		"Sunny.".to_string(),
	]));
	let service = service(routed_config(), llm.clone());
	let answered = service.answer(request("Weather today?")).await.expect("Answer failed.");

	assert_eq!(answered.route, Route::Agent);
	assert_eq!(answered.response.answer, "Sunny.");
}

#[tokio::test]
async fn unparseable_classification_falls_back_to_the_reasoning_loop() {
	let llm = Arc::new(ScriptedLlm::new([
		"This looks like a knowledge question.",
		"Final Answer: Cats are mammals.",
		"Cats are mammals.",
	]));
	let service = service(routed_config(), llm.clone());
	let answered = service.answer(request("Are cats mammals?")).await.expect("Answer failed.");
	let analysis = answered.intent.expect("Intent expected.");

	assert_eq!(answered.route, Route::Agent);
	assert_eq!(analysis.intent, Intent::MultiStep);
	assert_eq!(analysis.confidence, 0.5);
	assert_eq!(analysis.sub_questions, vec!["Are cats mammals?".to_string()]);
	assert!(answered.response.success);
	assert_eq!(llm.generate_calls(), 3);
}

#[tokio::test]
async fn failed_classification_falls_back_to_the_reasoning_loop() {
	let llm = Arc::new(
		ScriptedLlm::new(Vec::<String>::new())
			.then_fail("classifier offline")
			.then_reply("Final Answer: Cats are mammals.")
			.then_reply("Cats are mammals."),
	);
	let service = service(routed_config(), llm.clone());
	let answered = service.answer(request("Are cats mammals?")).await.expect("Answer failed.");

	assert_eq!(answered.route, Route::Agent);
	let reasoning = answered.intent.as_ref().map(|analysis| analysis.reasoning.as_str());

	assert!(reasoning.unwrap_or_default().contains("classifier offline"));
	assert!(answered.response.success);
	assert_eq!(answered.response.answer, "Cats are mammals.");
}

#[tokio::test]
async fn disabled_routing_skips_classification() {
	let llm = Arc::new(ScriptedLlm::new(["Final Answer: Cats are mammals.", "Cats are mammals."]));
	let service = service(test_config(), llm.clone());
	let answered = service.answer(request("Are cats mammals?")).await.expect("Answer failed.");

	assert_eq!(answered.route, Route::Agent);
	assert!(answered.intent.is_none());
	assert_eq!(answered.response.answer, "Cats are mammals.");
	assert_eq!(llm.generate_calls(), 2);
}

#[tokio::test]
async fn failed_single_pass_answer_is_reported_and_not_persisted() {
	let llm =
		Arc::new(ScriptedLlm::new([intent_reply("knowledge_base")]).then_fail("model offline"));
	let service = service(routed_config(), llm);
	let answered = service
		.answer(AgentRequest {
			query: "Are cats mammals?".to_string(),
			conversation_id: Some("c2".to_string()),
		})
		.await
		.expect("Answer failed.");

	assert_eq!(answered.route, Route::Retrieval);
	assert!(!answered.response.success);
	assert!(answered.response.error.as_deref().unwrap_or_default().contains("model offline"));
	assert!(service.history.get_recent("c2", 10).await.expect("History read failed.").is_empty());
}

#[tokio::test]
async fn answer_rejects_blank_queries() {
	let llm = Arc::new(ScriptedLlm::new(Vec::<String>::new()));
	let service = service(routed_config(), llm.clone());

	assert!(service.answer(request("   ")).await.is_err());
	assert_eq!(llm.total_calls(), 0);
}
