use std::{path::PathBuf, sync::Arc, time::Duration};

use serde_json::{Value, json};

use lore_config::Config;
use lore_providers::web_search::WebResult;
use lore_service::{
	BoxFuture, Error, LoreService, ParamType, Providers, ToolExecutor, ToolKind, ToolParam,
	ToolRegistry, ToolResult, ToolSpec,
};
use lore_testkit::{
	RecordingWebSearch, ScriptedLlm, TempDir, sample_chunks, test_config, test_providers,
};

struct EchoTool {
	spec: ToolSpec,
	delay: Option<Duration>,
}
impl EchoTool {
	fn new(name: &str) -> Self {
		Self {
			spec: ToolSpec::new(
				name,
				"Echoes its input.",
				ToolKind::Analysis,
				vec![ToolParam::required("text", ParamType::String, "Text to echo.")],
			),
			delay: None,
		}
	}

	fn slow(name: &str, delay: Duration) -> Self {
		Self { delay: Some(delay), ..Self::new(name) }
	}
}
impl ToolExecutor for EchoTool {
	fn spec(&self) -> &ToolSpec {
		&self.spec
	}

	fn execute<'a>(&'a self, input: &'a Value) -> BoxFuture<'a, ToolResult> {
		Box::pin(async move {
			if let Some(delay) = self.delay {
				tokio::time::sleep(delay).await;
			}

			ToolResult::ok(input["text"].as_str().unwrap_or_default())
		})
	}
}

fn providers() -> Providers {
	test_providers(Arc::new(ScriptedLlm::new(Vec::<String>::new())))
}

fn service_with(cfg: Config, providers: Providers) -> LoreService {
	LoreService::with_chunks(cfg, providers, sample_chunks()).expect("Failed to build service.")
}

fn sandboxed_config(read_root: PathBuf, write_root: PathBuf) -> Config {
	let mut cfg = test_config();

	cfg.tools.read_roots = vec![read_root];
	cfg.tools.write_roots = vec![write_root];
	cfg.tools.max_write_bytes = 16;

	cfg
}

#[tokio::test]
async fn unknown_tool_is_reported_as_a_failed_result() {
	let service = service_with(test_config(), providers());
	let result = service.tools().dispatch("translate", &json!({ "text": "hola" })).await;

	assert!(!result.success);
	assert_eq!(result.error_message.as_deref(), Some("unknown tool"));
	assert!(result.output.contains("rag_search"), "Output should list tools: {}", result.output);
}

#[test]
fn duplicate_registration_is_a_configuration_error() {
	let mut registry = ToolRegistry::new(Duration::from_secs(1));

	registry.register(Arc::new(EchoTool::new("echo"))).expect("First registration failed.");

	let err = registry
		.register(Arc::new(EchoTool::new("echo")))
		.expect_err("Expected duplicate registration to fail.");

	assert!(matches!(err, Error::Configuration { .. }), "Unexpected error: {err:?}");
	assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn invalid_input_fails_before_execution_and_is_counted() {
	let mut registry = ToolRegistry::new(Duration::from_secs(1));

	registry.register(Arc::new(EchoTool::new("echo"))).expect("Registration failed.");

	let result = registry.dispatch("echo", &json!({ "text": 7 })).await;

	assert!(!result.success);
	assert!(
		result.error_message.as_deref().unwrap_or_default().contains("'text'"),
		"Unexpected message: {:?}",
		result.error_message
	);

	let ok = registry.dispatch("echo", &json!({ "text": "hi" })).await;
	let stats = registry.stats("echo").expect("Stats missing.");

	assert!(ok.success);
	assert_eq!(ok.output, "hi");
	assert_eq!(stats.calls, 2);
	assert_eq!(stats.failures, 1);
}

#[tokio::test]
async fn slow_tools_time_out_as_failures() {
	let mut registry = ToolRegistry::new(Duration::from_millis(20));

	registry
		.register(Arc::new(EchoTool::slow("sleepy", Duration::from_secs(5))))
		.expect("Registration failed.");

	let result = registry.dispatch("sleepy", &json!({ "text": "zzz" })).await;

	assert!(!result.success);
	assert!(result.output.contains("timed out"), "Unexpected output: {}", result.output);
}

#[tokio::test]
async fn rag_search_adapts_retrieval_results() {
	let service = service_with(test_config(), providers());
	let result = service
		.tools()
		.dispatch("rag_search", &json!({ "query": "cats", "method": "lexical" }))
		.await;

	assert!(result.success, "rag_search failed: {}", result.output);
	assert!(result.output.contains("animals.md"));
	assert!(!result.is_degraded());

	let hits = result.data.as_ref().and_then(Value::as_array).expect("Hits missing.");

	assert_eq!(hits[0]["id"], "a");
}

#[tokio::test]
async fn rag_search_rejects_unknown_methods() {
	let service = service_with(test_config(), providers());
	let result = service
		.tools()
		.dispatch("rag_search", &json!({ "query": "cats", "method": "psychic" }))
		.await;

	assert!(!result.success);
}

#[tokio::test]
async fn web_search_forwards_the_query_and_handles_empty_results() {
	let web = Arc::new(RecordingWebSearch::new(vec![WebResult {
		title: "Cats".to_string(),
		url: "https://example.com/cats".to_string(),
		content: "Cats are mammals.".to_string(),
	}]));
	let mut with_results = providers();

	with_results.web_search = web.clone();

	let service = service_with(test_config(), with_results);
	let result = service.tools().dispatch("web_search", &json!({ "query": "cats" })).await;

	assert!(result.success);
	assert!(result.output.contains("https://example.com/cats"));
	assert_eq!(web.queries(), vec!["cats".to_string()]);

	let empty = service_with(test_config(), providers());
	let result = empty.tools().dispatch("web_search", &json!({ "query": "nothing" })).await;

	assert!(result.success);
	assert!(result.output.starts_with("No web results found"));
}

#[tokio::test]
async fn web_search_is_absent_without_configuration() {
	let mut cfg = test_config();

	cfg.providers.web_search = None;

	let service = service_with(cfg, providers());

	assert!(!service.tools().contains("web_search"));
	assert!(service.tools().contains("rag_search"));
}

#[tokio::test]
async fn read_file_stays_inside_the_sandbox() {
	let allowed = TempDir::new("lore_read_allowed").expect("Temp dir failed.");
	let outside = TempDir::new("lore_read_outside").expect("Temp dir failed.");
	let inside_file = allowed.write("notes.txt", "one\ntwo\nthree\n").expect("Write failed.");
	let outside_file = outside.write("secret.txt", "secret").expect("Write failed.");
	let service = service_with(
		sandboxed_config(allowed.path().to_path_buf(), allowed.path().join("out")),
		providers(),
	);
	let ok = service
		.tools()
		.dispatch(
			"read_file",
			&json!({ "file_path": inside_file.display().to_string(), "max_lines": 2 }),
		)
		.await;

	assert!(ok.success, "read_file failed: {}", ok.output);
	assert!(ok.output.starts_with("one\ntwo"));
	assert!(ok.output.contains("[truncated: showing 2 of 3 lines]"));

	let denied = service
		.tools()
		.dispatch("read_file", &json!({ "file_path": outside_file.display().to_string() }))
		.await;

	assert!(!denied.success);
	assert!(denied.output.contains("Access denied"), "Unexpected output: {}", denied.output);
}

#[tokio::test]
async fn list_directory_reports_entries() {
	let allowed = TempDir::new("lore_list").expect("Temp dir failed.");

	allowed.write("a.txt", "alpha").expect("Write failed.");
	allowed.write("nested/b.txt", "beta").expect("Write failed.");

	let service = service_with(
		sandboxed_config(allowed.path().to_path_buf(), allowed.path().to_path_buf()),
		providers(),
	);
	let result = service
		.tools()
		.dispatch("list_directory", &json!({ "path": allowed.path().display().to_string() }))
		.await;

	assert!(result.success, "list_directory failed: {}", result.output);
	assert!(result.output.contains("a.txt (5 bytes)"));
	assert!(result.output.contains("nested/"));
}

#[tokio::test]
async fn write_file_enforces_sandbox_and_size_limit() {
	let root = TempDir::new("lore_write").expect("Temp dir failed.");
	let service = service_with(
		sandboxed_config(root.path().to_path_buf(), root.path().to_path_buf()),
		providers(),
	);
	let target = root.path().join("out/report.md");
	let written = service
		.tools()
		.dispatch(
			"write_file",
			&json!({ "file_path": target.display().to_string(), "content": "hello" }),
		)
		.await;

	assert!(written.success, "write_file failed: {}", written.output);

	let appended = service
		.tools()
		.dispatch(
			"write_file",
			&json!({ "file_path": target.display().to_string(), "content": " world", "append": true }),
		)
		.await;

	assert!(appended.success, "append failed: {}", appended.output);
	assert_eq!(std::fs::read_to_string(&target).expect("Read back failed."), "hello world");

	let oversized = root.path().join("big.txt");
	let too_big = service
		.tools()
		.dispatch(
			"write_file",
			&json!({ "file_path": oversized.display().to_string(), "content": "x".repeat(64) }),
		)
		.await;

	assert!(!too_big.success);
	assert!(!oversized.exists(), "Oversized content must not be written.");

	let escape = format!("{}/../escape.txt", root.path().display());
	let escaped = service
		.tools()
		.dispatch("write_file", &json!({ "file_path": escape, "content": "x" }))
		.await;

	assert!(!escaped.success);
	assert!(escaped.output.contains("parent directory"));
}

#[cfg(unix)]
#[tokio::test]
async fn write_file_refuses_links_that_leave_the_sandbox() {
	let root = TempDir::new("lore_write_link").expect("Temp dir failed.");
	let outside = TempDir::new("lore_write_victim").expect("Temp dir failed.");
	let victim = outside.path().join("victim.txt");
	let link = root.path().join("link.txt");
	let linked_dir = root.path().join("elsewhere");

	std::os::unix::fs::symlink(&victim, &link).expect("Symlink failed.");
	std::os::unix::fs::symlink(outside.path().join("missing_dir"), &linked_dir)
		.expect("Symlink failed.");

	let service = service_with(
		sandboxed_config(root.path().to_path_buf(), root.path().to_path_buf()),
		providers(),
	);
	let through_file = service
		.tools()
		.dispatch(
			"write_file",
			&json!({ "file_path": link.display().to_string(), "content": "pwned" }),
		)
		.await;

	assert!(!through_file.success, "Write through a link succeeded: {}", through_file.output);
	assert!(through_file.output.contains("Access denied"), "Unexpected output: {}", through_file.output);
	assert!(!victim.exists(), "Write escaped the sandbox.");

	let through_dir = service
		.tools()
		.dispatch(
			"write_file",
			&json!({
				"file_path": linked_dir.join("note.txt").display().to_string(),
				"content": "pwned",
			}),
		)
		.await;

	assert!(!through_dir.success, "Write through a linked directory succeeded.");
	assert!(!outside.path().join("missing_dir").exists());
}

#[tokio::test]
async fn failed_write_leaves_no_new_directories() {
	let root = TempDir::new("lore_write_rollback").expect("Temp dir failed.");
	let service = service_with(
		sandboxed_config(root.path().to_path_buf(), root.path().to_path_buf()),
		providers(),
	);
	let new_dir = root.path().join("drafts");
	let target = new_dir.join("deep").join("n".repeat(300));
	let result = service
		.tools()
		.dispatch(
			"write_file",
			&json!({ "file_path": target.display().to_string(), "content": "hello" }),
		)
		.await;

	assert!(!result.success, "Write with an overlong file name succeeded.");
	assert!(result.output.starts_with("Error: Cannot write"), "Unexpected output: {}", result.output);
	assert!(!new_dir.exists(), "Directories created for the failed write were left behind.");
}

#[tokio::test]
async fn analyze_corpus_reports_sources_and_terms() {
	let service = service_with(test_config(), providers());
	let result =
		service.tools().dispatch("analyze_corpus", &json!({ "analysis_type": "all" })).await;

	assert!(result.success, "analyze_corpus failed: {}", result.output);
	assert!(result.output.contains("animals.md"));
	assert!(result.output.contains("Most widespread terms"));
}

#[tokio::test]
async fn summarize_uses_one_generate_call() {
	let llm = Arc::new(ScriptedLlm::new(["Cats and dogs are mammals."]));
	let service = service_with(test_config(), test_providers(llm.clone()));
	let result = service
		.tools()
		.dispatch("summarize", &json!({ "text": "Cats are mammals. Dogs are mammals too." }))
		.await;

	assert!(result.success);
	assert_eq!(result.output, "Cats and dogs are mammals.");
	assert_eq!(llm.generate_calls(), 1);
}

#[test]
fn catalog_exposes_schemas_and_counters() {
	let service = service_with(test_config(), providers());
	let catalog = service.tool_catalog();
	let rag = catalog.iter().find(|tool| tool.name == "rag_search").expect("rag_search missing.");

	assert_eq!(rag.input_schema["required"], json!(["query"]));
	assert_eq!(rag.stats.calls, 0);
	assert!(catalog.iter().any(|tool| tool.name == "write_file" && tool.kind == ToolKind::FileWrite));
}
