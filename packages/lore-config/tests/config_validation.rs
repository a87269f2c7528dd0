use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use lore_config::Error;

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_value() -> Value {
	toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.")
}

fn set(value: &mut Value, table_path: &[&str], key: &str, entry: Value) {
	let mut table = value.as_table_mut().expect("Template config must be a table.");

	for segment in table_path {
		table = table
			.get_mut(*segment)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Template config must include [{segment}]."));
	}

	table.insert(key.to_string(), entry);
}

fn remove_table(value: &mut Value, key: &str) {
	value.as_table_mut().expect("Template config must be a table.").remove(key);
}

fn render(value: &Value) -> String {
	toml::to_string(value).expect("Failed to render template config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("lore_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_value(value: &Value) -> lore_config::Result<lore_config::Config> {
	let path = write_temp_config(render(value));
	let result = lore_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

fn expect_invalid(value: &Value, key: &str) -> Error {
	let err = load_value(value).expect_err("Expected validation error.");

	assert!(err.keys().contains(&key), "Expected an error about {key}, got {err:?}.");

	err
}

#[test]
fn lore_example_toml_is_valid() {
	let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../lore.example.toml");
	let cfg = lore_config::load(&path).expect("Expected lore.example.toml to be a valid config.");

	assert_eq!(cfg.retrieval.top_k, 5);
	assert_eq!(cfg.agent.max_iterations, 5);
	assert!(cfg.security.bind_localhost_only);
}

#[test]
fn optional_sections_fall_back_to_defaults() {
	let mut value = sample_value();

	for key in ["lexical", "agent", "tools", "security"] {
		remove_table(&mut value, key);
	}

	let cfg = load_value(&value).expect("Expected config without optional sections to load.");

	assert_eq!(cfg.lexical.k1, 1.5);
	assert_eq!(cfg.lexical.b, 0.75);
	assert_eq!(cfg.agent.max_iterations, 5);
	assert!(cfg.agent.enable_planning);
	assert!(!cfg.agent.enable_reflection);
	assert!(cfg.agent.enable_routing);
	assert_eq!(cfg.agent.timeout_ms, 30_000);
	assert_eq!(cfg.tools.max_read_lines, 100);
	assert!(cfg.security.bind_localhost_only);
}

#[test]
fn missing_file_reports_read_error() {
	let path = env::temp_dir().join("lore_config_test_missing_file.toml");
	let err = lore_config::load(&path).expect_err("Expected read error.");

	assert!(matches!(err, Error::ReadConfig { .. }));
	assert!(err.keys().is_empty());
}

#[test]
fn malformed_toml_reports_parse_error() {
	let path = write_temp_config("[service\nhttp_bind = ".to_string());
	let err = lore_config::load(&path).expect_err("Expected parse error.");

	assert!(matches!(err, Error::ParseConfig { .. }));
}

#[test]
fn retrieval_top_k_must_be_positive() {
	let mut value = sample_value();

	set(&mut value, &["retrieval"], "top_k", Value::Integer(0));

	expect_invalid(&value, "retrieval.top_k");
}

#[test]
fn retrieval_weights_must_be_non_negative() {
	let mut value = sample_value();

	set(&mut value, &["retrieval"], "vector_weight", Value::Float(-0.1));

	let err = expect_invalid(&value, "retrieval.vector_weight");

	assert_eq!(err.to_string(), "retrieval.vector_weight must be zero or greater.");
}

#[test]
fn retrieval_weights_require_at_least_one_positive() {
	let mut value = sample_value();

	set(&mut value, &["retrieval"], "vector_weight", Value::Float(0.0));
	set(&mut value, &["retrieval"], "lexical_weight", Value::Float(0.0));

	let err = expect_invalid(&value, "retrieval.lexical_weight");

	assert!(matches!(err, Error::Conflict { .. }));
	assert!(err.keys().contains(&"retrieval.vector_weight"));
}

#[test]
fn lexical_b_must_be_in_unit_range() {
	let mut value = sample_value();

	set(&mut value, &["lexical"], "b", Value::Float(1.5));

	expect_invalid(&value, "lexical.b");
}

#[test]
fn lexical_k1_must_be_positive() {
	let mut value = sample_value();

	set(&mut value, &["lexical"], "k1", Value::Float(0.0));

	expect_invalid(&value, "lexical.k1");
}

#[test]
fn agent_max_iterations_must_be_at_least_one() {
	let mut value = sample_value();

	set(&mut value, &["agent"], "max_iterations", Value::Integer(0));

	expect_invalid(&value, "agent.max_iterations");
}

#[test]
fn agent_timeout_must_be_positive() {
	let mut value = sample_value();

	set(&mut value, &["agent"], "timeout_ms", Value::Integer(0));

	expect_invalid(&value, "agent.timeout_ms");
}

#[test]
fn rerank_top_n_must_be_positive_when_enabled() {
	let mut value = sample_value();

	set(&mut value, &["retrieval", "rerank"], "enabled", Value::Boolean(true));
	set(&mut value, &["retrieval", "rerank"], "top_n", Value::Integer(0));

	expect_invalid(&value, "retrieval.rerank.top_n");
}

#[test]
fn provider_api_key_cannot_be_blank() {
	let mut value = sample_value();

	set(&mut value, &["providers", "llm"], "api_key", Value::String("   ".to_string()));

	let err = expect_invalid(&value, "providers.llm.api_key");

	assert!(matches!(err, Error::Blank { .. }));
}

#[test]
fn blank_optional_strings_are_normalized_to_none() {
	let mut value = sample_value();

	set(&mut value, &["agent"], "final_answer_signal", Value::String("  ".to_string()));
	set(&mut value, &["providers", "web_search"], "language", Value::String(String::new()));

	let cfg = load_value(&value).expect("Expected config to load.");

	assert!(cfg.agent.final_answer_signal.is_none());
	assert!(
		cfg.providers.web_search.as_ref().expect("web_search must be present").language.is_none()
	);
}

#[test]
fn provider_timeouts_must_be_positive() {
	let mut value = sample_value();

	set(&mut value, &["providers", "rerank"], "timeout_ms", Value::Integer(0));

	let err = expect_invalid(&value, "providers.rerank.timeout_ms");

	assert!(matches!(err, Error::OutOfRange { expected: "greater than zero", .. }));
}
