use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

static ACTION: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"Action:\s*([A-Za-z_][A-Za-z0-9_\-]*)").ok());
static FINAL_ANSWER: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"(?s)Final Answer:\s*(.+)").ok());
static RETRY: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?s)RETRY:\s*(.+)").ok());
static PLAN_STEP: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"Step\s*\d+\s*:").ok());
static STRING_PAIR: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r#""(\w+)"\s*:\s*"((?:[^"\\]|\\.)*)""#).ok());
static NUMBER_PAIR: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r#""(\w+)"\s*:\s*(-?\d+(?:\.\d+)?)"#).ok());
static BOOL_PAIR: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r#""(\w+)"\s*:\s*(true|false)\b"#).ok());

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedAction {
	pub tool: String,
	pub input: Value,
}

/// One reasoning reply in the Thought / Action / Action Input / Final Answer format.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedTurn {
	pub thought: String,
	pub action: Option<ParsedAction>,
	pub final_answer: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reflection {
	pub approved: bool,
	pub advice: Option<String>,
	pub text: String,
}

/// A final answer wins over an action. No action and no final answer means
/// the model is ready to answer.
pub fn parse_turn(text: &str) -> ParsedTurn {
	let thought = extract_thought(text);

	if let Some(answer) = capture(&FINAL_ANSWER, text) {
		return ParsedTurn { thought, action: None, final_answer: Some(answer) };
	}

	let action = capture(&ACTION, text).map(|tool| ParsedAction {
		tool,
		input: text
			.find("Action Input:")
			.map(|idx| parse_action_input(&text[idx + "Action Input:".len()..]))
			.unwrap_or_else(|| Value::Object(Map::new())),
	});

	ParsedTurn { thought, action, final_answer: None }
}

pub fn parse_plan(text: &str) -> Vec<String> {
	let Some(re) = &*PLAN_STEP else {
		return Vec::new();
	};
	let markers: Vec<(usize, usize)> = re.find_iter(text).map(|m| (m.start(), m.end())).collect();
	let mut steps = Vec::with_capacity(markers.len());

	for (idx, (_, body_start)) in markers.iter().enumerate() {
		let body_end = markers.get(idx + 1).map(|(start, _)| *start).unwrap_or(text.len());
		let step = text[*body_start..body_end].split_whitespace().collect::<Vec<_>>().join(" ");

		if !step.is_empty() {
			steps.push(step);
		}
	}

	steps
}

/// `APPROVED` anywhere approves; `RETRY: advice` rejects; anything else approves.
pub fn parse_reflection(text: &str) -> Reflection {
	let trimmed = text.trim().to_string();

	if trimmed.to_uppercase().contains("APPROVED") {
		return Reflection { approved: true, advice: None, text: trimmed };
	}
	if let Some(advice) = capture(&RETRY, &trimmed) {
		return Reflection { approved: false, advice: Some(advice), text: trimmed };
	}

	Reflection { approved: true, advice: None, text: trimmed }
}

/// First balanced `{...}` in `text`, honoring string literals.
pub fn extract_json_object(text: &str) -> Option<&str> {
	let start = text.find('{')?;
	let mut depth = 0_usize;
	let mut in_string = false;
	let mut escaped = false;

	for (offset, ch) in text[start..].char_indices() {
		if in_string {
			match ch {
				_ if escaped => escaped = false,
				'\\' => escaped = true,
				'"' => in_string = false,
				_ => {},
			}

			continue;
		}

		match ch {
			'"' => in_string = true,
			'{' => depth += 1,
			'}' => {
				depth -= 1;

				if depth == 0 {
					return Some(&text[start..start + offset + ch.len_utf8()]);
				}
			},
			_ => {},
		}
	}

	None
}

fn parse_action_input(raw: &str) -> Value {
	let candidate = extract_json_object(raw);

	if let Some(json) = candidate
		&& let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(json)
	{
		return value;
	}

	let scope = candidate.unwrap_or(raw);
	let scraped = scrape_pairs(scope);

	if scraped.is_empty() {
		tracing::debug!("Action input is not JSON and has no recognizable pairs.");
	}

	Value::Object(scraped)
}

/// Best-effort recovery of `"key": value` pairs from malformed JSON.
fn scrape_pairs(text: &str) -> Map<String, Value> {
	let mut out = Map::new();

	if let Some(re) = &*STRING_PAIR {
		for caps in re.captures_iter(text) {
			out.insert(caps[1].to_string(), Value::String(unescape(&caps[2])));
		}
	}
	if let Some(re) = &*NUMBER_PAIR {
		for caps in re.captures_iter(text) {
			let raw = &caps[2];
			let number = raw
				.parse::<i64>()
				.map(Value::from)
				.or_else(|_| raw.parse::<f64>().map(Value::from))
				.unwrap_or(Value::Null);

			out.entry(caps[1].to_string()).or_insert(number);
		}
	}
	if let Some(re) = &*BOOL_PAIR {
		for caps in re.captures_iter(text) {
			out.entry(caps[1].to_string()).or_insert(Value::Bool(&caps[2] == "true"));
		}
	}

	out
}

fn unescape(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());
	let mut chars = raw.chars();

	while let Some(ch) = chars.next() {
		if ch != '\\' {
			out.push(ch);

			continue;
		}

		match chars.next() {
			Some('n') => out.push('\n'),
			Some('t') => out.push('\t'),
			Some(other) => out.push(other),
			None => out.push('\\'),
		}
	}

	out
}

fn extract_thought(text: &str) -> String {
	let body = match text.find("Thought:") {
		Some(idx) => &text[idx + "Thought:".len()..],
		None => text,
	};
	let end = ["Action:", "Action Input:", "Final Answer:"]
		.iter()
		.filter_map(|marker| body.find(marker))
		.min()
		.unwrap_or(body.len());

	body[..end].trim().to_string()
}

fn capture(re: &LazyLock<Option<Regex>>, text: &str) -> Option<String> {
	let Some(re) = &**re else {
		return None;
	};
	let caps = re.captures(text)?;
	let value = caps.get(1)?.as_str().trim();

	if value.is_empty() { None } else { Some(value.to_string()) }
}
