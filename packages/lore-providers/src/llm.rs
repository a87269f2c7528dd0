use std::{collections::VecDeque, pin::Pin, time::Duration};

use color_eyre::{Result, eyre};
use futures::{Stream, StreamExt, stream};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Vec<u8>>> + Send>>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
	pub role: String,
	pub content: String,
}
impl ChatMessage {
	pub fn system(content: impl Into<String>) -> Self {
		Self { role: "system".to_string(), content: content.into() }
	}

	pub fn user(content: impl Into<String>) -> Self {
		Self { role: "user".to_string(), content: content.into() }
	}

	pub fn assistant(content: impl Into<String>) -> Self {
		Self { role: "assistant".to_string(), content: content.into() }
	}
}

/// One complete chat completion.
pub async fn generate(
	cfg: &lore_config::LlmProviderConfig,
	messages: &[ChatMessage],
	temperature: f32,
) -> Result<String> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = request_body(cfg, messages, temperature, false);
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_completion_response(json)
}

/// Chat completion streamed as content fragments, in arrival order.
///
/// Only connecting is bounded here; callers bound how long they keep reading.
pub async fn generate_stream(
	cfg: &lore_config::LlmProviderConfig,
	messages: &[ChatMessage],
	temperature: f32,
) -> Result<TextStream> {
	let client = Client::builder().connect_timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = request_body(cfg, messages, temperature, true);
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let bytes: ByteStream =
		Box::pin(res.error_for_status()?.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec())));
	let state = SseState { bytes, buffer: Vec::new(), pending: VecDeque::new(), done: false };

	Ok(Box::pin(stream::unfold(state, |mut state| async move {
		loop {
			if let Some(fragment) = state.pending.pop_front() {
				return Some((Ok(fragment), state));
			}
			if state.done {
				return None;
			}

			match state.bytes.next().await {
				Some(Ok(chunk)) => {
					state.buffer.extend_from_slice(&chunk);
					state.drain_lines();
				},
				Some(Err(err)) => {
					state.done = true;

					return Some((Err(err.into()), state));
				},
				None => {
					state.buffer.push(b'\n');
					state.drain_lines();
					state.done = true;
				},
			}
		}
	})))
}

#[derive(Debug, PartialEq, Eq)]
enum StreamLine {
	Fragment(String),
	Done,
	Skip,
}

struct SseState {
	bytes: ByteStream,
	buffer: Vec<u8>,
	pending: VecDeque<String>,
	done: bool,
}
impl SseState {
	fn drain_lines(&mut self) {
		while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
			let line: Vec<u8> = self.buffer.drain(..=pos).collect();
			let text = String::from_utf8_lossy(&line);

			match parse_stream_line(text.trim()) {
				StreamLine::Fragment(fragment) => self.pending.push_back(fragment),
				StreamLine::Done => {
					self.done = true;
					self.buffer.clear();

					return;
				},
				StreamLine::Skip => {},
			}
		}
	}
}

fn request_body(
	cfg: &lore_config::LlmProviderConfig,
	messages: &[ChatMessage],
	temperature: f32,
	stream: bool,
) -> Value {
	let mut body = serde_json::json!({
		"model": cfg.model,
		"temperature": temperature,
		"messages": messages,
		"stream": stream,
	});

	if let Some(max_tokens) = cfg.max_tokens {
		body["max_tokens"] = Value::from(max_tokens);
	}

	body
}

fn parse_completion_response(json: Value) -> Result<String> {
	json.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.map(str::to_string)
		.ok_or_else(|| eyre::eyre!("Completion response is missing message content."))
}

fn parse_stream_line(line: &str) -> StreamLine {
	let Some(data) = line.strip_prefix("data:") else {
		return StreamLine::Skip;
	};
	let data = data.trim();

	if data == "[DONE]" {
		return StreamLine::Done;
	}

	let Ok(json) = serde_json::from_str::<Value>(data) else {
		return StreamLine::Skip;
	};

	match json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("delta"))
		.and_then(|delta| delta.get("content"))
		.and_then(|c| c.as_str())
	{
		Some(content) if !content.is_empty() => StreamLine::Fragment(content.to_string()),
		_ => StreamLine::Skip,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_message_content() {
		let json = serde_json::json!({
			"choices": [{ "message": { "role": "assistant", "content": "Paris." } }]
		});

		assert_eq!(parse_completion_response(json).expect("parse failed"), "Paris.");
	}

	#[test]
	fn missing_content_is_an_error() {
		assert!(parse_completion_response(serde_json::json!({ "choices": [] })).is_err());
	}

	#[test]
	fn parses_stream_lines() {
		assert_eq!(
			parse_stream_line(r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#),
			StreamLine::Fragment("Hel".to_string())
		);
		assert_eq!(parse_stream_line("data: [DONE]"), StreamLine::Done);
		assert_eq!(parse_stream_line(": keep-alive"), StreamLine::Skip);
		assert_eq!(
			parse_stream_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
			StreamLine::Skip
		);
	}

	#[tokio::test]
	async fn sse_state_reassembles_split_lines() {
		let chunks: Vec<reqwest::Result<Vec<u8>>> = vec![
			Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel".to_vec()),
			Ok(b"lo\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n".to_vec()),
			Ok(b"data: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n".to_vec()),
		];
		let mut state = SseState {
			bytes: Box::pin(stream::iter(chunks)),
			buffer: Vec::new(),
			pending: VecDeque::new(),
			done: false,
		};
		let mut fragments = Vec::new();

		while !state.done {
			match state.bytes.next().await {
				Some(Ok(chunk)) => {
					state.buffer.extend_from_slice(&chunk);
					state.drain_lines();
				},
				_ => break,
			}
		}

		fragments.extend(state.pending.drain(..));

		assert_eq!(fragments, vec!["Hello".to_string(), " world".to_string()]);
	}

	#[test]
	fn request_body_includes_max_tokens_when_set() {
		let cfg = lore_config::LlmProviderConfig {
			provider_id: "p".to_string(),
			api_base: "http://localhost".to_string(),
			api_key: "key".to_string(),
			path: "/chat/completions".to_string(),
			model: "m".to_string(),
			temperature: 0.1,
			max_tokens: Some(64),
			timeout_ms: 1_000,
			default_headers: serde_json::Map::new(),
		};
		let body = request_body(&cfg, &[ChatMessage::user("hi")], 0.3, true);

		assert_eq!(body["max_tokens"], 64);
		assert_eq!(body["stream"], true);
		assert_eq!(body["messages"][0]["role"], "user");
	}
}
