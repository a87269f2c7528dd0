use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
	Thinking,
	Action,
	Observation,
	Reflection,
	Answer,
	Error,
	Done,
}

/// Wire shape: `{"type": ..., "data": ..., "step": ...}`.
#[derive(Clone, Debug, Serialize)]
pub struct StreamEvent {
	#[serde(rename = "type")]
	pub kind: EventKind,
	pub data: Value,
	pub step: u32,
}
impl StreamEvent {
	pub fn new(kind: EventKind, step: u32, data: Value) -> Self {
		Self { kind, data, step }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn serializes_with_type_field() {
		let event = StreamEvent::new(EventKind::Observation, 2, serde_json::json!({ "ok": true }));
		let json = serde_json::to_value(&event).expect("serialize failed");

		assert_eq!(json, serde_json::json!({ "type": "observation", "data": { "ok": true }, "step": 2 }));
	}
}
