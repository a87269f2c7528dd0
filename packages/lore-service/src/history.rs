use std::sync::Mutex;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::{BoxFuture, Result};

const DEFAULT_MAX_MESSAGES: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	User,
	Assistant,
}
impl Role {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::User => "user",
			Self::Assistant => "assistant",
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
	pub role: Role,
	pub text: String,
}

/// Conversation log. The agent only reads it; callers append.
pub trait HistoryStore
where
	Self: Send + Sync,
{
	fn append<'a>(
		&'a self,
		conversation_id: &'a str,
		role: Role,
		text: &'a str,
	) -> BoxFuture<'a, Result<()>>;

	/// Last `n` messages, oldest first.
	fn get_recent<'a>(
		&'a self,
		conversation_id: &'a str,
		n: usize,
	) -> BoxFuture<'a, Result<Vec<HistoryMessage>>>;
}

pub struct InMemoryHistoryStore {
	conversations: Mutex<AHashMap<String, Vec<HistoryMessage>>>,
	max_messages: usize,
}
impl InMemoryHistoryStore {
	/// Keeps at most `max_messages` per conversation, dropping the oldest.
	pub fn new(max_messages: usize) -> Self {
		Self { conversations: Mutex::new(AHashMap::new()), max_messages: max_messages.max(1) }
	}
}
impl Default for InMemoryHistoryStore {
	fn default() -> Self {
		Self::new(DEFAULT_MAX_MESSAGES)
	}
}
impl HistoryStore for InMemoryHistoryStore {
	fn append<'a>(
		&'a self,
		conversation_id: &'a str,
		role: Role,
		text: &'a str,
	) -> BoxFuture<'a, Result<()>> {
		{
			let mut conversations = self.conversations.lock().unwrap_or_else(|err| err.into_inner());
			let messages = conversations.entry(conversation_id.to_string()).or_default();

			messages.push(HistoryMessage { role, text: text.to_string() });

			if messages.len() > self.max_messages {
				let excess = messages.len() - self.max_messages;

				messages.drain(..excess);
			}
		}

		Box::pin(async { Ok(()) })
	}

	fn get_recent<'a>(
		&'a self,
		conversation_id: &'a str,
		n: usize,
	) -> BoxFuture<'a, Result<Vec<HistoryMessage>>> {
		let recent = {
			let conversations = self.conversations.lock().unwrap_or_else(|err| err.into_inner());

			conversations
				.get(conversation_id)
				.map(|messages| messages[messages.len().saturating_sub(n)..].to_vec())
				.unwrap_or_default()
		};

		Box::pin(async move { Ok(recent) })
	}
}

/// Last `turns` exchanges of a conversation, oldest first. A failed read is
/// logged and treated as no history.
pub(crate) async fn recent_turns(
	store: &dyn HistoryStore,
	conversation_id: Option<&str>,
	turns: u32,
) -> Vec<HistoryMessage> {
	let Some(conversation_id) = conversation_id else {
		return Vec::new();
	};
	let limit = turns as usize * 2;

	if limit == 0 {
		return Vec::new();
	}

	match store.get_recent(conversation_id, limit).await {
		Ok(messages) => messages,
		Err(err) => {
			tracing::warn!(conversation_id, error = %err, "Failed to load conversation history.");

			Vec::new()
		},
	}
}
