use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Immutable unit of retrievable text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
	pub id: String,
	pub text: String,
	pub source_name: String,
	pub chunk_index: u32,
	#[serde(default)]
	pub metadata: BTreeMap<String, String>,
}

/// One line of a corpus JSONL file.
#[derive(Clone, Debug, Deserialize)]
pub struct ChunkRecord {
	pub id: Option<String>,
	pub text: String,
	pub source_name: String,
	pub chunk_index: u32,
	#[serde(default)]
	pub metadata: BTreeMap<String, String>,
}
impl ChunkRecord {
	pub fn into_chunk(self) -> Chunk {
		let id = match self.id {
			Some(id) if !id.trim().is_empty() => id,
			_ => chunk_id(&self.source_name, self.chunk_index),
		};

		Chunk {
			id,
			text: self.text,
			source_name: self.source_name,
			chunk_index: self.chunk_index,
			metadata: self.metadata,
		}
	}
}

/// Stable id for a chunk that arrives without one.
pub fn chunk_id(source_name: &str, chunk_index: u32) -> String {
	let mut hasher = blake3::Hasher::new();

	hasher.update(source_name.as_bytes());
	hasher.update(&[0]);
	hasher.update(&chunk_index.to_le_bytes());

	let hex = hasher.finalize().to_hex();

	hex.as_str()[..32].to_string()
}
