use std::{
	collections::BTreeMap,
	path::{Path, PathBuf},
	sync::{
		Arc, Mutex, RwLock,
		atomic::{AtomicU64, Ordering},
	},
};

use ahash::AHashMap;
use serde::Serialize;
use time::OffsetDateTime;

use crate::{Error, Result};
use lore_domain::{Chunk, ChunkRecord, Tokenizer};
use lore_lexical::{Bm25Params, LexicalSnapshot};

const PROGRESS_BATCH: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
	pub source_name: String,
	pub chunk_count: usize,
}

/// One consistent view of the chunk set and its lexical index.
pub struct CorpusSnapshot {
	pub version: u64,
	pub loaded_at: OffsetDateTime,
	by_id: AHashMap<String, Arc<Chunk>>,
	lexical: LexicalSnapshot,
}
impl CorpusSnapshot {
	pub fn len(&self) -> usize {
		self.lexical.len()
	}

	pub fn is_empty(&self) -> bool {
		self.lexical.is_empty()
	}

	pub fn get(&self, chunk_id: &str) -> Option<&Arc<Chunk>> {
		self.by_id.get(chunk_id)
	}

	pub fn chunks(&self) -> &[Arc<Chunk>] {
		self.lexical.chunks()
	}

	pub fn lexical(&self) -> &LexicalSnapshot {
		&self.lexical
	}

	/// Sources ordered by name.
	pub fn sources(&self) -> Vec<SourceSummary> {
		let mut counts: BTreeMap<&str, usize> = BTreeMap::new();

		for chunk in self.chunks() {
			*counts.entry(chunk.source_name.as_str()).or_insert(0) += 1;
		}

		counts
			.into_iter()
			.map(|(source_name, chunk_count)| SourceSummary {
				source_name: source_name.to_string(),
				chunk_count,
			})
			.collect()
	}
}

/// Owner of the current snapshot. Readers clone the `Arc`; the rebuild path swaps it.
pub struct Corpus {
	path: PathBuf,
	tokenizer: Arc<dyn Tokenizer>,
	params: Bm25Params,
	current: RwLock<Arc<CorpusSnapshot>>,
	next_version: AtomicU64,
}
impl Corpus {
	pub fn new(path: PathBuf, tokenizer: Arc<dyn Tokenizer>, params: Bm25Params) -> Self {
		let empty = CorpusSnapshot {
			version: 0,
			loaded_at: OffsetDateTime::now_utc(),
			by_id: AHashMap::new(),
			lexical: LexicalSnapshot::empty(tokenizer.clone(), params),
		};

		Self {
			path,
			tokenizer,
			params,
			current: RwLock::new(Arc::new(empty)),
			next_version: AtomicU64::new(1),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn snapshot(&self) -> Arc<CorpusSnapshot> {
		self.current.read().unwrap_or_else(|err| err.into_inner()).clone()
	}

	/// Builds a snapshot without publishing it. Rejects duplicate chunk ids.
	pub fn build_snapshot(&self, chunks: Vec<Chunk>) -> Result<CorpusSnapshot> {
		let mut by_id = AHashMap::with_capacity(chunks.len());
		let mut ordered = Vec::with_capacity(chunks.len());

		for chunk in chunks {
			if chunk.text.trim().is_empty() {
				return Err(Error::Corpus {
					message: format!("Chunk {} has empty text.", chunk.id),
				});
			}

			let chunk = Arc::new(chunk);

			if by_id.insert(chunk.id.clone(), chunk.clone()).is_some() {
				return Err(Error::Corpus { message: format!("Duplicate chunk id {}.", chunk.id) });
			}

			ordered.push(chunk);
		}

		let lexical = LexicalSnapshot::build(ordered, self.tokenizer.clone(), self.params);

		Ok(CorpusSnapshot {
			version: self.next_version.fetch_add(1, Ordering::SeqCst),
			loaded_at: OffsetDateTime::now_utc(),
			by_id,
			lexical,
		})
	}

	pub fn replace(&self, snapshot: CorpusSnapshot) {
		let version = snapshot.version;
		let chunk_count = snapshot.len();
		let mut current = self.current.write().unwrap_or_else(|err| err.into_inner());

		*current = Arc::new(snapshot);

		tracing::info!(version, chunk_count, "Corpus snapshot published.");
	}
}

pub async fn read_records(path: &Path) -> Result<Vec<ChunkRecord>> {
	let raw = tokio::fs::read_to_string(path).await.map_err(|err| Error::Corpus {
		message: format!("Failed to read corpus at {}: {err}", path.display()),
	})?;

	parse_records(&raw)
}

/// Parses JSONL chunk records; blank lines are skipped.
pub fn parse_records(raw: &str) -> Result<Vec<ChunkRecord>> {
	let mut records = Vec::new();

	for (idx, line) in raw.lines().enumerate() {
		if line.trim().is_empty() {
			continue;
		}

		let record: ChunkRecord = serde_json::from_str(line).map_err(|err| Error::Corpus {
			message: format!("Invalid chunk record on line {}: {err}", idx + 1),
		})?;

		records.push(record);
	}

	Ok(records)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildState {
	Idle,
	Running,
	Completed,
	Failed,
}

#[derive(Clone, Debug, Serialize)]
pub struct RebuildProgress {
	pub state: RebuildState,
	pub processed: u64,
	pub total: u64,
	pub snapshot_version: Option<u64>,
	#[serde(serialize_with = "crate::time_serde::option::serialize")]
	pub started_at: Option<OffsetDateTime>,
	#[serde(serialize_with = "crate::time_serde::option::serialize")]
	pub finished_at: Option<OffsetDateTime>,
	pub error: Option<String>,
}
impl Default for RebuildProgress {
	fn default() -> Self {
		Self {
			state: RebuildState::Idle,
			processed: 0,
			total: 0,
			snapshot_version: None,
			started_at: None,
			finished_at: None,
			error: None,
		}
	}
}

/// Single-writer corpus rebuild with observable progress.
pub struct RebuildJob {
	corpus: Arc<Corpus>,
	progress: Mutex<RebuildProgress>,
}
impl RebuildJob {
	pub fn new(corpus: Arc<Corpus>) -> Self {
		Self { corpus, progress: Mutex::new(RebuildProgress::default()) }
	}

	pub fn progress(&self) -> RebuildProgress {
		self.lock().clone()
	}

	/// Marks the job running and rebuilds in the background.
	pub fn start(self: &Arc<Self>, path: PathBuf) -> Result<RebuildProgress> {
		let initial = self.begin()?;
		let job = self.clone();

		tokio::spawn(async move {
			job.execute(&path).await;
		});

		Ok(initial)
	}

	/// Rebuilds in place and returns the final progress.
	pub async fn run(&self, path: &Path) -> Result<RebuildProgress> {
		self.begin()?;
		self.execute(path).await;

		let progress = self.progress();

		match progress.state {
			RebuildState::Failed => Err(Error::Corpus {
				message: progress.error.unwrap_or_else(|| "Rebuild failed.".to_string()),
			}),
			_ => Ok(progress),
		}
	}

	fn begin(&self) -> Result<RebuildProgress> {
		let mut progress = self.lock();

		if progress.state == RebuildState::Running {
			return Err(Error::Conflict {
				message: "A corpus rebuild is already running.".to_string(),
			});
		}

		*progress = RebuildProgress {
			state: RebuildState::Running,
			started_at: Some(OffsetDateTime::now_utc()),
			..RebuildProgress::default()
		};

		Ok(progress.clone())
	}

	async fn execute(&self, path: &Path) {
		tracing::info!(path = %path.display(), "Corpus rebuild started.");

		match self.rebuild(path).await {
			Ok(version) => {
				let mut progress = self.lock();

				progress.state = RebuildState::Completed;
				progress.snapshot_version = Some(version);
				progress.finished_at = Some(OffsetDateTime::now_utc());

				tracing::info!(
					version,
					processed = progress.processed,
					"Corpus rebuild completed."
				);
			},
			Err(err) => {
				let mut progress = self.lock();

				progress.state = RebuildState::Failed;
				progress.error = Some(err.to_string());
				progress.finished_at = Some(OffsetDateTime::now_utc());

				tracing::error!(error = %err, "Corpus rebuild failed.");
			},
		}
	}

	async fn rebuild(&self, path: &Path) -> Result<u64> {
		let records = read_records(path).await?;
		let total = records.len();

		self.lock().total = total as u64;

		let mut chunks = Vec::with_capacity(total);

		for (idx, record) in records.into_iter().enumerate() {
			chunks.push(record.into_chunk());

			if (idx + 1) % PROGRESS_BATCH == 0 {
				self.lock().processed = (idx + 1) as u64;
			}
		}

		let corpus = self.corpus.clone();
		let snapshot = tokio::task::spawn_blocking(move || corpus.build_snapshot(chunks))
			.await
			.map_err(|err| Error::Corpus { message: format!("Rebuild task failed: {err}") })??;
		let version = snapshot.version;

		self.lock().processed = total as u64;
		self.corpus.replace(snapshot);

		Ok(version)
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, RebuildProgress> {
		self.progress.lock().unwrap_or_else(|err| err.into_inner())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_jsonl_and_skips_blank_lines() {
		let raw = "{\"text\":\"a\",\"source_name\":\"s\",\"chunk_index\":0}\n\n{\"id\":\"x\",\"text\":\"b\",\"source_name\":\"s\",\"chunk_index\":1}\n";
		let records = parse_records(raw).expect("parse failed");

		assert_eq!(records.len(), 2);
		assert_eq!(records[1].id.as_deref(), Some("x"));
	}

	#[test]
	fn reports_line_number_of_bad_record() {
		let raw = "{\"text\":\"a\",\"source_name\":\"s\",\"chunk_index\":0}\nnot json\n";
		let err = parse_records(raw).expect_err("Expected parse error.");

		assert!(err.to_string().contains("line 2"), "Unexpected error: {err}");
	}
}
