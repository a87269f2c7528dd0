use std::{cmp::Ordering, sync::Arc};

use ahash::{AHashMap, AHashSet};

use lore_domain::{Chunk, Tokenizer};

use crate::{Bm25Params, TermStatistics, bm25};

#[derive(Clone, Debug)]
pub struct LexicalHit {
	pub chunk: Arc<Chunk>,
	pub score: f32,
}

struct Posting {
	chunk: usize,
	term_frequency: u32,
}

/// Immutable BM25 index over one chunk set.
pub struct LexicalSnapshot {
	chunks: Vec<Arc<Chunk>>,
	postings: AHashMap<String, Vec<Posting>>,
	stats: TermStatistics,
	params: Bm25Params,
	tokenizer: Arc<dyn Tokenizer>,
}
impl LexicalSnapshot {
	pub fn build(chunks: Vec<Arc<Chunk>>, tokenizer: Arc<dyn Tokenizer>, params: Bm25Params) -> Self {
		let chunk_terms: Vec<Vec<String>> =
			chunks.iter().map(|chunk| tokenizer.tokenize(&chunk.text)).collect();
		let stats = TermStatistics::build(&chunk_terms);
		let mut postings: AHashMap<String, Vec<Posting>> = AHashMap::new();

		for (idx, terms) in chunk_terms.into_iter().enumerate() {
			let mut counts: AHashMap<String, u32> = AHashMap::new();

			for term in terms {
				*counts.entry(term).or_insert(0) += 1;
			}
			for (term, term_frequency) in counts {
				postings.entry(term).or_default().push(Posting { chunk: idx, term_frequency });
			}
		}

		tracing::debug!(
			chunk_count = stats.chunk_count(),
			vocabulary_size = stats.vocabulary_size(),
			average_length = stats.average_length(),
			"Built lexical snapshot."
		);

		Self { chunks, postings, stats, params, tokenizer }
	}

	pub fn empty(tokenizer: Arc<dyn Tokenizer>, params: Bm25Params) -> Self {
		Self::build(Vec::new(), tokenizer, params)
	}

	pub fn len(&self) -> usize {
		self.chunks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.chunks.is_empty()
	}

	pub fn chunks(&self) -> &[Arc<Chunk>] {
		&self.chunks
	}

	pub fn stats(&self) -> &TermStatistics {
		&self.stats
	}

	pub fn params(&self) -> Bm25Params {
		self.params
	}

	pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
		&self.tokenizer
	}

	/// Top `k` chunks by BM25, score desc then id asc. Chunks matching no query
	/// term score exactly zero and are not returned.
	pub fn score(&self, query: &str, k: usize) -> Vec<LexicalHit> {
		if k == 0 || self.chunks.is_empty() {
			return Vec::new();
		}

		let scores = self.accumulate(query);
		let mut hits: Vec<LexicalHit> = scores
			.into_iter()
			.filter(|(_, score)| *score > 0.0)
			.map(|(idx, score)| LexicalHit { chunk: self.chunks[idx].clone(), score })
			.collect();

		hits.sort_by(cmp_hits);
		hits.truncate(k);

		hits
	}

	/// BM25 score of a single chunk; `None` when the id is not in this snapshot.
	pub fn score_chunk(&self, query: &str, chunk_id: &str) -> Option<f32> {
		let idx = self.chunks.iter().position(|chunk| chunk.id == chunk_id)?;

		Some(self.accumulate(query).get(&idx).copied().unwrap_or(0.0))
	}

	fn accumulate(&self, query: &str) -> AHashMap<usize, f32> {
		let mut scores: AHashMap<usize, f32> = AHashMap::new();
		let mut seen = AHashSet::new();
		let chunk_count = self.stats.chunk_count();
		let average_length = self.stats.average_length();

		for term in self.tokenizer.tokenize(query) {
			if !seen.insert(term.clone()) {
				continue;
			}

			let Some(postings) = self.postings.get(&term) else {
				continue;
			};
			let idf = bm25::idf(chunk_count, postings.len() as u32);

			for posting in postings {
				let score = bm25::term_score(
					self.params,
					idf,
					posting.term_frequency,
					self.stats.chunk_length(posting.chunk),
					average_length,
				);

				*scores.entry(posting.chunk).or_insert(0.0) += score;
			}
		}

		scores
	}
}

fn cmp_hits(a: &LexicalHit, b: &LexicalHit) -> Ordering {
	crate::cmp_f32_desc(a.score, b.score).then_with(|| a.chunk.id.cmp(&b.chunk.id))
}
