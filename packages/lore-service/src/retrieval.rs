use std::{cmp::Ordering, sync::Arc, time::Instant};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::{Corpus, CorpusSnapshot, Providers, Result};
use lore_config::Config;
use lore_domain::Chunk;
use lore_lexical::cmp_f32_desc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
	#[default]
	Hybrid,
	Lexical,
	Vector,
}
impl RetrievalMethod {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Hybrid => "hybrid",
			Self::Lexical => "lexical",
			Self::Vector => "vector",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"hybrid" => Some(Self::Hybrid),
			"lexical" | "bm25" => Some(Self::Lexical),
			"vector" => Some(Self::Vector),
			_ => None,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct RetrieveRequest {
	pub query: String,
	pub top_k: Option<u32>,
	#[serde(default)]
	pub method: RetrievalMethod,
}

#[derive(Clone, Debug, Serialize)]
pub struct FusedHit {
	pub chunk: Arc<Chunk>,
	/// Normalized to 0.0-1.0 against the best lexical candidate.
	pub lexical_score: f32,
	pub vector_score: f32,
	/// Ranking score. For reranked hits this is the reranker output.
	pub fused_score: f32,
	/// Weighted fusion score a reranked hit had before its score was replaced.
	pub pre_rerank_score: Option<f32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RetrievalResult {
	pub method: RetrievalMethod,
	pub items: Vec<FusedHit>,
	pub degraded: bool,
	pub degraded_reason: Option<String>,
	pub reranked: bool,
}
impl RetrievalResult {
	fn empty(method: RetrievalMethod) -> Self {
		Self { method, items: Vec::new(), degraded: false, degraded_reason: None, reranked: false }
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Weights {
	vector: f32,
	lexical: f32,
}

/// Merges lexical and vector candidates into one ranked list. Holds no per-query state.
pub struct Retriever {
	cfg: Arc<Config>,
	providers: Providers,
	corpus: Arc<Corpus>,
}
impl Retriever {
	pub fn new(cfg: Arc<Config>, providers: Providers, corpus: Arc<Corpus>) -> Self {
		Self { cfg, providers, corpus }
	}

	pub async fn retrieve(
		&self,
		query: &str,
		top_k: u32,
		method: RetrievalMethod,
	) -> Result<RetrievalResult> {
		let started = Instant::now();
		let query = query.trim();

		if query.is_empty() || top_k == 0 {
			return Ok(RetrievalResult::empty(method));
		}

		let snapshot = self.corpus.snapshot();

		if snapshot.is_empty() {
			return Ok(RetrievalResult::empty(method));
		}

		let fetch_k = self.cfg.retrieval.candidate_k.max(top_k);
		let mut degraded_reason = None;
		let vector_hits = match method {
			RetrievalMethod::Lexical => Vec::new(),
			RetrievalMethod::Hybrid | RetrievalMethod::Vector => {
				match self.vector_candidates(query, fetch_k).await {
					Ok(hits) => hits,
					Err(err) => {
						tracing::warn!(
							error = %err,
							method = method.as_str(),
							"Vector provider failed; falling back to lexical-only scoring."
						);

						degraded_reason = Some(err.to_string());

						Vec::new()
					},
				}
			},
		};
		let degraded = degraded_reason.is_some();
		let weights = match (method, degraded) {
			(RetrievalMethod::Lexical, _) | (_, true) => Weights { vector: 0.0, lexical: 1.0 },
			(RetrievalMethod::Vector, false) => Weights { vector: 1.0, lexical: 0.0 },
			(RetrievalMethod::Hybrid, false) => Weights {
				vector: self.cfg.retrieval.vector_weight,
				lexical: self.cfg.retrieval.lexical_weight,
			},
		};
		let lexical_hits = if weights.lexical > 0.0 {
			snapshot
				.lexical()
				.score(query, fetch_k as usize)
				.into_iter()
				.map(|hit| (hit.chunk, hit.score))
				.collect()
		} else {
			Vec::new()
		};
		let mut items = fuse(&snapshot, &lexical_hits, &vector_hits, weights);
		let candidate_count = items.len();
		let reranked = self.rerank(query, &mut items).await;

		items.truncate(top_k as usize);

		tracing::debug!(
			method = method.as_str(),
			candidate_count,
			returned = items.len(),
			degraded,
			reranked,
			elapsed_ms = started.elapsed().as_millis() as u64,
			"Retrieval finished."
		);

		Ok(RetrievalResult { method, items, degraded, degraded_reason, reranked })
	}

	async fn vector_candidates(&self, query: &str, k: u32) -> Result<Vec<(String, f32)>> {
		let providers = &self.cfg.providers;
		let vector = self.providers.embedding.embed_query(&providers.embedding, query).await?;
		let neighbors =
			self.providers.vector.nearest_neighbors(&providers.vector, &vector, k).await?;

		Ok(neighbors.into_iter().map(|n| (n.chunk_id, n.similarity)).collect())
	}

	/// Replaces the fused score of the head of `items` with the reranker output
	/// and re-sorts the whole list. Returns whether it did.
	async fn rerank(&self, query: &str, items: &mut [FusedHit]) -> bool {
		let rerank_cfg = &self.cfg.retrieval.rerank;

		if !rerank_cfg.enabled || items.len() <= 2 {
			return false;
		}

		let top_n = (rerank_cfg.top_n as usize).min(items.len());
		let docs: Vec<String> = items[..top_n].iter().map(|hit| hit.chunk.text.clone()).collect();
		let scores = match self
			.providers
			.rerank
			.rerank(&self.cfg.providers.rerank, query, &docs)
			.await
		{
			Ok(scores) if scores.len() == docs.len() => scores,
			Ok(scores) => {
				tracing::warn!(
					expected = docs.len(),
					received = scores.len(),
					"Reranker returned a mismatched score count; keeping fused order."
				);

				return false;
			},
			Err(err) => {
				tracing::warn!(error = %err, "Reranker failed; keeping fused order.");

				return false;
			},
		};

		for (hit, score) in items[..top_n].iter_mut().zip(scores) {
			hit.pre_rerank_score = Some(hit.fused_score);
			hit.fused_score = if score.is_nan() { f32::MIN } else { score };
		}

		items.sort_by(cmp_reranked);

		true
	}
}

/// Normalizes both sources, merges by chunk id, and sorts by fused score.
fn fuse(
	snapshot: &CorpusSnapshot,
	lexical: &[(Arc<Chunk>, f32)],
	vector: &[(String, f32)],
	weights: Weights,
) -> Vec<FusedHit> {
	let max_lexical = lexical.iter().map(|(_, score)| *score).fold(0.0_f32, f32::max);
	let mut items: Vec<FusedHit> = Vec::with_capacity(lexical.len() + vector.len());
	let mut positions: AHashMap<String, usize> = AHashMap::new();

	for (chunk, score) in lexical {
		let normalized = if max_lexical > 0.0 { score / max_lexical } else { 0.0 };

		positions.insert(chunk.id.clone(), items.len());
		items.push(FusedHit {
			chunk: chunk.clone(),
			lexical_score: normalized,
			vector_score: 0.0,
			fused_score: 0.0,
			pre_rerank_score: None,
		});
	}

	if weights.vector > 0.0 {
		for (chunk_id, similarity) in vector {
			let similarity = if similarity.is_nan() { 0.0 } else { similarity.clamp(0.0, 1.0) };

			if let Some(idx) = positions.get(chunk_id) {
				let hit = &mut items[*idx];

				hit.vector_score = hit.vector_score.max(similarity);

				continue;
			}

			let Some(chunk) = snapshot.get(chunk_id) else {
				tracing::warn!(
					chunk_id = %chunk_id,
					"Vector candidate is not in the current corpus; dropping."
				);

				continue;
			};

			positions.insert(chunk_id.clone(), items.len());
			items.push(FusedHit {
				chunk: chunk.clone(),
				lexical_score: 0.0,
				vector_score: similarity,
				fused_score: 0.0,
				pre_rerank_score: None,
			});
		}
	}

	for hit in items.iter_mut() {
		hit.fused_score = weights.vector * hit.vector_score + weights.lexical * hit.lexical_score;
	}

	items.sort_by(cmp_fused);

	items
}

fn cmp_fused(a: &FusedHit, b: &FusedHit) -> Ordering {
	cmp_f32_desc(a.fused_score, b.fused_score).then_with(|| a.chunk.id.cmp(&b.chunk.id))
}

fn cmp_reranked(a: &FusedHit, b: &FusedHit) -> Ordering {
	cmp_f32_desc(a.fused_score, b.fused_score)
		.then_with(|| {
			cmp_f32_desc(
				a.pre_rerank_score.unwrap_or(a.fused_score),
				b.pre_rerank_score.unwrap_or(b.fused_score),
			)
		})
		.then_with(|| a.chunk.id.cmp(&b.chunk.id))
}
