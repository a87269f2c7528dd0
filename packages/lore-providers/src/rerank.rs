use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use lore_config::ProviderConfig;

/// Score given to a document the reranker left out of its top-N reply.
pub const UNSCORED: f32 = f32::MIN;

#[derive(Serialize)]
struct RerankBody<'a> {
	model: &'a str,
	query: &'a str,
	documents: &'a [String],
	top_n: usize,
	return_documents: bool,
}

#[derive(Deserialize)]
struct RerankReply {
	#[serde(alias = "data")]
	results: Vec<RankedDocument>,
}

#[derive(Deserialize)]
struct RankedDocument {
	index: usize,
	#[serde(alias = "score")]
	relevance_score: f32,
}

/// Scores every document in `docs` against `query`; the output is aligned with
/// `docs`. Documents the service does not rank get [`UNSCORED`].
pub async fn rerank(cfg: &ProviderConfig, query: &str, docs: &[String]) -> Result<Vec<f32>> {
	if docs.is_empty() {
		return Ok(Vec::new());
	}

	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = RerankBody {
		model: &cfg.model,
		query,
		documents: docs,
		top_n: docs.len(),
		return_documents: false,
	};
	let reply: RerankReply = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?
		.error_for_status()?
		.json()
		.await?;

	align_scores(reply, docs.len())
}

/// Maps ranked results back onto document positions. A reply that points
/// outside the request or ranks one document twice is rejected.
fn align_scores(reply: RerankReply, doc_count: usize) -> Result<Vec<f32>> {
	if reply.results.is_empty() {
		return Err(eyre::eyre!("Reranker ranked none of the {doc_count} documents."));
	}

	let mut scores: Vec<Option<f32>> = vec![None; doc_count];

	for ranked in reply.results {
		let Some(slot) = scores.get_mut(ranked.index) else {
			return Err(eyre::eyre!(
				"Reranker returned index {} for {doc_count} documents.",
				ranked.index
			));
		};

		if slot.is_some() {
			return Err(eyre::eyre!("Reranker ranked document {} twice.", ranked.index));
		}

		*slot = Some(ranked.relevance_score);
	}

	Ok(scores.into_iter().map(|score| score.unwrap_or(UNSCORED)).collect())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn reply(json: serde_json::Value) -> RerankReply {
		serde_json::from_value(json).expect("reply should deserialize")
	}

	#[test]
	fn aligns_ranked_results_with_the_request() {
		let json = serde_json::json!({
			"results": [
				{ "index": 2, "relevance_score": 0.9 },
				{ "index": 0, "relevance_score": 0.4 },
				{ "index": 1, "relevance_score": 0.1 }
			]
		});

		assert_eq!(align_scores(reply(json), 3).expect("scores expected"), vec![0.4, 0.1, 0.9]);
	}

	#[test]
	fn documents_outside_a_truncated_reply_rank_last() {
		let json = serde_json::json!({ "data": [{ "index": 1, "score": 0.7 }] });

		assert_eq!(align_scores(reply(json), 3).expect("scores expected"), vec![
			UNSCORED, 0.7, UNSCORED
		]);
	}

	#[test]
	fn rejects_indices_the_request_did_not_send() {
		let json = serde_json::json!({ "results": [{ "index": 4, "relevance_score": 0.5 }] });

		assert!(align_scores(reply(json), 2).is_err());
	}

	#[test]
	fn rejects_duplicate_and_empty_rankings() {
		let twice = serde_json::json!({
			"results": [
				{ "index": 0, "relevance_score": 0.5 },
				{ "index": 0, "relevance_score": 0.6 }
			]
		});
		let empty = serde_json::json!({ "results": [] });

		assert!(align_scores(reply(twice), 2).is_err());
		assert!(align_scores(reply(empty), 2).is_err());
	}
}
