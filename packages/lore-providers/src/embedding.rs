use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use lore_config::EmbeddingProviderConfig;

#[derive(Serialize)]
struct EmbedQueryBody<'a> {
	model: &'a str,
	input: [&'a str; 1],
	#[serde(skip_serializing_if = "Option::is_none")]
	dimensions: Option<u32>,
}

#[derive(Deserialize)]
struct EmbedQueryReply {
	data: Vec<EmbeddedInput>,
}

#[derive(Deserialize)]
struct EmbeddedInput {
	#[serde(default)]
	index: usize,
	embedding: Vec<f32>,
}

/// Embeds one query for a nearest-neighbour lookup. The vector comes back
/// unit length so a cosine index can score it with a plain dot product.
pub async fn embed_query(cfg: &EmbeddingProviderConfig, query: &str) -> Result<Vec<f32>> {
	if query.trim().is_empty() {
		return Err(eyre::eyre!("Cannot embed an empty query."));
	}

	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = EmbedQueryBody {
		model: &cfg.model,
		input: [query],
		dimensions: (cfg.dimensions > 0).then_some(cfg.dimensions),
	};
	let reply: EmbedQueryReply = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?
		.error_for_status()?
		.json()
		.await?;

	query_vector(reply, cfg.dimensions)
}

/// Picks the vector for input 0 and checks it against the configured width.
fn query_vector(reply: EmbedQueryReply, dimensions: u32) -> Result<Vec<f32>> {
	let vector = reply
		.data
		.into_iter()
		.find(|item| item.index == 0)
		.map(|item| item.embedding)
		.ok_or_else(|| eyre::eyre!("Embedding reply has no vector for the query."))?;

	if dimensions > 0 && vector.len() != dimensions as usize {
		return Err(eyre::eyre!(
			"Query embedding has {} dimensions; the vector index expects {dimensions}.",
			vector.len()
		));
	}

	unit_length(vector)
}

fn unit_length(mut vector: Vec<f32>) -> Result<Vec<f32>> {
	if vector.iter().any(|value| !value.is_finite()) {
		return Err(eyre::eyre!("Query embedding contains a non-finite component."));
	}

	let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();

	if norm == 0.0 {
		return Err(eyre::eyre!("Query embedding is the zero vector."));
	}

	vector.iter_mut().for_each(|value| *value /= norm);

	Ok(vector)
}
