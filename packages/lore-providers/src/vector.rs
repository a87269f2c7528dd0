use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq)]
pub struct Neighbor {
	pub chunk_id: String,
	pub similarity: f32,
}

/// Nearest chunks to `vector`, as returned by the similarity service.
pub async fn nearest_neighbors(
	cfg: &lore_config::VectorProviderConfig,
	vector: &[f32],
	k: u32,
) -> Result<Vec<Neighbor>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path.replace("{collection}", &cfg.collection));
	let body = serde_json::json!({ "vector": vector, "limit": k, "with_payload": true });
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_neighbors_response(json)
}

fn parse_neighbors_response(json: Value) -> Result<Vec<Neighbor>> {
	let results = json
		.get("result")
		.or_else(|| json.get("results"))
		.and_then(|v| v.as_array())
		.ok_or_else(|| eyre::eyre!("Vector response is missing result array."))?;
	let mut out = Vec::with_capacity(results.len());

	for item in results {
		let chunk_id = item
			.get("payload")
			.and_then(|payload| payload.get("chunk_id"))
			.and_then(|v| v.as_str())
			.map(str::to_string)
			.or_else(|| id_to_string(item.get("id")?))
			.ok_or_else(|| eyre::eyre!("Vector result missing id."))?;
		let similarity = item
			.get("score")
			.and_then(|v| v.as_f64())
			.ok_or_else(|| eyre::eyre!("Vector result missing score."))? as f32;

		out.push(Neighbor { chunk_id, similarity });
	}

	Ok(out)
}

fn id_to_string(value: &Value) -> Option<String> {
	match value {
		Value::String(text) => Some(text.clone()),
		Value::Number(number) => Some(number.to_string()),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn prefers_payload_chunk_id_over_point_id() {
		let json = serde_json::json!({
			"result": [
				{ "id": 7, "score": 0.8, "payload": { "chunk_id": "A" } },
				{ "id": "B", "score": 0.4 },
				{ "id": 3, "score": 0.1 }
			]
		});
		let neighbors = parse_neighbors_response(json).expect("parse failed");

		assert_eq!(
			neighbors,
			vec![
				Neighbor { chunk_id: "A".to_string(), similarity: 0.8 },
				Neighbor { chunk_id: "B".to_string(), similarity: 0.4 },
				Neighbor { chunk_id: "3".to_string(), similarity: 0.1 },
			]
		);
	}

	#[test]
	fn rejects_result_without_score() {
		let json = serde_json::json!({ "result": [{ "id": "A" }] });

		assert!(parse_neighbors_response(json).is_err());
	}
}
