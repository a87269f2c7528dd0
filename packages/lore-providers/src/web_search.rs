use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WebResult {
	pub title: String,
	pub url: String,
	pub content: String,
}

/// Queries a SearXNG-compatible JSON search endpoint.
pub async fn search(
	cfg: &lore_config::WebSearchProviderConfig,
	query: &str,
	max_results: usize,
) -> Result<Vec<WebResult>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let mut params = vec![("q", query.to_string()), ("format", "json".to_string())];

	if let Some(language) = cfg.language.as_ref() {
		params.push(("language", language.clone()));
	}

	let res = client
		.get(url)
		.headers(crate::plain_headers(&cfg.default_headers)?)
		.query(&params)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_search_response(json, max_results)
}

fn parse_search_response(json: Value, max_results: usize) -> Result<Vec<WebResult>> {
	let results = json
		.get("results")
		.and_then(|v| v.as_array())
		.ok_or_else(|| eyre::eyre!("Search response is missing results array."))?;
	let mut out = Vec::new();

	for item in results.iter() {
		let Some(url) = item.get("url").and_then(|v| v.as_str()) else {
			continue;
		};
		let field = |key: &str| item.get(key).and_then(|v| v.as_str()).unwrap_or("").to_string();

		out.push(WebResult { title: field("title"), url: url.to_string(), content: field("content") });

		if out.len() >= max_results {
			break;
		}
	}

	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn keeps_results_with_urls_up_to_limit() {
		let json = serde_json::json!({
			"results": [
				{ "title": "One", "url": "https://one.example", "content": "first" },
				{ "title": "No url" },
				{ "title": "Two", "url": "https://two.example" },
				{ "title": "Three", "url": "https://three.example", "content": "third" }
			]
		});
		let results = parse_search_response(json, 2).expect("parse failed");

		assert_eq!(results.len(), 2);
		assert_eq!(results[0].title, "One");
		assert_eq!(results[1].url, "https://two.example");
		assert_eq!(results[1].content, "");
	}

	#[test]
	fn empty_results_are_not_an_error() {
		let json = serde_json::json!({ "results": [] });

		assert!(parse_search_response(json, 5).expect("parse failed").is_empty());
	}
}
