mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Agent, Config, Corpus, EmbeddingProviderConfig, Lexical, LlmProviderConfig, ProviderConfig,
	Providers, Retrieval, RetrievalRerank, Security, Service, Tools, VectorProviderConfig,
	WebSearchProviderConfig,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (key, value) in
		[("service.http_bind", &cfg.service.http_bind), ("service.admin_bind", &cfg.service.admin_bind)]
	{
		if value.trim().is_empty() {
			return Err(Error::blank(key));
		}
	}

	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::out_of_range("providers.embedding.dimensions", "greater than zero"));
	}

	for (label, api_key, timeout_ms) in [
		("embedding", &cfg.providers.embedding.api_key, cfg.providers.embedding.timeout_ms),
		("vector", &cfg.providers.vector.api_key, cfg.providers.vector.timeout_ms),
		("rerank", &cfg.providers.rerank.api_key, cfg.providers.rerank.timeout_ms),
		("llm", &cfg.providers.llm.api_key, cfg.providers.llm.timeout_ms),
	] {
		if api_key.trim().is_empty() {
			return Err(Error::blank(format!("providers.{label}.api_key")));
		}
		if timeout_ms == 0 {
			return Err(Error::out_of_range(
				format!("providers.{label}.timeout_ms"),
				"greater than zero",
			));
		}
	}

	if let Some(web) = cfg.providers.web_search.as_ref()
		&& web.api_base.trim().is_empty()
	{
		return Err(Error::blank("providers.web_search.api_base"));
	}

	if !cfg.lexical.k1.is_finite() || cfg.lexical.k1 <= 0.0 {
		return Err(Error::out_of_range("lexical.k1", "a finite number greater than zero"));
	}
	if !(0.0..=1.0).contains(&cfg.lexical.b) {
		return Err(Error::out_of_range("lexical.b", "in the range 0.0-1.0"));
	}

	if cfg.retrieval.top_k == 0 {
		return Err(Error::out_of_range("retrieval.top_k", "greater than zero"));
	}

	for (key, weight) in [
		("retrieval.vector_weight", cfg.retrieval.vector_weight),
		("retrieval.lexical_weight", cfg.retrieval.lexical_weight),
	] {
		if !weight.is_finite() {
			return Err(Error::out_of_range(key, "a finite number"));
		}
		if weight < 0.0 {
			return Err(Error::out_of_range(key, "zero or greater"));
		}
	}

	if cfg.retrieval.vector_weight + cfg.retrieval.lexical_weight <= 0.0 {
		return Err(Error::Conflict {
			keys: vec!["retrieval.vector_weight", "retrieval.lexical_weight"],
			message: "retrieval.vector_weight and retrieval.lexical_weight must not both be zero.",
		});
	}
	if cfg.retrieval.rerank.enabled && cfg.retrieval.rerank.top_n == 0 {
		return Err(Error::Conflict {
			keys: vec!["retrieval.rerank.enabled", "retrieval.rerank.top_n"],
			message: "retrieval.rerank.top_n must be greater than zero when reranking is enabled.",
		});
	}

	if cfg.agent.max_iterations < 1 {
		return Err(Error::out_of_range("agent.max_iterations", "at least 1"));
	}
	if cfg.agent.timeout_ms == 0 {
		return Err(Error::out_of_range("agent.timeout_ms", "greater than zero"));
	}
	if !cfg.agent.temperature.is_finite() || cfg.agent.temperature < 0.0 {
		return Err(Error::out_of_range("agent.temperature", "a finite number, zero or greater"));
	}
	if cfg.agent.stream_buffer == 0 {
		return Err(Error::out_of_range("agent.stream_buffer", "greater than zero"));
	}

	if cfg.tools.max_read_lines == 0 {
		return Err(Error::out_of_range("tools.max_read_lines", "greater than zero"));
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg
		.agent
		.final_answer_signal
		.as_deref()
		.map(|signal| signal.trim().is_empty())
		.unwrap_or(false)
	{
		cfg.agent.final_answer_signal = None;
	}
	if let Some(web) = cfg.providers.web_search.as_mut()
		&& web.language.as_deref().map(|language| language.trim().is_empty()).unwrap_or(false)
	{
		web.language = None;
	}
	if cfg.corpus.documents_root.as_deref().map(|root| root.as_os_str().is_empty()).unwrap_or(false)
	{
		cfg.corpus.documents_root = None;
	}
}
