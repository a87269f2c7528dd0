use ahash::AHashMap;

/// Corpus-wide aggregates for BM25. Built once per chunk set and never mutated.
#[derive(Clone, Debug, Default)]
pub struct TermStatistics {
	document_frequency: AHashMap<String, u32>,
	chunk_lengths: Vec<u32>,
	total_length: u64,
}
impl TermStatistics {
	/// `chunk_terms[i]` is the token sequence of chunk `i`.
	pub fn build(chunk_terms: &[Vec<String>]) -> Self {
		let mut document_frequency: AHashMap<String, u32> = AHashMap::new();
		let mut chunk_lengths = Vec::with_capacity(chunk_terms.len());
		let mut total_length = 0_u64;

		for terms in chunk_terms {
			let mut distinct: Vec<&str> = terms.iter().map(String::as_str).collect();

			distinct.sort_unstable();
			distinct.dedup();

			for term in distinct {
				*document_frequency.entry(term.to_string()).or_insert(0) += 1;
			}

			chunk_lengths.push(terms.len() as u32);

			total_length += terms.len() as u64;
		}

		Self { document_frequency, chunk_lengths, total_length }
	}

	pub fn chunk_count(&self) -> usize {
		self.chunk_lengths.len()
	}

	pub fn vocabulary_size(&self) -> usize {
		self.document_frequency.len()
	}

	pub fn vocabulary(&self) -> impl Iterator<Item = &str> {
		self.document_frequency.keys().map(String::as_str)
	}

	pub fn contains(&self, term: &str) -> bool {
		self.document_frequency.contains_key(term)
	}

	pub fn document_frequency(&self, term: &str) -> u32 {
		self.document_frequency.get(term).copied().unwrap_or(0)
	}

	pub fn chunk_length(&self, chunk: usize) -> u32 {
		self.chunk_lengths.get(chunk).copied().unwrap_or(0)
	}

	pub fn total_length(&self) -> u64 {
		self.total_length
	}

	pub fn average_length(&self) -> f32 {
		if self.chunk_lengths.is_empty() {
			return 0.0;
		}

		self.total_length as f32 / self.chunk_lengths.len() as f32
	}

	/// Terms ordered by document frequency desc, then term asc.
	pub fn top_terms(&self, limit: usize) -> Vec<(String, u32)> {
		let mut terms: Vec<(String, u32)> =
			self.document_frequency.iter().map(|(term, df)| (term.clone(), *df)).collect();

		terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
		terms.truncate(limit);

		terms
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn terms(raw: &[&str]) -> Vec<String> {
		raw.iter().map(|term| term.to_string()).collect()
	}

	#[test]
	fn average_length_tracks_chunk_set() {
		let stats = TermStatistics::build(&[terms(&["a", "b", "a"]), terms(&["c"])]);

		assert_eq!(stats.chunk_count(), 2);
		assert_eq!(stats.total_length(), 4);
		assert_eq!(stats.average_length(), 2.0);
	}

	#[test]
	fn document_frequency_counts_chunks_not_occurrences() {
		let stats = TermStatistics::build(&[terms(&["a", "a", "a"]), terms(&["a", "b"])]);

		assert_eq!(stats.document_frequency("a"), 2);
		assert_eq!(stats.document_frequency("b"), 1);
		assert_eq!(stats.document_frequency("z"), 0);
		assert_eq!(stats.vocabulary_size(), 2);
	}

	#[test]
	fn empty_corpus_has_zero_average() {
		let stats = TermStatistics::build(&[]);

		assert_eq!(stats.average_length(), 0.0);
		assert_eq!(stats.chunk_count(), 0);
	}

	#[test]
	fn top_terms_break_ties_alphabetically() {
		let stats = TermStatistics::build(&[terms(&["b", "a"]), terms(&["a", "b", "c"])]);

		assert_eq!(
			stats.top_terms(2),
			vec![("a".to_string(), 2), ("b".to_string(), 2)]
		);
	}
}
