#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bm25Params {
	/// Term-frequency saturation.
	pub k1: f32,
	/// Length normalization strength, 0.0-1.0.
	pub b: f32,
}
impl Default for Bm25Params {
	fn default() -> Self {
		Self { k1: 1.5, b: 0.75 }
	}
}

/// `ln((N - df + 0.5) / (df + 0.5) + 1)`; always positive for `df <= N`.
pub fn idf(chunk_count: usize, document_frequency: u32) -> f32 {
	let n = chunk_count as f32;
	let df = document_frequency as f32;

	((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

pub fn term_score(
	params: Bm25Params,
	idf: f32,
	term_frequency: u32,
	chunk_length: u32,
	average_length: f32,
) -> f32 {
	if term_frequency == 0 {
		return 0.0;
	}

	let tf = term_frequency as f32;
	let length_ratio = if average_length > 0.0 { chunk_length as f32 / average_length } else { 0.0 };
	let denom = tf + params.k1 * (1.0 - params.b + params.b * length_ratio);

	idf * tf * (params.k1 + 1.0) / denom
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn idf_is_higher_for_rarer_terms() {
		let rare = idf(10, 1);
		let common = idf(10, 9);

		assert!(rare > common);
		assert!(common > 0.0);
	}

	#[test]
	fn idf_matches_closed_form() {
		let expected = ((2.0_f32 - 1.0 + 0.5) / (1.0 + 0.5) + 1.0).ln();

		assert!((idf(2, 1) - expected).abs() < 1e-6);
	}

	#[test]
	fn absent_term_scores_zero() {
		assert_eq!(term_score(Bm25Params::default(), 1.2, 0, 5, 4.0), 0.0);
	}

	#[test]
	fn longer_chunks_score_lower_for_same_frequency() {
		let params = Bm25Params::default();
		let short = term_score(params, 1.0, 1, 2, 4.0);
		let long = term_score(params, 1.0, 1, 8, 4.0);

		assert!(short > long);
	}

	#[test]
	fn b_zero_disables_length_normalization() {
		let params = Bm25Params { k1: 1.2, b: 0.0 };

		assert_eq!(term_score(params, 1.0, 2, 2, 4.0), term_score(params, 1.0, 2, 40, 4.0));
	}
}
