mod bm25;
mod snapshot;
mod stats;

pub use bm25::{Bm25Params, idf, term_score};
pub use snapshot::{LexicalHit, LexicalSnapshot};
pub use stats::TermStatistics;

use std::cmp::Ordering;

/// Descending order for scores; NaN sorts last.
pub fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}
