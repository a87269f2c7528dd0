use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

use crate::cjk;

/// Splits text into index terms. Queries and chunks must go through the same tokenizer.
pub trait Tokenizer
where
	Self: Send + Sync,
{
	fn tokenize(&self, text: &str) -> Vec<String>;
}

/// NFKC + lowercase, Unicode word boundaries for alphabetic scripts, and
/// overlapping character bigrams for CJK runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnicodeTokenizer;
impl Tokenizer for UnicodeTokenizer {
	fn tokenize(&self, text: &str) -> Vec<String> {
		let normalized: String = text.nfkc().flat_map(char::to_lowercase).collect();
		let mut tokens = Vec::new();

		if !cjk::contains_cjk(&normalized) {
			push_words(&normalized, &mut tokens);

			return tokens;
		}

		let mut span = String::new();
		let mut cjk_run = Vec::new();

		for ch in normalized.chars() {
			if cjk::is_cjk_char(ch) {
				if !span.is_empty() {
					push_words(&span, &mut tokens);
					span.clear();
				}

				cjk_run.push(ch);

				continue;
			}
			if !cjk_run.is_empty() {
				push_bigrams(&cjk_run, &mut tokens);
				cjk_run.clear();
			}

			span.push(ch);
		}

		if !span.is_empty() {
			push_words(&span, &mut tokens);
		}
		if !cjk_run.is_empty() {
			push_bigrams(&cjk_run, &mut tokens);
		}

		tokens
	}
}

fn push_words(span: &str, out: &mut Vec<String>) {
	for word in span.unicode_words() {
		let token: String = word.chars().filter(|ch| ch.is_alphanumeric()).collect();

		if !token.is_empty() {
			out.push(token);
		}
	}
}

fn push_bigrams(run: &[char], out: &mut Vec<String>) {
	if run.len() == 1 {
		out.push(run[0].to_string());

		return;
	}

	for pair in run.windows(2) {
		out.push(pair.iter().collect());
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn tokens(text: &str) -> Vec<String> {
		UnicodeTokenizer.tokenize(text)
	}

	#[test]
	fn folds_case_and_strips_punctuation() {
		assert_eq!(tokens("Cats, DOGS; and birds!"), vec!["cats", "dogs", "and", "birds"]);
	}

	#[test]
	fn keeps_inner_apostrophes_as_one_term() {
		assert_eq!(tokens("don't stop"), vec!["dont", "stop"]);
	}

	#[test]
	fn applies_compatibility_normalization() {
		assert_eq!(tokens("ＡＢＣ １２３"), vec!["abc", "123"]);
	}

	#[test]
	fn segments_cjk_runs_into_bigrams() {
		assert_eq!(tokens("机器学习"), vec!["机器", "器学", "学习"]);
	}

	#[test]
	fn mixes_scripts_without_losing_terms() {
		assert_eq!(tokens("rust语言 guide"), vec!["rust", "语言", "guide"]);
	}

	#[test]
	fn single_cjk_character_is_a_unigram() {
		assert_eq!(tokens("猫 cat"), vec!["猫", "cat"]);
	}

	#[test]
	fn blank_input_has_no_terms() {
		assert!(tokens("  ,.;  ").is_empty());
	}
}
