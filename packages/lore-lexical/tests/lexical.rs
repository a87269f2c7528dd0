use std::{collections::BTreeMap, sync::Arc};

use lore_domain::{Chunk, UnicodeTokenizer};
use lore_lexical::{Bm25Params, LexicalSnapshot};

fn chunk(id: &str, text: &str) -> Arc<Chunk> {
	Arc::new(Chunk {
		id: id.to_string(),
		text: text.to_string(),
		source_name: format!("{id}.md"),
		chunk_index: 0,
		metadata: BTreeMap::new(),
	})
}

fn snapshot(chunks: Vec<Arc<Chunk>>) -> LexicalSnapshot {
	LexicalSnapshot::build(chunks, Arc::new(UnicodeTokenizer), Bm25Params::default())
}

#[test]
fn ranks_matching_chunk_above_non_matching() {
	let index = snapshot(vec![chunk("A", "cats are mammals"), chunk("B", "dogs are mammals")]);
	let hits = index.score("cats", 10);

	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].chunk.id, "A");
	assert!(hits[0].score > 0.0);
	assert_eq!(index.score_chunk("cats", "B"), Some(0.0));
	assert!(index.score_chunk("cats", "A").expect("A is indexed") > 0.0);
}

#[test]
fn chunk_without_query_terms_scores_exactly_zero() {
	let index = snapshot(vec![chunk("A", "alpha beta"), chunk("B", "gamma delta")]);

	assert_eq!(index.score_chunk("alpha", "B"), Some(0.0));
	assert_eq!(index.score_chunk("unknown", "A"), Some(0.0));
	assert_eq!(index.score_chunk("alpha", "missing"), None);
}

#[test]
fn result_respects_k_and_is_non_increasing() {
	let index = snapshot(vec![
		chunk("A", "rust rust rust"),
		chunk("B", "rust and go"),
		chunk("C", "rust"),
		chunk("D", "python only"),
		chunk("E", "rust is a language with a long description attached to it"),
	]);
	let hits = index.score("rust", 3);

	assert_eq!(hits.len(), 3);

	for pair in hits.windows(2) {
		assert!(pair[0].score >= pair[1].score);
	}
}

#[test]
fn ties_resolve_by_ascending_id() {
	let index = snapshot(vec![
		chunk("c", "shared term"),
		chunk("a", "shared term"),
		chunk("b", "shared term"),
	]);
	let ids: Vec<String> =
		index.score("shared", 10).into_iter().map(|hit| hit.chunk.id.clone()).collect();

	assert_eq!(ids, vec!["a", "b", "c"]);
}

#[test]
fn empty_query_or_corpus_yields_empty_result() {
	let index = snapshot(vec![chunk("A", "cats are mammals")]);

	assert!(index.score("", 5).is_empty());
	assert!(index.score("   ?!", 5).is_empty());
	assert!(snapshot(Vec::new()).score("cats", 5).is_empty());
}

#[test]
fn repeated_query_terms_count_once() {
	let index = snapshot(vec![chunk("A", "cats are mammals"), chunk("B", "dogs are mammals")]);
	let single = index.score("cats", 1)[0].score;
	let repeated = index.score("cats cats cats", 1)[0].score;

	assert_eq!(single, repeated);
}

#[test]
fn rarer_terms_weigh_more() {
	let index = snapshot(vec![
		chunk("A", "common rare"),
		chunk("B", "common filler"),
		chunk("C", "common filler"),
	]);
	let common = index.score_chunk("common", "A").expect("A is indexed");
	let rare = index.score_chunk("rare", "A").expect("A is indexed");

	assert!(rare > common);
}

#[test]
fn statistics_follow_chunk_set() {
	let index = snapshot(vec![chunk("A", "one two three"), chunk("B", "four")]);
	let stats = index.stats();

	assert_eq!(stats.chunk_count(), 2);
	assert_eq!(stats.average_length(), 2.0);
	assert_eq!(stats.document_frequency("two"), 1);
	assert!(stats.contains("four"));
}

#[test]
fn cjk_queries_match_bigrams() {
	let index = snapshot(vec![chunk("A", "机器学习入门"), chunk("B", "深度网络")]);
	let hits = index.score("学习", 5);

	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].chunk.id, "A");
}
