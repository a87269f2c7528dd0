use lore_domain::{ChunkRecord, chunk_id, cjk};

#[test]
fn chunk_id_is_stable_and_position_sensitive() {
	let first = chunk_id("guide.md", 0);

	assert_eq!(first, chunk_id("guide.md", 0));
	assert_ne!(first, chunk_id("guide.md", 1));
	assert_ne!(first, chunk_id("notes.md", 0));
	assert_eq!(first.len(), 32);
}

#[test]
fn record_without_id_gets_derived_id() {
	let record: ChunkRecord = serde_json::from_str(
		r#"{"text":"cats are mammals","source_name":"animals.md","chunk_index":3}"#,
	)
	.expect("Failed to parse record.");
	let chunk = record.into_chunk();

	assert_eq!(chunk.id, chunk_id("animals.md", 3));
	assert!(chunk.metadata.is_empty());
}

#[test]
fn record_with_blank_id_gets_derived_id() {
	let record: ChunkRecord = serde_json::from_str(
		r#"{"id":"  ","text":"t","source_name":"a.md","chunk_index":0,"metadata":{"lang":"en"}}"#,
	)
	.expect("Failed to parse record.");
	let chunk = record.into_chunk();

	assert_eq!(chunk.id, chunk_id("a.md", 0));
	assert_eq!(chunk.metadata.get("lang").map(String::as_str), Some("en"));
}

#[test]
fn record_keeps_explicit_id() {
	let record: ChunkRecord =
		serde_json::from_str(r#"{"id":"A","text":"t","source_name":"a.md","chunk_index":0}"#)
			.expect("Failed to parse record.");

	assert_eq!(record.into_chunk().id, "A");
}

#[test]
fn detects_cjk_scripts() {
	assert!(cjk::contains_cjk("hello 世界"));
	assert!(cjk::contains_cjk("カタカナ"));
	assert!(cjk::contains_cjk("한국어"));
	assert!(!cjk::contains_cjk("plain ascii, über café"));
}
