pub mod chunk;
pub mod cjk;
pub mod tokenize;

pub use chunk::{Chunk, ChunkRecord, chunk_id};
pub use tokenize::{Tokenizer, UnicodeTokenizer};
