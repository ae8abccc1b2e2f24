//! Tokenization, token-window chunking and local file access
//!
//! The chunker is pure: it turns text into [`TokenChunk`](crate::types::TokenChunk)s
//! and leaves embedding to the caller.

mod chunker;
mod file_reader;
mod tokenizer;

pub use chunker::TokenChunker;
pub use file_reader::{FileReader, LocalFileReader};
pub use tokenizer::{TiktokenTokenizer, Tokenizer};
