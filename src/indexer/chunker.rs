use super::Tokenizer;
use crate::error::ChunkingError;
use crate::types::TokenChunk;
use std::sync::Arc;

/// Splits text into fixed-size token windows with overlap
///
/// Windows start at multiples of `chunk_size - overlap` while the start lies inside the
/// token sequence; the last window may be shorter. When `overlap >= chunk_size` the
/// stride is zero and only the first window is produced.
#[derive(Clone)]
pub struct TokenChunker {
    tokenizer: Arc<dyn Tokenizer>,
    chunk_size: usize,
    overlap: usize,
}

impl TokenChunker {
    pub fn new(
        tokenizer: Arc<dyn Tokenizer>,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize(chunk_size));
        }
        if overlap >= chunk_size {
            tracing::warn!(
                "Overlap {} >= chunk size {}, only the first window of each document will be produced",
                overlap,
                chunk_size
            );
        }
        Ok(Self {
            tokenizer,
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Cut `text` into token windows
    pub fn chunk(&self, text: &str) -> Result<Vec<TokenChunk>, ChunkingError> {
        let tokens = self.tokenizer.encode(text);
        self.chunk_tokens(&tokens)
    }

    /// Cut an already encoded token sequence into windows
    pub fn chunk_tokens(&self, tokens: &[u32]) -> Result<Vec<TokenChunk>, ChunkingError> {
        let stride = self.chunk_size.saturating_sub(self.overlap);
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < tokens.len() {
            let end = (start + self.chunk_size).min(tokens.len());
            let window = &tokens[start..end];
            chunks.push(TokenChunk {
                text: self.tokenizer.decode(window)?,
                token_ids: window.to_vec(),
                start_offset: start,
            });

            if stride == 0 {
                break;
            }
            start += stride;
        }

        tracing::debug!(
            "Chunked {} tokens into {} windows (size {}, overlap {})",
            tokens.len(),
            chunks.len(),
            self.chunk_size,
            self.overlap
        );

        Ok(chunks)
    }
}

impl std::fmt::Debug for TokenChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenChunker")
            .field("chunk_size", &self.chunk_size)
            .field("overlap", &self.overlap)
            .finish()
    }
}
