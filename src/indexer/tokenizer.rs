use crate::error::ChunkingError;
use tiktoken_rs::CoreBPE;

/// Model-scoped vocabulary used to cut text into token windows
pub trait Tokenizer: Send + Sync {
    /// Encode text into token ids
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Decode token ids back into text
    ///
    /// A window may start or end inside a multi-byte character; the partial
    /// bytes decode to U+FFFD rather than an error.
    fn decode(&self, ids: &[u32]) -> Result<String, ChunkingError>;
}

/// BPE tokenizer backed by tiktoken vocabularies
pub struct TiktokenTokenizer {
    bpe: CoreBPE,
    model: String,
}

impl TiktokenTokenizer {
    /// Load the vocabulary used by an OpenAI model (e.g. `text-embedding-ada-002` -> cl100k_base)
    pub fn for_model(model: &str) -> Result<Self, ChunkingError> {
        tracing::debug!("Loading tokenizer for model {}", model);
        let bpe = tiktoken_rs::get_bpe_from_model(model)
            .map_err(|e| ChunkingError::Tokenizer(format!("{}: {}", model, e)))?;
        Ok(Self {
            bpe,
            model: model.to_string(),
        })
    }

    /// The cl100k_base vocabulary
    pub fn cl100k() -> Result<Self, ChunkingError> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| ChunkingError::Tokenizer(e.to_string()))?;
        Ok(Self {
            bpe,
            model: "cl100k_base".to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_ordinary(text)
    }

    fn decode(&self, ids: &[u32]) -> Result<String, ChunkingError> {
        match self.bpe.decode(ids.to_vec()) {
            Ok(text) => Ok(text),
            // Unknown ids are still an error; only a split character falls back to bytes
            Err(e) if e.to_string().contains("UTF-8") => {
                let bytes: Vec<u8> = self
                    .bpe
                    ._decode_native_and_split(ids.to_vec())
                    .flatten()
                    .collect();
                tracing::trace!("Lossy decode of a {}-token window", ids.len());
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            Err(e) => Err(ChunkingError::Tokenizer(e.to_string())),
        }
    }
}
