//! Question answering over the vector store

use crate::embedding::EmbeddingProvider;
use crate::error::{Result, ValidationError};
use crate::llm::ChatCompletion;
use crate::types::{AnswerSource, AskResponse, QueryMatch, metadata};
use crate::vector_db::VectorStore;

/// Render one match as a context entry
pub fn render_match(hit: &QueryMatch) -> String {
    let text = hit.field(metadata::CONTENT);
    let file = hit.field(metadata::FILE_PATH);
    let repo = hit.field(metadata::REPO_NAME);
    if file.is_empty() && repo.is_empty() {
        text.to_string()
    } else {
        format!("Found in file: {}, repo: {} content: {}", file, repo, text)
    }
}

/// Join rendered matches with blank lines
pub fn render_context(matches: &[QueryMatch]) -> String {
    matches
        .iter()
        .map(render_match)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// System instruction wrapping the retrieved context
pub fn system_prompt(context: &str) -> String {
    format!(
        "You are a helpful assistant. Use the following context to answer the question, \
         make sure to include the file path and repo in your response:\n\n{}\n\n\
         If the answer cannot be found in the context, provide your best possible answer.",
        context
    )
}

/// Embed the question, fetch `top_k` neighbours and ask the chat model
pub async fn answer_question(
    embedder: &dyn EmbeddingProvider,
    store: &dyn VectorStore,
    chat: &dyn ChatCompletion,
    question: &str,
    top_k: usize,
) -> Result<AskResponse> {
    let question = question.trim();
    if question.is_empty() {
        return Err(ValidationError::Empty("question".to_string()).into());
    }
    if top_k == 0 {
        return Err(
            ValidationError::InvalidValue("top_k".to_string(), "must be at least 1".to_string())
                .into(),
        );
    }

    let vector = embedder.embed(question).await?;
    let matches = store.query(vector, top_k).await?;
    tracing::info!("Retrieved {} context entries for question", matches.len());

    let context = render_context(&matches);
    let answer = chat.complete(&system_prompt(&context), question).await?;

    let sources = matches
        .iter()
        .map(|hit| AnswerSource {
            file_path: hit.field(metadata::FILE_PATH).to_string(),
            repo_name: hit.field(metadata::REPO_NAME).to_string(),
            score: hit.score,
        })
        .collect();

    Ok(AskResponse {
        question: question.to_string(),
        answer,
        sources,
    })
}
