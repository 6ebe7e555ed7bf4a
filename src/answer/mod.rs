
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::embeddings::EmbeddingProvider;
use crate::generation::{GenerationProvider, PromptContent};
use crate::retrieval::Retriever;
use crate::{DocQaError, Result};

/// Returned instead of calling the generation service when the user has not
/// indexed any documents yet.
pub const NO_DOCUMENTS_ANSWER: &str =
    "You have no documents indexed yet. Upload and index a document, then ask again.";

const GROUNDING_INSTRUCTION: &str = "Answer the question using only the context provided below. \
If the context does not contain the information needed, say that you cannot answer from the \
uploaded documents.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    fn as_prompt_role(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "model",
        }
    }
}

/// One prior turn of the conversation, oldest first in a history slice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    #[inline]
    pub fn user(content: &str) -> Self {
        Self {
            role: ChatRole::User,
            content: content.to_string(),
        }
    }

    #[inline]
    pub fn assistant(content: &str) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.to_string(),
        }
    }
}

/// Grounds a generative prompt in retrieved chunks and returns the answer.
pub struct AnswerComposer<'a, E: EmbeddingProvider, G: GenerationProvider> {
    retriever: Retriever<'a, E>,
    generator: &'a G,
}

impl<'a, E: EmbeddingProvider, G: GenerationProvider> AnswerComposer<'a, E, G> {
    #[inline]
    pub fn new(retriever: Retriever<'a, E>, generator: &'a G) -> Self {
        Self {
            retriever,
            generator,
        }
    }

    /// Answer `question` for `user_id`, grounding the prompt in the user's
    /// retrieved chunks and the prior conversation `history`.
    ///
    /// A user with nothing indexed gets the fixed [`NO_DOCUMENTS_ANSWER`]
    /// without a generation call; every other failure propagates.
    #[inline]
    pub fn answer(&self, user_id: &str, question: &str, history: &[ChatTurn]) -> Result<String> {
        let chunks = match self.retriever.retrieve(user_id, question) {
            Ok(chunks) => chunks,
            Err(DocQaError::NoIndex(_)) => {
                info!("user {user_id} has no indexed documents, skipping generation");
                return Ok(NO_DOCUMENTS_ANSWER.to_string());
            }
            Err(e) => return Err(e),
        };

        let context = chunks.iter().map(|chunk| chunk.text.as_str()).join("\n");
        let contents = build_prompt(history, &context, question);

        debug!(
            "composed prompt from {} retrieved chunks and {} history turns",
            chunks.len(),
            history.len()
        );

        self.generator.generate(&contents)
    }
}

/// Assemble the content sequence sent to the generation service: the prior
/// conversation verbatim, then a final user turn carrying the grounding
/// instruction, the context block, and the question.
fn build_prompt(history: &[ChatTurn], context: &str, question: &str) -> Vec<PromptContent> {
    let mut contents = Vec::with_capacity(history.len() + 1);
    for turn in history {
        contents.push(PromptContent::new(
            turn.role.as_prompt_role(),
            turn.content.clone(),
        ));
    }
    contents.push(PromptContent::new(
        "user",
        format!("{GROUNDING_INSTRUCTION}\n\nContext:\n{context}\n\nQuestion: {question}"),
    ));
    contents
}
