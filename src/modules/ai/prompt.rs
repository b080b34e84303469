use crate::{
    configs::vector_store::ScoredChunk,
    modules::ai::model::ChatTurn,
    modules::message::schema::MessageEntity,
};

const SYSTEM_PROMPT: &str = "Use the following pieces of context (or previous conversation if needed) \
to answer the user's question in markdown format.";

const SEPARATOR: &str = "\n\n----------------\n\n";

/// Builds the completion request for `question`.
///
/// `history` is expected oldest first; `context` in relevance order.
pub fn build_prompt(
    question: &str,
    history: &[MessageEntity],
    context: &[ScoredChunk],
) -> Vec<ChatTurn> {
    let conversation = history
        .iter()
        .map(|m| {
            let speaker = if m.is_user_message { "User" } else { "Assistant" };
            format!("{speaker}: {}", m.text)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let context = context.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n\n");

    let user = format!(
        "{SYSTEM_PROMPT}\nIf you don't know the answer, say that you don't know; \
         do not make up an answer.{SEPARATOR}PREVIOUS CONVERSATION:\n{conversation}\
         {SEPARATOR}CONTEXT:\n{context}\n\nUSER INPUT: {question}"
    );

    vec![ChatTurn::system(SYSTEM_PROMPT), ChatTurn::user(user)]
}
