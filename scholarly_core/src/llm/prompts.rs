//! Prompt text and message assembly for the research assistant.

use super::{ChatMessage, ChatRole};
use crate::store::SentDocument;
use std::fmt::Write;

pub const QUERY_SYSTEM_PROMPT: &str = "You are an expert academic research assistant. \
Generate focused search queries for academic databases from the user's research conversation.

Guidelines:
- Each query should cover a different aspect or perspective of the topic
- Use academic terminology and keywords
- Keep queries concise but specific
- Give every query a short focus description
- Take clarifications from later messages into account

Respond with a JSON object of the form \
{\"queries\": [{\"query\": \"...\", \"focus\": \"...\"}]}";

pub const CLARIFY_SYSTEM_PROMPT: &str = "You are an expert academic research assistant. \
Before searching the literature, help the user sharpen their research question. \
Briefly restate what you understood, then ask two or three short questions about scope, \
time period, methodology or field that would make the search more precise. \
Do not answer the question yet.";

pub const ANSWER_SYSTEM_PROMPT: &str = "You are an expert academic research assistant. \
Answer the user's research question using the provided academic documents.

Guidelines:
- Use only information from the provided documents
- Cite papers by their document number and title when making claims
- If the documents do not contain enough information, say so
- Synthesize across sources and acknowledge conflicting findings
- Keep an academic tone";

/// The conversation without any caller-supplied system messages.
fn dialogue(conversation: &[ChatMessage]) -> impl Iterator<Item = ChatMessage> + '_ {
    conversation
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .cloned()
}

pub fn query_messages(conversation: &[ChatMessage], max: usize) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(format!(
        "{}\n\nGenerate between 1 and {} queries.",
        QUERY_SYSTEM_PROMPT, max
    ))];
    messages.extend(dialogue(conversation));
    messages
}

pub fn clarification_messages(conversation: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(CLARIFY_SYSTEM_PROMPT)];
    messages.extend(dialogue(conversation));
    messages
}

/// Numbered document blocks for the answer prompt.
pub fn format_context(documents: &[SentDocument]) -> String {
    let mut context = String::new();
    for (i, doc) in documents.iter().enumerate() {
        let _ = writeln!(context, "--- Document {} ---", i + 1);
        let _ = writeln!(context, "Title: {}", doc.title);
        let _ = writeln!(context, "Authors: {}", doc.authors);
        let _ = writeln!(context, "Year: {}", doc.year);
        if !doc.url.is_empty() {
            let _ = writeln!(context, "URL: {}", doc.url);
        }
        let _ = writeln!(context, "Abstract: {}", doc.abstract_text);
        context.push('\n');
    }
    context
}

pub fn answer_messages(
    conversation: &[ChatMessage],
    documents: &[SentDocument],
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(ANSWER_SYSTEM_PROMPT)];
    messages.extend(dialogue(conversation));
    messages.push(ChatMessage::user(format!(
        "Relevant academic documents:\n\n{}Answer my question based on the documents above.",
        format_context(documents)
    )));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federated::AccessType;

    fn doc(title: &str, url: &str) -> SentDocument {
        SentDocument {
            content: String::new(),
            score: 0.5,
            title: title.into(),
            authors: "A. Author".into(),
            year: "2022".into(),
            source: "arxiv".into(),
            url: url.into(),
            abstract_text: "Findings.".into(),
            access: AccessType::Open,
            doc_hash: None,
        }
    }

    #[test]
    fn context_numbers_documents() {
        let context = format_context(&[doc("First", "https://x"), doc("Second", "")]);
        assert!(context.contains("--- Document 1 ---\nTitle: First"));
        assert!(context.contains("--- Document 2 ---\nTitle: Second"));
        assert!(context.contains("URL: https://x"));
        assert_eq!(context.matches("URL:").count(), 1);
    }

    #[test]
    fn caller_system_messages_are_replaced() {
        let conversation = vec![
            ChatMessage::system("ignore me"),
            ChatMessage::user("What is RAG?"),
        ];
        let messages = answer_messages(&conversation, &[doc("First", "")]);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, ANSWER_SYSTEM_PROMPT);
        assert_eq!(messages[1].content, "What is RAG?");
        assert_eq!(messages[2].role, ChatRole::User);

        let queries = query_messages(&conversation, 4);
        assert!(queries[0].content.ends_with("between 1 and 4 queries."));
    }
}
