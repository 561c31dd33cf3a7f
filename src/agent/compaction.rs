//! COMPACT procedure (spec.md §4.9): summarizes everything except the seed
//! message and the most recent `keep_recent` messages via a tool-free LLM
//! call. Failure leaves the message list untouched and aborts further
//! compaction for this round.

use crate::agent::message::Message;
use crate::agent::transport::LlmTransport;

const SUMMARY_PREFACE: &str = "[Previous conversation summary]: ";

/// Attempts one compaction pass. Returns `None` if compaction isn't
/// possible (fewer than `keep_recent + 1` messages, or the summarization
/// call failed) so the caller can stop the compaction loop.
pub async fn compact_once(
    transport: &dyn LlmTransport,
    messages: &[Message],
    keep_recent: usize,
) -> Option<Vec<Message>> {
    if messages.len() <= keep_recent + 1 {
        return None;
    }

    let seed = messages[0].clone();
    let split = messages.len() - keep_recent;
    let to_summarize = &messages[1..split];
    let recent = &messages[split..];

    let summary = summarize(transport, to_summarize).await?;

    let mut rebuilt = Vec::with_capacity(2 + recent.len());
    rebuilt.push(seed);
    rebuilt.push(Message::user_text(format!("{SUMMARY_PREFACE}{summary}")));
    rebuilt.extend_from_slice(recent);
    Some(rebuilt)
}

async fn summarize(transport: &dyn LlmTransport, target: &[Message]) -> Option<String> {
    if target.is_empty() {
        return Some(String::new());
    }
    let mut prompt = String::from(
        "Summarize the following conversation segment concisely. Preserve \
         user intents, tool call intents, key tool results, and decisions \
         made.\n\n",
    );
    for msg in target {
        prompt.push_str(&msg.text_only());
        prompt.push('\n');
    }
    let request = vec![Message::user_text(prompt)];
    match transport.call(&request, &[]).await {
        Ok(response) => Some(
            response
                .blocks
                .iter()
                .map(|b| match b {
                    crate::agent::message::ContentBlock::Text { text } => text.clone(),
                    _ => String::new(),
                })
                .collect::<Vec<_>>()
                .join(""),
        ),
        Err(_) => None,
    }
}

/// Repeatedly compacts, decrementing `keep_recent` by 2 starting at 10, up
/// to 5 attempts, stopping as soon as the estimate drops under `budget_chars`
/// or compaction becomes infeasible (spec.md §4.9 step 2).
pub async fn compact_until_under_budget(
    transport: &dyn LlmTransport,
    mut messages: Vec<Message>,
    budget_chars: usize,
) -> Vec<Message> {
    let mut keep_recent = 10usize;
    for _ in 0..5 {
        let total: usize = messages.iter().map(|m| m.approx_chars()).sum();
        if total <= budget_chars {
            break;
        }
        match compact_once(transport, &messages, keep_recent).await {
            Some(compacted) => messages = compacted,
            None => break,
        }
        keep_recent = keep_recent.saturating_sub(2);
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::ContentBlock;
    use crate::agent::transport::mock::ScriptedTransport;
    use crate::agent::transport::LlmResponse;

    fn text_response(text: &str) -> LlmResponse {
        LlmResponse {
            blocks: vec![ContentBlock::Text { text: text.to_string() }],
        }
    }

    #[tokio::test]
    async fn compact_once_keeps_seed_and_recent() {
        let mut messages = vec![Message::user_text("seed")];
        for i in 0..20 {
            messages.push(Message::user_text(format!("msg {i}")));
        }
        let transport = ScriptedTransport::new(vec![text_response("summary of old stuff")]);
        let result = compact_once(&transport, &messages, 4).await.unwrap();
        assert_eq!(result[0], messages[0]);
        assert!(result[1].text_only().starts_with("[Previous conversation summary]: "));
        assert_eq!(result.len(), 2 + 4);
    }

    #[tokio::test]
    async fn compact_once_returns_none_when_too_short() {
        let messages = vec![Message::user_text("seed"), Message::user_text("only one more")];
        let transport = ScriptedTransport::new(vec![text_response("unused")]);
        assert!(compact_once(&transport, &messages, 4).await.is_none());
    }

    #[tokio::test]
    async fn compact_once_aborts_on_summarization_failure() {
        let mut messages = vec![Message::user_text("seed")];
        for i in 0..20 {
            messages.push(Message::user_text(format!("msg {i}")));
        }
        let transport = ScriptedTransport::new(vec![]);
        assert!(compact_once(&transport, &messages, 4).await.is_none());
    }
}
