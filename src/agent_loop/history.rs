//! Bounding the outbound log without splitting tool-call/result pairs.
//!
//! Truncation only ever drops a prefix of the non-system messages, and only at a
//! position where every tool call issued so far has been answered. When no such
//! position gets the log under the limit, more messages are kept rather than
//! orphaning a call or a result.

use std::collections::HashSet;

use crate::types::{Message, Role};

/// Positions where the log can be cut without orphaning a call or a result.
///
/// Position `i` means "keep `messages[i..]`". Position 0 is always included.
pub fn safe_boundaries(messages: &[Message]) -> Vec<usize> {
    let mut unresolved: HashSet<&str> = HashSet::new();
    let mut boundaries = vec![0];

    for (i, message) in messages.iter().enumerate() {
        match message {
            Message::Assistant(turn) => {
                unresolved.extend(turn.tool_calls.iter().map(|call| call.id.as_str()));
            }
            Message::Tool(tool) => {
                unresolved.remove(tool.tool_call_id.as_str());
            }
            _ => {}
        }

        let next = i + 1;
        let starts_with_result = messages
            .get(next)
            .is_some_and(|m| m.role() == Role::Tool);
        if unresolved.is_empty() && !starts_with_result {
            boundaries.push(next);
        }
    }
    boundaries
}

/// Trim `messages` toward `max_messages`, keeping the first system message.
///
/// The count applies to the non-system messages. The result may be longer than
/// requested but is never structurally worse than the input.
pub fn truncate_history(messages: &[Message], max_messages: usize) -> Vec<Message> {
    let system_index = messages.iter().position(Message::is_system);
    let rest: Vec<&Message> = messages
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != system_index)
        .map(|(_, m)| m)
        .collect();

    if rest.len() <= max_messages {
        return messages.to_vec();
    }

    let owned_rest: Vec<Message> = rest.into_iter().cloned().collect();
    let target = owned_rest.len() - max_messages;
    let boundary = safe_boundaries(&owned_rest)
        .into_iter()
        .filter(|b| *b <= target)
        .max()
        .unwrap_or(0);

    tracing::debug!(
        original = messages.len(),
        dropped = boundary,
        max_messages,
        "truncated history"
    );

    let mut out = Vec::with_capacity(owned_rest.len() - boundary + 1);
    if let Some(index) = system_index {
        out.push(messages[index].clone());
    }
    out.extend(owned_rest.into_iter().skip(boundary));
    out
}
