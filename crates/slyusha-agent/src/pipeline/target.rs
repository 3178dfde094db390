use slyusha_core::types::{ChatMessage, MessageId};

/// Resolve a reply or reaction target against `history` (oldest first).
///
/// Candidates are the non-self messages. A `hint` narrows them to one sender;
/// a hint matching nobody is ignored. `offset` counts back from the newest
/// candidate and is clamped to the candidate range. With no candidates at
/// all, `fallback_to_last` selects the newest message of any author.
pub fn resolve_target(
    history: &[ChatMessage],
    hint: Option<&str>,
    offset: Option<usize>,
    fallback_to_last: bool,
) -> Option<MessageId> {
    let mut candidates: Vec<&ChatMessage> = history.iter().filter(|m| !m.is_self).collect();

    if let Some(hint) = hint.filter(|h| !h.trim().is_empty()) {
        let narrowed: Vec<&ChatMessage> = candidates
            .iter()
            .copied()
            .filter(|m| m.sender.matches_hint(hint))
            .collect();
        if !narrowed.is_empty() {
            candidates = narrowed;
        }
    }

    if candidates.is_empty() {
        return if fallback_to_last {
            history.last().map(|m| m.id)
        } else {
            None
        };
    }

    let offset = offset.unwrap_or(0).min(candidates.len() - 1);
    candidates.iter().rev().nth(offset).map(|m| m.id)
}
