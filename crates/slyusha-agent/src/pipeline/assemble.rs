//! Context assembly: chat history to role-tagged prompt blocks.
//!
//! Works on a read-only view of the newest `messages_limit` messages. Each
//! message becomes one block; a reply to a message outside the nearby window
//! gets a quote block inserted right before it. Attachments are only fetched
//! for the newest messages.

use tracing::debug;

use slyusha_core::config::ContextConfig;
use slyusha_core::types::{ChatMessage, ReplySnapshot};

use super::attach::{self, AttachmentPolicy};
use super::context::MediaFetcher;
use crate::provider::{Content, Part, Role};

/// Replies to one of this many preceding messages are annotated inline.
const INLINE_REPLY_WINDOW: usize = 5;
/// Own attachments are included for this many newest messages.
const OWN_MEDIA_WINDOW: usize = 5;
/// Replied-to attachments are included for this many newest messages.
const REPLY_MEDIA_WINDOW: usize = 3;

const ELLIPSIS: char = '…';

#[derive(Debug, Clone, Copy)]
pub struct AssembleOptions {
    pub symbol_limit: usize,
    pub messages_limit: usize,
    pub include_usernames: bool,
    pub include_reactions: bool,
    pub include_attachments: bool,
    pub attachments: AttachmentPolicy,
}

impl From<&ContextConfig> for AssembleOptions {
    fn from(cfg: &ContextConfig) -> Self {
        Self {
            symbol_limit: cfg.symbol_limit,
            messages_limit: cfg.messages_limit,
            include_usernames: cfg.include_usernames,
            include_reactions: cfg.include_reactions,
            include_attachments: cfg.include_attachments,
            attachments: AttachmentPolicy::from(cfg),
        }
    }
}

/// Trim `text` and cut it to at most `limit` characters, marking the cut
/// with an ellipsis.
pub fn truncate(text: &str, limit: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= limit {
        return trimmed.to_string();
    }
    if limit == 0 {
        return String::new();
    }
    let mut cut: String = trimmed.chars().take(limit - 1).collect();
    cut.truncate(cut.trim_end().len());
    cut.push(ELLIPSIS);
    cut
}

/// Build prompt blocks from `history` (oldest first). The history is not
/// modified; attachment failures only drop the failing attachment.
pub async fn assemble(
    history: &[ChatMessage],
    opts: &AssembleOptions,
    fetcher: Option<&dyn MediaFetcher>,
) -> Vec<Content> {
    let start = history.len().saturating_sub(opts.messages_limit);
    let view = &history[start..];
    let mut blocks = Vec::with_capacity(view.len());

    for (i, msg) in view.iter().enumerate() {
        if msg.is_self {
            let mut text = message_text(msg, opts);
            push_reactions(&mut text, msg, opts);
            blocks.push(Content::text(Role::Model, text));
            continue;
        }

        let mut line = msg.sender.label(opts.include_usernames);

        if let Some(reply) = msg.reply_to.as_ref().filter(|r| !r.is_self) {
            let nearby = &view[i.saturating_sub(INLINE_REPLY_WINDOW)..i];
            let who = reply.sender.label(opts.include_usernames);
            if nearby.iter().any(|m| m.id == reply.id) {
                line.push_str(&format!(" (in reply to: {who})"));
            } else {
                blocks.push(quote_block(reply, &who, opts.symbol_limit));
            }
        }

        line.push_str(": ");
        line.push_str(&message_text(msg, opts));
        push_reactions(&mut line, msg, opts);

        let mut parts = vec![Part::Text(line)];
        if opts.include_attachments {
            if let Some(fetcher) = fetcher {
                let from_end = view.len() - i;
                parts.extend(media_parts(msg, from_end, opts, fetcher).await);
            }
        }

        blocks.push(Content {
            role: Role::User,
            parts,
        });
    }

    debug!(
        messages = view.len(),
        blocks = blocks.len(),
        "assembled context"
    );
    blocks
}

fn message_text(msg: &ChatMessage, opts: &AssembleOptions) -> String {
    if msg.text.trim().is_empty() && !msg.media.is_empty() {
        return "[attachment]".to_string();
    }
    truncate(&msg.text, opts.symbol_limit)
}

fn push_reactions(line: &mut String, msg: &ChatMessage, opts: &AssembleOptions) {
    if !opts.include_reactions {
        return;
    }
    if let Some(summary) = msg.reaction_summary() {
        line.push_str(&format!(" [reactions: {summary}]"));
    }
}

fn quote_block(reply: &ReplySnapshot, who: &str, symbol_limit: usize) -> Content {
    let text = if reply.text.trim().is_empty() && !reply.media.is_empty() {
        "[attachment]".to_string()
    } else {
        truncate(&reply.text, symbol_limit)
    };
    Content::text(Role::User, format!("[quoted message from {who}]: {text}"))
}

/// Inline media for a non-self message that sits `from_end` positions from
/// the end of the view (1 = newest).
async fn media_parts(
    msg: &ChatMessage,
    from_end: usize,
    opts: &AssembleOptions,
    fetcher: &dyn MediaFetcher,
) -> Vec<Part> {
    let mut refs = Vec::new();
    if from_end <= OWN_MEDIA_WINDOW {
        refs.extend(attach::resolve(&msg.media, &opts.attachments));
    }
    if from_end <= REPLY_MEDIA_WINDOW {
        if let Some(ref reply) = msg.reply_to {
            refs.extend(attach::resolve(&reply.media, &opts.attachments));
        }
    }
    if refs.is_empty() {
        return Vec::new();
    }

    attach::fetch_all(fetcher, &refs, &opts.attachments)
        .await
        .into_iter()
        .map(|m| Part::InlineData {
            mime_type: m.mime_type,
            data: m.data,
        })
        .collect()
}
