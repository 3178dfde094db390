//! Platform interfaces the pipeline talks through.
//!
//! `ChatApi` is the messaging surface and `MediaFetcher` downloads attachment
//! bytes. Both are implemented by the channel adapter (Telegram) and by mocks
//! in tests, so the pipeline itself stays platform-agnostic.

use async_trait::async_trait;

use slyusha_core::types::{ChatId, MessageId, ReactionKey};

use super::attach::{InlineMedia, MediaRef};

/// How outgoing text should be rendered by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    /// Markdown converted to the platform's rich text.
    Rich,
    Plain,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The platform rejected the formatting entities; a plain-text retry may succeed.
    #[error("formatting rejected: {0}")]
    Formatting(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A split message failed after some of its parts were delivered.
    /// `delivered` is the last part that reached the chat.
    #[error("partially sent, last delivered {delivered}: {reason}")]
    Partial { delivered: MessageId, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    pub id: MessageId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatAdmin {
    pub user_id: i64,
    pub name: String,
    pub username: Option<String>,
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
        format: TextFormat,
    ) -> Result<SentMessage, ApiError>;

    /// Replace the bot's reactions on a message with `reactions`.
    async fn set_reaction(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        reactions: &[ReactionKey],
    ) -> Result<(), ApiError>;

    async fn send_typing(&self, chat_id: ChatId) -> Result<(), ApiError>;

    async fn list_admins(&self, chat_id: ChatId) -> Result<Vec<ChatAdmin>, ApiError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("download failed: {0}")]
    Network(String),

    #[error("file is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("file not available: {0}")]
    Missing(String),
}

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download `media` and encode it for the prompt. Files above
    /// `byte_limit` are rejected.
    async fn fetch(&self, media: &MediaRef, byte_limit: u64) -> Result<InlineMedia, FetchError>;
}
