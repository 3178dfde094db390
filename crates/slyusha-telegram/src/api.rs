//! `ChatApi` over the Telegram Bot API.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, MessageId as TgMessageId, ParseMode, ReplyParameters};
use teloxide::{ApiError as TgApiError, RequestError};
use tracing::debug;

use slyusha_agent::pipeline::{ApiError, ChatAdmin, ChatApi, SentMessage, TextFormat};
use slyusha_core::types::{ChatId as SlyChatId, MessageId, ReactionKey};

use crate::convert::reaction_type;
use crate::format::{markdown_to_html, split_message, MESSAGE_MAX_CHARS};

pub struct TelegramApi {
    bot: Bot,
}

impl TelegramApi {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn map_error(e: RequestError) -> ApiError {
    match e {
        RequestError::Api(TgApiError::CantParseEntities(reason)) => ApiError::Formatting(reason),
        RequestError::Api(api @ (TgApiError::MessageToReplyNotFound | TgApiError::ChatNotFound)) => {
            ApiError::NotFound(api.to_string())
        }
        other => ApiError::Network(other.to_string()),
    }
}

/// A failure after earlier chunks went out is reported as `Partial`.
fn chunk_error(delivered: Option<MessageId>, e: ApiError) -> ApiError {
    match delivered {
        Some(delivered) => ApiError::Partial {
            delivered,
            reason: e.to_string(),
        },
        None => e,
    }
}

#[async_trait]
impl ChatApi for TelegramApi {
    /// Long texts go out as several messages; the id of the last one is
    /// returned and only the first one is threaded. A failure after the first
    /// chunk comes back as `ApiError::Partial`.
    async fn send_text(
        &self,
        chat_id: SlyChatId,
        text: &str,
        reply_to: Option<MessageId>,
        format: TextFormat,
    ) -> Result<SentMessage, ApiError> {
        let mut last = None;
        for (i, chunk) in split_message(text, MESSAGE_MAX_CHARS).iter().enumerate() {
            let mut req = match format {
                TextFormat::Rich => self
                    .bot
                    .send_message(ChatId(chat_id), markdown_to_html(chunk))
                    .parse_mode(ParseMode::Html),
                TextFormat::Plain => self.bot.send_message(ChatId(chat_id), chunk.as_str()),
            };
            if let Some(id) = reply_to.filter(|_| i == 0) {
                req = req.reply_parameters(
                    ReplyParameters::new(TgMessageId(id)).allow_sending_without_reply(),
                );
            }
            let sent = req.await.map_err(|e| chunk_error(last, map_error(e)))?;
            last = Some(sent.id.0);
        }
        debug!(chat_id, ?reply_to, ?format, "message sent");
        last.map(|id| SentMessage { id })
            .ok_or_else(|| ApiError::Network("nothing was sent".to_string()))
    }

    async fn set_reaction(
        &self,
        chat_id: SlyChatId,
        message_id: MessageId,
        reactions: &[ReactionKey],
    ) -> Result<(), ApiError> {
        self.bot
            .set_message_reaction(ChatId(chat_id), TgMessageId(message_id))
            .reaction(reactions.iter().map(reaction_type).collect::<Vec<_>>())
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn send_typing(&self, chat_id: SlyChatId) -> Result<(), ApiError> {
        self.bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn list_admins(&self, chat_id: SlyChatId) -> Result<Vec<ChatAdmin>, ApiError> {
        let members = self
            .bot
            .get_chat_administrators(ChatId(chat_id))
            .await
            .map_err(map_error)?;
        Ok(members
            .into_iter()
            .map(|m| ChatAdmin {
                user_id: m.user.id.0 as i64,
                name: m.user.full_name(),
                username: m.user.username.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_map_to_formatting() {
        let err = map_error(RequestError::Api(TgApiError::CantParseEntities(
            "can't find end tag".to_string(),
        )));
        assert!(matches!(err, ApiError::Formatting(ref r) if r.contains("end tag")));
    }

    #[test]
    fn failure_after_first_chunk_is_partial() {
        let first = chunk_error(None, ApiError::Formatting("bad tag".to_string()));
        assert!(matches!(first, ApiError::Formatting(_)));

        let later = chunk_error(Some(77), ApiError::Formatting("bad tag".to_string()));
        assert!(matches!(
            later,
            ApiError::Partial { delivered: 77, ref reason } if reason.contains("bad tag")
        ));
    }

    #[test]
    fn missing_targets_map_to_not_found() {
        assert!(matches!(
            map_error(RequestError::Api(TgApiError::ChatNotFound)),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            map_error(RequestError::Api(TgApiError::BotBlocked)),
            ApiError::Network(_)
        ));
    }
}
