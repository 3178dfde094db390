//! Telegram adapter.
//!
//! Wraps a teloxide `Bot` and drives the long-polling dispatcher until the
//! process exits. Messages and reaction updates are the only update kinds
//! requested from Telegram.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::AllowedUpdate;
use teloxide::update_listeners::Polling;
use tracing::info;

use slyusha_core::types::SenderRef;

use crate::context::TelegramContext;
use crate::convert::sender_ref;
use crate::error::TelegramError;
use crate::handler::{handle_message, handle_reaction};

pub struct TelegramAdapter {
    bot: Bot,
    ctx: Arc<TelegramContext>,
}

impl TelegramAdapter {
    /// Build the bot client and look up its own identity.
    pub async fn connect(token: &str) -> Result<(Bot, SenderRef), TelegramError> {
        if token.trim().is_empty() {
            return Err(TelegramError::NoToken);
        }
        let bot = Bot::new(token.trim());
        let me = bot.get_me().await?;
        let identity = sender_ref(&me.user);
        info!(bot_id = identity.id, username = ?identity.username, "connected to Telegram");
        Ok((bot, identity))
    }

    pub fn new(bot: Bot, ctx: Arc<TelegramContext>) -> Self {
        Self { bot, ctx }
    }

    /// Drive the long-polling loop. Returns only when the dispatcher stops.
    pub async fn run(self) {
        info!("Telegram: starting long-polling dispatcher");

        let handler = dptree::entry()
            .branch(Update::filter_message().endpoint(handle_message))
            .branch(Update::filter_message_reaction_updated().endpoint(handle_reaction));

        let listener = Polling::builder(self.bot.clone())
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::MessageReaction])
            .build();

        Dispatcher::builder(self.bot, handler)
            .dependencies(dptree::deps![self.ctx])
            .default_handler(|_upd| async {})
            .build()
            .dispatch_with_listener(
                listener,
                LoggingErrorHandler::with_custom_text("telegram update listener error"),
            )
            .await;
    }
}
