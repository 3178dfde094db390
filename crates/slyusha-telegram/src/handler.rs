//! Dispatcher endpoints: inbound messages and reaction updates.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::MessageReactionUpdated;
use tracing::{debug, info};

use slyusha_agent::pipeline::{Decision, Inbound, Trigger, TriggerRules};
use slyusha_core::types::{ChatId as SlyChatId, ChatMessage};

use crate::context::TelegramContext;
use crate::convert;

/// Store every message, then start a turn if it addresses the bot.
///
/// Runs for every incoming `Message`:
/// 1. Convert and append to the chat history
/// 2. Track the sender as an active member
/// 3. Opt-out check
/// 4. Trigger detection
/// 5. Schedule the turn (debounced, non-blocking)
pub async fn handle_message(msg: Message, ctx: Arc<TelegramContext>) -> ResponseResult<()> {
    let Some(chat_msg) = convert::to_chat_message(&msg, ctx.bot_id()) else {
        return Ok(());
    };
    if chat_msg.text.trim().is_empty() && chat_msg.media.is_empty() {
        return Ok(());
    }

    let chat_id = msg.chat.id.0;
    let from_bot = msg.from.as_ref().is_some_and(|u| u.is_bot);
    let store = ctx.store();

    if !store.append(chat_id, chat_msg.clone()) {
        return Ok(());
    }
    if !from_bot {
        store.touch_member(chat_id, &chat_msg.sender, chat_msg.date);
    }

    let settings = store.settings(chat_id);
    if settings.opted_out {
        debug!(chat_id, "chat opted out, not responding");
        return Ok(());
    }

    let probability = settings
        .random_reply_probability
        .unwrap_or(ctx.random_reply_probability);
    let Some(trigger) = trigger_for(
        &ctx.rules,
        chat_id,
        &chat_msg,
        msg.chat.is_private(),
        from_bot,
        probability,
        rand::random::<f64>(),
    ) else {
        return Ok(());
    };

    info!(
        chat_id,
        message_id = trigger.message_id,
        unsolicited = trigger.unsolicited,
        "turn scheduled"
    );
    // Detached: the runner logs its own outcome.
    drop(ctx.runner.schedule(trigger));
    Ok(())
}

/// Decide whether `msg` starts a turn and build its trigger.
pub fn trigger_for(
    rules: &TriggerRules,
    chat_id: SlyChatId,
    msg: &ChatMessage,
    is_private: bool,
    from_bot: bool,
    probability: f64,
    draw: f64,
) -> Option<Trigger> {
    let inbound = Inbound {
        text: &msg.text,
        is_private,
        replies_to_bot: msg.reply_to.as_ref().is_some_and(|r| r.is_self),
        from_bot: from_bot || msg.is_self,
    };
    let unsolicited = match rules.decide(&inbound, probability, draw) {
        Decision::Ignore => return None,
        Decision::Respond => false,
        Decision::RespondUnsolicited => true,
    };
    let reply_hint = if is_private {
        None
    } else {
        Some(
            msg.sender
                .username
                .clone()
                .unwrap_or_else(|| msg.sender.name.clone()),
        )
    };
    Some(Trigger {
        chat_id,
        message_id: msg.id,
        sender: msg.sender.clone(),
        unsolicited,
        reply_hint,
    })
}

/// Apply a `message_reaction` update to the stored message.
pub async fn handle_reaction(
    update: MessageReactionUpdated,
    ctx: Arc<TelegramContext>,
) -> ResponseResult<()> {
    let contributor = match (&update.user, &update.actor_chat) {
        (Some(user), _) => user.id.0 as i64,
        (None, Some(chat)) => chat.id.0,
        (None, None) => return Ok(()),
    };
    let old = convert::reaction_keys(&update.old_reaction);
    let new = convert::reaction_keys(&update.new_reaction);
    ctx.store().apply_reaction_update(
        update.chat.id.0,
        update.message_id.0,
        contributor,
        &old,
        &new,
    );
    debug!(
        chat_id = update.chat.id.0,
        message_id = update.message_id.0,
        contributor,
        "reaction update applied"
    );
    Ok(())
}
