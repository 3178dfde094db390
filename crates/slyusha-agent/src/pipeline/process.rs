//! Response orchestration: executes a parsed turn against the chat.
//!
//! Entries run strictly in order because a text entry without an explicit
//! target replies to the message sent just before it. Reaction failures are
//! logged and skipped. A text failure ends the turn with at most one
//! fallback message.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::IndexedRandom;
use tracing::{debug, info, warn};

use slyusha_core::config::TurnConfig;
use slyusha_core::types::{ChatId, ChatMessage, MessageId, ReactionKey, SenderRef};
use slyusha_store::MessageStore;

use super::context::{ApiError, ChatApi, SentMessage, TextFormat};
use super::reaction;
use super::target::resolve_target;
use super::turn::TurnEntry;

/// Sent when a turn fails midway.
pub const FALLBACK_PHRASES: &[&str] = &[
    "ой, я что-то зависла",
    "кажется, мысль убежала",
    "так, я потеряла нить разговора",
    "мм, не могу сейчас сформулировать",
    "погодите, у меня лагнуло",
];

const BLOCKED_APOLOGY: &str = "прости, на это я ответить не могу";

const BULLET_MARKERS: &[&str] = &["* ", "- ", "· ", "– ", "— "];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    pub cap_ms: u64,
    pub typing_speed_cpm: u32,
}

impl From<&TurnConfig> for PacingConfig {
    fn from(cfg: &TurnConfig) -> Self {
        Self {
            cap_ms: cfg.pacing_cap_ms,
            typing_speed_cpm: cfg.typing_speed_cpm,
        }
    }
}

/// Wait before sending `next_len` characters: typing time at the
/// configured speed, capped.
pub fn pacing_delay(next_len: usize, cfg: &PacingConfig) -> Duration {
    if cfg.typing_speed_cpm == 0 {
        return Duration::from_millis(cfg.cap_ms);
    }
    let typing_ms = (next_len as u128 * 60_000) / u128::from(cfg.typing_speed_cpm);
    let ms = typing_ms.min(u128::from(cfg.cap_ms)) as u64;
    Duration::from_millis(ms)
}

/// Replace a leading list marker with a standard bullet.
pub fn normalize_bullet(text: &str) -> String {
    let trimmed = text.trim();
    for marker in BULLET_MARKERS {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            return format!("• {rest}");
        }
    }
    trimmed.to_string()
}

fn pick_fallback() -> &'static str {
    FALLBACK_PHRASES
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or("…")
}

/// Everything needed to execute one turn.
#[derive(Debug, Clone)]
pub struct TurnPlan {
    pub chat_id: ChatId,
    pub entries: Vec<TurnEntry>,
    /// Working view the targets resolve against, oldest first.
    pub history: Vec<ChatMessage>,
    /// Reply-to-user hint carried from the inbound trigger (plain-text mode).
    pub carried_reply_hint: Option<String>,
    /// Random unprompted reply: failures stay silent.
    pub unsolicited: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnReport {
    pub sent: Vec<MessageId>,
    pub reactions_applied: usize,
    pub delays: Vec<Duration>,
    pub fallback_sent: bool,
    pub aborted: bool,
}

#[derive(Clone)]
pub struct ResponseOrchestrator {
    api: Arc<dyn ChatApi>,
    store: Arc<MessageStore>,
    bot: SenderRef,
    pacing: PacingConfig,
}

impl ResponseOrchestrator {
    pub fn new(
        api: Arc<dyn ChatApi>,
        store: Arc<MessageStore>,
        bot: SenderRef,
        pacing: PacingConfig,
    ) -> Self {
        Self {
            api,
            store,
            bot,
            pacing,
        }
    }

    pub fn bot(&self) -> &SenderRef {
        &self.bot
    }

    pub async fn execute(&self, plan: TurnPlan) -> TurnReport {
        let mut report = TurnReport::default();
        let mut last_sent: Option<MessageId> = None;
        let total = plan.entries.len();

        for (i, entry) in plan.entries.iter().enumerate() {
            match entry {
                TurnEntry::React { reaction, .. } => {
                    if self.apply_reaction(&plan, entry, reaction).await {
                        report.reactions_applied += 1;
                    }
                }
                TurnEntry::Text { text, .. } => {
                    let reply_to = self.text_target(&plan, entry, last_sent);
                    match self.send_text(plan.chat_id, text, reply_to).await {
                        Ok(sent) => {
                            last_sent = Some(sent.id);
                            report.sent.push(sent.id);
                        }
                        Err(e) => {
                            warn!(chat_id = plan.chat_id, entry = i, error = %e, "text send failed, aborting turn");
                            if let ApiError::Partial { delivered, .. } = e {
                                report.sent.push(delivered);
                            }
                            report.aborted = true;
                            if !plan.unsolicited {
                                report.fallback_sent = self.send_fallback(plan.chat_id).await;
                            }
                            return report;
                        }
                    }

                    if let Some(next) = plan.entries.get(i + 1) {
                        let delay = pacing_delay(next.text_len(), &self.pacing);
                        report.delays.push(delay);
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        info!(
            chat_id = plan.chat_id,
            entries = total,
            sent = report.sent.len(),
            reactions = report.reactions_applied,
            "turn executed"
        );
        report
    }

    /// Returns `true` if the reaction was applied.
    async fn apply_reaction(&self, plan: &TurnPlan, entry: &TurnEntry, raw: &str) -> bool {
        let Some(glyph) = reaction::canonicalize(raw) else {
            debug!(chat_id = plan.chat_id, reaction = raw, "reaction not allowed, dropped");
            return false;
        };
        let (hint, offset) = entry.target();
        let Some(target) = resolve_target(&plan.history, hint, offset, true) else {
            debug!(chat_id = plan.chat_id, "no reaction target");
            return false;
        };

        let key = ReactionKey::Emoji(glyph.to_string());
        match self
            .api
            .set_reaction(plan.chat_id, target, std::slice::from_ref(&key))
            .await
        {
            Ok(()) => {
                self.record_reaction(plan.chat_id, target, key);
                true
            }
            Err(e) => {
                warn!(chat_id = plan.chat_id, message_id = target, error = %e, "reaction failed");
                false
            }
        }
    }

    /// `set_reaction` replaces the bot's whole set on the platform, so the
    /// store keeps at most one bot reaction per message as well.
    fn record_reaction(&self, chat_id: ChatId, target: MessageId, key: ReactionKey) {
        let held: Vec<ReactionKey> = self
            .store
            .message(chat_id, target)
            .map(|msg| {
                msg.reactions
                    .values()
                    .filter(|r| r.contributors.contains(&self.bot.id))
                    .map(|r| r.key.clone())
                    .collect()
            })
            .unwrap_or_default();

        for old in held.iter().filter(|k| **k != key) {
            self.store.remove_reaction(chat_id, target, old, self.bot.id);
        }
        if !held.contains(&key) {
            self.store.add_reaction(chat_id, target, key, self.bot.id);
        }
    }

    /// Own hint/offset, then the carried hint, then the message just sent.
    fn text_target(
        &self,
        plan: &TurnPlan,
        entry: &TurnEntry,
        last_sent: Option<MessageId>,
    ) -> Option<MessageId> {
        let own = if entry.has_target() {
            let (hint, offset) = entry.target();
            resolve_target(&plan.history, hint, offset, false)
        } else {
            None
        };
        own.or_else(|| {
            plan.carried_reply_hint
                .as_deref()
                .and_then(|hint| resolve_target(&plan.history, Some(hint), None, false))
        })
        .or(last_sent)
    }

    /// Send one text entry and record it as a self-authored message.
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<SentMessage, ApiError> {
        let text = normalize_bullet(text);
        let result = match self
            .api
            .send_text(chat_id, &text, reply_to, TextFormat::Rich)
            .await
        {
            Err(ApiError::Formatting(reason)) => {
                debug!(chat_id, %reason, "rich text rejected, retrying as plain");
                self.api
                    .send_text(chat_id, &text, reply_to, TextFormat::Plain)
                    .await
            }
            other => other,
        };

        match result {
            Ok(sent) => {
                self.record_sent(chat_id, sent.id, text, reply_to);
                Ok(sent)
            }
            // What reached the chat is part of the history even though the
            // turn stops here.
            Err(ApiError::Partial { delivered, reason }) => {
                self.record_sent(chat_id, delivered, text, reply_to);
                Err(ApiError::Partial { delivered, reason })
            }
            Err(e) => Err(e),
        }
    }

    fn record_sent(
        &self,
        chat_id: ChatId,
        id: MessageId,
        text: String,
        reply_to: Option<MessageId>,
    ) {
        let mut msg = ChatMessage::new(id, self.bot.clone(), text).authored_by_self();
        if let Some(snapshot) = reply_to.and_then(|id| self.store.message(chat_id, id)) {
            msg = msg.with_reply(snapshot.snapshot());
        }
        self.store.append(chat_id, msg);
    }

    /// Send one fallback phrase. Returns `true` if it was delivered.
    pub async fn send_fallback(&self, chat_id: ChatId) -> bool {
        self.send_notice(chat_id, pick_fallback()).await
    }

    /// Report a provider refusal to the chat.
    pub async fn send_blocked(&self, chat_id: ChatId, reason: Option<&str>) -> bool {
        let text = match reason {
            Some(reason) => format!("blocked: {reason}"),
            None => BLOCKED_APOLOGY.to_string(),
        };
        self.send_notice(chat_id, &text).await
    }

    /// Plain, unthreaded message that is not part of the model's output.
    pub async fn send_notice(&self, chat_id: ChatId, text: &str) -> bool {
        match self
            .api
            .send_text(chat_id, text, None, TextFormat::Plain)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(chat_id, error = %e, "notice send failed");
                false
            }
        }
    }
}
