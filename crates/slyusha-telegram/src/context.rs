use std::sync::Arc;

use slyusha_agent::pipeline::{TriggerRules, TurnRunner};
use slyusha_core::config::SlyushaConfig;
use slyusha_store::MessageStore;

/// Shared state injected into every dispatcher endpoint.
pub struct TelegramContext {
    pub runner: Arc<TurnRunner>,
    pub rules: TriggerRules,
    /// Used when the chat has no random-reply override.
    pub random_reply_probability: f64,
}

impl TelegramContext {
    pub fn new(config: &SlyushaConfig, runner: Arc<TurnRunner>) -> Self {
        let rules = TriggerRules::from_config(&config.telegram, runner.bot().username.as_deref());
        Self {
            runner,
            rules,
            random_reply_probability: config.turn.random_reply_probability,
        }
    }

    pub fn store(&self) -> &Arc<MessageStore> {
        self.runner.store()
    }

    pub fn bot_id(&self) -> i64 {
        self.runner.bot().id
    }
}
