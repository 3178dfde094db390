//! Whether an inbound message should start a turn.

use regex::Regex;
use tracing::warn;

use slyusha_core::config::TelegramConfig;

/// Platform-neutral facts about an inbound message.
#[derive(Debug, Clone, Copy)]
pub struct Inbound<'a> {
    pub text: &'a str,
    pub is_private: bool,
    pub replies_to_bot: bool,
    pub from_bot: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Ignore,
    Respond,
    /// Random unprompted reply.
    RespondUnsolicited,
}

pub struct TriggerRules {
    names: Option<Regex>,
    bot_mention: Option<String>,
    dm_allowed: bool,
}

impl TriggerRules {
    pub fn new(names: &[String], bot_username: Option<&str>, dm_allowed: bool) -> Self {
        let alternatives: Vec<String> = names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .map(regex::escape)
            .collect();
        let names = if alternatives.is_empty() {
            None
        } else {
            let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
            Regex::new(&pattern)
                .map_err(|e| warn!(error = %e, "invalid trigger names, name matching disabled"))
                .ok()
        };
        Self {
            names,
            bot_mention: bot_username.map(|u| format!("@{}", u.to_lowercase())),
            dm_allowed,
        }
    }

    pub fn from_config(cfg: &TelegramConfig, bot_username: Option<&str>) -> Self {
        Self::new(&cfg.trigger_names, bot_username, cfg.dm_allowed)
    }

    /// A trigger name appears as a whole word, or the bot is @-mentioned.
    pub fn is_addressed(&self, text: &str) -> bool {
        if self.names.as_ref().is_some_and(|re| re.is_match(text)) {
            return true;
        }
        self.bot_mention
            .as_ref()
            .is_some_and(|m| text.to_lowercase().contains(m.as_str()))
    }

    /// `draw` is a uniform sample in `[0, 1)` compared against
    /// `random_probability` when nothing else triggers.
    pub fn decide(&self, inbound: &Inbound<'_>, random_probability: f64, draw: f64) -> Decision {
        if inbound.from_bot || inbound.text.trim_start().starts_with('/') {
            return Decision::Ignore;
        }
        if inbound.is_private && self.dm_allowed {
            return Decision::Respond;
        }
        if inbound.replies_to_bot || self.is_addressed(inbound.text) {
            return Decision::Respond;
        }
        if !inbound.is_private && draw < random_probability {
            return Decision::RespondUnsolicited;
        }
        Decision::Ignore
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> TriggerRules {
        TriggerRules::new(
            &["слюша".to_string(), "Slyusha".to_string()],
            Some("Slyusha_Bot"),
            true,
        )
    }

    fn group(text: &str) -> Inbound<'_> {
        Inbound {
            text,
            is_private: false,
            replies_to_bot: false,
            from_bot: false,
        }
    }

    #[test]
    fn name_must_be_a_whole_word() {
        let r = rules();
        assert!(r.is_addressed("Слюша привет"));
        assert!(r.is_addressed("эй, СЛЮША!"));
        assert!(r.is_addressed("hi slyusha"));
        assert!(!r.is_addressed("слюшальник"));
        assert!(!r.is_addressed("nothing here"));
    }

    #[test]
    fn bot_mention_counts() {
        assert!(rules().is_addressed("look @slyusha_bot"));
    }

    #[test]
    fn decisions() {
        let r = rules();
        assert_eq!(r.decide(&group("Слюша привет"), 0.0, 0.5), Decision::Respond);
        assert_eq!(r.decide(&group("random chatter"), 0.0, 0.5), Decision::Ignore);
        assert_eq!(
            r.decide(&group("random chatter"), 0.6, 0.5),
            Decision::RespondUnsolicited
        );
        assert_eq!(r.decide(&group("/start слюша"), 1.0, 0.0), Decision::Ignore);

        let reply = Inbound {
            replies_to_bot: true,
            ..group("ok")
        };
        assert_eq!(r.decide(&reply, 0.0, 0.9), Decision::Respond);

        let bot = Inbound {
            from_bot: true,
            ..group("слюша")
        };
        assert_eq!(r.decide(&bot, 1.0, 0.0), Decision::Ignore);
    }

    #[test]
    fn private_chats_depend_on_dm_allowed() {
        let dm = Inbound {
            is_private: true,
            ..group("hello")
        };
        assert_eq!(rules().decide(&dm, 0.0, 0.5), Decision::Respond);
        let closed = TriggerRules::new(&["слюша".to_string()], None, false);
        assert_eq!(closed.decide(&dm, 1.0, 0.0), Decision::Ignore);
    }
}
