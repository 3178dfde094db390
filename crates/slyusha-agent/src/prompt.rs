//! System instruction for one chat turn.
//!
//! The prompt is rebuilt every turn from the persona, the chat's settings,
//! its memory and notes, and the people currently active in it.

use chrono::{DateTime, Utc};

use slyusha_core::config::PersonaConfig;
use slyusha_core::types::{ChatSettings, Member, SenderRef};

use crate::pipeline::context::ChatAdmin;

const STRUCTURED_CONTRACT: &str = "\
Answer with a JSON array. Each element is one action, executed in order:
- {\"text\": \"...\"} sends a message;
- {\"react\": \"<emoji>\"} puts a reaction on a message.
Both may carry \"reply_to\" (name or @username of the person you address) and
\"offset\" (0 = their latest message, 1 = the one before). Without them a text
continues from your previous message and a reaction goes to the latest message.
Several short messages read more naturally than one long one.
An empty array means you stay silent.";

const PLAIN_CONTRACT: &str = "\
Answer with the text of a single chat message. No JSON, no name prefix.";

const HATE_MODE: &str = "\
Hate mode is on: you are grumpy, sarcastic and reluctant to help, \
but never cruel about things people cannot change.";

/// Per-turn data the prompt is rendered from.
pub struct PromptInput<'a> {
    pub settings: &'a ChatSettings,
    pub memory: Option<&'a str>,
    pub notes: &'a [String],
    pub members: &'a [Member],
    pub admins: &'a [ChatAdmin],
    pub structured: bool,
    pub now: DateTime<Utc>,
}

pub struct PromptBuilder {
    persona: PersonaConfig,
    bot: SenderRef,
}

impl PromptBuilder {
    pub fn new(persona: PersonaConfig, bot: SenderRef) -> Self {
        Self { persona, bot }
    }

    pub fn build(&self, input: &PromptInput<'_>) -> String {
        let mut out = String::new();

        out.push_str(self.persona.resolve(input.settings.persona.as_deref()).trim());
        out.push_str(&format!(
            "\n\nIn this chat you are {}. Messages from others are prefixed with \
             the sender's name; your own earlier messages appear as model turns.",
            self.bot.label(true)
        ));

        if let Some(ref locale) = input.settings.locale {
            out.push_str(&format!("\nReply in the language with code \"{locale}\"."));
        }
        if input.settings.hate_mode {
            out.push_str("\n\n");
            out.push_str(HATE_MODE);
        }

        if let Some(memory) = input.memory.map(str::trim).filter(|m| !m.is_empty()) {
            out.push_str("\n\n## Memory\n");
            out.push_str(memory);
        }

        if !input.notes.is_empty() {
            out.push_str("\n\n## Notes\n");
            for note in input.notes {
                out.push_str(&format!("- {}\n", note.trim()));
            }
        }

        let members: Vec<String> = input
            .members
            .iter()
            .filter(|m| m.sender.id != self.bot.id)
            .map(|m| {
                let admin = input.admins.iter().any(|a| a.user_id == m.sender.id);
                let mut line = format!("- {}", m.sender.label(true));
                if admin {
                    line.push_str(" (admin)");
                }
                line
            })
            .collect();
        if !members.is_empty() {
            out.push_str("\n\n## People in the chat\n");
            out.push_str(&members.join("\n"));
        }

        out.push_str(&format!(
            "\n\nCurrent time: {}",
            input.now.format("%Y-%m-%d %H:%M UTC")
        ));

        out.push_str("\n\n## Output\n");
        out.push_str(if input.structured {
            STRUCTURED_CONTRACT
        } else {
            PLAIN_CONTRACT
        });

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn builder() -> PromptBuilder {
        let mut presets = HashMap::new();
        presets.insert("pirate".to_string(), "You are a pirate.".to_string());
        PromptBuilder::new(
            PersonaConfig {
                default: "You are Slyusha.".to_string(),
                presets,
            },
            SenderRef::new(42, "Слюша", Some("slyusha_bot")),
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    fn member(id: i64, name: &str, username: Option<&str>) -> Member {
        Member {
            sender: SenderRef::new(id, name, username),
            last_used: now(),
        }
    }

    #[test]
    fn minimal_prompt_has_persona_and_contract() {
        let settings = ChatSettings::default();
        let prompt = builder().build(&PromptInput {
            settings: &settings,
            memory: None,
            notes: &[],
            members: &[],
            admins: &[],
            structured: true,
            now: now(),
        });
        assert!(prompt.starts_with("You are Slyusha."));
        assert!(prompt.contains("Слюша @slyusha_bot"));
        assert!(prompt.contains("JSON array"));
        assert!(prompt.contains("2024-05-01 12:30 UTC"));
        assert!(!prompt.contains("## Memory"));
        assert!(!prompt.contains("Hate mode"));
    }

    #[test]
    fn chat_overrides_are_rendered() {
        let settings = ChatSettings {
            persona: Some("pirate".to_string()),
            locale: Some("uk".to_string()),
            hate_mode: true,
            ..Default::default()
        };
        let notes = vec!["Bob hates mondays".to_string()];
        let members = vec![
            member(1, "Alice", Some("alice")),
            member(42, "Слюша", Some("slyusha_bot")),
            member(2, "Bob", None),
        ];
        let admins = vec![ChatAdmin {
            user_id: 1,
            name: "Alice".to_string(),
            username: Some("alice".to_string()),
        }];
        let prompt = builder().build(&PromptInput {
            settings: &settings,
            memory: Some("they run a book club"),
            notes: &notes,
            members: &members,
            admins: &admins,
            structured: false,
            now: now(),
        });

        assert!(prompt.starts_with("You are a pirate."));
        assert!(prompt.contains("code \"uk\""));
        assert!(prompt.contains("Hate mode is on"));
        assert!(prompt.contains("## Memory\nthey run a book club"));
        assert!(prompt.contains("- Bob hates mondays"));
        assert!(prompt.contains("- Alice @alice (admin)"));
        assert!(prompt.contains("- Bob"));
        assert!(!prompt.contains("- Слюша"));
        assert!(prompt.contains("single chat message"));
    }
}
