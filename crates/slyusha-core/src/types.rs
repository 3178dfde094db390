use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platform chat identifier (Telegram chat ids are signed 64-bit).
pub type ChatId = i64;

/// Message identifier, unique within one chat.
pub type MessageId = i32;

/// Who sent a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderRef {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub username: Option<String>,
}

impl SenderRef {
    pub fn new(id: i64, name: impl Into<String>, username: Option<&str>) -> Self {
        Self {
            id,
            name: name.into(),
            username: username.map(str::to_string),
        }
    }

    /// `true` if `hint` names this sender. A leading `@` is ignored and the
    /// comparison is case-insensitive against both the username and the name.
    pub fn matches_hint(&self, hint: &str) -> bool {
        let hint = hint.trim();
        let hint = hint.strip_prefix('@').unwrap_or(hint);
        if hint.is_empty() {
            return false;
        }
        let hint = hint.to_lowercase();
        self.username
            .as_deref()
            .is_some_and(|u| u.to_lowercase() == hint)
            || self.name.to_lowercase() == hint
    }

    /// Display label: `Name` or `Name @username`.
    pub fn label(&self, with_username: bool) -> String {
        match (&self.username, with_username) {
            (Some(u), true) => format!("{} @{}", self.name, u),
            _ => self.name.clone(),
        }
    }
}

/// A file the platform can hand back on request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub file_id: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl FileRef {
    pub fn new(file_id: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            file_id: file_id.into(),
            size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickerMedia {
    pub file: FileRef,
    /// Animated (TGS) or video (WEBM) sticker.
    pub animated: bool,
    #[serde(default)]
    pub thumbnail: Option<FileRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMedia {
    pub file: FileRef,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<FileRef>,
}

/// Media kinds that are only ever sent to the model as a thumbnail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailOnly {
    #[serde(default)]
    pub thumbnail: Option<FileRef>,
}

/// Media fields of one message, in platform-neutral form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFields {
    /// Photo sizes, smallest first.
    #[serde(default)]
    pub photo: Vec<FileRef>,
    #[serde(default)]
    pub sticker: Option<StickerMedia>,
    #[serde(default)]
    pub video: Option<VideoMedia>,
    #[serde(default)]
    pub animation: Option<ThumbnailOnly>,
    #[serde(default)]
    pub video_note: Option<ThumbnailOnly>,
}

impl MediaFields {
    pub fn is_empty(&self) -> bool {
        self.photo.is_empty()
            && self.sticker.is_none()
            && self.video.is_none()
            && self.animation.is_none()
            && self.video_note.is_none()
    }
}

/// Frozen copy of the message being replied to, captured at receive time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplySnapshot {
    pub id: MessageId,
    pub text: String,
    pub sender: SenderRef,
    pub is_self: bool,
    #[serde(default)]
    pub media: MediaFields,
}

/// Reaction identity. `encode` is the only key format used for storage
/// and comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ReactionKey {
    Emoji(String),
    Custom(String),
}

impl ReactionKey {
    pub fn encode(&self) -> String {
        match self {
            ReactionKey::Emoji(v) => format!("emoji:{v}"),
            ReactionKey::Custom(v) => format!("custom:{v}"),
        }
    }

    /// Short form used in context summaries.
    pub fn glyph(&self) -> &str {
        match self {
            ReactionKey::Emoji(v) => v,
            ReactionKey::Custom(_) => "🧩",
        }
    }
}

impl fmt::Display for ReactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionRecord {
    pub key: ReactionKey,
    /// Distinct contributors in first-reaction order.
    pub contributors: Vec<i64>,
    /// Call counter, not set cardinality: may exceed `contributors.len()`.
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub text: String,
    pub sender: SenderRef,
    #[serde(default)]
    pub reply_to: Option<ReplySnapshot>,
    pub is_self: bool,
    /// Keyed by `ReactionKey::encode`.
    #[serde(default)]
    pub reactions: BTreeMap<String, ReactionRecord>,
    #[serde(default)]
    pub media: MediaFields,
    pub date: DateTime<Utc>,
    /// Untouched platform payload.
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl ChatMessage {
    pub fn new(id: MessageId, sender: SenderRef, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            sender,
            reply_to: None,
            is_self: false,
            reactions: BTreeMap::new(),
            media: MediaFields::default(),
            date: Utc::now(),
            raw: serde_json::Value::Null,
        }
    }

    pub fn with_reply(mut self, reply: ReplySnapshot) -> Self {
        self.reply_to = Some(reply);
        self
    }

    pub fn authored_by_self(mut self) -> Self {
        self.is_self = true;
        self
    }

    pub fn with_media(mut self, media: MediaFields) -> Self {
        self.media = media;
        self
    }

    /// Snapshot of this message for use as another message's reply target.
    pub fn snapshot(&self) -> ReplySnapshot {
        ReplySnapshot {
            id: self.id,
            text: self.text.clone(),
            sender: self.sender.clone(),
            is_self: self.is_self,
            media: self.media.clone(),
        }
    }

    /// Record one reaction call. The count always grows by one; the
    /// contributor is listed once.
    pub fn add_reaction(&mut self, key: ReactionKey, contributor: i64) {
        let record = self
            .reactions
            .entry(key.encode())
            .or_insert_with(|| ReactionRecord {
                key,
                contributors: Vec::new(),
                count: 0,
            });
        record.count += 1;
        if !record.contributors.contains(&contributor) {
            record.contributors.push(contributor);
        }
    }

    /// Undo one reaction call. Returns `false` if no such reaction exists.
    pub fn remove_reaction(&mut self, key: &ReactionKey, contributor: i64) -> bool {
        let encoded = key.encode();
        let Some(record) = self.reactions.get_mut(&encoded) else {
            return false;
        };
        record.count -= 1;
        record.contributors.retain(|c| *c != contributor);
        if record.count <= 0 && record.contributors.is_empty() {
            self.reactions.remove(&encoded);
        }
        true
    }

    /// Compact `glyph×count` summary, `None` when there are no reactions.
    pub fn reaction_summary(&self) -> Option<String> {
        let parts: Vec<String> = self
            .reactions
            .values()
            .filter(|r| r.count > 0)
            .map(|r| format!("{}×{}", r.key.glyph(), r.count))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Per-chat setting overrides. `None` means "use the config value".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatSettings {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub context_length: Option<usize>,
    #[serde(default)]
    pub random_reply_probability: Option<f64>,
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default)]
    pub hate_mode: bool,
    #[serde(default)]
    pub locale: Option<String>,
    /// Chat opted out of bot replies.
    #[serde(default)]
    pub opted_out: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub sender: SenderRef,
    pub last_used: DateTime<Utc>,
}

/// Durable per-chat record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatState {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub settings: ChatSettings,
}

impl ChatState {
    pub fn message(&self, id: MessageId) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.id == id)
    }

    pub fn message_mut(&mut self, id: MessageId) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().rev().find(|m| m.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> SenderRef {
        SenderRef::new(1, "Alice", Some("alice_w"))
    }

    #[test]
    fn reaction_count_is_a_call_counter() {
        let mut msg = ChatMessage::new(10, alice(), "hi");
        let key = ReactionKey::Emoji("👍".to_string());
        for expected in 1..=4 {
            msg.add_reaction(key.clone(), 7);
            let rec = &msg.reactions[&key.encode()];
            assert_eq!(rec.count, expected);
            assert_eq!(rec.contributors, vec![7]);
        }
    }

    #[test]
    fn reaction_record_deleted_when_drained() {
        let mut msg = ChatMessage::new(10, alice(), "hi");
        let key = ReactionKey::Emoji("🔥".to_string());
        msg.add_reaction(key.clone(), 7);
        assert!(msg.remove_reaction(&key, 7));
        assert!(msg.reactions.is_empty());
        assert!(!msg.remove_reaction(&key, 7));
    }

    #[test]
    fn reaction_record_survives_while_count_positive() {
        let mut msg = ChatMessage::new(10, alice(), "hi");
        let key = ReactionKey::Emoji("🔥".to_string());
        msg.add_reaction(key.clone(), 7);
        msg.add_reaction(key.clone(), 7);
        msg.remove_reaction(&key, 7);
        let rec = &msg.reactions[&key.encode()];
        assert_eq!(rec.count, 1);
        assert!(rec.contributors.is_empty());
    }

    #[test]
    fn emoji_and_custom_keys_never_collide() {
        let emoji = ReactionKey::Emoji("123".to_string());
        let custom = ReactionKey::Custom("123".to_string());
        assert_ne!(emoji.encode(), custom.encode());
    }

    #[test]
    fn reaction_summary_format() {
        let mut msg = ChatMessage::new(10, alice(), "hi");
        msg.add_reaction(ReactionKey::Emoji("👍".to_string()), 1);
        msg.add_reaction(ReactionKey::Emoji("👍".to_string()), 2);
        assert_eq!(msg.reaction_summary().as_deref(), Some("👍×2"));
        assert_eq!(ChatMessage::new(11, alice(), "x").reaction_summary(), None);
    }

    #[test]
    fn hint_matching_ignores_at_and_case() {
        let a = alice();
        assert!(a.matches_hint("@ALICE_W"));
        assert!(a.matches_hint("alice"));
        assert!(!a.matches_hint("bob"));
        assert!(!a.matches_hint("@"));
    }

    #[test]
    fn chat_state_round_trips_through_json() {
        let mut state = ChatState::default();
        let mut msg = ChatMessage::new(1, alice(), "hello");
        msg.add_reaction(ReactionKey::Custom("5368".to_string()), 3);
        state.messages.push(msg);
        state.notes.push("likes cats".to_string());
        let json = serde_json::to_string(&state).unwrap();
        let back: ChatState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
