use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rusqlite::Connection;
use tracing::{debug, info, instrument, warn};

use slyusha_core::config::StoreConfig;
use slyusha_core::types::{
    ChatId, ChatMessage, ChatSettings, ChatState, Member, MessageId, ReactionKey, SenderRef,
};

use crate::error::StoreError;

/// Capacity caps applied on every write and on load.
#[derive(Debug, Clone, Copy)]
pub struct StoreLimits {
    pub max_messages: usize,
    pub max_notes: usize,
    pub max_members: usize,
}

impl From<&StoreConfig> for StoreLimits {
    fn from(cfg: &StoreConfig) -> Self {
        Self {
            max_messages: cfg.max_messages,
            max_notes: cfg.max_notes,
            max_members: cfg.max_members,
        }
    }
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

/// Per-chat message history, reactions, notes and settings.
///
/// Every method takes the shard lock for one chat only and never holds it
/// across an await point. Readers get clones, never references into the map.
pub struct MessageStore {
    chats: DashMap<ChatId, ChatState>,
    limits: StoreLimits,
}

impl MessageStore {
    pub fn new(limits: StoreLimits) -> Self {
        Self {
            chats: DashMap::new(),
            limits,
        }
    }

    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    /// Run `f` against the chat's state, creating an empty state on first use.
    fn with_chat<R>(&self, chat_id: ChatId, f: impl FnOnce(&mut ChatState) -> R) -> R {
        let mut entry = self.chats.entry(chat_id).or_default();
        f(entry.value_mut())
    }

    /// Create the chat's state if it does not exist yet.
    pub fn ensure(&self, chat_id: ChatId) {
        self.chats.entry(chat_id).or_default();
    }

    pub fn chat_ids(&self) -> Vec<ChatId> {
        self.chats.iter().map(|e| *e.key()).collect()
    }

    /// Append a message at the newest end, trimming the oldest messages past
    /// the cap. Returns `false` if a message with the same id already exists.
    pub fn append(&self, chat_id: ChatId, msg: ChatMessage) -> bool {
        let max = self.limits.max_messages;
        self.with_chat(chat_id, |state| {
            if state.message(msg.id).is_some() {
                debug!(chat_id, message_id = msg.id, "duplicate message id ignored");
                return false;
            }
            state.messages.push(msg);
            if state.messages.len() > max {
                let excess = state.messages.len() - max;
                state.messages.drain(..excess);
            }
            true
        })
    }

    /// Read-only copy of the newest `limit` messages, oldest first.
    pub fn snapshot(&self, chat_id: ChatId, limit: usize) -> Vec<ChatMessage> {
        self.chats
            .get(&chat_id)
            .map(|state| {
                let start = state.messages.len().saturating_sub(limit);
                state.messages[start..].to_vec()
            })
            .unwrap_or_default()
    }

    pub fn message(&self, chat_id: ChatId, message_id: MessageId) -> Option<ChatMessage> {
        self.chats
            .get(&chat_id)
            .and_then(|state| state.message(message_id).cloned())
    }

    pub fn message_count(&self, chat_id: ChatId) -> usize {
        self.chats
            .get(&chat_id)
            .map(|state| state.messages.len())
            .unwrap_or(0)
    }

    /// Id of the newest stored message sent by `sender_id`.
    pub fn latest_from_sender(&self, chat_id: ChatId, sender_id: i64) -> Option<MessageId> {
        self.chats.get(&chat_id).and_then(|state| {
            state
                .messages
                .iter()
                .rev()
                .find(|m| m.sender.id == sender_id)
                .map(|m| m.id)
        })
    }

    /// Record one reaction call on a stored message. Returns `false` if the
    /// message is not in the history.
    pub fn add_reaction(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        key: ReactionKey,
        contributor: i64,
    ) -> bool {
        self.with_chat(chat_id, |state| match state.message_mut(message_id) {
            Some(msg) => {
                msg.add_reaction(key, contributor);
                true
            }
            None => false,
        })
    }

    pub fn remove_reaction(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        key: &ReactionKey,
        contributor: i64,
    ) -> bool {
        self.with_chat(chat_id, |state| {
            state
                .message_mut(message_id)
                .is_some_and(|msg| msg.remove_reaction(key, contributor))
        })
    }

    /// Apply a platform reaction diff: keys only in `old` are removed, keys
    /// only in `new` are added.
    pub fn apply_reaction_update(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        contributor: i64,
        old: &[ReactionKey],
        new: &[ReactionKey],
    ) {
        for key in old.iter().filter(|k| !new.contains(k)) {
            self.remove_reaction(chat_id, message_id, key, contributor);
        }
        for key in new.iter().filter(|k| !old.contains(k)) {
            if !self.add_reaction(chat_id, message_id, key.clone(), contributor) {
                debug!(chat_id, message_id, "reaction on unknown message ignored");
            }
        }
    }

    /// Mark a sender as active now. Members are kept newest-first.
    pub fn touch_member(&self, chat_id: ChatId, sender: &SenderRef, at: DateTime<Utc>) {
        let max = self.limits.max_members;
        self.with_chat(chat_id, |state| {
            state.members.retain(|m| m.sender.id != sender.id);
            state.members.insert(
                0,
                Member {
                    sender: sender.clone(),
                    last_used: at,
                },
            );
            state.members.truncate(max);
        });
    }

    pub fn members(&self, chat_id: ChatId) -> Vec<Member> {
        self.chats
            .get(&chat_id)
            .map(|state| state.members.clone())
            .unwrap_or_default()
    }

    pub fn add_note(&self, chat_id: ChatId, note: impl Into<String>) {
        let max = self.limits.max_notes;
        let note = note.into();
        self.with_chat(chat_id, |state| {
            state.notes.push(note);
            if state.notes.len() > max {
                let excess = state.notes.len() - max;
                state.notes.drain(..excess);
            }
        });
    }

    pub fn notes(&self, chat_id: ChatId) -> Vec<String> {
        self.chats
            .get(&chat_id)
            .map(|state| state.notes.clone())
            .unwrap_or_default()
    }

    pub fn set_memory(&self, chat_id: ChatId, memory: Option<String>) {
        self.with_chat(chat_id, |state| state.memory = memory);
    }

    pub fn memory(&self, chat_id: ChatId) -> Option<String> {
        self.chats.get(&chat_id).and_then(|state| state.memory.clone())
    }

    /// Drop the whole message history of a chat (the reset command).
    pub fn clear_history(&self, chat_id: ChatId) -> usize {
        self.with_chat(chat_id, |state| {
            let removed = state.messages.len();
            state.messages.clear();
            removed
        })
    }

    pub fn settings(&self, chat_id: ChatId) -> ChatSettings {
        self.chats
            .get(&chat_id)
            .map(|state| state.settings.clone())
            .unwrap_or_default()
    }

    pub fn update_settings(&self, chat_id: ChatId, f: impl FnOnce(&mut ChatSettings)) {
        self.with_chat(chat_id, |state| f(&mut state.settings));
    }

    /// Load every stored chat. A row that fails to parse starts empty.
    #[instrument(skip(conn, limits))]
    pub fn load(conn: &Connection, limits: StoreLimits) -> Result<Self, StoreError> {
        let store = Self::new(limits);
        let mut stmt = conn.prepare("SELECT chat_id, doc FROM chat_states")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (chat_id, doc) = row?;
            let mut state = match serde_json::from_str::<ChatState>(&doc) {
                Ok(s) => s,
                Err(e) => {
                    warn!(chat_id, error = %e, "corrupt chat state, starting empty");
                    ChatState::default()
                }
            };
            apply_limits(&mut state, &limits);
            store.chats.insert(chat_id, state);
        }

        info!(chats = store.chats.len(), "chat states loaded");
        Ok(store)
    }

    /// Write every chat state. Returns the number of rows written.
    #[instrument(skip(self, conn))]
    pub fn save(&self, conn: &Connection) -> Result<usize, StoreError> {
        let now = Utc::now().to_rfc3339();
        let docs: Vec<(ChatId, String)> = self
            .chats
            .iter()
            .map(|e| serde_json::to_string(e.value()).map(|doc| (*e.key(), doc)))
            .collect::<Result<_, _>>()?;

        let tx = conn.unchecked_transaction()?;
        for (chat_id, doc) in &docs {
            tx.execute(
                "INSERT INTO chat_states (chat_id, doc, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(chat_id) DO UPDATE SET doc = excluded.doc,
                 updated_at = excluded.updated_at",
                rusqlite::params![chat_id, doc, now],
            )?;
        }
        tx.commit()?;
        debug!(chats = docs.len(), "chat states saved");
        Ok(docs.len())
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new(StoreLimits::default())
    }
}

fn apply_limits(state: &mut ChatState, limits: &StoreLimits) {
    if state.messages.len() > limits.max_messages {
        let excess = state.messages.len() - limits.max_messages;
        state.messages.drain(..excess);
    }
    if state.notes.len() > limits.max_notes {
        let excess = state.notes.len() - limits.max_notes;
        state.notes.drain(..excess);
    }
    state.members.truncate(limits.max_members);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn sender(id: i64, name: &str) -> SenderRef {
        SenderRef::new(id, name, None)
    }

    fn small_store() -> MessageStore {
        MessageStore::new(StoreLimits {
            max_messages: 3,
            max_notes: 2,
            max_members: 2,
        })
    }

    #[test]
    fn append_trims_oldest_end() {
        let store = small_store();
        for id in 1..=5 {
            assert!(store.append(1, ChatMessage::new(id, sender(1, "A"), "x")));
        }
        let ids: Vec<_> = store.snapshot(1, 10).iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[test]
    fn append_rejects_duplicate_id() {
        let store = small_store();
        assert!(store.append(1, ChatMessage::new(1, sender(1, "A"), "first")));
        assert!(!store.append(1, ChatMessage::new(1, sender(1, "A"), "second")));
        assert_eq!(store.snapshot(1, 10)[0].text, "first");
    }

    #[test]
    fn snapshot_does_not_shrink_store() {
        let store = MessageStore::default();
        for id in 1..=10 {
            store.append(1, ChatMessage::new(id, sender(1, "A"), "x"));
        }
        let view = store.snapshot(1, 4);
        assert_eq!(view.len(), 4);
        assert_eq!(view[0].id, 7);
        assert_eq!(store.message_count(1), 10);
    }

    #[test]
    fn latest_from_sender_tracks_newest() {
        let store = MessageStore::default();
        store.append(1, ChatMessage::new(1, sender(1, "A"), "a1"));
        store.append(1, ChatMessage::new(2, sender(2, "B"), "b1"));
        store.append(1, ChatMessage::new(3, sender(1, "A"), "a2"));
        assert_eq!(store.latest_from_sender(1, 1), Some(3));
        assert_eq!(store.latest_from_sender(1, 2), Some(2));
        assert_eq!(store.latest_from_sender(1, 9), None);
    }

    #[test]
    fn reaction_update_diffs_old_and_new() {
        let store = MessageStore::default();
        store.append(1, ChatMessage::new(1, sender(1, "A"), "x"));
        let thumbs = ReactionKey::Emoji("👍".to_string());
        let fire = ReactionKey::Emoji("🔥".to_string());

        store.apply_reaction_update(1, 1, 42, &[], &[thumbs.clone()]);
        store.apply_reaction_update(1, 1, 42, &[thumbs.clone()], &[fire.clone()]);

        let msg = store.message(1, 1).unwrap();
        assert!(!msg.reactions.contains_key(&thumbs.encode()));
        assert_eq!(msg.reactions[&fire.encode()].count, 1);
    }

    #[test]
    fn reaction_on_missing_message_is_reported() {
        let store = MessageStore::default();
        assert!(!store.add_reaction(1, 99, ReactionKey::Emoji("👍".into()), 1));
    }

    #[test]
    fn members_are_newest_first_and_capped() {
        let store = small_store();
        let now = Utc::now();
        store.touch_member(1, &sender(1, "A"), now);
        store.touch_member(1, &sender(2, "B"), now);
        store.touch_member(1, &sender(3, "C"), now);
        store.touch_member(1, &sender(2, "B"), now);
        let names: Vec<_> = store
            .members(1)
            .into_iter()
            .map(|m| m.sender.name)
            .collect();
        assert_eq!(names, vec!["B", "C"]);
    }

    #[test]
    fn notes_are_capped() {
        let store = small_store();
        store.add_note(1, "one");
        store.add_note(1, "two");
        store.add_note(1, "three");
        assert_eq!(store.notes(1), vec!["two", "three"]);
    }

    #[test]
    fn clear_history_keeps_settings() {
        let store = MessageStore::default();
        store.append(1, ChatMessage::new(1, sender(1, "A"), "x"));
        store.update_settings(1, |s| s.hate_mode = true);
        assert_eq!(store.clear_history(1), 1);
        assert_eq!(store.message_count(1), 0);
        assert!(store.settings(1).hate_mode);
    }

    #[test]
    fn save_and_load_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();

        let store = MessageStore::default();
        store.append(-100, ChatMessage::new(1, sender(1, "A"), "hello"));
        store.set_memory(-100, Some("they like tea".to_string()));
        assert_eq!(store.save(&conn).unwrap(), 1);
        // Saving twice upserts.
        assert_eq!(store.save(&conn).unwrap(), 1);

        let loaded = MessageStore::load(&conn, StoreLimits::default()).unwrap();
        assert_eq!(loaded.snapshot(-100, 10)[0].text, "hello");
        assert_eq!(loaded.memory(-100).as_deref(), Some("they like tea"));
    }

    #[test]
    fn corrupt_row_loads_as_empty_state() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        conn.execute(
            "INSERT INTO chat_states (chat_id, doc, updated_at) VALUES (5, '{not json', 'x')",
            [],
        )
        .unwrap();

        let loaded = MessageStore::load(&conn, StoreLimits::default()).unwrap();
        assert_eq!(loaded.chat_ids(), vec![5]);
        assert_eq!(loaded.message_count(5), 0);
    }

    #[test]
    fn load_applies_limits() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        let big = MessageStore::default();
        for id in 1..=6 {
            big.append(1, ChatMessage::new(id, sender(1, "A"), "x"));
        }
        big.save(&conn).unwrap();

        let loaded = MessageStore::load(&conn, small_store().limits()).unwrap();
        let ids: Vec<_> = loaded.snapshot(1, 10).iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![4, 5, 6]);
    }
}
