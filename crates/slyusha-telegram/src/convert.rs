//! Conversion from teloxide types into the platform-neutral data model.

use teloxide::types::{FileMeta, Message, PhotoSize, ReactionType, User};
use tracing::debug;

use slyusha_core::types::{
    ChatMessage, FileRef, MediaFields, ReactionKey, ReplySnapshot, SenderRef, StickerMedia,
    ThumbnailOnly, VideoMedia,
};

pub fn sender_ref(user: &User) -> SenderRef {
    SenderRef::new(user.id.0 as i64, user.full_name(), user.username.as_deref())
}

fn file_ref(meta: &FileMeta) -> FileRef {
    FileRef::new(meta.id.clone(), Some(u64::from(meta.size)))
}

fn thumb(photo: Option<&PhotoSize>) -> Option<FileRef> {
    photo.map(|p| file_ref(&p.file))
}

/// Text of a message, falling back to its caption.
pub fn message_text(msg: &Message) -> &str {
    msg.text().or(msg.caption()).unwrap_or("")
}

pub fn media_fields(msg: &Message) -> MediaFields {
    MediaFields {
        photo: msg
            .photo()
            .map(|sizes| sizes.iter().map(|p| file_ref(&p.file)).collect())
            .unwrap_or_default(),
        sticker: msg.sticker().map(|s| StickerMedia {
            file: file_ref(&s.file),
            animated: s.is_animated() || s.is_video(),
            thumbnail: thumb(s.thumbnail.as_ref()),
        }),
        video: msg.video().map(|v| VideoMedia {
            file: file_ref(&v.file),
            mime_type: v.mime_type.as_ref().map(|m| m.to_string()),
            thumbnail: thumb(v.thumbnail.as_ref()),
        }),
        animation: msg.animation().map(|a| ThumbnailOnly {
            thumbnail: thumb(a.thumbnail.as_ref()),
        }),
        video_note: msg.video_note().map(|n| ThumbnailOnly {
            thumbnail: thumb(n.thumbnail.as_ref()),
        }),
    }
}

fn snapshot(msg: &Message, bot_id: i64) -> Option<ReplySnapshot> {
    let user = msg.from.as_ref()?;
    let sender = sender_ref(user);
    Some(ReplySnapshot {
        id: msg.id.0,
        text: message_text(msg).to_string(),
        is_self: sender.id == bot_id,
        sender,
        media: media_fields(msg),
    })
}

/// Build a stored message from an inbound Telegram message. Returns `None`
/// for messages without a user sender.
pub fn to_chat_message(msg: &Message, bot_id: i64) -> Option<ChatMessage> {
    let user = msg.from.as_ref()?;
    let sender = sender_ref(user);
    let is_self = sender.id == bot_id;

    let mut chat_msg = ChatMessage::new(msg.id.0, sender, message_text(msg))
        .with_media(media_fields(msg));
    chat_msg.is_self = is_self;
    chat_msg.date = msg.date;
    chat_msg.raw = serde_json::to_value(msg).unwrap_or_else(|e| {
        debug!(error = %e, "could not serialize raw message");
        serde_json::Value::Null
    });
    if let Some(reply) = msg.reply_to_message().and_then(|r| snapshot(r, bot_id)) {
        chat_msg = chat_msg.with_reply(reply);
    }
    Some(chat_msg)
}

#[allow(unreachable_patterns)]
pub fn reaction_key(reaction: &ReactionType) -> Option<ReactionKey> {
    match reaction {
        ReactionType::Emoji { emoji } => Some(ReactionKey::Emoji(emoji.clone())),
        ReactionType::CustomEmoji { custom_emoji_id } => {
            Some(ReactionKey::Custom(custom_emoji_id.clone()))
        }
        _ => None,
    }
}

pub fn reaction_type(key: &ReactionKey) -> ReactionType {
    match key {
        ReactionKey::Emoji(emoji) => ReactionType::Emoji {
            emoji: emoji.clone(),
        },
        ReactionKey::Custom(id) => ReactionType::CustomEmoji {
            custom_emoji_id: id.clone(),
        },
    }
}

pub fn reaction_keys(reactions: &[ReactionType]) -> Vec<ReactionKey> {
    reactions.iter().filter_map(reaction_key).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BOT_ID: i64 = 4242;

    fn message(extra: serde_json::Value) -> Message {
        let mut base = json!({
            "message_id": 10,
            "date": 1_700_000_000,
            "chat": { "id": -100123, "type": "supergroup", "title": "chat" },
            "from": { "id": 7, "is_bot": false, "first_name": "Маша", "username": "masha" },
        });
        if let (Some(base_obj), Some(extra_obj)) = (base.as_object_mut(), extra.as_object()) {
            for (k, v) in extra_obj {
                base_obj.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(base).unwrap()
    }

    #[test]
    fn text_message_converts() {
        let msg = message(json!({ "text": "Слюша привет" }));
        let converted = to_chat_message(&msg, BOT_ID).unwrap();
        assert_eq!(converted.id, 10);
        assert_eq!(converted.text, "Слюша привет");
        assert_eq!(converted.sender.id, 7);
        assert_eq!(converted.sender.username.as_deref(), Some("masha"));
        assert!(!converted.is_self);
        assert!(converted.reply_to.is_none());
        assert!(converted.media.is_empty());
        assert_eq!(converted.raw["message_id"], 10);
    }

    #[test]
    fn reply_to_bot_is_marked_self() {
        let msg = message(json!({
            "text": "ты о чём?",
            "reply_to_message": {
                "message_id": 9,
                "date": 1_699_999_990,
                "chat": { "id": -100123, "type": "supergroup", "title": "chat" },
                "from": { "id": BOT_ID, "is_bot": true, "first_name": "Слюша" },
                "text": "мяу"
            }
        }));
        let converted = to_chat_message(&msg, BOT_ID).unwrap();
        let reply = converted.reply_to.unwrap();
        assert_eq!(reply.id, 9);
        assert!(reply.is_self);
        assert_eq!(reply.text, "мяу");
    }

    #[test]
    fn photo_caption_and_sizes() {
        let msg = message(json!({
            "caption": "look",
            "photo": [
                { "file_id": "small", "file_unique_id": "s", "width": 90, "height": 90, "file_size": 1000 },
                { "file_id": "big", "file_unique_id": "b", "width": 800, "height": 800, "file_size": 90000 }
            ]
        }));
        let converted = to_chat_message(&msg, BOT_ID).unwrap();
        assert_eq!(converted.text, "look");
        let ids: Vec<_> = converted.media.photo.iter().map(|p| p.file_id.as_str()).collect();
        assert_eq!(ids, vec!["small", "big"]);
        assert_eq!(converted.media.photo[1].size, Some(90000));
    }

    #[test]
    fn reaction_types_map_to_keys() {
        let emoji = ReactionType::Emoji {
            emoji: "👍".to_string(),
        };
        let key = reaction_key(&emoji).unwrap();
        assert_eq!(key, ReactionKey::Emoji("👍".to_string()));
        assert_eq!(reaction_type(&key), emoji);

        let custom = ReactionKey::Custom("5368324170671202286".to_string());
        assert_eq!(reaction_key(&reaction_type(&custom)), Some(custom));
    }
}
