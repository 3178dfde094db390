//! Structured turn parsing.
//!
//! The model answers with a JSON array whose elements are either
//! `{ "text": .., "reply_to"?: .., "offset"?: n }` or
//! `{ "react": .., "reply_to"?: .., "offset"?: n }`. The array is validated
//! once here and becomes a list of [`TurnEntry`]; nothing downstream looks at
//! field presence again.

use serde::Deserialize;

/// One unit of a structured turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEntry {
    Text {
        text: String,
        reply_to: Option<String>,
        offset: Option<usize>,
    },
    React {
        reaction: String,
        reply_to: Option<String>,
        offset: Option<usize>,
    },
}

impl TurnEntry {
    pub fn text(text: impl Into<String>) -> Self {
        TurnEntry::Text {
            text: text.into(),
            reply_to: None,
            offset: None,
        }
    }

    pub fn react(reaction: impl Into<String>) -> Self {
        TurnEntry::React {
            reaction: reaction.into(),
            reply_to: None,
            offset: None,
        }
    }

    /// Sender hint and offset the model attached to this entry.
    pub fn target(&self) -> (Option<&str>, Option<usize>) {
        match self {
            TurnEntry::Text {
                reply_to, offset, ..
            }
            | TurnEntry::React {
                reply_to, offset, ..
            } => (reply_to.as_deref(), *offset),
        }
    }

    /// `true` if the entry names its own target.
    pub fn has_target(&self) -> bool {
        let (hint, offset) = self.target();
        hint.is_some() || offset.is_some()
    }

    /// Characters of text this entry sends; reactions send none.
    pub fn text_len(&self) -> usize {
        match self {
            TurnEntry::Text { text, .. } => text.trim().chars().count(),
            TurnEntry::React { .. } => 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("turn is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("entry {index}: {reason}")]
    Entry { index: usize, reason: String },
}

#[derive(Deserialize)]
struct WireEntry {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    react: Option<String>,
    #[serde(default)]
    reply_to: Option<String>,
    #[serde(default)]
    offset: Option<i64>,
}

impl WireEntry {
    fn into_entry(self, index: usize) -> Result<TurnEntry, TurnError> {
        let invalid = |reason: &str| TurnError::Entry {
            index,
            reason: reason.to_string(),
        };

        let offset = match self.offset {
            Some(n) if n < 0 => return Err(invalid("offset must be >= 0")),
            Some(n) => Some(usize::try_from(n).map_err(|_| invalid("offset out of range"))?),
            None => None,
        };
        let reply_to = self
            .reply_to
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty());

        match (self.text, self.react) {
            (Some(_), Some(_)) => Err(invalid("has both text and react")),
            (None, None) => Err(invalid("has neither text nor react")),
            (Some(text), None) => {
                if text.trim().is_empty() {
                    return Err(invalid("text is empty"));
                }
                Ok(TurnEntry::Text {
                    text,
                    reply_to,
                    offset,
                })
            }
            (None, Some(reaction)) => {
                if reaction.trim().is_empty() {
                    return Err(invalid("react is empty"));
                }
                Ok(TurnEntry::React {
                    reaction,
                    reply_to,
                    offset,
                })
            }
        }
    }
}

/// Parse the model's raw structured output.
pub fn parse_turn(raw: &str) -> Result<Vec<TurnEntry>, TurnError> {
    let wire: Vec<WireEntry> = serde_json::from_str(strip_code_fence(raw))?;
    wire.into_iter()
        .enumerate()
        .map(|(i, w)| w.into_entry(i))
        .collect()
}

/// Legacy plain-text mode: the whole answer is a single text entry.
pub fn plain_turn(raw: &str) -> Vec<TurnEntry> {
    let text = raw.trim();
    if text.is_empty() {
        Vec::new()
    } else {
        vec![TurnEntry::text(text)]
    }
}

/// Remove a surrounding ```` ```json ```` fence some models add despite the
/// JSON response type.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Response schema for the wire contract, in Gemini's OpenAPI subset.
pub fn response_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "text": {
                    "type": "STRING",
                    "description": "A chat message to send."
                },
                "react": {
                    "type": "STRING",
                    "description": "A single emoji reaction to put on a message."
                },
                "reply_to": {
                    "type": "STRING",
                    "description": "Name or @username of the person whose message this answers."
                },
                "offset": {
                    "type": "INTEGER",
                    "description": "0 is their latest message, 1 the one before, and so on."
                }
            }
        }
    })
}
