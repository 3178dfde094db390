use std::collections::HashMap;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_PERSONA: &str = "You are Slyusha (Слюша), a playful member of a group chat. \
You talk like a regular participant: short, casual messages, no assistant tone.";

/// Top-level config (slyusha.toml + SLYUSHA_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlyushaConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub turn: TurnConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub persona: PersonaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Names that trigger a reply when they appear as a word in a message.
    /// Matched case-insensitively.
    #[serde(default = "default_trigger_names")]
    pub trigger_names: Vec<String>,
    /// When true, every private-chat message triggers a turn.
    #[serde(default = "bool_true")]
    pub dm_allowed: bool,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            trigger_names: default_trigger_names(),
            dm_allowed: true,
        }
    }
}

/// Generation model settings. Only the Gemini `generateContent` API is wired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// `false` switches to the legacy plain-text reply mode.
    #[serde(default = "bool_true")]
    pub structured_output: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_gemini_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            max_output_tokens: default_max_output_tokens(),
            structured_output: true,
        }
    }
}

/// Size budgets for context assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_symbol_limit")]
    pub symbol_limit: usize,
    #[serde(default = "default_messages_limit")]
    pub messages_limit: usize,
    #[serde(default = "bool_true")]
    pub include_usernames: bool,
    #[serde(default = "bool_true")]
    pub include_reactions: bool,
    #[serde(default = "bool_true")]
    pub include_attachments: bool,
    #[serde(default = "default_attachment_byte_limit")]
    pub attachment_byte_limit: u64,
    /// Send short videos as full media instead of their thumbnail.
    #[serde(default)]
    pub video_attachments: bool,
    #[serde(default = "default_video_max_bytes")]
    pub video_max_bytes: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            symbol_limit: default_symbol_limit(),
            messages_limit: default_messages_limit(),
            include_usernames: true,
            include_reactions: true,
            include_attachments: true,
            attachment_byte_limit: default_attachment_byte_limit(),
            video_attachments: false,
            video_max_bytes: default_video_max_bytes(),
        }
    }
}

/// Timing of a single response turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_typing_interval_ms")]
    pub typing_interval_ms: u64,
    #[serde(default = "default_typing_max_ms")]
    pub typing_max_ms: u64,
    #[serde(default = "default_pacing_cap_ms")]
    pub pacing_cap_ms: u64,
    #[serde(default = "default_typing_speed_cpm")]
    pub typing_speed_cpm: u32,
    #[serde(default)]
    pub random_reply_probability: f64,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            typing_interval_ms: default_typing_interval_ms(),
            typing_max_ms: default_typing_max_ms(),
            pacing_cap_ms: default_pacing_cap_ms(),
            typing_speed_cpm: default_typing_speed_cpm(),
            random_reply_probability: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_max_notes")]
    pub max_notes: usize,
    #[serde(default = "default_max_members")]
    pub max_members: usize,
    #[serde(default = "default_save_interval_secs")]
    pub save_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_messages: default_max_messages(),
            max_notes: default_max_notes(),
            max_members: default_max_members(),
            save_interval_secs: default_save_interval_secs(),
        }
    }
}

/// Persona prompts. `presets` are selected per chat by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    #[serde(default = "default_persona")]
    pub default: String,
    #[serde(default)]
    pub presets: HashMap<String, String>,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            default: default_persona(),
            presets: HashMap::new(),
        }
    }
}

impl PersonaConfig {
    /// Persona text for an optional per-chat preset name, falling back to the default.
    pub fn resolve(&self, name: Option<&str>) -> &str {
        name.and_then(|n| self.presets.get(n))
            .map(String::as_str)
            .unwrap_or(&self.default)
    }
}

fn bool_true() -> bool {
    true
}
fn default_trigger_names() -> Vec<String> {
    vec!["слюша".to_string(), "slyusha".to_string()]
}
fn default_gemini_base_url() -> String {
    DEFAULT_GEMINI_BASE_URL.to_string()
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_temperature() -> f32 {
    1.0
}
fn default_top_k() -> u32 {
    40
}
fn default_top_p() -> f32 {
    0.95
}
fn default_max_output_tokens() -> u32 {
    2048
}
fn default_symbol_limit() -> usize {
    1500
}
fn default_messages_limit() -> usize {
    50
}
fn default_attachment_byte_limit() -> u64 {
    5 * 1024 * 1024
}
fn default_video_max_bytes() -> u64 {
    10 * 1024 * 1024
}
fn default_debounce_ms() -> u64 {
    1500
}
fn default_typing_interval_ms() -> u64 {
    4000
}
fn default_typing_max_ms() -> u64 {
    120_000
}
fn default_pacing_cap_ms() -> u64 {
    5000
}
fn default_typing_speed_cpm() -> u32 {
    900
}
fn default_max_messages() -> usize {
    300
}
fn default_max_notes() -> usize {
    50
}
fn default_max_members() -> usize {
    100
}
fn default_save_interval_secs() -> u64 {
    60
}
fn default_persona() -> String {
    DEFAULT_PERSONA.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.slyusha/slyusha.db", home)
}

impl SlyushaConfig {
    /// Load config from a TOML file with SLYUSHA_* env var overrides.
    ///
    /// Nested keys use a double underscore: `SLYUSHA_MODEL__API_KEY`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: SlyushaConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("SLYUSHA_").split("__"))
            .extract()
            .map_err(|e| crate::error::SlyushaError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.slyusha/slyusha.toml", home)
}
