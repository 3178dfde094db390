pub mod adapter;
pub mod api;
pub mod attach;
pub mod context;
pub mod convert;
pub mod error;
pub mod format;
pub mod handler;

pub use adapter::TelegramAdapter;
pub use api::TelegramApi;
pub use attach::TelegramFetcher;
pub use context::TelegramContext;
pub use error::TelegramError;
