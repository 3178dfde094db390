pub mod gemini;
pub mod pipeline;
pub mod prompt;
pub mod provider;

pub use provider::{GenerationProvider, ProviderError};
