//! The response pipeline, leaf-first: attachment resolution, context
//! assembly, turn parsing and target resolution, reaction canonicalization,
//! orchestration, trigger detection, and the runner that ties them to one
//! inbound message.

pub mod assemble;
pub mod attach;
pub mod context;
pub mod debounce;
pub mod process;
pub mod reaction;
pub mod runner;
pub mod target;
pub mod trigger;
pub mod turn;
pub mod typing;

pub use assemble::{assemble, AssembleOptions};
pub use context::{ApiError, ChatAdmin, ChatApi, FetchError, MediaFetcher, SentMessage, TextFormat};
pub use process::{ResponseOrchestrator, TurnPlan, TurnReport};
pub use runner::{Trigger, TurnOutcome, TurnRunner};
pub use trigger::{Decision, Inbound, TriggerRules};
pub use turn::{parse_turn, TurnEntry, TurnError};
