//! Turn runner: everything between "this message wants an answer" and the
//! answer being in the chat.
//!
//! debounce → drop check → typing heartbeat → assemble → generate → parse →
//! orchestrate → stop heartbeat.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use slyusha_core::config::{ContextConfig, ModelConfig, SlyushaConfig, TurnConfig};
use slyusha_core::types::{ChatId, ChatSettings, MessageId, SenderRef};
use slyusha_store::MessageStore;

use super::assemble::{assemble, AssembleOptions};
use super::context::{ChatApi, MediaFetcher};
use super::debounce::Debouncer;
use super::process::{PacingConfig, ResponseOrchestrator, TurnPlan, TurnReport};
use super::turn::{parse_turn, plain_turn, response_schema};
use super::typing::Heartbeat;
use crate::prompt::{PromptBuilder, PromptInput};
use crate::provider::{GenerateRequest, GenerationProvider, ProviderError, SamplingParams};

/// An inbound message that asked for a turn.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub sender: SenderRef,
    /// Random unprompted reply.
    pub unsolicited: bool,
    /// Who the answer should thread to in plain-text mode.
    pub reply_hint: Option<String>,
}

#[derive(Debug)]
pub enum TurnOutcome {
    /// A newer message from the same sender arrived during the debounce.
    Superseded,
    Completed(TurnReport),
    Blocked { reason: Option<String> },
    Failed(String),
}

pub struct TurnRunner {
    store: Arc<MessageStore>,
    api: Arc<dyn ChatApi>,
    fetcher: Arc<dyn MediaFetcher>,
    provider: Arc<dyn GenerationProvider>,
    prompt: PromptBuilder,
    orchestrator: ResponseOrchestrator,
    debouncer: Debouncer,
    model: ModelConfig,
    context: ContextConfig,
    turn: TurnConfig,
}

impl TurnRunner {
    pub fn new(
        config: &SlyushaConfig,
        bot: SenderRef,
        store: Arc<MessageStore>,
        api: Arc<dyn ChatApi>,
        fetcher: Arc<dyn MediaFetcher>,
        provider: Arc<dyn GenerationProvider>,
    ) -> Self {
        let orchestrator = ResponseOrchestrator::new(
            api.clone(),
            store.clone(),
            bot.clone(),
            PacingConfig::from(&config.turn),
        );
        let debouncer = Debouncer::new(
            store.clone(),
            Duration::from_millis(config.turn.debounce_ms),
        );
        Self {
            store,
            api,
            fetcher,
            provider,
            prompt: PromptBuilder::new(config.persona.clone(), bot),
            orchestrator,
            debouncer,
            model: config.model.clone(),
            context: config.context.clone(),
            turn: config.turn.clone(),
        }
    }

    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    pub fn bot(&self) -> &SenderRef {
        self.orchestrator.bot()
    }

    /// Debounce, then run the turn unless a newer message from the same
    /// sender superseded it.
    pub fn schedule(self: &Arc<Self>, trigger: Trigger) -> JoinHandle<TurnOutcome> {
        let runner = Arc::clone(self);
        tokio::spawn(async move {
            if !runner
                .debouncer
                .settle(trigger.chat_id, trigger.sender.id, trigger.message_id)
                .await
            {
                return TurnOutcome::Superseded;
            }
            runner.run_turn(&trigger).await
        })
    }

    #[instrument(skip(self, trigger), fields(chat_id = trigger.chat_id, message_id = trigger.message_id))]
    pub async fn run_turn(&self, trigger: &Trigger) -> TurnOutcome {
        let heartbeat = Heartbeat::for_chat(
            self.api.clone(),
            trigger.chat_id,
            Duration::from_millis(self.turn.typing_interval_ms),
            Duration::from_millis(self.turn.typing_max_ms),
        );
        let settings = self.store.settings(trigger.chat_id);
        let outcome = self.respond(trigger, &settings).await;
        heartbeat.stop();

        match &outcome {
            TurnOutcome::Completed(report) => info!(
                sent = report.sent.len(),
                reactions = report.reactions_applied,
                aborted = report.aborted,
                "turn completed"
            ),
            TurnOutcome::Blocked { reason } => {
                warn!(reason = reason.as_deref().unwrap_or("-"), "generation blocked")
            }
            TurnOutcome::Failed(e) => warn!(error = %e, "turn failed"),
            TurnOutcome::Superseded => {}
        }
        outcome
    }

    async fn respond(&self, trigger: &Trigger, settings: &ChatSettings) -> TurnOutcome {
        let chat_id = trigger.chat_id;
        let structured = self.model.structured_output;

        let mut opts = AssembleOptions::from(&self.context);
        if let Some(len) = settings.context_length {
            opts.messages_limit = len;
        }
        let history = self.store.snapshot(chat_id, opts.messages_limit);
        let contents = assemble(&history, &opts, Some(self.fetcher.as_ref())).await;

        // Negative ids are groups and channels.
        let admins = if chat_id < 0 {
            self.api.list_admins(chat_id).await.unwrap_or_else(|e| {
                warn!(chat_id, error = %e, "could not list chat admins");
                Vec::new()
            })
        } else {
            Vec::new()
        };

        let memory = self.store.memory(chat_id);
        let notes = self.store.notes(chat_id);
        let members = self.store.members(chat_id);
        let system = self.prompt.build(&PromptInput {
            settings,
            memory: memory.as_deref(),
            notes: &notes,
            members: &members,
            admins: &admins,
            structured,
            now: Utc::now(),
        });

        let request = GenerateRequest {
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| self.model.model.clone()),
            system,
            contents,
            response_schema: structured.then(response_schema),
            sampling: SamplingParams::from(&self.model),
        };

        let response = match self.provider.generate(&request).await {
            Ok(r) => r,
            Err(ProviderError::Blocked { reason }) => {
                if !trigger.unsolicited {
                    self.orchestrator
                        .send_blocked(chat_id, reason.as_deref())
                        .await;
                }
                return TurnOutcome::Blocked { reason };
            }
            Err(e) => return self.fail(trigger, e.to_string()).await,
        };

        let entries = if structured {
            match parse_turn(&response.text) {
                Ok(entries) => entries,
                Err(e) => return self.fail(trigger, e.to_string()).await,
            }
        } else {
            plain_turn(&response.text)
        };

        let report = self
            .orchestrator
            .execute(TurnPlan {
                chat_id,
                entries,
                history,
                carried_reply_hint: if structured {
                    None
                } else {
                    trigger.reply_hint.clone()
                },
                unsolicited: trigger.unsolicited,
            })
            .await;
        TurnOutcome::Completed(report)
    }

    async fn fail(&self, trigger: &Trigger, error: String) -> TurnOutcome {
        if !trigger.unsolicited {
            self.orchestrator.send_fallback(trigger.chat_id).await;
        }
        TurnOutcome::Failed(error)
    }
}
