// src/core/orchestrator.rs — Session loop: budget, context, dispatch, record, normalize

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::context::{build_context, ContextWindow};
use super::dispatcher::ModelDispatcher;
use super::ledger::{UsageLedger, UsageRecord};
use super::normalize::{markup_to_plain, TextNormalizer};
use super::pool::WorkerPool;
use super::transcript::ChatLog;
use super::types::{CostInfo, SessionPhase, SessionState, StopReason, TurnOutcome, TurnReply};
use crate::infra::config::Config;
use crate::infra::errors::ParleyError;
use crate::provider::TokenUsage;

/// Supplies user prompts to the session loop.
#[async_trait]
pub trait PromptSource: Send {
    /// The next prompt, or `None` once the source is exhausted.
    async fn next_prompt(&mut self) -> Option<String>;
}

#[async_trait]
impl PromptSource for VecDeque<String> {
    async fn next_prompt(&mut self) -> Option<String> {
        self.pop_front()
    }
}

/// Per-session limits, taken from config.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub budget_cap: f64,
    pub max_exchanges: usize,
    pub max_chars: usize,
    pub timeout: Duration,
    pub pool_size: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            budget_cap: 5.0,
            max_exchanges: 5,
            max_chars: 10_000,
            timeout: Duration::from_secs(30),
            pool_size: 2,
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            budget_cap: config.budget.max_yearly_cost,
            max_exchanges: config.context.max_exchanges,
            max_chars: config.context.max_chars,
            timeout: Duration::from_secs(config.request.timeout_secs),
            pool_size: config.request.pool_size,
        }
    }
}

pub struct SessionOrchestrator {
    state: SessionState,
    dispatcher: Arc<ModelDispatcher>,
    ledger: UsageLedger,
    chat_log: ChatLog,
    normalizer: TextNormalizer,
    pool: WorkerPool,
    settings: SessionSettings,
    phase: SessionPhase,
}

impl SessionOrchestrator {
    pub fn new(
        dispatcher: ModelDispatcher,
        ledger: UsageLedger,
        chat_log: ChatLog,
        normalizer: TextNormalizer,
        settings: SessionSettings,
    ) -> Self {
        let usage = if dispatcher.is_local() {
            None
        } else {
            Some(ledger.load())
        };
        let state = SessionState::new(dispatcher.config().clone(), usage);
        let pool = WorkerPool::new(settings.pool_size, state.shutdown_token());
        Self {
            state,
            dispatcher: Arc::new(dispatcher),
            ledger,
            chat_log,
            normalizer,
            pool,
            settings,
            phase: SessionPhase::Idle,
        }
    }

    /// Tie the session to an externally owned shutdown token (e.g. a signal handler's).
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.pool = WorkerPool::new(self.settings.pool_size, token.clone());
        self.state = SessionState::new(self.state.selected_model.clone(), self.state.usage)
            .with_shutdown(token);
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn in_flight(&self) -> usize {
        self.pool.in_flight()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown_token()
    }

    /// True when the next remote turn would be refused.
    pub fn budget_exhausted(&self) -> bool {
        self.state
            .usage
            .is_some_and(|u| u.over_budget(self.settings.budget_cap))
    }

    /// The user's prompt wrapped for echoing, without markup conversion.
    pub fn prompt_echo(&self, prompt: &str) -> String {
        self.normalizer.wrap(prompt)
    }

    fn stopped(&mut self, reason: StopReason, error: Option<ParleyError>) -> TurnOutcome {
        self.phase = SessionPhase::Stopped;
        TurnOutcome::Stopped { reason, error }
    }

    fn context_window(&self, diagnostics: &mut Vec<String>) -> ContextWindow {
        match self.chat_log.tail(self.settings.max_chars) {
            Ok(tail) => build_context(&tail, self.settings.max_exchanges),
            Err(e) => {
                tracing::warn!("{}", e);
                diagnostics.push(e.to_string());
                ContextWindow::default()
            }
        }
    }

    /// One full prompt-to-reply cycle.
    pub async fn turn(&mut self, prompt: &str) -> TurnOutcome {
        if !self.state.running() {
            return self.stopped(StopReason::Shutdown, None);
        }
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return self.stopped(StopReason::EmptyInput, None);
        }
        if let Some(usage) = self.state.usage {
            let cap = self.settings.budget_cap;
            if usage.over_budget(cap) {
                tracing::warn!(spent = usage.total_cost, cap, "Budget cap reached");
                return self.stopped(
                    StopReason::BudgetExceeded,
                    Some(ParleyError::BudgetExceeded {
                        spent: usage.total_cost,
                        cap,
                    }),
                );
            }
        }

        self.phase = SessionPhase::Dispatching;
        let mut diagnostics = Vec::new();
        let window = self.context_window(&mut diagnostics);
        tracing::debug!(
            model = %self.state.selected_model.name,
            exchanges = window.len(),
            "Dispatching prompt"
        );

        let reply = match self
            .pool
            .run(
                Arc::clone(&self.dispatcher),
                prompt.to_string(),
                window,
                self.settings.timeout,
            )
            .await
        {
            Ok(r) => r,
            Err(e) if e.ends_session() => return self.stopped(StopReason::Shutdown, Some(e)),
            Err(e) => {
                tracing::warn!("Turn failed: {}", e);
                self.phase = SessionPhase::Idle;
                return TurnOutcome::Failed(e);
            }
        };

        self.phase = SessionPhase::Updating;
        let cost = self.record_usage(&reply.usage, &mut diagnostics);

        if let Err(e) = self.chat_log.append(prompt, &reply.text) {
            tracing::warn!("{}", e);
            diagnostics.push(e.to_string());
        }

        let clean = markup_to_plain(&reply.text);
        let display = self.normalizer.wrap(&clean);
        self.phase = SessionPhase::Idle;

        TurnOutcome::Reply(TurnReply {
            model: self.state.selected_model.name.clone(),
            raw: reply.text,
            clean,
            display,
            cost,
            diagnostics,
        })
    }

    /// Charge a remote turn to the ledger. The local model has no record.
    fn record_usage(
        &mut self,
        usage: &TokenUsage,
        diagnostics: &mut Vec<String>,
    ) -> Option<CostInfo> {
        let record: UsageRecord = self.state.usage?;
        let recorded = self.ledger.record_usage(
            record,
            &self.state.selected_model.name,
            usage.input_tokens,
            usage.output_tokens,
        );
        if let Some(e) = recorded.save_error {
            diagnostics.push(e.to_string());
        }
        self.state.usage = Some(recorded.record);
        Some(CostInfo {
            turn_cost: recorded.cost,
            cumulative_cost: recorded.record.total_cost,
            cap: self.settings.budget_cap,
        })
    }

    /// Drive turns from `source` until the session stops. Every outcome,
    /// failed turns included, is passed to `on_turn`.
    pub async fn run<S, F>(&mut self, source: &mut S, mut on_turn: F) -> StopReason
    where
        S: PromptSource + ?Sized,
        F: FnMut(&TurnOutcome),
    {
        let shutdown = self.state.shutdown_token();
        loop {
            self.phase = SessionPhase::AwaitingInput;
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    self.phase = SessionPhase::Stopped;
                    return StopReason::Shutdown;
                }
                p = source.next_prompt() => p,
            };
            let Some(prompt) = next else {
                self.phase = SessionPhase::Stopped;
                return StopReason::SourceExhausted;
            };

            let outcome = self.turn(&prompt).await;
            on_turn(&outcome);
            if let TurnOutcome::Stopped { reason, .. } = outcome {
                return reason;
            }
        }
    }

    /// Release the worker pool. After a shutdown signal in-flight work is
    /// abandoned; otherwise it is waited for.
    pub async fn finish(&mut self) {
        if self.state.running() {
            self.pool.drain().await;
        } else {
            self.pool.abandon();
        }
        self.phase = SessionPhase::Stopped;
    }
}
