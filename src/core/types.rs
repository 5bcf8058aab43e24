// src/core/types.rs — Session-level data types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

use super::cost::{ModelPricing, PricingTable};
use super::ledger::UsageRecord;
use crate::infra::errors::ParleyError;

/// The fixed set of selectable models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    #[serde(rename = "local-llm")]
    LocalLlm,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::Gpt35Turbo, ModelKind::Gpt4o, ModelKind::LocalLlm];

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::Gpt35Turbo => "gpt-3.5-turbo",
            ModelKind::Gpt4o => "gpt-4o",
            ModelKind::LocalLlm => "local-llm",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ModelKind::Gpt35Turbo => "GPT-3.5 Turbo (Online)",
            ModelKind::Gpt4o => "GPT-4o (Online)",
            ModelKind::LocalLlm => "Local LLM (Offline)",
        }
    }

    pub fn is_local(self) -> bool {
        matches!(self, ModelKind::LocalLlm)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = ParleyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParleyError::Config(format!("unknown model '{s}'")))
    }
}

/// A selected model, fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub kind: ModelKind,
    pub name: String,
    pub is_local: bool,
    pub pricing: Option<ModelPricing>,
}

impl ModelConfig {
    pub fn for_kind(kind: ModelKind, table: &PricingTable) -> Self {
        Self {
            kind,
            name: kind.name().to_string(),
            is_local: kind.is_local(),
            pricing: if kind.is_local() {
                None
            } else {
                table.get(kind.name()).copied()
            },
        }
    }
}

/// Mutable state for one process-lifetime session.
pub struct SessionState {
    pub selected_model: ModelConfig,
    /// Absent for the local model, which never touches the ledger.
    pub usage: Option<UsageRecord>,
    shutdown: CancellationToken,
}

impl SessionState {
    pub fn new(selected_model: ModelConfig, usage: Option<UsageRecord>) -> Self {
        Self {
            selected_model,
            usage,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Flip `running` to false. Takes effect at the next safe point of the loop.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

/// Orchestrator state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    AwaitingInput,
    Dispatching,
    Updating,
    Stopped,
}

/// Why the session loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Empty or cancelled input from the user.
    EmptyInput,
    BudgetExceeded,
    /// Shutdown signal or explicit stop.
    Shutdown,
    /// The prompt source has nothing more to give.
    SourceExhausted,
}

/// Spend figures for one remote turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostInfo {
    pub turn_cost: f64,
    pub cumulative_cost: f64,
    pub cap: f64,
}

impl CostInfo {
    pub fn percent_of_cap(&self) -> f64 {
        if self.cap <= 0.0 {
            return 100.0;
        }
        self.cumulative_cost / self.cap * 100.0
    }
}

/// A successful turn, ready for the presentation layer.
#[derive(Debug, Clone)]
pub struct TurnReply {
    pub model: String,
    /// Reply exactly as the model returned it (and as it was logged).
    pub raw: String,
    /// Markup converted to plain text; what gets copied to the clipboard.
    pub clean: String,
    /// `clean` wrapped and indented for the terminal.
    pub display: String,
    pub cost: Option<CostInfo>,
    /// Non-fatal storage problems hit while recording this turn.
    pub diagnostics: Vec<String>,
}

/// Result of one pass through the orchestrator.
#[derive(Debug)]
pub enum TurnOutcome {
    Reply(TurnReply),
    /// The turn failed; the session accepts the next prompt.
    Failed(ParleyError),
    /// The session is over.
    Stopped {
        reason: StopReason,
        error: Option<ParleyError>,
    },
}

impl TurnOutcome {
    pub fn is_stopped(&self) -> bool {
        matches!(self, TurnOutcome::Stopped { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_kind_names_roundtrip() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.name().parse::<ModelKind>().unwrap(), kind);
        }
        assert!("gpt-5".parse::<ModelKind>().is_err());
        assert_eq!(" GPT-4O ".parse::<ModelKind>().unwrap(), ModelKind::Gpt4o);
    }

    #[test]
    fn test_model_config_pricing() {
        let table = PricingTable::builtin();
        let remote = ModelConfig::for_kind(ModelKind::Gpt4o, &table);
        assert!(!remote.is_local);
        assert_eq!(remote.pricing, Some(ModelPricing::new(2.5, 10.0)));

        let local = ModelConfig::for_kind(ModelKind::LocalLlm, &table);
        assert!(local.is_local);
        assert!(local.pricing.is_none());
        assert_eq!(local.name, "local-llm");
    }

    #[test]
    fn test_session_stop_flips_running() {
        let s = SessionState::new(
            ModelConfig::for_kind(ModelKind::LocalLlm, &PricingTable::builtin()),
            None,
        );
        assert!(s.running());
        s.stop();
        assert!(!s.running());
        assert!(s.shutdown_token().is_cancelled());
    }

    #[test]
    fn test_percent_of_cap() {
        let c = CostInfo {
            turn_cost: 0.01,
            cumulative_cost: 1.25,
            cap: 5.0,
        };
        assert!((c.percent_of_cap() - 25.0).abs() < 1e-9);
        let zero_cap = CostInfo { cap: 0.0, ..c };
        assert_eq!(zero_cap.percent_of_cap(), 100.0);
    }
}
