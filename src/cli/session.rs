// src/cli/session.rs — Model selection and session assembly

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::dispatcher::ModelDispatcher;
use crate::core::ledger::UsageLedger;
use crate::core::normalize::TextNormalizer;
use crate::core::orchestrator::{SessionOrchestrator, SessionSettings};
use crate::core::transcript::ChatLog;
use crate::core::types::{ModelConfig, ModelKind};
use crate::infra::config::Config;
use crate::infra::errors::ParleyError;
use crate::infra::paths;
use crate::provider::local::LocalResponder;
use crate::provider::openai::OpenAIProvider;

/// Where the two stores live.
#[derive(Debug, Clone)]
pub struct StorePaths {
    pub usage: PathBuf,
    pub transcript: PathBuf,
}

impl StorePaths {
    pub fn default_locations() -> Self {
        Self {
            usage: paths::usage_path(),
            transcript: paths::transcript_path(),
        }
    }
}

/// Models usable with the current credentials, in menu order.
pub fn available_models(has_key: bool) -> Vec<ModelKind> {
    ModelKind::ALL
        .into_iter()
        .filter(|k| k.is_local() || has_key)
        .collect()
}

struct ModelOption(ModelKind);

impl fmt::Display for ModelOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<24} {}", self.0.label(), self.0.name())
    }
}

/// Interactive picker. `Ok(None)` means the user cancelled.
pub fn pick_model(config: &Config) -> anyhow::Result<Option<ModelKind>> {
    let has_key = config.api_key().is_ok();
    let options: Vec<ModelOption> = available_models(has_key)
        .into_iter()
        .map(ModelOption)
        .collect();
    if !has_key {
        eprintln!("  No OpenAI API key found; only the offline model is available.");
    }

    let start = options
        .iter()
        .position(|o| o.0.name() == config.models.default)
        .unwrap_or(0);

    match inquire::Select::new("Select a model for this session:", options)
        .with_starting_cursor(start)
        .with_help_message("Use arrow keys, Enter to confirm, Esc to cancel")
        .prompt()
    {
        Ok(choice) => Ok(Some(choice.0)),
        Err(
            inquire::InquireError::OperationCanceled | inquire::InquireError::OperationInterrupted,
        ) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// `--model` if given, else `models.default`.
pub fn model_from_flags(flag: Option<&str>, config: &Config) -> Result<ModelKind, ParleyError> {
    flag.unwrap_or(&config.models.default).parse()
}

/// Build the dispatcher for `kind`. Remote models need a credential.
pub fn build_dispatcher(kind: ModelKind, config: &Config) -> Result<ModelDispatcher, ParleyError> {
    if kind.is_local() {
        let responder = LocalResponder::load(config.local.responses_path.as_deref());
        return Ok(ModelDispatcher::local(
            responder,
            Duration::from_millis(config.local.delay_ms),
        ));
    }

    let key = config.api_key()?;
    let provider = OpenAIProvider::with_base_url(key, config.models.base_url.clone());
    Ok(ModelDispatcher::remote(
        Arc::new(provider),
        ModelConfig::for_kind(kind, &config.pricing_table()),
    ))
}

/// Wire stores, normalizer and dispatcher into a session bound to `shutdown`.
///
/// Store creation failures are logged; the session still starts.
pub fn build_session(
    dispatcher: ModelDispatcher,
    config: &Config,
    stores: &StorePaths,
    shutdown: CancellationToken,
) -> SessionOrchestrator {
    let ledger = UsageLedger::new(&stores.usage, config.pricing_table());
    let chat_log = ChatLog::new(&stores.transcript);
    if let Err(e) = ledger.ensure() {
        tracing::warn!("{}", e);
    }
    if let Err(e) = chat_log.ensure() {
        tracing::warn!("{}", e);
    }

    let normalizer = TextNormalizer::new(config.display.wrap_width, config.display.wrap_indent.clone());
    SessionOrchestrator::new(
        dispatcher,
        ledger,
        chat_log,
        normalizer,
        SessionSettings::from_config(config),
    )
    .with_shutdown(shutdown)
}
