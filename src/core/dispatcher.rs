// src/core/dispatcher.rs — Remote and local model variants behind one contract

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::context::ContextWindow;
use super::types::{ModelConfig, ModelKind};
use crate::infra::errors::ParleyError;
use crate::provider::local::LocalResponder;
use crate::provider::{ChatRequest, ModelProvider, TokenUsage};

/// Reply text plus the token counts to charge for it.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReply {
    pub text: String,
    pub usage: TokenUsage,
}

pub struct RemoteModel {
    provider: Arc<dyn ModelProvider>,
    config: ModelConfig,
}

impl RemoteModel {
    pub fn new(provider: Arc<dyn ModelProvider>, config: ModelConfig) -> Self {
        Self { provider, config }
    }

    /// One chat-completion call carrying the context-prefixed prompt.
    ///
    /// Missing usage is charged as zero tokens. The call is dropped if
    /// `cancel` fires before the provider answers.
    pub async fn ask(
        &self,
        prompt: &str,
        window: &ContextWindow,
        cancel: &CancellationToken,
    ) -> Result<DispatchReply, ParleyError> {
        let request = ChatRequest::new(&self.config.name, window.prompt_with_context(prompt));
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ParleyError::Cancelled),
            r = self.provider.chat(request) => r?,
        };

        let usage = response.usage.unwrap_or_else(|| {
            tracing::warn!(model = %self.config.name, "Provider reported no usage; charging zero tokens");
            TokenUsage::default()
        });
        Ok(DispatchReply {
            text: response.content,
            usage,
        })
    }
}

pub struct LocalModel {
    config: ModelConfig,
    responder: LocalResponder,
    delay: Duration,
}

impl LocalModel {
    pub fn new(responder: LocalResponder, delay: Duration) -> Self {
        Self {
            config: ModelConfig {
                kind: ModelKind::LocalLlm,
                name: ModelKind::LocalLlm.name().to_string(),
                is_local: true,
                pricing: None,
            },
            responder,
            delay,
        }
    }

    /// Canned reply after a fixed delay. Context is ignored and usage is zero.
    pub async fn ask(&self, prompt: &str) -> Result<DispatchReply, ParleyError> {
        tokio::time::sleep(self.delay).await;
        Ok(DispatchReply {
            text: self.responder.respond(prompt),
            usage: TokenUsage::default(),
        })
    }
}

pub enum ModelDispatcher {
    Remote(RemoteModel),
    Local(LocalModel),
}

impl ModelDispatcher {
    pub fn remote(provider: Arc<dyn ModelProvider>, config: ModelConfig) -> Self {
        ModelDispatcher::Remote(RemoteModel::new(provider, config))
    }

    pub fn local(responder: LocalResponder, delay: Duration) -> Self {
        ModelDispatcher::Local(LocalModel::new(responder, delay))
    }

    pub fn config(&self) -> &ModelConfig {
        match self {
            ModelDispatcher::Remote(m) => &m.config,
            ModelDispatcher::Local(m) => &m.config,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ModelDispatcher::Local(_))
    }

    /// The local variant never observes `cancel`; its result always arrives.
    pub async fn ask(
        &self,
        prompt: &str,
        window: &ContextWindow,
        cancel: &CancellationToken,
    ) -> Result<DispatchReply, ParleyError> {
        match self {
            ModelDispatcher::Remote(m) => m.ask(prompt, window, cancel).await,
            ModelDispatcher::Local(m) => m.ask(prompt).await,
        }
    }
}
