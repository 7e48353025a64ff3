//! The model gateway: one round trip to the inference backend per call.

use std::sync::Arc;
use std::time::Duration;

use pacekeeper_core::error::ProviderError;
use pacekeeper_core::message::{Message, MessageLog};
use pacekeeper_core::provider::{Provider, ProviderRequest, StopReason, ToolDefinition, Usage};
use pacekeeper_core::tool::ToolCall;
use tracing::debug;

/// What the model asked for on this turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnSignal {
    /// Execute these invocations and come back.
    ToolsRequested(Vec<ToolCall>),
    /// The model is done; its text is the answer.
    FinalAnswer,
    /// Generation ended early (length limit, filter, stop sequence).
    Incomplete(StopReason),
}

/// The outcome of one gateway call.
#[derive(Debug, Clone)]
pub struct GatewayTurn {
    pub message: Message,
    pub signal: TurnSignal,
    pub usage: Option<Usage>,
    pub model: String,
}

/// Sends the message log and tool schemas to a provider and classifies the
/// reply.
pub struct ModelGateway {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    timeout: Duration,
}

impl ModelGateway {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.2,
            max_tokens: None,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Per-call timeout. Expiry surfaces as [`ProviderError::Timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Make one call with the full log.
    pub async fn turn(
        &self,
        system: &str,
        log: &MessageLog,
        tools: &[ToolDefinition],
    ) -> Result<GatewayTurn, ProviderError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            system: (!system.is_empty()).then(|| system.to_string()),
            messages: log.messages().to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: tools.to_vec(),
            stop: vec![],
        };

        debug!(
            provider = self.provider.name(),
            model = %self.model,
            messages = log.len(),
            tools = tools.len(),
            "Calling model"
        );

        let response = tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .map_err(|_| {
                ProviderError::Timeout(format!("no response within {}s", self.timeout.as_secs()))
            })??;

        let signal = classify(&response.message, &response.stop_reason);
        Ok(GatewayTurn {
            message: response.message,
            signal,
            usage: response.usage,
            model: response.model,
        })
    }
}

/// Map a reply and its stop reason onto a turn signal.
///
/// Tool-use blocks win over the stop reason unless the output was cut off
/// by the length limit, in which case the invocations may be truncated.
pub fn classify(message: &Message, stop: &StopReason) -> TurnSignal {
    let calls = message.tool_calls();
    match stop {
        StopReason::MaxTokens => TurnSignal::Incomplete(stop.clone()),
        _ if !calls.is_empty() => TurnSignal::ToolsRequested(calls),
        StopReason::EndTurn | StopReason::ToolUse => TurnSignal::FinalAnswer,
        StopReason::StopSequence | StopReason::Refusal | StopReason::Other(_) => {
            TurnSignal::Incomplete(stop.clone())
        }
    }
}
