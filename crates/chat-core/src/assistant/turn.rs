use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ProvisionedAssistant;
use crate::error::ErrorKind;
use crate::openai::{AssistantsApi, MessageRole, RemoteError, RunLastError, RunStatus};

pub const INVALID_INPUT_MESSAGE: &str = "Missing thread_id or message.";

const WARNING_MARKER: &str = "⚠️";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnSettings {
    pub poll_interval: Duration,
    pub run_timeout: Duration,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            run_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("Missing thread_id or message.")]
    InvalidInput,
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("run {run_id} ended with status {status}: {detail}")]
    RunFailed {
        run_id: String,
        status: RunStatus,
        detail: String,
    },
    #[error("run {run_id} did not complete within {timeout:?}")]
    Timeout { run_id: String, timeout: Duration },
    #[error("run {run_id} was abandoned before completing")]
    Cancelled { run_id: String },
    #[error("run {run_id} completed without a text reply")]
    EmptyReply { run_id: String },
}

impl TurnError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput => ErrorKind::Validation,
            Self::Remote(err) => err.kind(),
            Self::RunFailed { .. } | Self::EmptyReply { .. } => ErrorKind::RemoteFatal,
            Self::Timeout { .. } | Self::Cancelled { .. } => ErrorKind::RemoteTransient,
        }
    }

    /// Text shown to the chat client in place of an assistant reply.
    pub fn client_message(&self) -> String {
        match self {
            Self::InvalidInput => format!("{WARNING_MARKER} {INVALID_INPUT_MESSAGE}"),
            other => format!("{WARNING_MARKER} {}: {other}", other.kind()),
        }
    }
}

/// Executes chat turns against the provisioned assistant.
///
/// Construction requires a [`ProvisionedAssistant`], so no turn can run before
/// provisioning has finished.
pub struct TurnExecutor {
    api: Arc<dyn AssistantsApi>,
    assistant_id: String,
    settings: TurnSettings,
}

impl TurnExecutor {
    pub fn new(
        api: Arc<dyn AssistantsApi>,
        assistant: &ProvisionedAssistant,
        settings: TurnSettings,
    ) -> Self {
        Self {
            api,
            assistant_id: assistant.assistant_id.clone(),
            settings,
        }
    }

    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    pub async fn start_session(&self) -> Result<String, TurnError> {
        let thread = self.api.create_thread().await?;
        info!(thread_id = %thread.id, "started chat session");
        Ok(thread.id)
    }

    pub async fn run_turn(
        &self,
        thread_id: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<String, TurnError> {
        let thread_id = thread_id.trim();
        let message = message.trim();
        if thread_id.is_empty() || message.is_empty() {
            return Err(TurnError::InvalidInput);
        }

        self.api.append_user_message(thread_id, message).await?;
        let run = self.api.create_run(thread_id, &self.assistant_id).await?;
        debug!(thread_id, run_id = %run.id, "run started");

        self.wait_for_completion(thread_id, &run.id, cancel).await?;

        let reply = self.api.latest_run_message(thread_id, &run.id).await?;
        reply
            .as_ref()
            .filter(|message| message.role == MessageRole::Assistant)
            .and_then(|message| message.primary_text())
            .map(ToString::to_string)
            .ok_or(TurnError::EmptyReply { run_id: run.id })
    }

    async fn wait_for_completion(
        &self,
        thread_id: &str,
        run_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), TurnError> {
        let started_at = Instant::now();

        loop {
            let run = self.api.retrieve_run(thread_id, run_id).await?;
            match run.status {
                RunStatus::Completed => {
                    debug!(
                        thread_id,
                        run_id,
                        elapsed_ms = started_at.elapsed().as_millis() as u64,
                        "run completed"
                    );
                    return Ok(());
                }
                status if status.is_dead_end() => {
                    return Err(TurnError::RunFailed {
                        run_id: run_id.to_string(),
                        status,
                        detail: describe_last_error(run.last_error.as_ref()),
                    });
                }
                _ => {}
            }

            let elapsed = started_at.elapsed();
            if elapsed >= self.settings.run_timeout {
                self.abandon_run(thread_id, run_id).await;
                return Err(TurnError::Timeout {
                    run_id: run_id.to_string(),
                    timeout: self.settings.run_timeout,
                });
            }

            let wait = self
                .settings
                .poll_interval
                .min(self.settings.run_timeout - elapsed);
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.abandon_run(thread_id, run_id).await;
                    return Err(TurnError::Cancelled {
                        run_id: run_id.to_string(),
                    });
                }
                _ = sleep(wait) => {}
            }
        }
    }

    async fn abandon_run(&self, thread_id: &str, run_id: &str) {
        if let Err(err) = self.api.cancel_run(thread_id, run_id).await {
            warn!(thread_id, run_id, error = %err, "failed to cancel abandoned run");
        }
    }
}

fn describe_last_error(last_error: Option<&RunLastError>) -> String {
    match last_error {
        Some(RunLastError {
            message: Some(message),
            ..
        }) => message.clone(),
        Some(RunLastError {
            code: Some(code), ..
        }) => code.clone(),
        _ => "no error detail reported".to_string(),
    }
}
