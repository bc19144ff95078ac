use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;

pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("{operation} timed out")]
    Timeout { operation: &'static str },
    #[error("{operation} could not reach the service: {message}")]
    Unavailable {
        operation: &'static str,
        message: String,
    },
    #[error("{operation} failed with status {status}: {message}")]
    Status {
        operation: &'static str,
        status: u16,
        message: String,
    },
    #[error("{operation} rejected identifier '{id}' before sending")]
    InvalidIdentifier { operation: &'static str, id: String },
    #[error("{operation} returned an invalid payload: {message}")]
    InvalidPayload {
        operation: &'static str,
        message: String,
    },
    #[error("failed to read upload {path}: {source}")]
    ReadUpload {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl RemoteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } | Self::Unavailable { .. } => ErrorKind::RemoteTransient,
            Self::Status { status: 404, .. } | Self::InvalidIdentifier { .. } => {
                ErrorKind::NotFound
            }
            Self::Status { status, .. } if is_transient_status(*status) => {
                ErrorKind::RemoteTransient
            }
            Self::Status { .. } | Self::InvalidPayload { .. } | Self::ReadUpload { .. } => {
                ErrorKind::RemoteFatal
            }
        }
    }
}

fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 409 | 429) || (500..=599).contains(&status)
}

#[derive(Debug, Clone)]
pub struct KnowledgeUpload {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadedFile {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct NewAssistant {
    pub name: String,
    pub model: String,
    pub instructions: String,
    pub knowledge_file_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssistantUpdate {
    pub instructions: Option<String>,
    pub model: Option<String>,
}

impl AssistantUpdate {
    pub fn is_empty(&self) -> bool {
        self.instructions.is_none() && self.model.is_none()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteAssistant {
    pub id: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thread {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        }
    }

    /// Statuses after which the run will never reach `completed`.
    ///
    /// `requires_action` is included: no tool outputs are ever submitted, so
    /// such a run can only expire.
    pub fn is_dead_end(self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Failed | Self::Incomplete | Self::Expired | Self::RequiresAction
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunLastError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub last_error: Option<RunLastError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextValue {
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: TextValue },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

impl ThreadMessage {
    /// First text part of the message, if any.
    pub fn primary_text(&self) -> Option<&str> {
        self.content.iter().find_map(|part| match part {
            MessageContent::Text { text } => Some(text.value.as_str()),
            MessageContent::Other => None,
        })
    }
}

/// The subset of the hosted assistants service this system depends on.
pub trait AssistantsApi: Send + Sync {
    fn upload_knowledge<'a>(&'a self, upload: KnowledgeUpload) -> RemoteFuture<'a, UploadedFile>;

    fn create_assistant<'a>(&'a self, assistant: NewAssistant)
    -> RemoteFuture<'a, RemoteAssistant>;

    fn retrieve_assistant<'a>(&'a self, assistant_id: &'a str)
    -> RemoteFuture<'a, RemoteAssistant>;

    fn update_assistant<'a>(
        &'a self,
        assistant_id: &'a str,
        update: AssistantUpdate,
    ) -> RemoteFuture<'a, RemoteAssistant>;

    fn create_thread<'a>(&'a self) -> RemoteFuture<'a, Thread>;

    fn append_user_message<'a>(
        &'a self,
        thread_id: &'a str,
        text: &'a str,
    ) -> RemoteFuture<'a, ThreadMessage>;

    fn create_run<'a>(&'a self, thread_id: &'a str, assistant_id: &'a str)
    -> RemoteFuture<'a, Run>;

    fn retrieve_run<'a>(&'a self, thread_id: &'a str, run_id: &'a str) -> RemoteFuture<'a, Run>;

    fn cancel_run<'a>(&'a self, thread_id: &'a str, run_id: &'a str) -> RemoteFuture<'a, Run>;

    /// Newest message in the thread authored by the given run.
    fn latest_run_message<'a>(
        &'a self,
        thread_id: &'a str,
        run_id: &'a str,
    ) -> RemoteFuture<'a, Option<ThreadMessage>>;
}
