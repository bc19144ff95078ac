pub mod api;
pub mod client;

pub use api::{
    AssistantUpdate, AssistantsApi, KnowledgeUpload, MessageContent, MessageRole, NewAssistant,
    RemoteAssistant, RemoteError, RemoteFuture, Run, RunLastError, RunStatus, TextValue, Thread,
    ThreadMessage, UploadedFile,
};
pub use client::{OpenAiAssistantsClient, OpenAiClientError};
