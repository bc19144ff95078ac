use std::time::Duration;

use reqwest::RequestBuilder;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;

use super::api::{
    AssistantUpdate, AssistantsApi, KnowledgeUpload, NewAssistant, RemoteAssistant, RemoteError,
    RemoteFuture, Run, Thread, ThreadMessage, UploadedFile,
};
use crate::config::OpenAiConfig;

const ASSISTANTS_BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");
const UPLOAD_PURPOSE: &str = "assistants";

#[derive(Debug, Error)]
pub enum OpenAiClientError {
    #[error("failed to build OpenAI http client: {0}")]
    HttpClient(String),
}

/// reqwest-backed client for the OpenAI Assistants v2 endpoints.
#[derive(Clone)]
pub struct OpenAiAssistantsClient {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiAssistantsClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, OpenAiClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|err| OpenAiClientError::HttpClient(err.to_string()))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, RemoteError> {
        let response = request
            .bearer_auth(&self.config.api_key)
            .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    RemoteError::Timeout { operation }
                } else {
                    RemoteError::Unavailable {
                        operation,
                        message: err.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|err| {
            if err.is_timeout() {
                RemoteError::Timeout { operation }
            } else {
                RemoteError::InvalidPayload {
                    operation,
                    message: format!("response body read failed: {err}"),
                }
            }
        })?;

        if !status.is_success() {
            return Err(RemoteError::Status {
                operation,
                status: status.as_u16(),
                message: parse_provider_error_message(&body),
            });
        }

        serde_json::from_str::<T>(&body).map_err(|err| RemoteError::InvalidPayload {
            operation,
            message: err.to_string(),
        })
    }
}

impl AssistantsApi for OpenAiAssistantsClient {
    fn upload_knowledge<'a>(&'a self, upload: KnowledgeUpload) -> RemoteFuture<'a, UploadedFile> {
        Box::pin(async move {
            let operation = "upload knowledge source";
            let bytes = tokio::fs::read(&upload.path)
                .await
                .map_err(|source| RemoteError::ReadUpload {
                    path: upload.path.display().to_string(),
                    source,
                })?;
            let file_name = upload
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "knowledge".to_string());

            let form = Form::new()
                .text("purpose", UPLOAD_PURPOSE)
                .part("file", Part::bytes(bytes).file_name(file_name));

            self.send(operation, self.client.post(self.url("files")).multipart(form))
                .await
        })
    }

    fn create_assistant<'a>(
        &'a self,
        assistant: NewAssistant,
    ) -> RemoteFuture<'a, RemoteAssistant> {
        Box::pin(async move {
            let body = json!({
                "name": assistant.name,
                "model": assistant.model,
                "instructions": assistant.instructions,
                "tools": [{ "type": "file_search" }],
                "tool_resources": {
                    "file_search": {
                        "vector_stores": [{ "file_ids": assistant.knowledge_file_ids }]
                    }
                }
            });

            self.send(
                "create assistant",
                self.client.post(self.url("assistants")).json(&body),
            )
            .await
        })
    }

    fn retrieve_assistant<'a>(
        &'a self,
        assistant_id: &'a str,
    ) -> RemoteFuture<'a, RemoteAssistant> {
        Box::pin(async move {
            let operation = "retrieve assistant";
            let assistant_id = path_segment(operation, assistant_id)?;
            self.send(
                operation,
                self.client.get(self.url(&format!("assistants/{assistant_id}"))),
            )
            .await
        })
    }

    fn update_assistant<'a>(
        &'a self,
        assistant_id: &'a str,
        update: AssistantUpdate,
    ) -> RemoteFuture<'a, RemoteAssistant> {
        Box::pin(async move {
            let operation = "update assistant";
            let assistant_id = path_segment(operation, assistant_id)?;

            let mut body = serde_json::Map::new();
            if let Some(instructions) = update.instructions {
                body.insert("instructions".to_string(), Value::String(instructions));
            }
            if let Some(model) = update.model {
                body.insert("model".to_string(), Value::String(model));
            }

            self.send(
                operation,
                self.client
                    .post(self.url(&format!("assistants/{assistant_id}")))
                    .json(&Value::Object(body)),
            )
            .await
        })
    }

    fn create_thread<'a>(&'a self) -> RemoteFuture<'a, Thread> {
        Box::pin(async move {
            self.send(
                "create thread",
                self.client.post(self.url("threads")).json(&json!({})),
            )
            .await
        })
    }

    fn append_user_message<'a>(
        &'a self,
        thread_id: &'a str,
        text: &'a str,
    ) -> RemoteFuture<'a, ThreadMessage> {
        Box::pin(async move {
            let operation = "append message";
            let thread_id = path_segment(operation, thread_id)?;
            self.send(
                operation,
                self.client
                    .post(self.url(&format!("threads/{thread_id}/messages")))
                    .json(&json!({ "role": "user", "content": text })),
            )
            .await
        })
    }

    fn create_run<'a>(
        &'a self,
        thread_id: &'a str,
        assistant_id: &'a str,
    ) -> RemoteFuture<'a, Run> {
        Box::pin(async move {
            let operation = "create run";
            let thread_id = path_segment(operation, thread_id)?;
            self.send(
                operation,
                self.client
                    .post(self.url(&format!("threads/{thread_id}/runs")))
                    .json(&json!({ "assistant_id": assistant_id })),
            )
            .await
        })
    }

    fn retrieve_run<'a>(&'a self, thread_id: &'a str, run_id: &'a str) -> RemoteFuture<'a, Run> {
        Box::pin(async move {
            let operation = "retrieve run";
            let thread_id = path_segment(operation, thread_id)?;
            let run_id = path_segment(operation, run_id)?;
            self.send(
                operation,
                self.client
                    .get(self.url(&format!("threads/{thread_id}/runs/{run_id}"))),
            )
            .await
        })
    }

    fn cancel_run<'a>(&'a self, thread_id: &'a str, run_id: &'a str) -> RemoteFuture<'a, Run> {
        Box::pin(async move {
            let operation = "cancel run";
            let thread_id = path_segment(operation, thread_id)?;
            let run_id = path_segment(operation, run_id)?;
            self.send(
                operation,
                self.client
                    .post(self.url(&format!("threads/{thread_id}/runs/{run_id}/cancel"))),
            )
            .await
        })
    }

    fn latest_run_message<'a>(
        &'a self,
        thread_id: &'a str,
        run_id: &'a str,
    ) -> RemoteFuture<'a, Option<ThreadMessage>> {
        Box::pin(async move {
            let operation = "list messages";
            let thread_id = path_segment(operation, thread_id)?;
            let page: ListPage<ThreadMessage> = self
                .send(
                    operation,
                    self.client
                        .get(self.url(&format!("threads/{thread_id}/messages")))
                        .query(&[("limit", "1"), ("order", "desc"), ("run_id", run_id)]),
                )
                .await?;

            Ok(page.data.into_iter().next())
        })
    }
}

#[derive(Debug, Deserialize)]
struct ListPage<T> {
    data: Vec<T>,
}

/// Identifiers come from clients verbatim; anything that is not a plain token
/// is rejected before it can alter the request path.
fn path_segment<'a>(operation: &'static str, id: &'a str) -> Result<&'a str, RemoteError> {
    let valid = !id.is_empty()
        && id
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_'));
    if valid {
        Ok(id)
    } else {
        Err(RemoteError::InvalidIdentifier {
            operation,
            id: id.to_string(),
        })
    }
}

fn parse_provider_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ProviderErrorEnvelope {
        error: Option<ProviderErrorDetails>,
    }

    #[derive(Deserialize)]
    struct ProviderErrorDetails {
        message: Option<String>,
        code: Option<Value>,
    }

    let details = serde_json::from_str::<ProviderErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error);
    let Some(details) = details else {
        return "unknown".to_string();
    };

    match (details.message, details.code) {
        (Some(message), _) if !message.trim().is_empty() => message,
        (_, Some(Value::String(code))) => code,
        (_, Some(Value::Number(code))) => code.to_string(),
        _ => "unknown".to_string(),
    }
}
