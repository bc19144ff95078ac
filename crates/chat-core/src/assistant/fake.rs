use std::collections::{HashMap, VecDeque};
use std::future::ready;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::openai::{
    AssistantUpdate, AssistantsApi, KnowledgeUpload, MessageContent, MessageRole, NewAssistant,
    RemoteAssistant, RemoteError, RemoteFuture, Run, RunLastError, RunStatus, TextValue, Thread,
    ThreadMessage, UploadedFile,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Upload(PathBuf),
    CreateAssistant(String),
    RetrieveAssistant(String),
    UpdateAssistant(String, AssistantUpdate),
    CreateThread,
    AppendMessage(String, String),
    CreateRun(String, String),
    RetrieveRun(String),
    CancelRun(String),
    LatestMessage(String),
}

#[derive(Default)]
struct FakeState {
    calls: Vec<Call>,
    next_id: u32,
    assistants: HashMap<String, RemoteAssistant>,
    threads: HashMap<String, Vec<(Option<String>, ThreadMessage)>>,
    runs: HashMap<String, String>,
    run_statuses: VecDeque<RunStatus>,
    stall_runs: bool,
    fail_updates: bool,
    fail_appends_with_status: Option<u16>,
    reply_text: String,
}

/// In-memory stand-in for the hosted service that records every call.
pub(crate) struct FakeAssistantsApi {
    state: Mutex<FakeState>,
}

impl FakeAssistantsApi {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                reply_text: "2 + 2 = 4.".to_string(),
                ..FakeState::default()
            }),
        }
    }

    pub(crate) fn with_assistant(self, id: &str, instructions: &str, model: &str) -> Self {
        self.lock().assistants.insert(
            id.to_string(),
            RemoteAssistant {
                id: id.to_string(),
                model: Some(model.to_string()),
                instructions: Some(instructions.to_string()),
            },
        );
        self
    }

    pub(crate) fn with_thread(self, id: &str) -> Self {
        self.lock().threads.insert(id.to_string(), Vec::new());
        self
    }

    pub(crate) fn with_run_statuses(self, statuses: Vec<RunStatus>) -> Self {
        self.lock().run_statuses = statuses.into();
        self
    }

    pub(crate) fn stalling_runs(self) -> Self {
        self.lock().stall_runs = true;
        self
    }

    pub(crate) fn failing_updates(self) -> Self {
        self.lock().fail_updates = true;
        self
    }

    pub(crate) fn failing_appends_with_status(self, status: u16) -> Self {
        self.lock().fail_appends_with_status = Some(status);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub(crate) fn assistant(&self, id: &str) -> Option<RemoteAssistant> {
        self.lock().assistants.get(id).cloned()
    }

    pub(crate) fn message_count(&self, thread_id: &str) -> usize {
        self.lock()
            .threads
            .get(thread_id)
            .map(Vec::len)
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{}", self.next_id)
    }
}

fn not_found(operation: &'static str, id: &str) -> RemoteError {
    RemoteError::Status {
        operation,
        status: 404,
        message: format!("No object found with id '{id}'."),
    }
}

fn text_message(id: String, role: MessageRole, text: &str) -> ThreadMessage {
    ThreadMessage {
        id,
        role,
        content: vec![MessageContent::Text {
            text: TextValue {
                value: text.to_string(),
            },
        }],
    }
}

impl AssistantsApi for FakeAssistantsApi {
    fn upload_knowledge<'a>(&'a self, upload: KnowledgeUpload) -> RemoteFuture<'a, UploadedFile> {
        let mut state = self.lock();
        state.calls.push(Call::Upload(upload.path));
        let id = state.next_id("file");
        Box::pin(ready(Ok(UploadedFile { id })))
    }

    fn create_assistant<'a>(
        &'a self,
        assistant: NewAssistant,
    ) -> RemoteFuture<'a, RemoteAssistant> {
        let mut state = self.lock();
        state.calls.push(Call::CreateAssistant(assistant.model.clone()));
        let id = state.next_id("asst");
        let created = RemoteAssistant {
            id: id.clone(),
            model: Some(assistant.model),
            instructions: Some(assistant.instructions),
        };
        state.assistants.insert(id, created.clone());
        Box::pin(ready(Ok(created)))
    }

    fn retrieve_assistant<'a>(
        &'a self,
        assistant_id: &'a str,
    ) -> RemoteFuture<'a, RemoteAssistant> {
        let mut state = self.lock();
        state
            .calls
            .push(Call::RetrieveAssistant(assistant_id.to_string()));
        let result = state
            .assistants
            .get(assistant_id)
            .cloned()
            .ok_or_else(|| not_found("retrieve assistant", assistant_id));
        Box::pin(ready(result))
    }

    fn update_assistant<'a>(
        &'a self,
        assistant_id: &'a str,
        update: AssistantUpdate,
    ) -> RemoteFuture<'a, RemoteAssistant> {
        let mut state = self.lock();
        state.calls.push(Call::UpdateAssistant(
            assistant_id.to_string(),
            update.clone(),
        ));
        if state.fail_updates {
            return Box::pin(ready(Err(RemoteError::Status {
                operation: "update assistant",
                status: 500,
                message: "server_error".to_string(),
            })));
        }

        let result = match state.assistants.get_mut(assistant_id) {
            Some(assistant) => {
                if let Some(instructions) = update.instructions {
                    assistant.instructions = Some(instructions);
                }
                if let Some(model) = update.model {
                    assistant.model = Some(model);
                }
                Ok(assistant.clone())
            }
            None => Err(not_found("update assistant", assistant_id)),
        };
        Box::pin(ready(result))
    }

    fn create_thread<'a>(&'a self) -> RemoteFuture<'a, Thread> {
        let mut state = self.lock();
        state.calls.push(Call::CreateThread);
        let id = state.next_id("thread");
        state.threads.insert(id.clone(), Vec::new());
        Box::pin(ready(Ok(Thread { id })))
    }

    fn append_user_message<'a>(
        &'a self,
        thread_id: &'a str,
        text: &'a str,
    ) -> RemoteFuture<'a, ThreadMessage> {
        let mut state = self.lock();
        state
            .calls
            .push(Call::AppendMessage(thread_id.to_string(), text.to_string()));
        if let Some(status) = state.fail_appends_with_status {
            return Box::pin(ready(Err(RemoteError::Status {
                operation: "append message",
                status,
                message: "injected failure".to_string(),
            })));
        }

        let id = state.next_id("msg");
        let message = text_message(id, MessageRole::User, text);
        let result = match state.threads.get_mut(thread_id) {
            Some(messages) => {
                messages.push((None, message.clone()));
                Ok(message)
            }
            None => Err(not_found("append message", thread_id)),
        };
        Box::pin(ready(result))
    }

    fn create_run<'a>(
        &'a self,
        thread_id: &'a str,
        assistant_id: &'a str,
    ) -> RemoteFuture<'a, Run> {
        let mut state = self.lock();
        state.calls.push(Call::CreateRun(
            thread_id.to_string(),
            assistant_id.to_string(),
        ));
        let id = state.next_id("run");
        state.runs.insert(id.clone(), thread_id.to_string());
        Box::pin(ready(Ok(Run {
            id,
            status: RunStatus::Queued,
            last_error: None,
        })))
    }

    fn retrieve_run<'a>(&'a self, thread_id: &'a str, run_id: &'a str) -> RemoteFuture<'a, Run> {
        let mut state = self.lock();
        state.calls.push(Call::RetrieveRun(run_id.to_string()));

        let status = if state.stall_runs {
            RunStatus::InProgress
        } else {
            state
                .run_statuses
                .pop_front()
                .unwrap_or(RunStatus::Completed)
        };

        if status == RunStatus::Completed {
            let id = state.next_id("msg");
            let reply = text_message(id, MessageRole::Assistant, &state.reply_text.clone());
            if let Some(messages) = state.threads.get_mut(thread_id) {
                let already_replied = messages
                    .iter()
                    .any(|(owner, _)| owner.as_deref() == Some(run_id));
                if !already_replied {
                    messages.push((Some(run_id.to_string()), reply));
                }
            }
        }

        let last_error = (status == RunStatus::Failed).then(|| RunLastError {
            code: Some("server_error".to_string()),
            message: Some("The model crashed.".to_string()),
        });
        Box::pin(ready(Ok(Run {
            id: run_id.to_string(),
            status,
            last_error,
        })))
    }

    fn cancel_run<'a>(&'a self, _thread_id: &'a str, run_id: &'a str) -> RemoteFuture<'a, Run> {
        let mut state = self.lock();
        state.calls.push(Call::CancelRun(run_id.to_string()));
        Box::pin(ready(Ok(Run {
            id: run_id.to_string(),
            status: RunStatus::Cancelling,
            last_error: None,
        })))
    }

    fn latest_run_message<'a>(
        &'a self,
        thread_id: &'a str,
        run_id: &'a str,
    ) -> RemoteFuture<'a, Option<ThreadMessage>> {
        let mut state = self.lock();
        state.calls.push(Call::LatestMessage(run_id.to_string()));
        let message = state.threads.get(thread_id).and_then(|messages| {
            messages
                .iter()
                .rev()
                .find(|(owner, _)| owner.as_deref() == Some(run_id))
                .map(|(_, message)| message.clone())
        });
        Box::pin(ready(Ok(message)))
    }
}
