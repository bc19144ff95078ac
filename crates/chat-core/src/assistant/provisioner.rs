use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use super::AssistantConfig;
use crate::openai::{
    AssistantUpdate, AssistantsApi, KnowledgeUpload, NewAssistant, RemoteAssistant, RemoteError,
};
use crate::store::{KeyValueStore, StoreError};

pub const RECORD_ASSISTANT_ID_KEY: &str = "assistant_id";
pub const RECORD_KNOWLEDGE_DIGEST_KEY: &str = "knowledge_source_sha256";
pub const RECORD_PROVISIONED_AT_KEY: &str = "provisioned_at";

const DIGEST_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("knowledge source {0} not found")]
    MissingKnowledgeSource(String),
    #[error("failed to read knowledge source {path}: {source}")]
    ReadKnowledgeSource {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("failed to persist assistant record: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Reused,
    Updated,
    Created,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedAssistant {
    pub assistant_id: String,
    pub instructions: String,
    pub outcome: ProvisionOutcome,
}

#[derive(Debug)]
struct StoredRecord {
    assistant_id: String,
    knowledge_digest: Option<String>,
}

#[derive(Debug, Error)]
enum ReuseRejection {
    #[error("knowledge source changed (recorded {recorded}, current {current})")]
    KnowledgeChanged { recorded: String, current: String },
    #[error("lookup failed: {0}")]
    Retrieve(RemoteError),
    #[error("drift repair failed: {0}")]
    Update(RemoteError),
}

/// Creates, reuses, or repairs the deployment's single remote assistant.
pub struct Provisioner {
    api: Arc<dyn AssistantsApi>,
    store: Arc<dyn KeyValueStore>,
}

impl Provisioner {
    pub fn new(api: Arc<dyn AssistantsApi>, store: Arc<dyn KeyValueStore>) -> Self {
        Self { api, store }
    }

    pub async fn ensure_assistant(
        &self,
        config: &AssistantConfig,
    ) -> Result<ProvisionedAssistant, ProvisionError> {
        let current_digest = match knowledge_digest(&config.knowledge_source_path).await {
            Ok(digest) => Some(digest),
            Err(ProvisionError::MissingKnowledgeSource(_)) => None,
            Err(err) => {
                warn!(error = %err, "knowledge source unreadable; skipping change check");
                None
            }
        };

        if let Some(record) = self.load_record() {
            match self
                .reuse(&record, config, current_digest.as_deref())
                .await
            {
                Ok(outcome) => {
                    info!(
                        assistant_id = %record.assistant_id,
                        outcome = ?outcome,
                        "loaded existing assistant"
                    );
                    return Ok(ProvisionedAssistant {
                        assistant_id: record.assistant_id,
                        instructions: config.instructions.clone(),
                        outcome,
                    });
                }
                Err(rejection) => {
                    warn!(
                        assistant_id = %record.assistant_id,
                        reason = %rejection,
                        "cached assistant is unusable; rebuilding"
                    );
                }
            }
        }

        self.create(config, current_digest).await
    }

    async fn reuse(
        &self,
        record: &StoredRecord,
        config: &AssistantConfig,
        current_digest: Option<&str>,
    ) -> Result<ProvisionOutcome, ReuseRejection> {
        if let (Some(recorded), Some(current)) = (record.knowledge_digest.as_deref(), current_digest)
            && recorded != current
        {
            return Err(ReuseRejection::KnowledgeChanged {
                recorded: recorded.to_string(),
                current: current.to_string(),
            });
        }

        let remote = self
            .api
            .retrieve_assistant(&record.assistant_id)
            .await
            .map_err(ReuseRejection::Retrieve)?;

        let update = drift_update(&remote, config);
        if update.is_empty() {
            return Ok(ProvisionOutcome::Reused);
        }

        info!(
            assistant_id = %record.assistant_id,
            instructions_drifted = update.instructions.is_some(),
            model_drifted = update.model.is_some(),
            "repairing assistant configuration drift"
        );
        self.api
            .update_assistant(&record.assistant_id, update)
            .await
            .map_err(ReuseRejection::Update)?;

        Ok(ProvisionOutcome::Updated)
    }

    async fn create(
        &self,
        config: &AssistantConfig,
        current_digest: Option<String>,
    ) -> Result<ProvisionedAssistant, ProvisionError> {
        let digest = match current_digest {
            Some(digest) => digest,
            None => knowledge_digest(&config.knowledge_source_path).await?,
        };

        let uploaded = self
            .api
            .upload_knowledge(KnowledgeUpload {
                path: config.knowledge_source_path.clone(),
            })
            .await?;

        let created = self
            .api
            .create_assistant(NewAssistant {
                name: config.name.clone(),
                model: config.model.clone(),
                instructions: config.instructions.clone(),
                knowledge_file_ids: vec![uploaded.id.clone()],
            })
            .await?;

        self.store.write_many(vec![
            (
                RECORD_ASSISTANT_ID_KEY.to_string(),
                Value::String(created.id.clone()),
            ),
            (RECORD_KNOWLEDGE_DIGEST_KEY.to_string(), Value::String(digest)),
            (
                RECORD_PROVISIONED_AT_KEY.to_string(),
                Value::String(Utc::now().to_rfc3339()),
            ),
        ])?;

        info!(
            assistant_id = %created.id,
            file_id = %uploaded.id,
            model = %config.model,
            "created new assistant"
        );

        Ok(ProvisionedAssistant {
            assistant_id: created.id,
            instructions: config.instructions.clone(),
            outcome: ProvisionOutcome::Created,
        })
    }

    fn load_record(&self) -> Option<StoredRecord> {
        let assistant_id = match self.store.read(RECORD_ASSISTANT_ID_KEY) {
            Ok(Some(Value::String(id))) if !id.trim().is_empty() => id.trim().to_string(),
            Ok(Some(other)) => {
                warn!(value = %other, "ignoring malformed assistant record");
                return None;
            }
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "failed to read assistant record");
                return None;
            }
        };

        let knowledge_digest = match self.store.read(RECORD_KNOWLEDGE_DIGEST_KEY) {
            Ok(Some(Value::String(digest))) => Some(digest),
            _ => None,
        };

        Some(StoredRecord {
            assistant_id,
            knowledge_digest,
        })
    }
}

fn drift_update(remote: &RemoteAssistant, config: &AssistantConfig) -> AssistantUpdate {
    let instructions = (remote.instructions.as_deref() != Some(config.instructions.as_str()))
        .then(|| config.instructions.clone());
    let model = remote
        .model
        .as_deref()
        .filter(|model| *model != config.model)
        .map(|_| config.model.clone());

    AssistantUpdate {
        instructions,
        model,
    }
}

/// Hex SHA-256 of the knowledge document, hashed in chunks.
async fn knowledge_digest(path: &Path) -> Result<String, ProvisionError> {
    let read_error = |source: std::io::Error| {
        if source.kind() == IoErrorKind::NotFound {
            ProvisionError::MissingKnowledgeSource(path.display().to_string())
        } else {
            ProvisionError::ReadKnowledgeSource {
                path: path.display().to_string(),
                source,
            }
        }
    };

    let mut file = File::open(path).await.map_err(read_error)?;
    let mut hasher = Sha256::new();
    let mut chunk = vec![0_u8; DIGEST_CHUNK_BYTES];
    loop {
        let read = file.read(&mut chunk).await.map_err(read_error)?;
        if read == 0 {
            break;
        }
        hasher.update(&chunk[..read]);
    }

    Ok(hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect())
}
