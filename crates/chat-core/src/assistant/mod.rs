use std::path::PathBuf;

mod prompts;
mod provisioner;
mod turn;

#[cfg(test)]
mod fake;

pub use prompts::DEFAULT_INSTRUCTIONS;
pub use provisioner::{
    ProvisionError, ProvisionOutcome, ProvisionedAssistant, Provisioner, RECORD_ASSISTANT_ID_KEY,
    RECORD_KNOWLEDGE_DIGEST_KEY, RECORD_PROVISIONED_AT_KEY,
};
pub use turn::{INVALID_INPUT_MESSAGE, TurnError, TurnExecutor, TurnSettings};

/// Desired shape of the deployment's single assistant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantConfig {
    pub name: String,
    pub instructions: String,
    pub model: String,
    pub knowledge_source_path: PathBuf,
}
