use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("upgrade script exited with code {code}: {stderr_tail}")]
    SubprocessFailure { code: i32, stderr_tail: String },

    #[error("upgrade script produced no structured output line")]
    NoStructuredOutput,

    #[error("upgrade script structured output did not parse: {cause}")]
    MalformedOutput { cause: String },

    #[error("signing device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("signing request rejected on device")]
    UserRejected,

    #[error("deploy already in progress for environment '{environment}' (upgrade '{upgrade_id}')")]
    DeployInProgress {
        environment: String,
        upgrade_id: String,
    },

    #[error("concurrent modification of '{path}'; refresh state and retry")]
    ConcurrentModification { path: String },

    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl DeployError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}
