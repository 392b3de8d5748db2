use anyhow::Result;
use chainup_core::{current_unix_timestamp, DeployError, SignatureRequest};
use chainup_registry::{signature_request_key, FileStore};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RequestState {
    pub version: u32,
    pub strategy: String,
    pub request: SignatureRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<String>,
    pub created_at_unix: u64,
}

impl RequestState {
    pub(crate) fn new(
        strategy: &str,
        request: SignatureRequest,
        proposal_id: Option<String>,
    ) -> Self {
        Self {
            version: 1,
            strategy: strategy.to_string(),
            request,
            proposal_id,
            created_at_unix: current_unix_timestamp(),
        }
    }
}

pub(crate) fn write_request_state(
    store: &FileStore,
    environment_id: &str,
    state: &RequestState,
) -> Result<(), DeployError> {
    store.update_json(&signature_request_key(environment_id), state)?;
    Ok(())
}

pub(crate) fn read_request_state(
    store: &FileStore,
    environment_id: &str,
) -> Result<Option<RequestState>, DeployError> {
    let state = store.get_json::<RequestState>(&signature_request_key(environment_id))?;
    Ok(state)
}

pub fn clear_request_state(store: &FileStore, environment_id: &str) -> Result<(), DeployError> {
    store.remove_file(&signature_request_key(environment_id))?;
    Ok(())
}
