use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{current_unix_timestamp, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployPhase {
    Created,
    Queued,
    Executing,
    Complete,
    Failed,
}

impl DeployPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Queued => "queued",
            Self::Executing => "executing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRecord {
    pub upgrade_id: String,
    pub phase: DeployPhase,
    #[serde(default)]
    pub proposed_transactions: Vec<Transaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_request_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_at_unix: Option<u64>,
    #[serde(default)]
    pub deployed_contracts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub started_at_unix: u64,
    pub last_updated_at_unix: u64,
}

impl DeployRecord {
    pub fn new(upgrade_id: impl Into<String>, phase: DeployPhase) -> Self {
        let now = current_unix_timestamp();
        Self {
            upgrade_id: upgrade_id.into(),
            phase,
            proposed_transactions: Vec::new(),
            signature_request_ref: None,
            executable_at_unix: None,
            deployed_contracts: BTreeMap::new(),
            failure_reason: None,
            started_at_unix: now,
            last_updated_at_unix: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_updated_at_unix = current_unix_timestamp();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_progress: Option<DeployRecord>,
}

impl DeployManifest {
    pub fn active_record(&self) -> Option<&DeployRecord> {
        self.in_progress
            .as_ref()
            .filter(|record| !record.phase.is_terminal())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRequest {
    pub id: String,
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_transaction: Option<String>,
    #[serde(default)]
    pub result_metadata: BTreeMap<String, String>,
}

impl SignatureRequest {
    pub fn ready(id: impl Into<String>, signed_transaction: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: RequestStatus::Ready,
            signed_transaction: Some(signed_transaction.into()),
            result_metadata: BTreeMap::new(),
        }
    }

    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: RequestStatus::Pending,
            signed_transaction: None,
            result_metadata: BTreeMap::new(),
        }
    }

    pub fn failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut result_metadata = BTreeMap::new();
        result_metadata.insert("reason".to_string(), reason.into());
        Self {
            id: id.into(),
            status: RequestStatus::Failed,
            signed_transaction: None,
            result_metadata,
        }
    }

    pub fn failure_reason(&self) -> String {
        self.result_metadata
            .get("reason")
            .cloned()
            .unwrap_or_else(|| "signature request failed".to_string())
    }
}
