use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::DeployError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precedes: Option<String>,
    #[serde(default)]
    pub contract_addresses: BTreeMap<String, String>,
    pub signing_strategy: SignerConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_deployed_commit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SignerConfig {
    DirectKey {
        private_key_hex: String,
    },
    HardwareWallet {
        bridge_command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        account: Option<String>,
    },
    MultisigProposal {
        service_url: String,
        wallet_address: String,
        proposer: String,
    },
}

impl SignerConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DirectKey { .. } => "direct-key",
            Self::HardwareWallet { .. } => "hardware-wallet",
            Self::MultisigProposal { .. } => "multisig-proposal",
        }
    }
}

pub fn validate_environment_id(id: &str) -> Result<(), DeployError> {
    if id.is_empty() {
        return Err(DeployError::Validation(
            "environment id must not be empty".to_string(),
        ));
    }
    let valid = id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid || id.starts_with('-') || id.ends_with('-') {
        return Err(DeployError::Validation(format!(
            "environment id '{id}' must be lowercase alphanumeric with interior dashes"
        )));
    }
    Ok(())
}
