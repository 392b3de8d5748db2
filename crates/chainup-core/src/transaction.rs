use serde::{Deserialize, Serialize};

use crate::DeployError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub to: String,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl Transaction {
    pub fn validate_for_signing(&self) -> Result<(), DeployError> {
        if self.to.trim().is_empty() {
            return Err(DeployError::InvalidTransaction(
                "transaction 'to' address must not be empty".to_string(),
            ));
        }
        decode_hex_field("to", &self.to)?;
        decode_hex_field("data", &self.data)?;
        Ok(())
    }

    pub fn validate_sender(&self) -> Result<(), DeployError> {
        match &self.from {
            Some(from) if !from.trim().is_empty() => decode_hex_field("from", from).map(|_| ()),
            _ => Err(DeployError::InvalidTransaction(
                "transaction 'from' address is required by this signing strategy".to_string(),
            )),
        }
    }
}

pub fn canonical_signing_payload(transactions: &[Transaction]) -> Result<Vec<u8>, DeployError> {
    serde_json::to_vec(transactions)
        .map_err(|err| DeployError::Validation(format!("failed encoding transactions: {err}")))
}

fn decode_hex_field(field: &str, raw: &str) -> Result<Vec<u8>, DeployError> {
    let stripped = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(stripped).map_err(|err| {
        DeployError::InvalidTransaction(format!("transaction '{field}' is not valid hex: {err}"))
    })
}
