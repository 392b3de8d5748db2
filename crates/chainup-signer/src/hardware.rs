use std::process::Command;

use chainup_core::{
    canonical_signing_payload, DeployError, SignatureRequest, Transaction,
};
use chainup_forge::first_structured_line;
use chainup_registry::FileStore;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::request_state::{read_request_state, write_request_state, RequestState};
use crate::SigningStrategy;

pub const HARDWARE_WALLET_KIND: &str = "hardware-wallet";

pub trait DeviceTransport {
    fn describe(&self) -> String;
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, DeployError>;
}

pub struct SubprocessBridgeTransport {
    command: String,
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    status: String,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

impl SubprocessBridgeTransport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl DeviceTransport for SubprocessBridgeTransport {
    fn describe(&self) -> String {
        format!("bridge command '{}'", self.command)
    }

    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, DeployError> {
        let output = Command::new(&self.command)
            .arg("sign")
            .arg(hex::encode(payload))
            .output()
            .map_err(|err| {
                DeployError::DeviceUnavailable(format!(
                    "failed launching {}: {err}",
                    self.describe()
                ))
            })?;
        if !output.status.success() {
            return Err(DeployError::DeviceUnavailable(format!(
                "{} exited with code {}: {}",
                self.describe(),
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let Some(line) = first_structured_line(&stdout) else {
            return Err(DeployError::DeviceUnavailable(format!(
                "{} produced no structured response",
                self.describe()
            )));
        };
        let response: BridgeResponse =
            serde_json::from_str(line).map_err(|err| DeployError::MalformedOutput {
                cause: format!("device bridge response did not parse: {err}"),
            })?;

        match response.status.as_str() {
            "signed" => {
                let signature = response.signature.ok_or_else(|| {
                    DeployError::MalformedOutput {
                        cause: "device bridge reported 'signed' without a signature".to_string(),
                    }
                })?;
                hex::decode(signature.strip_prefix("0x").unwrap_or(&signature)).map_err(|err| {
                    DeployError::MalformedOutput {
                        cause: format!("device bridge signature is not valid hex: {err}"),
                    }
                })
            }
            "rejected" => Err(DeployError::UserRejected),
            other => Err(DeployError::DeviceUnavailable(format!(
                "device bridge reported status '{}': {}",
                other,
                response.reason.unwrap_or_default()
            ))),
        }
    }
}

pub struct HardwareWalletSigner {
    store: FileStore,
    environment_id: String,
    transport: Box<dyn DeviceTransport>,
    account: Option<String>,
}

impl HardwareWalletSigner {
    pub fn new(
        store: FileStore,
        environment_id: impl Into<String>,
        transport: Box<dyn DeviceTransport>,
        account: Option<String>,
    ) -> Self {
        Self {
            store,
            environment_id: environment_id.into(),
            transport,
            account,
        }
    }
}

impl SigningStrategy for HardwareWalletSigner {
    fn kind(&self) -> &'static str {
        HARDWARE_WALLET_KIND
    }

    fn validate_args(&self) -> Result<(), DeployError> {
        if self.transport.describe().trim().is_empty() {
            return Err(DeployError::Validation(
                "hardware wallet transport must be configured".to_string(),
            ));
        }
        if let Some(account) = &self.account {
            let stripped = account.strip_prefix("0x").unwrap_or(account);
            hex::decode(stripped).map_err(|err| {
                DeployError::Validation(format!(
                    "hardware wallet account is not a valid hex address: {err}"
                ))
            })?;
        }
        Ok(())
    }

    fn forge_invocation_args(&self) -> Vec<String> {
        let mut args = vec!["--hardware-wallet".to_string()];
        if let Some(account) = &self.account {
            args.push("--sender".to_string());
            args.push(account.clone());
        }
        args
    }

    fn request_new(&self, transactions: &[Transaction]) -> Result<SignatureRequest, DeployError> {
        for transaction in transactions {
            transaction.validate_for_signing()?;
        }

        let payload = canonical_signing_payload(transactions)?;
        let digest = Sha256::digest(&payload);
        let signature = self.transport.sign(&digest)?;

        let mut signed = signature;
        signed.extend_from_slice(&payload);

        let digest_hex = hex::encode(digest);
        let request = SignatureRequest::ready(
            format!("hw-{}", &digest_hex[..16]),
            hex::encode(signed),
        );
        write_request_state(
            &self.store,
            &self.environment_id,
            &RequestState::new(HARDWARE_WALLET_KIND, request.clone(), None),
        )?;
        Ok(request)
    }

    fn latest(&self) -> Result<Option<SignatureRequest>, DeployError> {
        let Some(state) = read_request_state(&self.store, &self.environment_id)? else {
            return Ok(None);
        };
        if state.strategy != HARDWARE_WALLET_KIND {
            return Err(DeployError::ConsistencyViolation(format!(
                "persisted signature request belongs to strategy '{}', not '{HARDWARE_WALLET_KIND}'",
                state.strategy
            )));
        }
        Ok(Some(state.request))
    }
}
