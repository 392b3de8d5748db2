use std::time::Duration;

use chainup_core::{DeployError, RequestStatus, SignatureRequest, Transaction};
use chainup_registry::FileStore;
use serde::{Deserialize, Serialize};

use crate::request_state::{read_request_state, write_request_state, RequestState};
use crate::SigningStrategy;

pub const MULTISIG_PROPOSAL_KIND: &str = "multisig-proposal";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalStatus {
    Pending,
    Ready { signed_transaction: String },
    Failed { reason: String },
}

pub trait CoordinationClient {
    fn propose(
        &self,
        wallet_address: &str,
        proposer: &str,
        transactions: &[Transaction],
    ) -> Result<String, DeployError>;

    fn proposal_status(&self, proposal_id: &str) -> Result<ProposalStatus, DeployError>;
}

pub struct HttpCoordinationClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[derive(Debug, Serialize)]
struct ProposeBody<'a> {
    wallet_address: &'a str,
    proposer: &'a str,
    transactions: &'a [Transaction],
}

#[derive(Debug, Deserialize)]
struct ProposeResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    signed_transaction: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

impl HttpCoordinationClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, DeployError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| {
                DeployError::Validation(format!(
                    "failed building multisig coordination client: {err}"
                ))
            })?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }
}

impl CoordinationClient for HttpCoordinationClient {
    fn propose(
        &self,
        wallet_address: &str,
        proposer: &str,
        transactions: &[Transaction],
    ) -> Result<String, DeployError> {
        let url = format!("{}/proposals", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&ProposeBody {
                wallet_address,
                proposer,
                transactions,
            })
            .send()
            .map_err(|err| {
                DeployError::Validation(format!("multisig proposal submission failed: {err}"))
            })?;
        if !response.status().is_success() {
            return Err(DeployError::Validation(format!(
                "multisig coordination service rejected the proposal: HTTP {}",
                response.status()
            )));
        }
        let parsed: ProposeResponse = response.json().map_err(|err| {
            DeployError::MalformedOutput {
                cause: format!("multisig coordination response did not parse: {err}"),
            }
        })?;
        Ok(parsed.id)
    }

    fn proposal_status(&self, proposal_id: &str) -> Result<ProposalStatus, DeployError> {
        let url = format!(
            "{}/proposals/{proposal_id}",
            self.base_url.trim_end_matches('/')
        );
        let response = self.client.get(&url).send().map_err(|err| {
            DeployError::Validation(format!("multisig status poll failed: {err}"))
        })?;
        if !response.status().is_success() {
            return Err(DeployError::Validation(format!(
                "multisig coordination service rejected the status poll: HTTP {}",
                response.status()
            )));
        }
        let parsed: StatusResponse = response.json().map_err(|err| {
            DeployError::MalformedOutput {
                cause: format!("multisig status response did not parse: {err}"),
            }
        })?;
        match parsed.status.as_str() {
            "pending" => Ok(ProposalStatus::Pending),
            "ready" => {
                let signed_transaction = parsed.signed_transaction.ok_or_else(|| {
                    DeployError::MalformedOutput {
                        cause: "multisig status 'ready' carried no signed transaction".to_string(),
                    }
                })?;
                Ok(ProposalStatus::Ready { signed_transaction })
            }
            "failed" => Ok(ProposalStatus::Failed {
                reason: parsed
                    .reason
                    .unwrap_or_else(|| "proposal failed".to_string()),
            }),
            other => Err(DeployError::MalformedOutput {
                cause: format!("multisig status '{other}' is not recognized"),
            }),
        }
    }
}

pub struct MultisigProposalSigner {
    store: FileStore,
    environment_id: String,
    client: Box<dyn CoordinationClient>,
    wallet_address: String,
    proposer: String,
}

impl MultisigProposalSigner {
    pub fn new(
        store: FileStore,
        environment_id: impl Into<String>,
        client: Box<dyn CoordinationClient>,
        wallet_address: impl Into<String>,
        proposer: impl Into<String>,
    ) -> Self {
        Self {
            store,
            environment_id: environment_id.into(),
            client,
            wallet_address: wallet_address.into(),
            proposer: proposer.into(),
        }
    }

    fn persist(&self, state: &RequestState) -> Result<(), DeployError> {
        write_request_state(&self.store, &self.environment_id, state)
    }
}

impl SigningStrategy for MultisigProposalSigner {
    fn kind(&self) -> &'static str {
        MULTISIG_PROPOSAL_KIND
    }

    fn validate_args(&self) -> Result<(), DeployError> {
        for (field, value) in [
            ("wallet address", &self.wallet_address),
            ("proposer", &self.proposer),
        ] {
            let stripped = value.strip_prefix("0x").unwrap_or(value);
            if stripped.is_empty() {
                return Err(DeployError::Validation(format!(
                    "multisig {field} must not be empty"
                )));
            }
            hex::decode(stripped).map_err(|err| {
                DeployError::Validation(format!(
                    "multisig {field} is not a valid hex address: {err}"
                ))
            })?;
        }
        Ok(())
    }

    fn forge_invocation_args(&self) -> Vec<String> {
        vec!["--sender".to_string(), self.wallet_address.clone()]
    }

    fn request_new(&self, transactions: &[Transaction]) -> Result<SignatureRequest, DeployError> {
        for transaction in transactions {
            transaction.validate_for_signing()?;
            transaction.validate_sender()?;
        }

        if let Some(state) = read_request_state(&self.store, &self.environment_id)? {
            if state.request.status == RequestStatus::Pending {
                return Err(DeployError::ConsistencyViolation(format!(
                    "signature request '{}' is still pending; poll latest() instead of proposing again",
                    state.request.id
                )));
            }
        }

        let proposal_id = self
            .client
            .propose(&self.wallet_address, &self.proposer, transactions)?;
        let request = SignatureRequest::pending(format!("multisig-{proposal_id}"));
        self.persist(&RequestState::new(
            MULTISIG_PROPOSAL_KIND,
            request.clone(),
            Some(proposal_id),
        ))?;
        Ok(request)
    }

    fn latest(&self) -> Result<Option<SignatureRequest>, DeployError> {
        let Some(state) = read_request_state(&self.store, &self.environment_id)? else {
            return Ok(None);
        };
        if state.strategy != MULTISIG_PROPOSAL_KIND {
            return Err(DeployError::ConsistencyViolation(format!(
                "persisted signature request belongs to strategy '{}', not '{MULTISIG_PROPOSAL_KIND}'",
                state.strategy
            )));
        }
        if state.request.status != RequestStatus::Pending {
            return Ok(Some(state.request));
        }
        let Some(proposal_id) = state.proposal_id.clone() else {
            return Err(DeployError::ConsistencyViolation(
                "pending multisig signature request has no proposal id".to_string(),
            ));
        };

        match self.client.proposal_status(&proposal_id)? {
            ProposalStatus::Pending => Ok(Some(state.request)),
            ProposalStatus::Ready { signed_transaction } => {
                let request =
                    SignatureRequest::ready(state.request.id.clone(), signed_transaction);
                self.persist(&RequestState {
                    request: request.clone(),
                    ..state
                })?;
                Ok(Some(request))
            }
            ProposalStatus::Failed { reason } => {
                let request = SignatureRequest::failed(state.request.id.clone(), reason);
                self.persist(&RequestState {
                    request: request.clone(),
                    ..state
                })?;
                Ok(Some(request))
            }
        }
    }
}
