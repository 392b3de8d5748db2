mod direct_key;
mod hardware;
mod multisig;
mod request_state;


pub use direct_key::DirectKeySigner;
pub use hardware::{DeviceTransport, HardwareWalletSigner, SubprocessBridgeTransport};
pub use multisig::{
    CoordinationClient, HttpCoordinationClient, MultisigProposalSigner, ProposalStatus,
};
pub use request_state::clear_request_state;

use chainup_core::{DeployError, Environment, SignatureRequest, SignerConfig, Transaction};
use chainup_registry::FileStore;

pub trait SigningStrategy {
    fn kind(&self) -> &'static str;
    fn validate_args(&self) -> Result<(), DeployError>;
    fn forge_invocation_args(&self) -> Vec<String>;
    fn request_new(&self, transactions: &[Transaction]) -> Result<SignatureRequest, DeployError>;
    fn latest(&self) -> Result<Option<SignatureRequest>, DeployError>;
}

pub fn strategy_for_environment(
    store: &FileStore,
    environment: &Environment,
) -> Result<Box<dyn SigningStrategy>, DeployError> {
    let strategy: Box<dyn SigningStrategy> = match &environment.signing_strategy {
        SignerConfig::DirectKey { private_key_hex } => Box::new(DirectKeySigner::new(
            store.clone(),
            &environment.id,
            private_key_hex,
        )),
        SignerConfig::HardwareWallet {
            bridge_command,
            account,
        } => {
            if bridge_command.trim().is_empty() {
                return Err(DeployError::Validation(
                    "hardware wallet bridge command must not be empty".to_string(),
                ));
            }
            Box::new(HardwareWalletSigner::new(
                store.clone(),
                &environment.id,
                Box::new(SubprocessBridgeTransport::new(bridge_command)),
                account.clone(),
            ))
        }
        SignerConfig::MultisigProposal {
            service_url,
            wallet_address,
            proposer,
        } => Box::new(MultisigProposalSigner::new(
            store.clone(),
            &environment.id,
            Box::new(HttpCoordinationClient::new(service_url)?),
            wallet_address,
            proposer,
        )),
    };
    strategy.validate_args()?;
    Ok(strategy)
}
