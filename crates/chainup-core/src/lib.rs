mod environment;
mod error;
mod manifest;
mod transaction;
mod upgrade;


pub use environment::{validate_environment_id, Environment, SignerConfig};
pub use error::DeployError;
pub use manifest::{
    DeployManifest, DeployPhase, DeployRecord, RequestStatus, SignatureRequest,
};
pub use transaction::{canonical_signing_payload, Transaction};
pub use upgrade::{PhaseSpec, UpgradeDefinition, UpgradePhase};

use std::time::{SystemTime, UNIX_EPOCH};

pub fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
