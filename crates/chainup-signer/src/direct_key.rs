use chainup_core::{
    canonical_signing_payload, DeployError, SignatureRequest, Transaction,
};
use chainup_registry::FileStore;
use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};

use crate::request_state::{read_request_state, write_request_state, RequestState};
use crate::SigningStrategy;

pub const DIRECT_KEY_KIND: &str = "direct-key";

#[derive(Debug, Clone)]
pub struct DirectKeySigner {
    store: FileStore,
    environment_id: String,
    private_key_hex: String,
}

impl DirectKeySigner {
    pub fn new(
        store: FileStore,
        environment_id: impl Into<String>,
        private_key_hex: impl Into<String>,
    ) -> Self {
        Self {
            store,
            environment_id: environment_id.into(),
            private_key_hex: private_key_hex.into(),
        }
    }

    fn signing_key(&self) -> Result<SigningKey, DeployError> {
        let stripped = self
            .private_key_hex
            .strip_prefix("0x")
            .unwrap_or(&self.private_key_hex);
        let bytes = hex::decode(stripped).map_err(|err| {
            DeployError::Validation(format!("private key is not valid hex: {err}"))
        })?;
        let key_bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            DeployError::Validation(
                "private key must be exactly 32 bytes of hex".to_string(),
            )
        })?;
        Ok(SigningKey::from_bytes(&key_bytes))
    }
}

impl SigningStrategy for DirectKeySigner {
    fn kind(&self) -> &'static str {
        DIRECT_KEY_KIND
    }

    fn validate_args(&self) -> Result<(), DeployError> {
        self.signing_key().map(|_| ())
    }

    fn forge_invocation_args(&self) -> Vec<String> {
        vec!["--private-key".to_string(), self.private_key_hex.clone()]
    }

    fn request_new(&self, transactions: &[Transaction]) -> Result<SignatureRequest, DeployError> {
        for transaction in transactions {
            transaction.validate_for_signing()?;
        }
        let signing_key = self.signing_key()?;

        let payload = canonical_signing_payload(transactions)?;
        let digest = Sha256::digest(&payload);
        let signature = signing_key.sign(&digest);

        let mut signed = signature.to_bytes().to_vec();
        signed.extend_from_slice(&payload);

        let digest_hex = hex::encode(digest);
        let mut request = SignatureRequest::ready(
            format!("direct-{}", &digest_hex[..16]),
            hex::encode(signed),
        );
        request.result_metadata.insert(
            "public_key".to_string(),
            hex::encode(signing_key.verifying_key().to_bytes()),
        );

        write_request_state(
            &self.store,
            &self.environment_id,
            &RequestState::new(DIRECT_KEY_KIND, request.clone(), None),
        )?;
        Ok(request)
    }

    fn latest(&self) -> Result<Option<SignatureRequest>, DeployError> {
        let Some(state) = read_request_state(&self.store, &self.environment_id)? else {
            return Ok(None);
        };
        if state.strategy != DIRECT_KEY_KIND {
            return Err(DeployError::ConsistencyViolation(format!(
                "persisted signature request belongs to strategy '{}', not '{DIRECT_KEY_KIND}'",
                state.strategy
            )));
        }
        Ok(Some(state.request))
    }
}
