use chainup_core::{DeployError, DeployManifest};

use crate::deploy_manifest_key;
use crate::store::{content_digest, FileStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSnapshot {
    pub manifest: DeployManifest,
    pub digest: Option<String>,
}

pub fn read_deploy_manifest(
    store: &FileStore,
    environment_id: &str,
) -> Result<ManifestSnapshot, DeployError> {
    let key = deploy_manifest_key(environment_id);
    let Some(bytes) = store.get_file(&key)? else {
        return Ok(ManifestSnapshot {
            manifest: DeployManifest::default(),
            digest: None,
        });
    };
    let manifest: DeployManifest = serde_json::from_slice(&bytes).map_err(|err| {
        DeployError::ConsistencyViolation(format!(
            "deploy manifest for '{environment_id}' is unreadable: {err}"
        ))
    })?;
    Ok(ManifestSnapshot {
        manifest,
        digest: Some(content_digest(&bytes)),
    })
}

pub fn write_deploy_manifest(
    store: &FileStore,
    environment_id: &str,
    expected_digest: Option<&str>,
    manifest: &DeployManifest,
) -> Result<String, DeployError> {
    let key = deploy_manifest_key(environment_id);
    let bytes = serde_json::to_vec_pretty(manifest).map_err(|err| {
        DeployError::Internal(anyhow::anyhow!(
            "failed serializing deploy manifest for '{environment_id}': {err}"
        ))
    })?;
    store.compare_and_swap(&key, expected_digest, &bytes)?;
    Ok(content_digest(&bytes))
}
