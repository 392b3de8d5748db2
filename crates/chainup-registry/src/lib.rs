mod environments;
mod manifest_state;
mod store;

#[cfg(test)]
mod tests;

pub use environments::EnvironmentRegistry;
pub use manifest_state::{read_deploy_manifest, write_deploy_manifest, ManifestSnapshot};
pub use store::{content_digest, FileStore, Snapshot};

pub fn environment_key(environment_id: &str) -> String {
    format!("environments/{environment_id}/env.json")
}

pub fn deploy_manifest_key(environment_id: &str) -> String {
    format!("environments/{environment_id}/deploy-manifest.json")
}

pub fn signature_request_key(environment_id: &str) -> String {
    format!("environments/{environment_id}/signature-request.json")
}

pub fn upgrade_key(upgrade_id: &str) -> String {
    format!("upgrades/{upgrade_id}.toml")
}

pub const SESSION_KEY: &str = "session.toml";
