use anyhow::{anyhow, Context, Result};
use chainup_core::current_unix_timestamp;
use chainup_registry::{FileStore, SESSION_KEY};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub operator: String,
    pub logged_in_at_unix: u64,
}

pub fn write_session(store: &FileStore, operator: &str) -> Result<Session> {
    let operator = operator.trim();
    if operator.is_empty() {
        return Err(anyhow!("operator name must not be empty"));
    }
    let session = Session {
        operator: operator.to_string(),
        logged_in_at_unix: current_unix_timestamp(),
    };
    let payload = toml::to_string_pretty(&session).context("failed serializing session")?;
    store.update_file(SESSION_KEY, payload.as_bytes())?;
    Ok(session)
}

pub fn load_session(store: &FileStore) -> Result<Session> {
    let Some(bytes) = store.get_file(SESSION_KEY)? else {
        return Err(anyhow!("not logged in; run 'chainup login' first"));
    };
    let raw = String::from_utf8(bytes).context("session file is not UTF-8")?;
    toml::from_str(&raw).context("failed parsing session file")
}
