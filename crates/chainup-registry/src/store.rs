use std::fs;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chainup_core::DeployError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub bytes: Option<Vec<u8>>,
    pub digest: Option<String>,
}

pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub fn get_file(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("failed reading store file: {}", path.display()))
            }
        }
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(bytes) = self.get_file(key)? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed parsing store file as JSON: {key}"))?;
        Ok(Some(value))
    }

    pub fn snapshot(&self, key: &str) -> Result<Snapshot> {
        let bytes = self.get_file(key)?;
        let digest = bytes.as_deref().map(content_digest);
        Ok(Snapshot { bytes, digest })
    }

    pub fn update_file(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.resolve(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        write_replacing(&path, bytes)
    }

    pub fn update_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)
            .with_context(|| format!("failed serializing store file: {key}"))?;
        self.update_file(key, &bytes)
    }

    pub fn compare_and_swap(
        &self,
        key: &str,
        expected_digest: Option<&str>,
        bytes: &[u8],
    ) -> Result<(), DeployError> {
        let path = self.resolve(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        match expected_digest {
            None => {
                let mut file = match fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&path)
                {
                    Ok(file) => file,
                    Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                        return Err(DeployError::ConcurrentModification {
                            path: key.to_string(),
                        });
                    }
                    Err(err) => {
                        return Err(DeployError::Internal(anyhow::Error::new(err).context(
                            format!("failed to claim store file: {}", path.display()),
                        )));
                    }
                };
                file.write_all(bytes)
                    .with_context(|| format!("failed writing store file: {}", path.display()))?;
                file.flush()
                    .with_context(|| format!("failed flushing store file: {}", path.display()))?;
                Ok(())
            }
            Some(expected) => {
                let current = self.get_file(key)?;
                let matched = current
                    .as_deref()
                    .map(content_digest)
                    .is_some_and(|digest| digest == expected);
                if !matched {
                    return Err(DeployError::ConcurrentModification {
                        path: key.to_string(),
                    });
                }
                write_replacing(&path, bytes)?;
                Ok(())
            }
        }
    }

    pub fn compare_and_swap_json<T: Serialize>(
        &self,
        key: &str,
        expected_digest: Option<&str>,
        value: &T,
    ) -> Result<(), DeployError> {
        let bytes = serde_json::to_vec_pretty(value)
            .with_context(|| format!("failed serializing store file: {key}"))?;
        self.compare_and_swap(key, expected_digest, &bytes)
    }

    pub fn remove_file(&self, key: &str) -> Result<()> {
        let path = self.resolve(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed removing store file: {}", path.display()))
            }
        }
    }

    pub fn subdirectories(&self, key: &str) -> Result<Vec<String>> {
        let dir = self.resolve(key);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("failed reading store directory: {}", dir.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

fn write_replacing(path: &Path, bytes: &[u8]) -> Result<()> {
    let staged = staging_path(path);
    fs::write(&staged, bytes)
        .with_context(|| format!("failed staging store file: {}", staged.display()))?;
    fs::rename(&staged, path)
        .with_context(|| format!("failed replacing store file: {}", path.display()))
}

fn staging_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "store-file".to_string());
    path.with_file_name(format!(".{}.staged-{}", file_name, std::process::id()))
}
