use std::collections::HashSet;

use chainup_core::{
    validate_environment_id, DeployError, Environment, UpgradeDefinition,
};

use crate::store::{content_digest, FileStore};
use crate::{environment_key, upgrade_key};

#[derive(Debug, Clone)]
pub struct EnvironmentRegistry {
    store: FileStore,
}

impl EnvironmentRegistry {
    pub fn new(store: FileStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub fn register_environment(&self, environment: &Environment) -> Result<(), DeployError> {
        validate_environment_id(&environment.id)?;
        if let Some(precedes) = &environment.precedes {
            validate_environment_id(precedes)?;
        }
        self.ensure_acyclic(environment)?;

        let key = environment_key(&environment.id);
        if self.store.get_file(&key)?.is_some() {
            return Err(DeployError::Validation(format!(
                "environment '{}' already exists",
                environment.id
            )));
        }
        self.store.compare_and_swap_json(&key, None, environment)
    }

    pub fn load_environment(&self, environment_id: &str) -> Result<Environment, DeployError> {
        let (environment, _) = self.environment_snapshot(environment_id)?;
        Ok(environment)
    }

    pub fn environment_snapshot(
        &self,
        environment_id: &str,
    ) -> Result<(Environment, String), DeployError> {
        validate_environment_id(environment_id)?;
        let key = environment_key(environment_id);
        let Some(bytes) = self.store.get_file(&key)? else {
            return Err(DeployError::Validation(format!(
                "unknown environment '{environment_id}'"
            )));
        };
        let environment: Environment = serde_json::from_slice(&bytes).map_err(|err| {
            DeployError::ConsistencyViolation(format!(
                "environment record '{environment_id}' is unreadable: {err}"
            ))
        })?;
        if environment.id != environment_id {
            return Err(DeployError::ConsistencyViolation(format!(
                "environment record at '{key}' names id '{}'",
                environment.id
            )));
        }
        Ok((environment, content_digest(&bytes)))
    }

    pub fn update_environment(
        &self,
        environment: &Environment,
        expected_digest: &str,
    ) -> Result<(), DeployError> {
        validate_environment_id(&environment.id)?;
        self.ensure_acyclic(environment)?;
        let key = environment_key(&environment.id);
        self.store
            .compare_and_swap_json(&key, Some(expected_digest), environment)
    }

    pub fn list_environments(&self) -> Result<Vec<String>, DeployError> {
        Ok(self.store.subdirectories("environments")?)
    }

    pub fn register_upgrade(&self, definition_toml: &str) -> Result<UpgradeDefinition, DeployError> {
        let definition = UpgradeDefinition::from_toml_str(definition_toml)
            .map_err(|err| DeployError::Validation(format!("{err:#}")))?;
        let key = upgrade_key(&definition.id);
        if self.store.get_file(&key)?.is_some() {
            return Err(DeployError::Validation(format!(
                "upgrade '{}' is already registered; upgrades are immutable once registered",
                definition.id
            )));
        }
        self.store
            .compare_and_swap(&key, None, definition_toml.as_bytes())?;
        Ok(definition)
    }

    pub fn load_upgrade(&self, upgrade_id: &str) -> Result<UpgradeDefinition, DeployError> {
        let key = upgrade_key(upgrade_id);
        let Some(bytes) = self.store.get_file(&key)? else {
            return Err(DeployError::Validation(format!(
                "unknown upgrade '{upgrade_id}'"
            )));
        };
        let raw = String::from_utf8(bytes).map_err(|err| {
            DeployError::ConsistencyViolation(format!(
                "upgrade definition '{upgrade_id}' is not UTF-8: {err}"
            ))
        })?;
        let definition = UpgradeDefinition::from_toml_str(&raw).map_err(|err| {
            DeployError::ConsistencyViolation(format!(
                "upgrade definition '{upgrade_id}' is unreadable: {err:#}"
            ))
        })?;
        if definition.id != upgrade_id {
            return Err(DeployError::ConsistencyViolation(format!(
                "upgrade definition at '{key}' names id '{}'",
                definition.id
            )));
        }
        Ok(definition)
    }

    fn ensure_acyclic(&self, candidate: &Environment) -> Result<(), DeployError> {
        let mut seen = HashSet::new();
        seen.insert(candidate.id.clone());

        let mut cursor = candidate.precedes.clone();
        while let Some(next_id) = cursor {
            if !seen.insert(next_id.clone()) {
                return Err(DeployError::ConsistencyViolation(format!(
                    "environment precedence cycle through '{}' and '{}'",
                    candidate.id, next_id
                )));
            }
            cursor = match self.store.get_json::<Environment>(&environment_key(&next_id))? {
                Some(environment) => environment.precedes,
                None => None,
            };
        }
        Ok(())
    }
}
