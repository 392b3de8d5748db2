use std::path::Path;

use chainup_core::{
    current_unix_timestamp, DeployError, DeployManifest, DeployPhase, DeployRecord, Environment,
    RequestStatus, UpgradeDefinition, UpgradePhase,
};
use chainup_forge::ActionBuilder;
use chainup_registry::{
    read_deploy_manifest, write_deploy_manifest, EnvironmentRegistry, FileStore,
};
use chainup_signer::{clear_request_state, strategy_for_environment, SigningStrategy};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    PhaseCompleted { phase: DeployPhase },
    SignaturePending { request_id: String },
    TimelockPending { until_unix: u64 },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployStatus {
    pub environment: Environment,
    pub record: Option<DeployRecord>,
}

#[derive(Debug, Clone)]
pub struct Coordinator {
    store: FileStore,
    registry: EnvironmentRegistry,
    builder: ActionBuilder,
}

impl Coordinator {
    pub fn new(store: FileStore, builder: ActionBuilder) -> Self {
        let registry = EnvironmentRegistry::new(store.clone());
        Self {
            store,
            registry,
            builder,
        }
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub fn registry(&self) -> &EnvironmentRegistry {
        &self.registry
    }

    pub fn begin(
        &self,
        environment_id: &str,
        upgrade_id: &str,
    ) -> Result<DeployRecord, DeployError> {
        self.registry.load_environment(environment_id)?;
        let definition = self.registry.load_upgrade(upgrade_id)?;
        let first_phase = definition.first_phase().ok_or_else(|| {
            DeployError::ConsistencyViolation(format!(
                "upgrade '{upgrade_id}' defines no phases"
            ))
        })?;

        let snapshot = read_deploy_manifest(&self.store, environment_id)?;
        if let Some(active) = snapshot.manifest.active_record() {
            return Err(DeployError::DeployInProgress {
                environment: environment_id.to_string(),
                upgrade_id: active.upgrade_id.clone(),
            });
        }

        let record = DeployRecord::new(upgrade_id, first_phase.record_phase());
        let manifest = DeployManifest {
            in_progress: Some(record.clone()),
        };
        write_deploy_manifest(
            &self.store,
            environment_id,
            snapshot.digest.as_deref(),
            &manifest,
        )?;
        clear_request_state(&self.store, environment_id)?;
        Ok(record)
    }

    pub fn advance(&self, environment_id: &str) -> Result<AdvanceOutcome, DeployError> {
        let environment = self.registry.load_environment(environment_id)?;
        let strategy = strategy_for_environment(&self.store, &environment)?;
        self.advance_with_strategy(environment_id, strategy.as_ref())
    }

    pub fn advance_with_strategy(
        &self,
        environment_id: &str,
        strategy: &dyn SigningStrategy,
    ) -> Result<AdvanceOutcome, DeployError> {
        self.advance_at(environment_id, strategy, current_unix_timestamp())
    }

    pub fn advance_at(
        &self,
        environment_id: &str,
        strategy: &dyn SigningStrategy,
        now_unix: u64,
    ) -> Result<AdvanceOutcome, DeployError> {
        let snapshot = read_deploy_manifest(&self.store, environment_id)?;
        let Some(record) = snapshot.manifest.active_record().cloned() else {
            return Err(DeployError::Validation(format!(
                "no deploy in progress for environment '{environment_id}'"
            )));
        };
        let manifest_digest = snapshot.digest.ok_or_else(|| {
            DeployError::ConsistencyViolation(format!(
                "deploy manifest for '{environment_id}' holds a record but has no content"
            ))
        })?;

        let definition = self.registry.load_upgrade(&record.upgrade_id)?;
        let phase = definition.phase_for_record(record.phase).ok_or_else(|| {
            DeployError::ConsistencyViolation(format!(
                "deploy record for '{environment_id}' is already terminal"
            ))
        })?;
        if definition.phase_spec(phase).is_none() {
            return Err(DeployError::ConsistencyViolation(format!(
                "deploy record for '{environment_id}' is in phase '{}' but upgrade '{}' does not define it",
                phase.as_str(),
                definition.id
            )));
        }

        if record.signature_request_ref.is_some() {
            return self.poll_outstanding(
                environment_id,
                record,
                manifest_digest,
                &definition,
                phase,
                strategy,
            );
        }

        if phase == UpgradePhase::Execute && definition.has_queue_phase() {
            if let Some(until) = record.executable_at_unix {
                if now_unix < until {
                    return Ok(AdvanceOutcome::TimelockPending { until_unix: until });
                }
            }
        }

        self.launch_phase(
            environment_id,
            record,
            manifest_digest,
            &definition,
            phase,
            strategy,
        )
    }

    fn launch_phase(
        &self,
        environment_id: &str,
        mut record: DeployRecord,
        manifest_digest: String,
        definition: &UpgradeDefinition,
        phase: UpgradePhase,
        strategy: &dyn SigningStrategy,
    ) -> Result<AdvanceOutcome, DeployError> {
        let spec = definition
            .phase_spec(phase)
            .ok_or_else(|| {
                DeployError::ConsistencyViolation(format!(
                    "upgrade '{}' lost its '{}' phase",
                    definition.id,
                    phase.as_str()
                ))
            })?;

        let mut args = spec.args.clone();
        args.extend(strategy.forge_invocation_args());
        let result = self.builder.build(Path::new(&spec.script), &args)?;

        record
            .deployed_contracts
            .extend(result.deployed_contracts.clone());
        if phase == UpgradePhase::Queue {
            record.executable_at_unix = result.timelock_eta_unix;
        }

        if result.transactions.is_empty() {
            return self.complete_phase(environment_id, record, manifest_digest, definition, phase);
        }

        for transaction in &result.transactions {
            transaction.validate_for_signing()?;
        }
        record.proposed_transactions = result.transactions.clone();

        let request = match strategy.latest()? {
            Some(existing) if existing.status == RequestStatus::Pending => existing,
            _ => strategy.request_new(&result.transactions)?,
        };

        record.signature_request_ref = Some(request.id.clone());
        record.touch();
        let manifest = DeployManifest {
            in_progress: Some(record.clone()),
        };
        let manifest_digest =
            write_deploy_manifest(&self.store, environment_id, Some(&manifest_digest), &manifest)?;

        match request.status {
            RequestStatus::Pending => Ok(AdvanceOutcome::SignaturePending {
                request_id: request.id,
            }),
            RequestStatus::Ready => {
                self.complete_phase(environment_id, record, manifest_digest, definition, phase)
            }
            RequestStatus::Failed => {
                self.mark_failed(environment_id, record, manifest_digest, request.failure_reason())
            }
        }
    }

    fn poll_outstanding(
        &self,
        environment_id: &str,
        mut record: DeployRecord,
        manifest_digest: String,
        definition: &UpgradeDefinition,
        phase: UpgradePhase,
        strategy: &dyn SigningStrategy,
    ) -> Result<AdvanceOutcome, DeployError> {
        let expected_ref = record
            .signature_request_ref
            .clone()
            .unwrap_or_default();
        let request = strategy.latest()?.ok_or_else(|| {
            DeployError::ConsistencyViolation(format!(
                "deploy record for '{environment_id}' references signature request '{expected_ref}' but none is persisted"
            ))
        })?;
        if request.id != expected_ref {
            return Err(DeployError::ConsistencyViolation(format!(
                "deploy record for '{environment_id}' references signature request '{expected_ref}' but the persisted request is '{}'",
                request.id
            )));
        }

        match request.status {
            RequestStatus::Pending => Ok(AdvanceOutcome::SignaturePending {
                request_id: request.id,
            }),
            RequestStatus::Ready => {
                self.complete_phase(environment_id, record, manifest_digest, definition, phase)
            }
            RequestStatus::Failed => {
                record.touch();
                self.mark_failed(environment_id, record, manifest_digest, request.failure_reason())
            }
        }
    }

    fn complete_phase(
        &self,
        environment_id: &str,
        mut record: DeployRecord,
        manifest_digest: String,
        definition: &UpgradeDefinition,
        phase: UpgradePhase,
    ) -> Result<AdvanceOutcome, DeployError> {
        match definition.phase_after(phase) {
            Some(next) => {
                record.phase = next.record_phase();
                record.signature_request_ref = None;
                record.proposed_transactions.clear();
                record.touch();
                let manifest = DeployManifest {
                    in_progress: Some(record.clone()),
                };
                write_deploy_manifest(
                    &self.store,
                    environment_id,
                    Some(&manifest_digest),
                    &manifest,
                )?;
                clear_request_state(&self.store, environment_id)?;
                Ok(AdvanceOutcome::PhaseCompleted {
                    phase: record.phase,
                })
            }
            None => self.finalize(environment_id, record, manifest_digest, definition),
        }
    }

    fn finalize(
        &self,
        environment_id: &str,
        record: DeployRecord,
        manifest_digest: String,
        definition: &UpgradeDefinition,
    ) -> Result<AdvanceOutcome, DeployError> {
        let (mut environment, environment_digest) =
            self.registry.environment_snapshot(environment_id)?;
        environment
            .contract_addresses
            .extend(record.deployed_contracts.clone());
        if definition.commit.is_some() {
            environment.latest_deployed_commit = definition.commit.clone();
        }
        self.registry
            .update_environment(&environment, &environment_digest)?;

        write_deploy_manifest(
            &self.store,
            environment_id,
            Some(&manifest_digest),
            &DeployManifest::default(),
        )?;
        clear_request_state(&self.store, environment_id)?;
        Ok(AdvanceOutcome::PhaseCompleted {
            phase: DeployPhase::Complete,
        })
    }

    fn mark_failed(
        &self,
        environment_id: &str,
        mut record: DeployRecord,
        manifest_digest: String,
        reason: String,
    ) -> Result<AdvanceOutcome, DeployError> {
        record.phase = DeployPhase::Failed;
        record.failure_reason = Some(reason.clone());
        record.touch();
        let manifest = DeployManifest {
            in_progress: Some(record),
        };
        write_deploy_manifest(
            &self.store,
            environment_id,
            Some(&manifest_digest),
            &manifest,
        )?;
        clear_request_state(&self.store, environment_id)?;
        Ok(AdvanceOutcome::Failed { reason })
    }

    pub fn abort(&self, environment_id: &str, reason: &str) -> Result<(), DeployError> {
        let snapshot = read_deploy_manifest(&self.store, environment_id)?;
        let Some(record) = snapshot.manifest.active_record().cloned() else {
            return Err(DeployError::Validation(format!(
                "no deploy in progress for environment '{environment_id}'"
            )));
        };
        let digest = snapshot.digest.ok_or_else(|| {
            DeployError::ConsistencyViolation(format!(
                "deploy manifest for '{environment_id}' holds a record but has no content"
            ))
        })?;
        self.mark_failed(environment_id, record, digest, reason.to_string())?;
        Ok(())
    }

    pub fn status(&self, environment_id: &str) -> Result<DeployStatus, DeployError> {
        let environment = self.registry.load_environment(environment_id)?;
        let snapshot = read_deploy_manifest(&self.store, environment_id)?;
        Ok(DeployStatus {
            environment,
            record: snapshot.manifest.in_progress,
        })
    }
}
