use anyhow::Context;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::{DeployError, DeployPhase};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradePhase {
    Create,
    Queue,
    Execute,
}

impl UpgradePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Queue => "queue",
            Self::Execute => "execute",
        }
    }

    pub fn record_phase(self) -> DeployPhase {
        match self {
            Self::Create => DeployPhase::Created,
            Self::Queue => DeployPhase::Queued,
            Self::Execute => DeployPhase::Executing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub script: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeDefinition {
    pub id: String,
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<PhaseSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<PhaseSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute: Option<PhaseSpec>,
}

impl UpgradeDefinition {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let definition: Self =
            toml::from_str(input).context("failed to parse upgrade definition")?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn validate(&self) -> Result<(), DeployError> {
        if self.id.trim().is_empty() {
            return Err(DeployError::Validation(
                "upgrade id must not be empty".to_string(),
            ));
        }
        if self.phases().is_empty() {
            return Err(DeployError::Validation(format!(
                "upgrade '{}' must define at least one of create, queue, execute",
                self.id
            )));
        }
        Ok(())
    }

    pub fn phase_spec(&self, phase: UpgradePhase) -> Option<&PhaseSpec> {
        match phase {
            UpgradePhase::Create => self.create.as_ref(),
            UpgradePhase::Queue => self.queue.as_ref(),
            UpgradePhase::Execute => self.execute.as_ref(),
        }
    }

    pub fn phases(&self) -> Vec<UpgradePhase> {
        [UpgradePhase::Create, UpgradePhase::Queue, UpgradePhase::Execute]
            .into_iter()
            .filter(|phase| self.phase_spec(*phase).is_some())
            .collect()
    }

    pub fn first_phase(&self) -> Option<UpgradePhase> {
        self.phases().into_iter().next()
    }

    pub fn phase_after(&self, phase: UpgradePhase) -> Option<UpgradePhase> {
        let phases = self.phases();
        phases
            .iter()
            .position(|candidate| *candidate == phase)
            .and_then(|index| phases.get(index + 1))
            .copied()
    }

    pub fn phase_for_record(&self, phase: DeployPhase) -> Option<UpgradePhase> {
        match phase {
            DeployPhase::Created => Some(UpgradePhase::Create),
            DeployPhase::Queued => Some(UpgradePhase::Queue),
            DeployPhase::Executing => Some(UpgradePhase::Execute),
            DeployPhase::Complete | DeployPhase::Failed => None,
        }
    }

    pub fn has_queue_phase(&self) -> bool {
        self.queue.is_some()
    }
}
