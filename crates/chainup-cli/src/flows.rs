use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chainup_core::{DeployPhase, Environment, SignerConfig};
use chainup_deploy::{AdvanceOutcome, Coordinator, DeployStatus};

use crate::render::{finish_wait_spinner, print_status, start_wait_spinner};

const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const MAX_WAIT_SECS: u64 = 86_400;

pub fn default_state_root() -> Result<PathBuf> {
    if let Some(root) = std::env::var_os("CHAINUP_STATE_ROOT") {
        return Ok(PathBuf::from(root));
    }
    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve Windows state root")?;
        return Ok(PathBuf::from(app_data).join("Chainup"));
    }
    let home = std::env::var("HOME").context("HOME is not set; cannot resolve state root")?;
    Ok(PathBuf::from(home).join(".chainup"))
}

pub fn parse_signer_config(raw: &str) -> Result<SignerConfig> {
    serde_json::from_str(raw).context(
        "invalid --signer value; expected JSON like {\"kind\":\"direct-key\",\"private_key_hex\":\"...\"}",
    )
}

pub fn format_environment_lines(environment: &Environment) -> Vec<String> {
    let mut lines = vec![
        format!("environment: {}", environment.id),
        format!("signing: {}", environment.signing_strategy.kind()),
    ];
    if let Some(precedes) = &environment.precedes {
        lines.push(format!("precedes: {precedes}"));
    }
    lines.push(format!(
        "deployed commit: {}",
        environment
            .latest_deployed_commit
            .as_deref()
            .unwrap_or("(none)")
    ));
    for (name, address) in &environment.contract_addresses {
        lines.push(format!("contract {name}: {address}"));
    }
    lines
}

pub fn format_status_lines(status: &DeployStatus) -> Vec<String> {
    let mut lines = format_environment_lines(&status.environment);
    match &status.record {
        None => lines.push("deploy: none in progress".to_string()),
        Some(record) => {
            lines.push(format!(
                "deploy: {} ({})",
                record.upgrade_id,
                record.phase.as_str()
            ));
            if let Some(reference) = &record.signature_request_ref {
                lines.push(format!("signature request: {reference}"));
            }
            if let Some(until) = record.executable_at_unix {
                lines.push(format!("executable at: {until}"));
            }
            if let Some(reason) = &record.failure_reason {
                lines.push(format!("failure: {reason}"));
            }
        }
    }
    lines
}

pub fn outcome_line(outcome: &AdvanceOutcome) -> (&'static str, String) {
    match outcome {
        AdvanceOutcome::PhaseCompleted { phase } => match phase {
            DeployPhase::Complete => ("ok", "deploy complete".to_string()),
            other => ("ok", format!("phase advanced to {}", other.as_str())),
        },
        AdvanceOutcome::SignaturePending { request_id } => (
            "pending",
            format!("signature request {request_id} is still pending"),
        ),
        AdvanceOutcome::TimelockPending { until_unix } => (
            "pending",
            format!("timelock holds execution until {until_unix}"),
        ),
        AdvanceOutcome::Failed { reason } => ("err", format!("deploy failed: {reason}")),
    }
}

pub fn outcome_is_settled(outcome: &AdvanceOutcome) -> bool {
    matches!(
        outcome,
        AdvanceOutcome::PhaseCompleted { .. } | AdvanceOutcome::Failed { .. }
    )
}

pub fn run_advance(
    coordinator: &Coordinator,
    environment_id: &str,
    wait: bool,
    timeout_secs: u64,
) -> Result<()> {
    let outcome = coordinator.advance(environment_id)?;
    let (status, message) = outcome_line(&outcome);
    print_status(status, &message);
    if !wait || outcome_is_settled(&outcome) {
        return Ok(());
    }

    let deadline = Instant::now() + Duration::from_secs(timeout_secs.min(MAX_WAIT_SECS));
    let spinner = start_wait_spinner("waiting for approvals");
    let result = wait_until_settled(coordinator, environment_id, deadline);
    finish_wait_spinner(spinner);

    match result? {
        Some(outcome) => {
            let (status, message) = outcome_line(&outcome);
            print_status(status, &message);
        }
        None => {
            print_status(
                "pending",
                &format!("still pending after {timeout_secs}s; re-run advance later"),
            );
        }
    }
    Ok(())
}

fn wait_until_settled(
    coordinator: &Coordinator,
    environment_id: &str,
    deadline: Instant,
) -> Result<Option<AdvanceOutcome>> {
    while Instant::now() < deadline {
        std::thread::sleep(WAIT_POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
        let outcome = coordinator.advance(environment_id)?;
        if outcome_is_settled(&outcome) {
            return Ok(Some(outcome));
        }
    }
    Ok(None)
}
