use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use anyhow::Context;
use chainup_core::{DeployError, Transaction};
use serde::{Deserialize, Serialize};


pub const DEFAULT_BUILD_TOOL: &str = "chainup-script";
pub const MACHINE_OUTPUT_FLAG: &str = "--json";

const STDERR_TAIL_LINES: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub deployed_contracts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timelock_eta_unix: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ActionBuilder {
    program: String,
}

impl Default for ActionBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_BUILD_TOOL)
    }
}

impl ActionBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn build(&self, script_path: &Path, args: &[String]) -> Result<BuildResult, DeployError> {
        let output = Command::new(&self.program)
            .arg(script_path)
            .args(args)
            .arg(MACHINE_OUTPUT_FLAG)
            .output()
            .with_context(|| {
                format!(
                    "failed launching build tool '{}' for script {}",
                    self.program,
                    script_path.display()
                )
            })?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            return Err(DeployError::SubprocessFailure {
                code,
                stderr_tail: stderr_tail(&String::from_utf8_lossy(&output.stderr)),
            });
        }

        parse_build_output(&String::from_utf8_lossy(&output.stdout))
    }
}

pub fn parse_build_output(stdout: &str) -> Result<BuildResult, DeployError> {
    let Some(line) = first_structured_line(stdout) else {
        return Err(DeployError::NoStructuredOutput);
    };
    serde_json::from_str(line).map_err(|err| DeployError::MalformedOutput {
        cause: err.to_string(),
    })
}

pub fn first_structured_line(stdout: &str) -> Option<&str> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with('{'))
}

pub fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let skip = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[skip..].join("\n")
}
