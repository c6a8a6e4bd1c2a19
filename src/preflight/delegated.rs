//! Variant B: delegate permission verification to a version-pinned external
//! preflight utility and report its verdict and transcript.

use super::{login_message, missing_arguments, PreflightResult, Stage};
use crate::azure::management_group_scope;
use crate::error::PreflightError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::process::Command;
use std::str::FromStr;
use thiserror::Error;

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07]*\x07").expect("static ANSI pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingType {
    Tenant,
    ManagementGroup,
}

impl OnboardingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnboardingType::Tenant => "tenant",
            OnboardingType::ManagementGroup => "management-group",
        }
    }
}

impl fmt::Display for OnboardingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OnboardingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tenant" => Ok(OnboardingType::Tenant),
            "management-group" | "management_group" | "managementgroup" | "mg" => {
                Ok(OnboardingType::ManagementGroup)
            }
            other => Err(format!(
                "unknown onboarding type '{}' (expected 'tenant' or 'management-group')",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegatedRequest {
    pub scope_id: String,
    pub subscription_id: String,
    pub enabled: bool,
    pub onboarding_type: OnboardingType,
    pub audit_logs: bool,
}

impl DelegatedRequest {
    /// Structured arguments passed to the external tool.
    pub fn tool_arguments(&self) -> Vec<String> {
        vec![
            "--non-interactive".to_string(),
            "--onboarding-type".to_string(),
            self.onboarding_type.as_str().to_string(),
            "--scope-id".to_string(),
            self.scope_id.trim().to_string(),
            "--subscription-id".to_string(),
            self.subscription_id.trim().to_string(),
            "--audit-logs".to_string(),
            self.audit_logs.to_string(),
        ]
    }
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("preflight tool '{path}' is not available in PATH")]
    NotInstalled { path: String },

    #[error("preflight tool version mismatch: expected {expected}, found '{found}'")]
    VersionMismatch { expected: String, found: String },

    #[error("preflight tool failed to run: {0}")]
    Io(String),
}

/// Exit status and console transcript of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRun {
    pub exit_code: Option<i32>,
    pub transcript: String,
}

impl ToolRun {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

pub trait PreflightTool {
    fn version(&self) -> Result<String, ToolError>;

    fn run(&self, args: &[String]) -> Result<ToolRun, ToolError>;
}

/// `PreflightTool` backed by an executable on disk or in PATH.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    path: String,
}

impl ExternalTool {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    fn spawn(&self, args: &[String]) -> Result<std::process::Output, ToolError> {
        Command::new(&self.path).args(args).output().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                ToolError::NotInstalled {
                    path: self.path.clone(),
                }
            } else {
                ToolError::Io(err.to_string())
            }
        })
    }
}

impl PreflightTool for ExternalTool {
    fn version(&self) -> Result<String, ToolError> {
        let output = self.spawn(&["--version".to_string()])?;
        if !output.status.success() {
            return Err(ToolError::Io(format!(
                "--version exited with {:?}",
                output.status.code()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run(&self, args: &[String]) -> Result<ToolRun, ToolError> {
        tracing::debug!(tool = %self.path, args = %args.join(" "), "invoking preflight tool");
        let output = self.spawn(args)?;
        let mut transcript = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !transcript.is_empty() && !transcript.ends_with('\n') {
                transcript.push('\n');
            }
            transcript.push_str(&stderr);
        }
        Ok(ToolRun {
            exit_code: output.status.code(),
            transcript,
        })
    }
}

/// Runs variant B: one call into the pinned external tool.
pub struct DelegatedChecker<'a, T: PreflightTool> {
    tool: &'a T,
    pinned_version: &'a str,
}

impl<'a, T: PreflightTool> DelegatedChecker<'a, T> {
    pub fn new(tool: &'a T, pinned_version: &'a str) -> Self {
        Self {
            tool,
            pinned_version,
        }
    }

    pub fn run(&self, request: &DelegatedRequest, tenant_id: &str) -> PreflightResult {
        if !request.enabled {
            tracing::info!("preflight checks disabled");
            return PreflightResult::passed(Stage::Disabled);
        }

        if let Some(err) = missing_arguments("scope id", &request.scope_id, &request.subscription_id) {
            return PreflightResult::failed(Stage::MissingArguments, err);
        }

        let scope = management_group_scope(&request.scope_id);
        let manual = format!(
            "az role assignment create --assignee \"$(az ad signed-in-user show --query id -o tsv)\" --role \"Owner\" --scope \"{}\"",
            scope
        );
        let login = login_message(tenant_id);

        if let Err(e) = self.verify_version() {
            return PreflightResult::failed(
                Stage::DelegatedFailed,
                PreflightError::DelegatedCheck(e.to_string()),
            )
            .with_login_message(login);
        }

        let run = match self.tool.run(&request.tool_arguments()) {
            Ok(run) => run,
            Err(e) => {
                return PreflightResult::failed(
                    Stage::DelegatedFailed,
                    PreflightError::DelegatedCheck(e.to_string()),
                )
                .with_login_message(login)
            }
        };
        let transcript = strip_ansi(&run.transcript);

        if run.success() {
            tracing::info!(onboarding_type = %request.onboarding_type, "delegated preflight passed");
            return PreflightResult::passed(Stage::DelegatedPassed).with_output(transcript);
        }

        let status = run
            .exit_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        PreflightResult::failed(
            Stage::DelegatedFailed,
            PreflightError::DelegatedCheck(format!(
                "preflight tool exited with status {}; see preflight_output for details",
                status
            )),
        )
        .with_output(transcript)
        .with_grant_command(manual)
        .with_login_message(login)
    }

    fn verify_version(&self) -> Result<(), ToolError> {
        let found = self.tool.version()?;
        if found.contains(self.pinned_version) {
            Ok(())
        } else {
            Err(ToolError::VersionMismatch {
                expected: self.pinned_version.to_string(),
                found,
            })
        }
    }
}

/// Remove terminal color and control sequences from a console transcript.
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// True when the template version map declares any key with `marker_prefix`.
pub fn audit_logs_requested(template_version: &str, marker_prefix: &str) -> bool {
    if marker_prefix.is_empty() {
        return false;
    }
    match serde_json::from_str::<Value>(template_version) {
        Ok(Value::Object(map)) => map.keys().any(|key| key.starts_with(marker_prefix)),
        _ => false,
    }
}
