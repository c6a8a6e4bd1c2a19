pub mod delegated;
pub mod local;

pub use delegated::{DelegatedChecker, DelegatedRequest, ExternalTool, OnboardingType, PreflightTool, ToolError, ToolRun};
pub use local::{is_valid_grant_record, LocalChecker, PreflightRequest};

use crate::error::PreflightError;
use serde::Serialize;

/// Terminal state a preflight run ended in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Disabled,
    MissingArguments,
    LoginFailed,
    PrincipalUnresolved,
    ManagementGroupInsufficient,
    GrantPending,
    AwaitingReauth,
    PostReauthCleanup,
    SubscriptionInsufficient,
    DirectoryInsufficient,
    Passed,
    DelegatedFailed,
    DelegatedPassed,
    Internal,
}

/// Outcome of one preflight run, consumed by the output assembler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreflightResult {
    pub ok: bool,
    pub error: Option<String>,
    pub output: Option<String>,
    pub granted_temp_role: bool,
    pub cleanup_command: Option<String>,
    pub login_message: Option<String>,
    pub grant_command: Option<String>,
    pub stage: Stage,
}

impl PreflightResult {
    pub fn passed(stage: Stage) -> Self {
        Self {
            ok: true,
            error: None,
            output: None,
            granted_temp_role: false,
            cleanup_command: None,
            login_message: None,
            grant_command: None,
            stage,
        }
    }

    pub fn failed(stage: Stage, error: PreflightError) -> Self {
        tracing::warn!(stage = ?stage, code = error.error_code(), "preflight failed: {}", error);
        Self {
            ok: false,
            error: Some(error.to_string()),
            ..Self::passed(stage)
        }
    }

    /// Result used when the checker itself could not run to completion.
    pub fn internal_failure(message: impl Into<String>) -> Self {
        Self::failed(Stage::Internal, PreflightError::configuration(message))
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_cleanup_command(mut self, command: impl Into<String>) -> Self {
        self.cleanup_command = Some(command.into());
        self
    }

    pub fn with_login_message(mut self, message: impl Into<String>) -> Self {
        self.login_message = Some(message.into());
        self
    }

    pub fn with_grant_command(mut self, command: impl Into<String>) -> Self {
        self.grant_command = Some(command.into());
        self
    }

    pub fn with_granted_temp_role(mut self) -> Self {
        self.granted_temp_role = true;
        self
    }
}

/// Error for a request that lacks the scope or subscription id.
pub(crate) fn missing_arguments(scope_label: &str, scope_id: &str, subscription_id: &str) -> Option<PreflightError> {
    let mut missing = Vec::new();
    if scope_id.trim().is_empty() {
        missing.push(scope_label);
    }
    if subscription_id.trim().is_empty() {
        missing.push("subscription id");
    }
    if missing.is_empty() {
        return None;
    }
    let verb = if missing.len() == 1 { "is" } else { "are" };
    Some(PreflightError::configuration(format!(
        "{} {} required for preflight checks",
        missing.join(" and "),
        verb
    )))
}

pub(crate) fn login_message(tenant_id: &str) -> String {
    if tenant_id.trim().is_empty() {
        "az logout && az login".to_string()
    } else {
        format!("az logout && az login --tenant {}", tenant_id.trim())
    }
}
