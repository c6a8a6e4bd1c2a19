// Preflight error taxonomy
use thiserror::Error;

/// Permission level a role check was performed at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionLevel {
    ManagementGroup,
    Subscription,
    Directory,
}

impl PermissionLevel {
    pub fn label(&self) -> &'static str {
        match self {
            PermissionLevel::ManagementGroup => "management group",
            PermissionLevel::Subscription => "subscription",
            PermissionLevel::Directory => "directory",
        }
    }
}

/// Every way a preflight run can end in FAIL. None of these abort the process;
/// they are rendered into the `preflight_error` output field.
#[derive(Error, Debug)]
pub enum PreflightError {
    #[error("{0}")]
    Configuration(String),

    #[error("Not logged in to Azure CLI ({0}). Run 'az login' and re-run terraform apply.")]
    Authentication(String),

    #[error("Unable to resolve the object id of the signed-in principal: {0}")]
    IdentityResolution(String),

    #[error("Insufficient {} permissions: {message}", .level.label())]
    Authorization {
        level: PermissionLevel,
        message: String,
    },

    #[error("Failed to grant temporary role: {0}")]
    Grant(String),

    #[error("Delegated preflight check failed: {0}")]
    DelegatedCheck(String),
}

impl PreflightError {
    pub fn configuration(message: impl Into<String>) -> Self {
        PreflightError::Configuration(message.into())
    }

    pub fn authorization(level: PermissionLevel, message: impl Into<String>) -> Self {
        PreflightError::Authorization {
            level,
            message: message.into(),
        }
    }

    /// Short machine-readable code, logged alongside the message
    pub fn error_code(&self) -> &'static str {
        match self {
            PreflightError::Configuration(_) => "CONFIGURATION_ERROR",
            PreflightError::Authentication(_) => "AUTHENTICATION_ERROR",
            PreflightError::IdentityResolution(_) => "IDENTITY_RESOLUTION_ERROR",
            PreflightError::Authorization { .. } => "AUTHORIZATION_ERROR",
            PreflightError::Grant(_) => "GRANT_ERROR",
            PreflightError::DelegatedCheck(_) => "DELEGATED_CHECK_ERROR",
        }
    }
}
