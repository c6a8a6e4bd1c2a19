use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub paths: PathConfig,
    pub azure: AzureConfig,
    pub roles: RoleConfig,
    pub params: ParamsConfig,
    pub delegated: DelegatedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    pub params_file: PathBuf,
    pub state_file: PathBuf,
    pub template_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureConfig {
    pub az_binary: String,
    pub graph_endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    pub management_group: Vec<String>,
    pub subscription: Vec<String>,
    pub directory: Vec<String>,
    /// Role self-granted at management-group scope when the caller lacks one
    pub grant_role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamsConfig {
    /// Parameter keys whose values are single-quoted JSON-like text
    pub json_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegatedConfig {
    pub tool_path: String,
    pub pinned_version: String,
    pub audit_marker_prefix: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::defaults().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Path overrides
        if let Ok(v) = env::var("PREFLIGHT_PARAMS_FILE") {
            self.paths.params_file = PathBuf::from(v);
        }
        if let Ok(v) = env::var("PREFLIGHT_STATE_FILE") {
            self.paths.state_file = PathBuf::from(v);
        }
        if let Ok(v) = env::var("PREFLIGHT_TEMPLATE_FILE") {
            self.paths.template_file = non_blank(&v).map(PathBuf::from);
        }

        // Azure overrides
        if let Ok(v) = env::var("PREFLIGHT_AZ_BIN") {
            self.azure.az_binary = v;
        }
        if let Ok(v) = env::var("PREFLIGHT_GRAPH_ENDPOINT") {
            self.azure.graph_endpoint = v.trim_end_matches('/').to_string();
        }

        // Role overrides
        if let Ok(v) = env::var("PREFLIGHT_MG_ROLES") {
            self.roles.management_group = split_list(&v);
        }
        if let Ok(v) = env::var("PREFLIGHT_SUBSCRIPTION_ROLES") {
            self.roles.subscription = split_list(&v);
        }
        if let Ok(v) = env::var("PREFLIGHT_DIRECTORY_ROLES") {
            self.roles.directory = split_list(&v);
        }
        if let Ok(v) = env::var("PREFLIGHT_GRANT_ROLE") {
            self.roles.grant_role = v;
        }

        // Parameter overrides
        if let Ok(v) = env::var("PREFLIGHT_JSON_FIELDS") {
            self.params.json_fields = split_list(&v);
        }

        // Delegated tool overrides
        if let Ok(v) = env::var("PREFLIGHT_TOOL_PATH") {
            self.delegated.tool_path = v;
        }
        if let Ok(v) = env::var("PREFLIGHT_TOOL_VERSION") {
            self.delegated.pinned_version = v;
        }
        if let Ok(v) = env::var("PREFLIGHT_AUDIT_MARKER") {
            self.delegated.audit_marker_prefix = v;
        }

        self
    }

    pub fn defaults() -> Self {
        Self {
            paths: PathConfig {
                params_file: PathBuf::from("params.sh"),
                state_file: PathBuf::from(".preflight_grant_id"),
                template_file: None,
            },
            azure: AzureConfig {
                az_binary: "az".to_string(),
                graph_endpoint: "https://graph.microsoft.com/v1.0".to_string(),
            },
            roles: RoleConfig {
                management_group: vec![
                    "Owner".to_string(),
                    "User Access Administrator".to_string(),
                    "Contributor".to_string(),
                ],
                subscription: vec!["Owner".to_string(), "Contributor".to_string()],
                directory: vec![
                    "Global Administrator".to_string(),
                    "Privileged Role Administrator".to_string(),
                    "Cloud Application Administrator".to_string(),
                    "Application Administrator".to_string(),
                ],
                grant_role: "Owner".to_string(),
            },
            params: ParamsConfig {
                json_fields: vec![
                    "tags".to_string(),
                    "template_version".to_string(),
                    "audit_storage_allowed_ips".to_string(),
                ],
            },
            delegated: DelegatedConfig {
                tool_path: "azure-onboarding-preflight".to_string(),
                pinned_version: "1.4.2".to_string(),
                audit_marker_prefix: "auditLogs".to_string(),
            },
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}
