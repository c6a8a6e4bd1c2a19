//! Builds the flat string-valued record handed back to the provisioner.

use crate::params::ParameterSet;
use crate::preflight::PreflightResult;
use serde::Serialize;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Parameter keys copied into every output record.
pub const PASSTHROUGH_KEYS: &[&str] = &[
    "tenant_id",
    "customer_object_id",
    "tags",
    "outpost_client_id",
    "resource_suffix",
    "upload_output_url",
    "template_id",
    "template_version",
    "connector_id",
    "audit_storage_allowed_ips",
    "audience",
    "collector_sa_unique_id",
];

/// Template parameter name and the parameter key that feeds it. Only passed
/// on when the template declares the parameter.
const OPTIONAL_TEMPLATE_PARAMETERS: &[(&str, &str)] = &[
    ("auditStorageAllowedIps", "audit_storage_allowed_ips"),
    ("audience", "audience"),
    ("collectorSaUniqueId", "collector_sa_unique_id"),
    ("connectorId", "connector_id"),
    ("tags", "tags"),
    ("uploadOutputUrl", "upload_output_url"),
];

const STORAGE_PREFIX: &str = "stonb";
const STORAGE_MAX_LEN: usize = 24;
const DEPLOYMENT_MAX_LEN: usize = 64;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("failed to read template {path}: {message}")]
    Read { path: String, message: String },

    #[error("template {path} is not valid JSON: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Which checker produced the result; decides the variant-specific keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Local,
    Delegated,
}

/// Resource names derived from the resource suffix. Same suffix, same names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceNames {
    pub resource_group_name: String,
    pub storage_account_name: String,
    pub deployment_name: String,
    pub managed_identity_name: String,
}

impl ResourceNames {
    pub fn derive(suffix: &str) -> Self {
        let slug: String = suffix
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        let slug = slug.trim_matches('-').to_string();
        let digest = short_digest(suffix.trim());

        let tail = if slug.is_empty() { digest.clone() } else { slug };

        Self {
            resource_group_name: format!("rg-onboarding-{}", tail),
            storage_account_name: storage_account_name(&tail, &digest),
            deployment_name: truncate(&format!("onboarding-{}", tail), DEPLOYMENT_MAX_LEN),
            managed_identity_name: format!("id-onboarding-{}", tail),
        }
    }
}

/// Storage account names are 3-24 lower-case alphanumerics.
fn storage_account_name(tail: &str, digest: &str) -> String {
    let alnum: String = tail.chars().filter(char::is_ascii_alphanumeric).collect();
    let candidate = format!("{}{}", STORAGE_PREFIX, alnum);
    if candidate.len() <= STORAGE_MAX_LEN && !alnum.is_empty() {
        return candidate;
    }
    let room = STORAGE_MAX_LEN - STORAGE_PREFIX.len() - digest.len();
    let head: String = alnum.chars().take(room).collect();
    format!("{}{}{}", STORAGE_PREFIX, head, digest)
}

fn short_digest(input: &str) -> String {
    let hash = Sha256::digest(input.as_bytes());
    hash.iter().take(4).map(|b| format!("{:02x}", b)).collect()
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect::<String>().trim_end_matches('-').to_string()
}

/// Parameter names an ARM template declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateParameters {
    declared: BTreeSet<String>,
}

impl TemplateParameters {
    pub fn from_path(path: &Path) -> Result<Self, TemplateError> {
        let display = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|e| TemplateError::Read {
            path: display.clone(),
            message: e.to_string(),
        })?;
        let value: Value = serde_json::from_str(&content).map_err(|source| TemplateError::Json {
            path: display,
            source,
        })?;
        Ok(Self::from_value(&value))
    }

    /// Like `from_path`, but any failure declares nothing.
    pub fn load_or_empty(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match Self::from_path(path) {
            Ok(template) => template,
            Err(e) => {
                tracing::warn!(error = %e, "template unavailable, optional parameters omitted");
                Self::default()
            }
        }
    }

    pub fn from_value(template: &Value) -> Self {
        let declared = template
            .get("parameters")
            .and_then(Value::as_object)
            .map(|params| params.keys().cloned().collect())
            .unwrap_or_default();
        Self { declared }
    }

    pub fn declares(&self, name: &str) -> bool {
        self.declared.contains(name)
    }
}

/// Optional template parameters in ARM parameter-file shape.
pub fn template_parameters(params: &ParameterSet, template: &TemplateParameters) -> Value {
    let mut out = Map::new();
    for (name, key) in OPTIONAL_TEMPLATE_PARAMETERS {
        if !template.declares(name) {
            continue;
        }
        let raw = params.get(key);
        if raw.is_empty() {
            continue;
        }
        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        out.insert((*name).to_string(), json!({ "value": value }));
    }
    Value::Object(out)
}

/// Flat output document; every value is a string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OutputRecord(BTreeMap<String, String>);

impl OutputRecord {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    fn set(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

pub fn assemble(
    params: &ParameterSet,
    result: &PreflightResult,
    variant: Variant,
    template: &TemplateParameters,
) -> OutputRecord {
    let mut record = OutputRecord::default();

    for key in PASSTHROUGH_KEYS {
        record.set(key, params.get(key));
    }

    record.set("preflight_ok", result.ok.to_string());
    record.set("preflight_error", result.error.clone().unwrap_or_default());
    record.set("login_message", result.login_message.clone().unwrap_or_default());

    match variant {
        Variant::Local => {
            record.set("granted_mg_admin", result.granted_temp_role.to_string());
            record.set("cleanup_cmd", result.cleanup_command.clone().unwrap_or_default());
        }
        Variant::Delegated => {
            record.set("preflight_output", result.output.clone().unwrap_or_default());
            record.set("grant_cmd", result.grant_command.clone().unwrap_or_default());
        }
    }

    let names = ResourceNames::derive(params.get("resource_suffix"));
    record.set("resource_group_name", names.resource_group_name);
    record.set("storage_account_name", names.storage_account_name);
    record.set("deployment_name", names.deployment_name);
    record.set("managed_identity_name", names.managed_identity_name);

    record.set(
        "template_parameters",
        template_parameters(params, template).to_string(),
    );

    record
}
