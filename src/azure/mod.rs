//! Azure CLI adapter.
//!
//! Shells out to `az` for every query. Callers treat any error as a negative
//! answer for the check in hand; nothing here retries.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process::Command;

/// Errors from invoking the Azure CLI.
#[derive(Debug, thiserror::Error)]
pub enum AzError {
    #[error("{binary} executable is not available in PATH")]
    NotInstalled { binary: String },

    #[error("az command failed: az {args} ({message})")]
    CommandFailed { args: String, message: String },

    #[error("unable to parse az output: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrincipalKind {
    User,
    ServicePrincipal,
}

impl PrincipalKind {
    /// Value accepted by `--assignee-principal-type`
    pub fn as_assignee_type(&self) -> &'static str {
        match self {
            PrincipalKind::User => "User",
            PrincipalKind::ServicePrincipal => "ServicePrincipal",
        }
    }
}

/// Subset of `az account show` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    pub user: AccountUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountUser {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Account {
    pub fn principal_kind(&self) -> PrincipalKind {
        if self.user.kind.eq_ignore_ascii_case("servicePrincipal") {
            PrincipalKind::ServicePrincipal
        } else {
            PrincipalKind::User
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleAssignmentRow {
    #[serde(default)]
    id: String,
    #[serde(default)]
    role_definition_name: String,
}

pub fn management_group_scope(management_group_id: &str) -> String {
    format!(
        "/providers/Microsoft.Management/managementGroups/{}",
        management_group_id.trim()
    )
}

pub fn subscription_scope(subscription_id: &str) -> String {
    format!("/subscriptions/{}", subscription_id.trim())
}

/// Prefix every role assignment created at `scope` shares.
pub fn role_assignment_prefix(scope: &str) -> String {
    format!("{}/providers/Microsoft.Authorization/roleAssignments/", scope)
}

/// True for any `.../providers/Microsoft.Authorization/roleAssignments/<name>` id.
pub fn is_role_assignment_id(id: &str) -> bool {
    const MARKER: &str = "/providers/microsoft.authorization/roleassignments/";
    let lowered = id.trim().to_ascii_lowercase();
    match lowered.rfind(MARKER) {
        Some(pos) => {
            let name = &lowered[pos + MARKER.len()..];
            lowered.starts_with('/')
                && !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        }
        None => false,
    }
}

/// Shell command that revokes a role assignment.
pub fn revoke_command(assignment_id: &str) -> String {
    format!("az role assignment delete --ids \"{}\"", assignment_id)
}

/// Shell command an administrator runs to grant `role` by hand.
pub fn grant_command(principal_id: &str, kind: PrincipalKind, role: &str, scope: &str) -> String {
    format!(
        "az role assignment create --assignee-object-id \"{}\" --assignee-principal-type {} --role \"{}\" --scope \"{}\"",
        principal_id,
        kind.as_assignee_type(),
        role,
        scope
    )
}

/// Operations the preflight checker needs from Azure.
pub trait AzureCli {
    fn account(&self) -> Result<Account, AzError>;

    fn signed_in_user_id(&self) -> Result<String, AzError>;

    fn service_principal_id(&self, app_id: &str) -> Result<String, AzError>;

    /// Role definition names assigned to `principal_id` at or above `scope`.
    fn role_names(&self, principal_id: &str, scope: &str) -> Result<Vec<String>, AzError>;

    /// Display names of directory (Entra ID) roles held by `principal_id`.
    fn directory_roles(&self, principal_id: &str) -> Result<Vec<String>, AzError>;

    /// Returns the id of the created role assignment.
    fn create_role_assignment(
        &self,
        principal_id: &str,
        kind: PrincipalKind,
        role: &str,
        scope: &str,
    ) -> Result<String, AzError>;

    fn delete_role_assignment(&self, assignment_id: &str) -> Result<(), AzError>;
}

/// `AzureCli` backed by the `az` binary.
#[derive(Debug, Clone)]
pub struct AzCli {
    binary: String,
    graph_endpoint: String,
}

impl AzCli {
    pub fn new(binary: impl Into<String>, graph_endpoint: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            graph_endpoint: graph_endpoint.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, AzError> {
        tracing::debug!(binary = %self.binary, args = %args.join(" "), "invoking az");
        let output = Command::new(&self.binary).args(args).output().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                AzError::NotInstalled {
                    binary: self.binary.clone(),
                }
            } else {
                AzError::CommandFailed {
                    args: args.join(" "),
                    message: err.to_string(),
                }
            }
        })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                "unknown error".to_string()
            } else {
                stderr
            };
            Err(AzError::CommandFailed {
                args: args.join(" "),
                message,
            })
        }
    }

    fn run_json(&self, args: &[&str]) -> Result<Value, AzError> {
        let stdout = self.run(args)?;
        serde_json::from_str(&stdout).map_err(|e| AzError::Parse(e.to_string()))
    }

    fn run_tsv_line(&self, args: &[&str]) -> Result<String, AzError> {
        let stdout = self.run(args)?;
        first_nonempty_line(&stdout)
            .map(ToOwned::to_owned)
            .ok_or_else(|| AzError::Parse(format!("az {} returned empty output", args.join(" "))))
    }
}

impl AzureCli for AzCli {
    fn account(&self) -> Result<Account, AzError> {
        let value = self.run_json(&["account", "show", "-o", "json"])?;
        serde_json::from_value(value).map_err(|e| AzError::Parse(e.to_string()))
    }

    fn signed_in_user_id(&self) -> Result<String, AzError> {
        self.run_tsv_line(&["ad", "signed-in-user", "show", "--query", "id", "-o", "tsv"])
    }

    fn service_principal_id(&self, app_id: &str) -> Result<String, AzError> {
        self.run_tsv_line(&["ad", "sp", "show", "--id", app_id, "--query", "id", "-o", "tsv"])
    }

    fn role_names(&self, principal_id: &str, scope: &str) -> Result<Vec<String>, AzError> {
        let value = self.run_json(&[
            "role",
            "assignment",
            "list",
            "--assignee",
            principal_id,
            "--scope",
            scope,
            "--include-inherited",
            "-o",
            "json",
        ])?;
        parse_role_names(value)
    }

    fn directory_roles(&self, principal_id: &str) -> Result<Vec<String>, AzError> {
        // Transitive so roles held through role-assignable groups count.
        let mut url = Some(directory_roles_url(&self.graph_endpoint, principal_id));
        let mut roles = Vec::new();
        while let Some(page) = url.take() {
            let value = self.run_json(&["rest", "--method", "get", "--url", &page])?;
            roles.extend(parse_directory_roles(&value)?);
            url = next_link(&value);
        }
        Ok(roles)
    }

    fn create_role_assignment(
        &self,
        principal_id: &str,
        kind: PrincipalKind,
        role: &str,
        scope: &str,
    ) -> Result<String, AzError> {
        let value = self.run_json(&[
            "role",
            "assignment",
            "create",
            "--assignee-object-id",
            principal_id,
            "--assignee-principal-type",
            kind.as_assignee_type(),
            "--role",
            role,
            "--scope",
            scope,
            "-o",
            "json",
        ])?;
        value
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(ToOwned::to_owned)
            .ok_or_else(|| AzError::Parse("role assignment create returned no id".to_string()))
    }

    fn delete_role_assignment(&self, assignment_id: &str) -> Result<(), AzError> {
        self.run(&["role", "assignment", "delete", "--ids", assignment_id])
            .map(|_| ())
    }
}

fn parse_role_names(value: Value) -> Result<Vec<String>, AzError> {
    let rows: Vec<RoleAssignmentRow> =
        serde_json::from_value(value).map_err(|e| AzError::Parse(e.to_string()))?;
    Ok(rows
        .into_iter()
        .inspect(|row| tracing::trace!(id = %row.id, role = %row.role_definition_name, "role assignment"))
        .map(|row| row.role_definition_name)
        .filter(|name| !name.is_empty())
        .collect())
}

fn directory_roles_url(graph_endpoint: &str, principal_id: &str) -> String {
    format!(
        "{}/directoryObjects/{}/transitiveMemberOf/microsoft.graph.directoryRole",
        graph_endpoint.trim_end_matches('/'),
        principal_id
    )
}

fn next_link(value: &Value) -> Option<String> {
    value
        .get("@odata.nextLink")
        .and_then(Value::as_str)
        .filter(|link| !link.is_empty())
        .map(ToOwned::to_owned)
}

fn parse_directory_roles(value: &Value) -> Result<Vec<String>, AzError> {
    let rows = value
        .get("value")
        .and_then(Value::as_array)
        .ok_or_else(|| AzError::Parse("graph transitiveMemberOf response has no value array".to_string()))?;
    Ok(rows
        .iter()
        .filter_map(|row| row.get("displayName").and_then(Value::as_str))
        .map(ToOwned::to_owned)
        .collect())
}

fn first_nonempty_line(input: &str) -> Option<&str> {
    input.lines().map(str::trim).find(|line| !line.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_nonempty_line_finds_trimmed_line() {
        assert_eq!(first_nonempty_line("\n\n  abc123  \n"), Some("abc123"));
        assert_eq!(first_nonempty_line(" \n\t\n"), None);
    }

    #[test]
    fn role_names_skip_rows_without_name() {
        let value = json!([
            {"id": "/a", "roleDefinitionName": "Owner"},
            {"id": "/b", "roleDefinitionName": ""},
            {"id": "/c"}
        ]);
        assert_eq!(parse_role_names(value).unwrap(), vec!["Owner"]);
    }

    #[test]
    fn directory_roles_require_value_array() {
        let value = json!({"value": [{"displayName": "Global Administrator"}, {"id": "x"}]});
        assert_eq!(parse_directory_roles(&value).unwrap(), vec!["Global Administrator"]);
        assert!(parse_directory_roles(&json!({})).is_err());
    }

    #[test]
    fn directory_roles_follow_transitive_membership_pages() {
        assert_eq!(
            directory_roles_url("https://graph.example/v1.0/", "p-1"),
            "https://graph.example/v1.0/directoryObjects/p-1/transitiveMemberOf/microsoft.graph.directoryRole"
        );
        let page = json!({
            "value": [{"displayName": "Application Administrator"}],
            "@odata.nextLink": "https://graph.example/v1.0/next?$skiptoken=abc"
        });
        assert_eq!(
            next_link(&page).as_deref(),
            Some("https://graph.example/v1.0/next?$skiptoken=abc")
        );
        assert_eq!(next_link(&json!({"value": []})), None);
    }

    #[test]
    fn account_principal_kind() {
        let account: Account = serde_json::from_value(json!({
            "id": "sub",
            "tenantId": "tenant",
            "user": {"name": "app-id", "type": "servicePrincipal"}
        }))
        .unwrap();
        assert_eq!(account.principal_kind(), PrincipalKind::ServicePrincipal);
        assert_eq!(account.tenant_id, "tenant");
    }

    #[test]
    fn scope_helpers() {
        let scope = management_group_scope("mg-root");
        assert_eq!(scope, "/providers/Microsoft.Management/managementGroups/mg-root");
        assert_eq!(
            role_assignment_prefix(&scope),
            "/providers/Microsoft.Management/managementGroups/mg-root/providers/Microsoft.Authorization/roleAssignments/"
        );
        assert_eq!(subscription_scope(" sub-1 "), "/subscriptions/sub-1");
    }

    #[test]
    fn role_assignment_id_shape() {
        assert!(is_role_assignment_id(
            "/subscriptions/s/providers/Microsoft.Authorization/roleAssignments/0b1c-22"
        ));
        assert!(!is_role_assignment_id("roleAssignments/abc"));
        assert!(!is_role_assignment_id(
            "/providers/Microsoft.Authorization/roleAssignments/"
        ));
        assert!(!is_role_assignment_id(
            "/providers/Microsoft.Authorization/roleAssignments/a b"
        ));
    }

    #[test]
    fn missing_binary_reports_not_installed() {
        let cli = AzCli::new("definitely-not-an-az-binary-onboard", "https://graph.example");
        match cli.account() {
            Err(AzError::NotInstalled { binary }) => assert_eq!(binary, "definitely-not-an-az-binary-onboard"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
