//! Local permission checks through direct Azure CLI queries, with an inline
//! self-grant and cleanup cycle for the management-group role.

use super::{login_message, missing_arguments, PreflightResult, Stage};
use crate::azure::{
    grant_command, management_group_scope, revoke_command, role_assignment_prefix,
    subscription_scope, Account, AzError, AzureCli,
};
use crate::config::RoleConfig;
use crate::error::{PermissionLevel, PreflightError};
use crate::state::GrantStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightRequest {
    pub management_group_id: String,
    pub subscription_id: String,
    pub enabled: bool,
    pub self_grant: bool,
}

#[derive(Debug, Clone)]
struct Principal {
    id: String,
    kind: crate::azure::PrincipalKind,
}

/// Runs variant A of the preflight: every check is a local `az` query.
pub struct LocalChecker<'a, A: AzureCli, S: GrantStore> {
    azure: &'a A,
    store: &'a S,
    roles: &'a RoleConfig,
}

impl<'a, A: AzureCli, S: GrantStore> LocalChecker<'a, A, S> {
    pub fn new(azure: &'a A, store: &'a S, roles: &'a RoleConfig) -> Self {
        Self { azure, store, roles }
    }

    pub fn run(&self, request: &PreflightRequest) -> PreflightResult {
        if !request.enabled {
            tracing::info!("preflight checks disabled");
            return PreflightResult::passed(Stage::Disabled);
        }

        if let Some(err) = missing_arguments(
            "management group id",
            &request.management_group_id,
            &request.subscription_id,
        ) {
            return PreflightResult::failed(Stage::MissingArguments, err);
        }

        let account = match self.azure.account() {
            Ok(account) => account,
            Err(e) => {
                return PreflightResult::failed(
                    Stage::LoginFailed,
                    PreflightError::Authentication(e.to_string()),
                )
            }
        };
        let login = login_message(&account.tenant_id);

        let principal = match self.resolve_principal(&account) {
            Ok(principal) => principal,
            Err(e) => {
                return PreflightResult::failed(
                    Stage::PrincipalUnresolved,
                    PreflightError::IdentityResolution(e),
                )
            }
        };
        tracing::info!(principal = %principal.id, kind = ?principal.kind, "resolved calling principal");

        let mg_scope = management_group_scope(&request.management_group_id);
        let record = self.load_record(&mg_scope);
        let mg_check = self.require_role(
            PermissionLevel::ManagementGroup,
            self.azure.role_names(&principal.id, &mg_scope),
            &self.roles.management_group,
            &mg_scope,
        );

        if let Err(insufficient) = mg_check {
            return self.handle_missing_mg_role(request, &principal, &mg_scope, record, insufficient, login);
        }

        if let Some(assignment_id) = record {
            // Token now carries the granted role; hand the grant back for revocation.
            tracing::info!(assignment = %assignment_id, "temporary grant effective after re-authentication, scheduling cleanup");
            self.delete_record();
            return PreflightResult::passed(Stage::PostReauthCleanup)
                .with_cleanup_command(revoke_command(&assignment_id));
        }

        let sub_scope = subscription_scope(&request.subscription_id);
        if let Err(e) = self.require_role(
            PermissionLevel::Subscription,
            self.azure.role_names(&principal.id, &sub_scope),
            &self.roles.subscription,
            &sub_scope,
        ) {
            return PreflightResult::failed(Stage::SubscriptionInsufficient, e);
        }

        if let Err(e) = self.require_role(
            PermissionLevel::Directory,
            self.azure.directory_roles(&principal.id),
            &self.roles.directory,
            "the tenant directory (needed to grant application role assignments)",
        ) {
            return PreflightResult::failed(Stage::DirectoryInsufficient, e);
        }

        tracing::info!("preflight checks passed");
        PreflightResult::passed(Stage::Passed)
    }

    fn handle_missing_mg_role(
        &self,
        request: &PreflightRequest,
        principal: &Principal,
        mg_scope: &str,
        record: Option<String>,
        insufficient: PreflightError,
        login: String,
    ) -> PreflightResult {
        let role = self.roles.grant_role.as_str();

        if let Some(assignment_id) = record {
            let err = PreflightError::authorization(
                PermissionLevel::ManagementGroup,
                format!(
                    "a temporary '{}' assignment ({}) was granted on a previous run but the current login does not carry it yet. Run '{}' and re-run terraform apply.",
                    role, assignment_id, login
                ),
            );
            return PreflightResult::failed(Stage::AwaitingReauth, err)
                .with_cleanup_command(revoke_command(&assignment_id))
                .with_login_message(login);
        }

        let manual = grant_command(&principal.id, principal.kind, role, mg_scope);

        if !request.self_grant {
            let err = PreflightError::authorization(
                PermissionLevel::ManagementGroup,
                format!("{} Ask an administrator to run: {}", detail(&insufficient), manual),
            );
            return PreflightResult::failed(Stage::ManagementGroupInsufficient, err)
                .with_grant_command(manual);
        }

        tracing::info!(role, scope = mg_scope, "attempting temporary self-grant");
        match self
            .azure
            .create_role_assignment(&principal.id, principal.kind, role, mg_scope)
        {
            Ok(assignment_id) => {
                if let Err(e) = self.store.write(&assignment_id) {
                    return self.roll_back_grant(&assignment_id, e.to_string(), manual);
                }
                let err = PreflightError::authorization(
                    PermissionLevel::ManagementGroup,
                    format!(
                        "granted temporary '{}' role at {}. Azure tokens must be refreshed before it takes effect: run '{}' and re-run terraform apply.",
                        role, mg_scope, login
                    ),
                );
                PreflightResult::failed(Stage::GrantPending, err)
                    .with_granted_temp_role()
                    .with_cleanup_command(revoke_command(&assignment_id))
                    .with_login_message(login)
            }
            Err(e) => {
                let err = PreflightError::Grant(format!(
                    "{}. {} Ask an administrator to run: {}",
                    e,
                    detail(&insufficient),
                    manual
                ));
                PreflightResult::failed(Stage::ManagementGroupInsufficient, err)
                    .with_grant_command(manual)
            }
        }
    }

    /// An unrecorded grant would never be cleaned up, so it is revoked at once.
    fn roll_back_grant(&self, assignment_id: &str, write_error: String, manual: String) -> PreflightResult {
        tracing::warn!(assignment = %assignment_id, error = %write_error, "failed to persist grant record, revoking grant");
        match self.azure.delete_role_assignment(assignment_id) {
            Ok(()) => {
                let err = PreflightError::Grant(format!(
                    "could not record assignment {} ({}); it was revoked again. Ask an administrator to run: {}",
                    assignment_id, write_error, manual
                ));
                PreflightResult::failed(Stage::ManagementGroupInsufficient, err).with_grant_command(manual)
            }
            Err(e) => {
                tracing::error!(assignment = %assignment_id, error = %e, "failed to revoke unrecorded grant");
                let revoke = revoke_command(assignment_id);
                let err = PreflightError::Grant(format!(
                    "could not record assignment {} ({}) and revoking it failed ({}); it will not be cleaned up automatically. Run: {}",
                    assignment_id, write_error, e, revoke
                ));
                PreflightResult::failed(Stage::ManagementGroupInsufficient, err)
                    .with_granted_temp_role()
                    .with_cleanup_command(revoke)
                    .with_grant_command(manual)
            }
        }
    }

    fn resolve_principal(&self, account: &Account) -> Result<Principal, String> {
        let kind = account.principal_kind();
        let resolved = match kind {
            crate::azure::PrincipalKind::User => self.azure.signed_in_user_id(),
            crate::azure::PrincipalKind::ServicePrincipal => {
                self.azure.service_principal_id(&account.user.name)
            }
        };
        match resolved {
            Ok(id) if !id.trim().is_empty() => Ok(Principal {
                id: id.trim().to_string(),
                kind,
            }),
            Ok(_) => Err(format!("empty object id for '{}'", account.user.name)),
            Err(e) => Err(e.to_string()),
        }
    }

    fn require_role(
        &self,
        level: PermissionLevel,
        held: Result<Vec<String>, AzError>,
        allowed: &[String],
        target: &str,
    ) -> Result<(), PreflightError> {
        let held = match held {
            Ok(held) => held,
            Err(e) => {
                tracing::warn!(level = level.label(), error = %e, "role query failed");
                return Err(PreflightError::authorization(
                    level,
                    format!("unable to list role assignments at {}: {}.", target, e),
                ));
            }
        };

        if held
            .iter()
            .any(|name| allowed.iter().any(|a| a.eq_ignore_ascii_case(name.trim())))
        {
            return Ok(());
        }

        let held_text = if held.is_empty() {
            "no roles".to_string()
        } else {
            held.join(", ")
        };
        Err(PreflightError::authorization(
            level,
            format!(
                "found {} at {}; one of [{}] is required.",
                held_text,
                target,
                allowed.join(", ")
            ),
        ))
    }

    /// Read the persisted grant, discarding it if it does not belong to `mg_scope`.
    fn load_record(&self, mg_scope: &str) -> Option<String> {
        let record = match self.store.read() {
            Ok(record) => record?,
            Err(e) => {
                tracing::warn!(error = %e, "unable to read grant record, ignoring it");
                return None;
            }
        };

        if is_valid_grant_record(&record, mg_scope) {
            return Some(record);
        }

        tracing::warn!(record = %record, "discarding malformed grant record; it will not be used for cleanup");
        self.delete_record();
        None
    }

    fn delete_record(&self) {
        if let Err(e) = self.store.delete() {
            tracing::warn!(error = %e, "failed to delete grant record");
        }
    }
}

/// True when `record` is a role-assignment id directly under `mg_scope`.
pub fn is_valid_grant_record(record: &str, mg_scope: &str) -> bool {
    let prefix = role_assignment_prefix(mg_scope);
    let Some(name) = strip_prefix_ignore_case(record.trim(), &prefix) else {
        return false;
    };
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn strip_prefix_ignore_case<'s>(value: &'s str, prefix: &str) -> Option<&'s str> {
    if value.len() < prefix.len() || !value.is_char_boundary(prefix.len()) {
        return None;
    }
    let (head, tail) = value.split_at(prefix.len());
    if head.eq_ignore_ascii_case(prefix) {
        Some(tail)
    } else {
        None
    }
}

fn detail(err: &PreflightError) -> String {
    match err {
        PreflightError::Authorization { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCOPE: &str = "/providers/Microsoft.Management/managementGroups/mg-root";

    #[test]
    fn grant_record_shape_is_validated() {
        let good = format!(
            "{}/providers/Microsoft.Authorization/roleAssignments/3f2504e0-4f89-11d3-9a0c-0305e82c3301",
            SCOPE
        );
        assert!(is_valid_grant_record(&good, SCOPE));
        assert!(is_valid_grant_record(&good.to_lowercase(), SCOPE));

        assert!(!is_valid_grant_record("garbage", SCOPE));
        assert!(!is_valid_grant_record(
            &format!("{}/providers/Microsoft.Authorization/roleAssignments/", SCOPE),
            SCOPE
        ));
        assert!(!is_valid_grant_record(
            &format!("{}/providers/Microsoft.Authorization/roleAssignments/a/b", SCOPE),
            SCOPE
        ));
        assert!(!is_valid_grant_record(
            "/providers/Microsoft.Management/managementGroups/other/providers/Microsoft.Authorization/roleAssignments/abc",
            SCOPE
        ));
    }

    #[test]
    fn strip_prefix_handles_short_input() {
        assert_eq!(strip_prefix_ignore_case("ab", "abc"), None);
        assert_eq!(strip_prefix_ignore_case("ABCdef", "abc"), Some("def"));
    }
}
