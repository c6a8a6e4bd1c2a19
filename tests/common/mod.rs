#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use onboard_preflight::azure::{Account, AccountUser, AzError, AzureCli, PrincipalKind};
use onboard_preflight::config::{AppConfig, RoleConfig};

pub const MG_ID: &str = "mg-root";
pub const SUB_ID: &str = "00000000-0000-0000-0000-000000000001";
pub const PRINCIPAL_ID: &str = "11111111-2222-3333-4444-555555555555";
pub const GRANT_ID: &str =
    "/providers/Microsoft.Management/managementGroups/mg-root/providers/Microsoft.Authorization/roleAssignments/0f8fad5b-d9cb-469f-a165-70867728950e";

pub fn roles() -> RoleConfig {
    AppConfig::defaults().roles
}

/// Scripted stand-in for the `az` binary. Every call is recorded.
pub struct FakeAzure {
    pub account: Option<Account>,
    pub principal_id: Option<String>,
    pub mg_roles: RefCell<Vec<String>>,
    pub sub_roles: Vec<String>,
    pub directory_roles: Vec<String>,
    pub role_query_fails: bool,
    pub grant_succeeds: bool,
    pub revoke_succeeds: bool,
    pub calls: RefCell<Vec<String>>,
}

impl FakeAzure {
    /// A signed-in user holding every required role.
    pub fn sufficient() -> Self {
        Self {
            account: Some(user_account()),
            principal_id: Some(PRINCIPAL_ID.to_string()),
            mg_roles: RefCell::new(vec!["Owner".to_string()]),
            sub_roles: vec!["Contributor".to_string()],
            directory_roles: vec!["Global Administrator".to_string()],
            role_query_fails: false,
            grant_succeeds: true,
            revoke_succeeds: true,
            calls: RefCell::new(Vec::new()),
        }
    }

    /// A signed-in user with subscription and directory roles but no MG role.
    pub fn missing_mg_role() -> Self {
        let fake = Self::sufficient();
        fake.mg_roles.replace(vec!["Reader".to_string()]);
        fake
    }

    /// Simulate a fresh login after the grant took effect.
    pub fn reauthenticate_with(&self, role: &str) {
        self.mg_roles.borrow_mut().push(role.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn called(&self, name: &str) -> bool {
        self.calls.borrow().iter().any(|c| c == name)
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls.borrow().iter().filter(|c| *c == name).count()
    }

    fn record(&self, name: &str) {
        self.calls.borrow_mut().push(name.to_string());
    }
}

pub fn user_account() -> Account {
    Account {
        id: SUB_ID.to_string(),
        tenant_id: "tenant-1".to_string(),
        user: AccountUser {
            name: "operator@example.com".to_string(),
            kind: "user".to_string(),
        },
    }
}

fn failed(args: &str) -> AzError {
    AzError::CommandFailed {
        args: args.to_string(),
        message: "scripted failure".to_string(),
    }
}

impl AzureCli for FakeAzure {
    fn account(&self) -> Result<Account, AzError> {
        self.record("account");
        self.account
            .clone()
            .ok_or_else(|| failed("account show"))
    }

    fn signed_in_user_id(&self) -> Result<String, AzError> {
        self.record("signed_in_user_id");
        self.principal_id
            .clone()
            .ok_or_else(|| failed("ad signed-in-user show"))
    }

    fn service_principal_id(&self, _app_id: &str) -> Result<String, AzError> {
        self.record("service_principal_id");
        self.principal_id
            .clone()
            .ok_or_else(|| failed("ad sp show"))
    }

    fn role_names(&self, _principal_id: &str, scope: &str) -> Result<Vec<String>, AzError> {
        if scope.starts_with("/subscriptions/") {
            self.record("subscription_roles");
            if self.role_query_fails {
                return Err(failed("role assignment list"));
            }
            Ok(self.sub_roles.clone())
        } else {
            self.record("mg_roles");
            if self.role_query_fails {
                return Err(failed("role assignment list"));
            }
            Ok(self.mg_roles.borrow().clone())
        }
    }

    fn directory_roles(&self, _principal_id: &str) -> Result<Vec<String>, AzError> {
        self.record("directory_roles");
        Ok(self.directory_roles.clone())
    }

    fn create_role_assignment(
        &self,
        _principal_id: &str,
        _kind: PrincipalKind,
        _role: &str,
        _scope: &str,
    ) -> Result<String, AzError> {
        self.record("create_role_assignment");
        if self.grant_succeeds {
            Ok(GRANT_ID.to_string())
        } else {
            Err(failed("role assignment create"))
        }
    }

    fn delete_role_assignment(&self, _assignment_id: &str) -> Result<(), AzError> {
        self.record("delete_role_assignment");
        if self.revoke_succeeds {
            Ok(())
        } else {
            Err(failed("role assignment delete"))
        }
    }
}

/// Scratch directory removed on drop.
pub struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    pub fn new(prefix: &str) -> Self {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "onboard-preflight-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("temp dir should be created");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}
