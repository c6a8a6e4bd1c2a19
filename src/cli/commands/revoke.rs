use anyhow::Context;
use serde_json::json;

use crate::azure::{is_role_assignment_id, management_group_scope, AzCli, AzureCli};
use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::preflight::is_valid_grant_record;
use crate::state::{FileGrantStore, GrantStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokeOutcome {
    pub assignment_id: String,
    pub record_cleared: bool,
}

pub fn handle(
    assignment_id: Option<String>,
    management_group_id: Option<String>,
    settings: &AppConfig,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let azure = AzCli::new(&settings.azure.az_binary, &settings.azure.graph_endpoint);
    let store = FileGrantStore::new(&settings.paths.state_file);

    let outcome = revoke(
        &azure,
        &store,
        assignment_id.as_deref(),
        management_group_id.as_deref(),
    )?;

    output_success(
        &output_format,
        &format!("Revoked role assignment {}", outcome.assignment_id),
        Some(json!({
            "assignment_id": outcome.assignment_id,
            "record_cleared": outcome.record_cleared,
        })),
    )
}

/// Delete a temporary role assignment, consuming the grant record when it names it.
pub fn revoke<A: AzureCli, S: GrantStore>(
    azure: &A,
    store: &S,
    explicit_id: Option<&str>,
    management_group_id: Option<&str>,
) -> anyhow::Result<RevokeOutcome> {
    let stored = store.read().context("failed to read grant record")?;

    let (assignment_id, from_store) = match explicit_id.map(str::trim) {
        Some(id) if !id.is_empty() => (id.to_string(), stored.as_deref() == Some(id)),
        _ => {
            let id = stored.context("no grant record found; pass --assignment-id")?;
            (id, true)
        }
    };

    let well_formed = match management_group_id {
        Some(mg) => is_valid_grant_record(&assignment_id, &management_group_scope(mg)),
        None => is_role_assignment_id(&assignment_id),
    };
    if !well_formed {
        anyhow::bail!("refusing to revoke malformed role assignment id '{}'", assignment_id);
    }

    azure
        .delete_role_assignment(&assignment_id)
        .with_context(|| format!("failed to delete role assignment {}", assignment_id))?;
    tracing::info!(assignment = %assignment_id, "revoked temporary role assignment");

    if from_store {
        store.delete().context("role assignment revoked but grant record could not be removed")?;
    }

    Ok(RevokeOutcome {
        assignment_id,
        record_cleared: from_store,
    })
}
