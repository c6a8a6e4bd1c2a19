use anyhow::Context;
use serde_json::json;

use crate::azure::{is_role_assignment_id, management_group_scope};
use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::preflight::is_valid_grant_record;
use crate::state::{FileGrantStore, GrantStore};

pub fn handle(
    management_group_id: Option<String>,
    settings: &AppConfig,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let store = FileGrantStore::new(&settings.paths.state_file);
    let record = store.read().context("failed to read grant record")?;

    let message = match &record {
        Some(_) => "Temporary grant record present",
        None => "No temporary grant record",
    };
    let well_formed = record
        .as_deref()
        .map(|id| record_is_well_formed(id, management_group_id.as_deref()));

    output_success(
        &output_format,
        message,
        Some(json!({
            "state_file": store.path().display().to_string(),
            "grant_record": record,
            "well_formed": well_formed,
        })),
    )
}

fn record_is_well_formed(record: &str, management_group_id: Option<&str>) -> bool {
    match management_group_id {
        Some(mg) => is_valid_grant_record(record, &management_group_scope(mg)),
        None => is_role_assignment_id(record),
    }
}
