pub mod delegated;
pub mod local;
pub mod revoke;
pub mod status;

use crate::assembler::{assemble, TemplateParameters, Variant};
use crate::cli::utils::emit_record;
use crate::config::AppConfig;
use crate::params::ParameterSet;
use crate::preflight::PreflightResult;

/// Emit a complete failure record when the invocation itself is unusable.
pub fn emit_invocation_failure(message: &str, variant: Variant, settings: &AppConfig) -> anyhow::Result<()> {
    let params = ParameterSet::load(&settings.paths.params_file).normalized(&settings.params.json_fields);
    let result = PreflightResult::internal_failure(message);
    let record = assemble(&params, &result, variant, &TemplateParameters::default());
    emit_record(&record, false)
}
