use crate::assembler::{assemble, TemplateParameters, Variant};
use crate::cli::utils::emit_record;
use crate::config::AppConfig;
use crate::params::ParameterSet;
use crate::preflight::delegated::audit_logs_requested;
use crate::preflight::{DelegatedChecker, DelegatedRequest, ExternalTool, OnboardingType};

pub struct DelegatedArgs {
    pub scope_id: String,
    pub subscription_id: String,
    pub preflight_enabled: bool,
    pub onboarding_type: OnboardingType,
}

pub fn handle(args: DelegatedArgs, settings: &AppConfig, pretty: bool) -> anyhow::Result<()> {
    let params = ParameterSet::load(&settings.paths.params_file).normalized(&settings.params.json_fields);

    let audit_logs = audit_logs_requested(
        params.get("template_version"),
        &settings.delegated.audit_marker_prefix,
    );
    let request = DelegatedRequest {
        scope_id: args.scope_id,
        subscription_id: args.subscription_id,
        enabled: args.preflight_enabled,
        onboarding_type: args.onboarding_type,
        audit_logs,
    };

    let tool = ExternalTool::new(&settings.delegated.tool_path);
    let result = DelegatedChecker::new(&tool, &settings.delegated.pinned_version)
        .run(&request, params.get("tenant_id"));
    tracing::info!(ok = result.ok, stage = ?result.stage, audit_logs, "delegated preflight finished");

    let template = TemplateParameters::load_or_empty(settings.paths.template_file.as_deref());
    let record = assemble(&params, &result, Variant::Delegated, &template);
    emit_record(&record, pretty)
}
