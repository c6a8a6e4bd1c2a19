use crate::assembler::{assemble, TemplateParameters, Variant};
use crate::azure::AzCli;
use crate::cli::utils::emit_record;
use crate::config::AppConfig;
use crate::params::ParameterSet;
use crate::preflight::{LocalChecker, PreflightRequest};
use crate::state::FileGrantStore;

pub struct LocalArgs {
    pub management_group_id: String,
    pub subscription_id: String,
    pub preflight_enabled: bool,
    pub self_grant: bool,
}

pub fn handle(args: LocalArgs, settings: &AppConfig, pretty: bool) -> anyhow::Result<()> {
    let params = ParameterSet::load(&settings.paths.params_file).normalized(&settings.params.json_fields);

    let azure = AzCli::new(&settings.azure.az_binary, &settings.azure.graph_endpoint);
    let store = FileGrantStore::new(&settings.paths.state_file);
    let request = PreflightRequest {
        management_group_id: args.management_group_id,
        subscription_id: args.subscription_id,
        enabled: args.preflight_enabled,
        self_grant: args.self_grant,
    };

    let result = LocalChecker::new(&azure, &store, &settings.roles).run(&request);
    tracing::info!(ok = result.ok, stage = ?result.stage, "local preflight finished");

    let template = TemplateParameters::load_or_empty(settings.paths.template_file.as_deref());
    let record = assemble(&params, &result, Variant::Local, &template);
    emit_record(&record, pretty)
}
