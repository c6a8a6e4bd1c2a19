mod common;

use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use common::TempDirGuard;
use serde_json::Value;

const PARAMS: &str = r#"# onboarding parameters
TENANT_ID="tenant-1"
CUSTOMER_OBJECT_ID="cust-9"
TAGS="{'env': 'prod', 'owner': 'platform'}"
RESOURCE_SUFFIX="Prod01"
TEMPLATE_VERSION="{'main': '3.2.0', 'auditLogsStorage': '1.1.0'}"
AUDIENCE="api://collector"
"#;

fn run_preflight<I, S>(cwd: &Path, args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let bin = env!("CARGO_BIN_EXE_onboard-preflight");
    Command::new(bin)
        .args(args)
        .current_dir(cwd)
        .env("PREFLIGHT_AZ_BIN", "onboard-preflight-missing-az")
        .env("PREFLIGHT_TOOL_PATH", "onboard-preflight-missing-tool")
        .env_remove("PREFLIGHT_PARAMS_FILE")
        .env_remove("PREFLIGHT_STATE_FILE")
        .env_remove("PREFLIGHT_TEMPLATE_FILE")
        .output()
        .expect("onboard-preflight should execute")
}

fn parse_stdout(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "command failed with status {:?}\nstdout:\n{}\nstderr:\n{}",
        output.status.code(),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr),
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be one JSON document")
}

fn write_params(dir: &TempDirGuard) -> String {
    let path = dir.path().join("params.sh");
    fs::write(&path, PARAMS).expect("params file should be written");
    path.display().to_string()
}

#[test]
fn disabled_local_run_emits_full_record() {
    let dir = TempDirGuard::new("smoke-disabled");
    let params = write_params(&dir);

    let output = run_preflight(
        dir.path(),
        ["--params", params.as_str(), "local", "mg-root", "sub-1", "false", "false"],
    );
    let body = parse_stdout(&output);

    assert_eq!(body["preflight_ok"], "true");
    assert_eq!(body["preflight_error"], "");
    assert_eq!(body["granted_mg_admin"], "false");
    assert_eq!(body["cleanup_cmd"], "");
    assert_eq!(body["tenant_id"], "tenant-1");
    assert_eq!(body["connector_id"], "");
    assert_eq!(body["storage_account_name"], "stonbprod01");

    let tags: Value = serde_json::from_str(body["tags"].as_str().unwrap()).unwrap();
    assert_eq!(tags["env"], "prod");
    assert!(body.as_object().unwrap().values().all(Value::is_string));
}

#[test]
fn missing_arguments_fail_structurally_with_exit_zero() {
    let dir = TempDirGuard::new("smoke-missing");

    let output = run_preflight(dir.path(), ["local", "", "", "true", "true"]);
    let body = parse_stdout(&output);

    assert_eq!(body["preflight_ok"], "false");
    assert!(body["preflight_error"]
        .as_str()
        .unwrap()
        .contains("required for preflight checks"));
    assert!(!dir.path().join(".preflight_grant_id").exists());
}

#[test]
fn absent_az_binary_reports_login_failure() {
    let dir = TempDirGuard::new("smoke-no-az");

    let output = run_preflight(dir.path(), ["local", "mg-root", "sub-1", "true", "false"]);
    let body = parse_stdout(&output);

    assert_eq!(body["preflight_ok"], "false");
    assert!(body["preflight_error"].as_str().unwrap().contains("az login"));
}

#[test]
fn invalid_flag_still_yields_json_record() {
    let dir = TempDirGuard::new("smoke-invalid");

    let output = run_preflight(dir.path(), ["local", "mg-root", "sub-1", "maybe"]);
    let body = parse_stdout(&output);

    assert_eq!(body["preflight_ok"], "false");
    assert!(body["preflight_error"]
        .as_str()
        .unwrap()
        .starts_with("invalid arguments"));
}

#[test]
fn delegated_run_filters_optional_template_parameters() {
    let dir = TempDirGuard::new("smoke-template");
    let params = write_params(&dir);
    let template = dir.path().join("main.json");
    fs::write(
        &template,
        r#"{"parameters": {"audience": {"type": "string"}, "tags": {"type": "object"}}}"#,
    )
    .unwrap();

    let output = run_preflight(
        dir.path(),
        [
            "--params",
            params.as_str(),
            "--template",
            template.to_str().unwrap(),
            "delegated",
            "tenant-root",
            "sub-1",
            "false",
            "tenant",
        ],
    );
    let body = parse_stdout(&output);

    assert_eq!(body["preflight_ok"], "true");
    assert_eq!(body["preflight_output"], "");
    assert_eq!(body["grant_cmd"], "");
    let optional: Value = serde_json::from_str(body["template_parameters"].as_str().unwrap()).unwrap();
    assert_eq!(optional["audience"]["value"], "api://collector");
    assert_eq!(optional["tags"]["value"]["owner"], "platform");
    assert!(optional.get("connectorId").is_none());
}

#[test]
fn delegated_run_without_tool_fails_structurally() {
    let dir = TempDirGuard::new("smoke-no-tool");

    let output = run_preflight(dir.path(), ["delegated", "tenant-root", "sub-1", "true", "tenant"]);
    let body = parse_stdout(&output);

    assert_eq!(body["preflight_ok"], "false");
    assert!(body["preflight_error"]
        .as_str()
        .unwrap()
        .contains("not available"));
}

#[test]
fn status_reports_empty_slot() {
    let dir = TempDirGuard::new("smoke-status");

    let output = run_preflight(dir.path(), ["--json", "status"]);
    let body = parse_stdout(&output);

    assert_eq!(body["success"], true);
    assert!(body["grant_record"].is_null());
    assert!(body["well_formed"].is_null());
}

#[test]
fn flag_value_named_local_does_not_turn_status_into_preflight() {
    let dir = TempDirGuard::new("smoke-flag-value");

    let output = run_preflight(dir.path(), ["--params", "local", "status", "--bogus"]);

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--bogus"));
}
