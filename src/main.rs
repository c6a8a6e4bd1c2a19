use clap::error::ErrorKind;
use clap::Parser;
use onboard_preflight::cli::{self, commands, Cli};
use onboard_preflight::config::config;
use tracing_subscriber::EnvFilter;

fn main() {
    // Load .env if present so PREFLIGHT_* overrides apply before the config singleton is built
    let _ = dotenvy::dotenv();

    // stdout is reserved for the JSON document
    let filter = EnvFilter::try_from_env("PREFLIGHT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => handle_parse_error(e),
    };

    if let Err(e) = cli::run(cli) {
        match std::env::var("CLI_VERBOSE").as_deref() {
            Ok("true") | Ok("1") => eprintln!("Error: {e:?}"),
            _ => eprintln!("Error: {e}"),
        }
        std::process::exit(1);
    }
}

/// Preflight invocations always answer with a JSON record; other commands
/// fall back to clap's usage error.
fn handle_parse_error(e: clap::Error) -> ! {
    if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
        e.exit();
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(variant) = cli::invoked_variant(&args) else {
        e.exit();
    };

    let message = format!("invalid arguments: {}", e.render().to_string().trim());
    if let Err(emit_err) = commands::emit_invocation_failure(&message, variant, config()) {
        eprintln!("Error: {emit_err}");
        std::process::exit(1);
    }
    std::process::exit(0);
}
