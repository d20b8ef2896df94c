use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // stdout carries the JSON document; diagnostics go to stderr.
    let filter =
        EnvFilter::try_from_env("CLAIMLENS_CLI_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ =
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();

    claimlens_cli::run()
}
