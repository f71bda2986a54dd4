//! mcp-relay binary entry point.
//!
//! Usage: `mcp-relay [OPTIONS] -- <COMMAND> [ARGS]...`

use clap::Parser;

use mcp_relay::cli::RelayArgs;
use mcp_relay::config::RelayConfig;
use mcp_relay::diagnostics::DiagnosticSink;

#[derive(Parser)]
#[command(
    name = "mcp-relay",
    version,
    about = "Relay an MCP stdio server, keeping its stdout protocol-clean"
)]
struct Cli {
    #[command(flatten)]
    args: RelayArgs,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match RelayConfig::from_args(cli.args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("mcp-relay error: {e}");
            std::process::exit(e.exit_code());
        }
    };

    let started = chrono::Local::now();
    let sink = config
        .log_path(started.date_naive())
        .map_or_else(DiagnosticSink::disabled, |path| {
            DiagnosticSink::open_or_disabled(&path)
        });
    init_tracing(config.verbose, &sink);

    sink.line(&format!(
        "=== start {} pid={} ===",
        started.format("%Y-%m-%dT%H:%M:%S"),
        std::process::id()
    ));

    let code = match mcp_relay::relay::run_relay(&config, sink.clone()).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "relay failed");
            eprintln!("mcp-relay error: {e}");
            sink.line(&format!("relay error: {e}"));
            e.exit_code()
        }
    };

    sink.line(&format!(
        "=== end {} code={code} ===",
        chrono::Local::now().format("%Y-%m-%dT%H:%M:%S")
    ));
    match sink.path() {
        Some(path) => eprintln!("mcp-relay log: {}", path.display()),
        None if config.log_dir.is_some() => {
            eprintln!("mcp-relay log: disabled (log directory not writable)");
        }
        None => eprintln!("mcp-relay log: disabled"),
    }

    // Exit directly: a blocked stdin read would otherwise hold the runtime open.
    std::process::exit(code);
}

/// Install the subscriber: `RUST_LOG`-filtered stderr plus the diagnostic file.
fn init_tracing(verbose: bool, sink: &DiagnosticSink) {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let stderr_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    let file_filter = EnvFilter::new(if verbose { "debug" } else { "info" });

    let file_layer = sink.is_enabled().then(|| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(sink.clone())
            .with_filter(file_filter)
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(stderr_filter),
        )
        .with(file_layer)
        .init();
}
