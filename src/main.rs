use nken::{Config, Dispatcher, Environment, decode_args, parse_chain};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Variable holding the log filter, e.g. `NKEN_LOG=debug`.
const LOG_FILTER_VAR: &str = "NKEN_LOG";

fn init_logging() {
    let env_filter =
        EnvFilter::try_from_env(LOG_FILTER_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .ok();
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_logging();

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("nken: {err}");
            return exit_code(err.exit_code());
        }
    };
    tracing::debug!(?config, "configuration loaded");

    let dispatcher = Dispatcher::from_config(&config, Environment::new());
    if let Err(err) = dispatcher.validate() {
        tracing::warn!(%err, fallback = %config.fallback, "fallback command does not resolve");
    }
    if !dispatcher.env().current_dir.join(&config.handlers_dir).is_dir() {
        tracing::warn!(
            dir = %config.handlers_dir.display(),
            "handler directory not found, only builtins are available"
        );
    }

    let tokens = match decode_args(std::env::args_os().skip(1)) {
        Ok(tokens) => tokens,
        Err(err) => {
            eprintln!("nken: {err}");
            return exit_code(err.exit_code());
        }
    };
    let chain = parse_chain(tokens, config.split_mode());
    tracing::debug!(invocations = chain.len(), "parsed command chain");

    let mut stdout = std::io::stdout();
    match dispatcher.run(&chain, &mut stdout) {
        Ok(report) => {
            tracing::debug!(executed = report.executed, fell_back = report.fell_back, "chain done");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::debug!(command = ?err.command(), code = err.exit_code(), "chain aborted");
            exit_code(err.exit_code())
        }
    }
}
