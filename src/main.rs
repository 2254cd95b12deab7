use std::process::ExitCode;

use clap::Parser;
use pingpong::{
    config::{Command, Config},
    load_test::LoadTest,
    server::ServerBuilder,
    PingPong,
};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let config = Config::parse();
    init_tracing(config.verbose);

    let result = match &config.command {
        Some(Command::LoadTest(load_test)) => {
            run_load_test(load_test);
            Ok(())
        }
        None => run(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "server failed");
            eprintln!("pingpong: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> std::io::Result<()> {
    let app = PingPong::from_config(config);
    let server = ServerBuilder::from_config(config).try_bind(config.bind_addr())?;

    tracing::info!(
        addr = %server.local_addr()?,
        threshold = config.threshold,
        boundary = ?config.boundary(),
        "Server started on {}",
        server.local_addr()?,
    );

    server.serve(app)
}

fn run_load_test(load_test: &LoadTest) {
    tracing::info!(
        addr = %load_test.target,
        requests = load_test.requests,
        concurrency = load_test.concurrency,
        "Running load test"
    );

    let report = load_test.run();

    tracing::info!(
        served = report.served,
        rejected = report.rejected,
        failed = report.failed,
        "Completed load test"
    );
    println!("{report}");
}

/// Logs to stderr. `--verbose` forces `debug`, otherwise `RUST_LOG` applies
/// and falls back to `info`.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
