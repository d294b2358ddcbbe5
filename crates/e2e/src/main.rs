//! Acceptance test runner entry point
//!
//! Run with: cargo run --package hello-e2e -- --server-binary target/debug/hello-web

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use hello_e2e::browser::BrowserOptions;
use hello_e2e::driver::DriverConfig;
use hello_e2e::runner::RunnerConfig;
use hello_e2e::server::ServerConfig;
use hello_e2e::{E2eResult, Scenario, TestRunner};

#[derive(Parser, Debug)]
#[command(name = "hello-e2e")]
#[command(about = "Headless browser acceptance test for hello-web")]
struct Args {
    /// Path to the responder binary
    #[arg(long, default_value = "target/debug/hello-web")]
    server_binary: PathBuf,

    /// Address the responder listens on
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Scenario YAML file (defaults to the Hello World check)
    #[arg(short, long)]
    scenario: Option<PathBuf>,

    /// Use an already running WebDriver endpoint instead of spawning one
    #[arg(long, env = "WEBDRIVER_URL")]
    driver_url: Option<String>,

    /// chromedriver binary for local runs
    #[arg(long, env = "CHROMEDRIVER_PATH")]
    chromedriver: Option<PathBuf>,

    /// Run the browser with a visible window (needs a display, e.g. Xvfb)
    #[arg(long)]
    headed: bool,

    /// Output directory for the run report
    #[arg(short, long, default_value = "test-results")]
    output: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(2);
        }
    };

    match rt.block_on(async_main(args)) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

async fn async_main(args: Args) -> E2eResult<i32> {
    let scenario = match &args.scenario {
        Some(path) => Scenario::load(path)?,
        None => Scenario::default(),
    };

    let driver = DriverConfig::from_env().with_overrides(args.driver_url, args.chromedriver);

    let config = RunnerConfig {
        server: ServerConfig {
            binary_path: args.server_binary,
            addr: args.addr,
            ..Default::default()
        },
        driver,
        browser: BrowserOptions {
            headless: !args.headed,
            ..Default::default()
        },
        scenario,
        output_dir: args.output,
    };

    let runner = TestRunner::with_config(config);
    let report = runner.run().await;
    let code = runner.finish(&report);

    if let Some(failure) = &report.failure {
        eprintln!("FAIL ({:?}): {}", failure.kind, failure.cause);
        for e in &report.teardown_errors {
            eprintln!("  teardown: {}", e);
        }
    } else {
        eprintln!("PASS {} ({} ms)", report.name, report.duration_ms);
    }

    Ok(code)
}
