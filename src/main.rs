mod classifier;
mod config;
mod context;
mod driver;
mod errors;
mod loader;
mod locator;
mod protocol;
mod renewal;
mod retry;
mod telemetry;
mod validation;

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use config::RenewalConfig;
use driver::chrome::ChromeDriver;
use driver::DriverError;
use errors::{ErrorCode, StructuredError};
use protocol::{Outcome, RunReport};
use retry::RetryExecutor;
use telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};

#[derive(Parser)]
#[command(name = "renewer")]
#[command(about = "Unattended page renewal runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the renewal once (or up to the configured retry attempts)
    Renew {
        /// Path to the JSON config file (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Path to the output report file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write logs to this file
        #[arg(long)]
        log_file: Option<PathBuf>,

        /// Directory for diagnostic screenshots
        #[arg(long)]
        screenshots: Option<PathBuf>,

        /// Where the page markup goes when the input is not found
        #[arg(long, default_value = "page_debug.html")]
        debug_html: PathBuf,

        /// Show the browser window
        #[arg(long)]
        headful: bool,
    },

    /// Loads and validates the config, then prints the effective values
    CheckConfig {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_file = match &cli.command {
        Commands::Renew { log_file, .. } => log_file.clone(),
        Commands::CheckConfig { .. } => None,
    };
    let mut telemetry_config = TelemetryConfig::from_env();
    if log_file.is_some() {
        telemetry_config.log_file = log_file;
    }
    if let Err(e) = init_telemetry(telemetry_config) {
        eprintln!("❌ Failed to initialize logging: {:#}", e);
        std::process::exit(1);
    }

    let code = match cli.command {
        Commands::Renew {
            config,
            output,
            screenshots,
            debug_html,
            headful,
            ..
        } => {
            let overrides = Overrides {
                screenshots,
                headful,
            };
            renew(config.as_deref(), overrides, output.as_deref(), &debug_html).await
        }
        Commands::CheckConfig { config } => check_config(config.as_deref()),
    };

    shutdown_telemetry();
    std::process::exit(code);
}

/// CLI flags that take precedence over file and environment.
struct Overrides {
    screenshots: Option<PathBuf>,
    headful: bool,
}

/// Loads and validates; on failure logs every problem and returns `None`.
fn prepare(path: Option<&Path>) -> Option<RenewalConfig> {
    let config = match loader::load_config(path) {
        Ok(c) => c,
        Err(e) => {
            let code = loader::load_error_code(&e);
            error!(
                category = ?code.category(),
                error = %StructuredError::new(code, format!("{:#}", e)),
                "Failed to load config: {}",
                code.description()
            );
            return None;
        }
    };

    if let Err(errors) = validation::validate_config(&config) {
        for e in &errors {
            let structured = StructuredError::new(e.code(), e.to_string()).with_field(e.field());
            error!(error = %structured, "Invalid config");
        }
        return None;
    }

    Some(config)
}

fn check_config(path: Option<&Path>) -> i32 {
    let Some(mut config) = prepare(path) else {
        return 1;
    };

    // The fill value may be a credential.
    config.fill_value = "*".repeat(config.fill_value.chars().count().min(8));
    config.variables.clear();

    match serde_json::to_string_pretty(&config) {
        Ok(json) => {
            println!("✅ Config is valid\n{}", json);
            0
        }
        Err(e) => {
            error!(error = %StructuredError::new(ErrorCode::SERIALIZATION_ERROR, e.to_string()), "Failed to print config");
            1
        }
    }
}

async fn renew(
    path: Option<&Path>,
    overrides: Overrides,
    output: Option<&Path>,
    debug_html: &Path,
) -> i32 {
    let Some(mut config) = prepare(path) else {
        return 1;
    };
    if let Some(dir) = overrides.screenshots {
        config.screenshot_dir = Some(dir);
    }
    if overrides.headful {
        config.browser.headless = false;
    }
    if let Some(dir) = &config.screenshot_dir {
        if let Err(e) = fs::create_dir_all(dir) {
            warn!(path = %dir.display(), error = %e, "Cannot create screenshot directory");
        }
    }

    info!(url = %config.target_url, strategy = %config.recovery.strategy, "Renewer starting");

    let executor = RetryExecutor::new(config.recovery.clone());
    let report = executor
        .execute("renewal", |attempt| attempt_run(&config, attempt), RunReport::is_retryable)
        .await;

    if let Some(markup) = &report.debug_markup {
        match fs::write(debug_html, markup) {
            Ok(()) => info!(path = %debug_html.display(), "Page markup saved for debugging"),
            Err(e) => error!(
                error = %StructuredError::new(ErrorCode::OUTPUT_WRITE_FAILED, e.to_string()),
                path = %debug_html.display(),
                "Failed to write page markup"
            ),
        }
    }

    write_report(&report, output);
    log_status(&report);

    report.outcome.exit_code()
}

/// One attempt: fresh browser, fresh page.
async fn attempt_run(config: &RenewalConfig, attempt: u32) -> RunReport {
    info!(attempt, "Launching browser");
    let launch = tokio::time::timeout(config.timeout(), ChromeDriver::launch(&config.browser)).await;
    match launch {
        Ok(Ok(driver)) => renewal::run(config, driver).await,
        Ok(Err(e)) => renewal::launch_failure_report(config, &e),
        Err(_) => renewal::launch_failure_report(
            config,
            &DriverError::Timeout {
                operation: "launch",
                limit_ms: config.timeout_ms,
            },
        ),
    }
}

fn write_report(report: &RunReport, output: Option<&Path>) {
    let json = match serde_json::to_string_pretty(report) {
        Ok(json) => json,
        Err(e) => {
            error!(error = %StructuredError::new(ErrorCode::SERIALIZATION_ERROR, e.to_string()), "Failed to serialize report");
            return;
        }
    };

    match output {
        Some(path) => match fs::write(path, json) {
            Ok(()) => info!(path = %path.display(), "Report saved"),
            Err(e) => error!(
                error = %StructuredError::new(ErrorCode::OUTPUT_WRITE_FAILED, e.to_string()),
                path = %path.display(),
                "Failed to write report"
            ),
        },
        None => println!("\n--- Renewal Report ---\n{}", json),
    }
}

fn log_status(report: &RunReport) {
    if !report.outcome.needs_attention() {
        let message = match report.outcome {
            Outcome::Cooldown => "⏳ Renewal on cooldown, nothing to do",
            _ => "✅ Renewal succeeded",
        };
        info!(duration_ms = report.duration_ms, status = report.outcome.label(), "{}", message);
        return;
    }

    match &report.outcome {
        Outcome::Failed(reason) => error!(
            duration_ms = report.duration_ms,
            reason = %reason,
            "❌ Renewal failed; check screenshots, page markup and logs"
        ),
        _ => warn!(
            duration_ms = report.duration_ms,
            "⚠️ Renewal result unconfirmed; check screenshots and the report"
        ),
    }
}
