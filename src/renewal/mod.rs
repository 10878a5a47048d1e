// Module: Renewal
// One renewal run: open → locate input → fill → locate control → activate
// → settle → classify. The page is closed exactly once, whatever happens.

pub mod settle;

use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::classifier::PhraseMatch;
use crate::config::RenewalConfig;
use crate::driver::{BoundedPage, DriverError, PageDriver};
use crate::errors::{ErrorCode, ErrorContext, StructuredError};
use crate::locator::{activate_broadly, locate, locate_action};
use crate::protocol::{Activation, Outcome, RunReport};

const EXCERPT_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRole {
    Input,
    Action,
}

impl fmt::Display for ElementRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Action => write!(f, "action"),
        }
    }
}

/// Why a run ended in `Outcome::Failed`.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("element not found for role {0}")]
    ElementNotFound(ElementRole),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl RunError {
    /// Human-readable reason carried by `Outcome::Failed`.
    pub fn reason(&self) -> String {
        match self {
            Self::Driver(err) if err.is_timeout() => "timeout".to_string(),
            Self::Driver(err) => format!("driver exception: {}", err),
            Self::ElementNotFound(_) => self.to_string(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ElementNotFound(ElementRole::Input) => ErrorCode::INPUT_NOT_FOUND,
            Self::ElementNotFound(ElementRole::Action) => ErrorCode::ACTION_NOT_FOUND,
            Self::Driver(err) => err.code(),
        }
    }

    /// Code, reason and the element role or driver operation involved.
    pub fn structured(&self) -> StructuredError {
        let context = match self {
            Self::ElementNotFound(role) => ErrorContext {
                role: Some(role.to_string()),
                ..Default::default()
            },
            Self::Driver(DriverError::Timeout { operation, .. })
            | Self::Driver(DriverError::Operation { operation, .. }) => ErrorContext {
                operation: Some(operation.to_string()),
                ..Default::default()
            },
            Self::Driver(DriverError::Launch(_)) => ErrorContext::default(),
        };
        StructuredError::new(self.code(), self.reason()).with_context(context)
    }
}

/// What the run learned along the way, kept even when it fails midway.
#[derive(Debug, Default)]
struct RunTrace {
    input_strategy: Option<usize>,
    activation: Option<Activation>,
    matched: Option<PhraseMatch>,
    markup_len: Option<usize>,
    text_excerpt: Option<String>,
    debug_markup: Option<String>,
}

/// Runs one renewal against `driver` and releases it before returning.
#[instrument(name = "renewal", skip_all, fields(url = %config.target_url))]
pub async fn run<D: PageDriver>(config: &RenewalConfig, driver: D) -> RunReport {
    let started_at = Utc::now();
    let start = Instant::now();

    let mut page = BoundedPage::new(driver, config.timeout());
    let mut trace = RunTrace::default();

    let result = drive(config, &page, &mut trace).await;

    if let Err(e) = page.close().await {
        warn!(error = %e, "Failed to close page");
    }

    let (outcome, error_code) = match result {
        Ok(outcome) => (outcome, None),
        Err(err) => {
            error!(
                category = ?err.code().category(),
                error = %err.structured(),
                "Renewal run failed: {}",
                err.code().description()
            );
            (Outcome::Failed(err.reason()), Some(err.code().formatted()))
        }
    };

    finish_report(config, started_at, start, outcome, error_code, trace)
}

/// Report for a run whose browser never came up.
pub fn launch_failure_report(config: &RenewalConfig, err: &DriverError) -> RunReport {
    error!(code = %err.code(), error = %err, "Browser launch failed");
    let reason = RunError::Driver(err.clone()).reason();
    finish_report(
        config,
        Utc::now(),
        Instant::now(),
        Outcome::Failed(reason),
        Some(err.code().formatted()),
        RunTrace::default(),
    )
}

fn finish_report(
    config: &RenewalConfig,
    started_at: DateTime<Utc>,
    start: Instant,
    outcome: Outcome,
    error_code: Option<String>,
    trace: RunTrace,
) -> RunReport {
    RunReport {
        run_id: Uuid::new_v4().to_string(),
        target_url: config.target_url.clone(),
        start_time: started_at.to_rfc3339(),
        end_time: Utc::now().to_rfc3339(),
        duration_ms: start.elapsed().as_millis() as u64,
        outcome,
        error_code,
        input_strategy: trace.input_strategy,
        activation: trace.activation,
        matched: trace.matched,
        markup_len: trace.markup_len,
        text_excerpt: trace.text_excerpt,
        debug_markup: trace.debug_markup,
    }
}

async fn drive<D: PageDriver>(
    config: &RenewalConfig,
    page: &D,
    trace: &mut RunTrace,
) -> Result<Outcome, RunError> {
    let shots = config.screenshot_dir.as_deref();

    info!(url = %config.target_url, "Opening renewal page");
    page.navigate(&config.target_url).await?;
    settle::pause("load", Duration::from_millis(config.load_settle_ms)).await;
    checkpoint(page, shots, "page_loaded.png").await?;

    // Input
    let input = match locate(page, &config.input_selectors).await? {
        Some(found) => found,
        None => {
            error!("No visible input matched any selector");
            match page.page_markup().await {
                Ok(markup) => trace.debug_markup = Some(markup),
                Err(e) => warn!(error = %e, "Could not capture page markup for debugging"),
            }
            return Err(RunError::ElementNotFound(ElementRole::Input));
        }
    };
    info!(index = input.strategy_index, selector = %input.strategy, "Input found");
    trace.input_strategy = Some(input.strategy_index);

    page.fill(&input.element, &config.fill_value).await?;
    info!("Input filled");
    settle::pause("fill", Duration::from_millis(config.fill_settle_ms)).await;
    checkpoint(page, shots, "after_fill.png").await?;

    // Action control: configured strategies first, then one broad pass.
    let keywords = config.action_keywords();
    match locate_action(page, &config.action_selectors, &keywords).await? {
        Some(control) => {
            info!(
                index = control.strategy_index,
                selector = %control.strategy,
                text = control.text.as_deref().unwrap_or(""),
                "Activating control"
            );
            trace.activation = Some(Activation::Strategy {
                index: control.strategy_index,
                selector: control.strategy.to_string(),
            });
            page.click(&control.element).await?;
        }
        None => {
            warn!("No configured selector matched a visible action control, trying broad pass");
            trace.activation = Some(Activation::BroadPass { text: None });
            match activate_broadly(page, &keywords).await? {
                Some(text) => {
                    info!(text = %text, "Activated control via broad pass");
                    trace.activation = Some(Activation::BroadPass { text: Some(text) });
                }
                None => {
                    trace.activation = None;
                    return Err(RunError::ElementNotFound(ElementRole::Action));
                }
            }
        }
    }

    let stable = settle::settle(page, Duration::from_millis(config.action_settle_ms), &config.settle).await?;
    if !stable {
        warn!("Page text still changing; classifying last snapshot");
    }
    checkpoint(page, shots, "final_result.png").await?;

    let markup = page.page_markup().await?;
    let text = page.page_text().await?;
    debug!(markup_len = markup.len(), "Page snapshot taken");
    trace.markup_len = Some(markup.len());
    trace.text_excerpt = Some(text.chars().take(EXCERPT_CHARS).collect());

    let classification = config.classifier().explain(&text, &markup);
    match &classification.matched {
        Some(m) => info!(phrase = %m.phrase, source = ?m.source, outcome = %classification.outcome, "Page classified"),
        None => warn!(outcome = %classification.outcome, "No configured phrase matched the page"),
    }
    trace.matched = classification.matched;

    Ok(classification.outcome)
}

/// Diagnostic screenshot. A timeout ends the run like any other
/// operation; other capture faults are only logged.
async fn checkpoint<D: PageDriver>(
    page: &D,
    dir: Option<&Path>,
    name: &str,
) -> Result<(), DriverError> {
    let Some(dir) = dir else {
        return Ok(());
    };
    let path = dir.join(name);
    match page.screenshot(&path).await {
        Ok(()) => info!(path = %path.display(), "Screenshot saved"),
        Err(e) if e.is_timeout() => return Err(e),
        Err(e) => warn!(path = %path.display(), error = %e, "Screenshot failed"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::scripted::ScriptedPage;
    use serde_json::json;
    use std::path::PathBuf;

    fn renewal_page() -> ScriptedPage {
        ScriptedPage::new()
            .with_element(1, &["input"], true, "")
            .with_element(2, &["button:has-text(\"Renew & Start\")", "button"], true, "Renew & Start")
    }

    #[tokio::test]
    async fn test_successful_run() {
        let config = RenewalConfig::for_tests("nhb789.xmania.me");
        let page = renewal_page()
            .with_text("Server renewed and started")
            .with_markup("<html><body>Server renewed</body></html>");
        let log = page.log();

        let report = run(&config, page).await;

        assert_eq!(report.outcome, Outcome::Succeeded);
        assert_eq!(report.input_strategy, Some(4)); // "input" is the 5th default selector
        assert_eq!(
            report.activation,
            Some(Activation::Strategy {
                index: 0,
                selector: "button:has-text(\"Renew & Start\")".to_string(),
            })
        );
        assert!(report.error_code.is_none());
        assert_eq!(report.markup_len, Some(40));

        let log = log.lock().unwrap();
        assert_eq!(log.navigated, vec!["https://renew.example.test/"]);
        assert_eq!(log.filled, vec![(1, "nhb789.xmania.me".to_string())]);
        assert_eq!(log.clicked, vec![2]);
        assert_eq!(log.closes, 1);
    }

    #[tokio::test]
    async fn test_cooldown_run() {
        let config = RenewalConfig::for_tests("srv");
        let page = renewal_page().with_text("Please wait, cooldown active, try again in 42 minutes");

        let report = run(&config, page).await;
        assert_eq!(report.outcome, Outcome::Cooldown);
        assert_eq!(report.matched.unwrap().phrase, "cooldown");
    }

    #[tokio::test]
    async fn test_missing_input_fails_and_keeps_markup() {
        let config = RenewalConfig::for_tests("srv");
        let page = ScriptedPage::new()
            .with_element(1, &["input"], false, "")
            .with_markup("<html><form></form></html>");
        let log = page.log();

        let report = run(&config, page).await;

        assert_eq!(
            report.outcome,
            Outcome::Failed("element not found for role input".to_string())
        );
        assert_eq!(report.error_code.as_deref(), Some("E3001"));
        assert_eq!(report.debug_markup.as_deref(), Some("<html><form></form></html>"));
        assert!(report.is_retryable());
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[tokio::test]
    async fn test_broad_pass_used_when_strategies_exhausted() {
        let config = RenewalConfig::for_tests("srv");
        let page = ScriptedPage::new()
            .with_element(1, &["input"], true, "")
            .with_element(2, &["button"], true, "Go")
            .with_evaluate_result(json!("Renew"))
            .with_text("Your server was extended");
        let log = page.log();

        let report = run(&config, page).await;

        assert_eq!(report.outcome, Outcome::Succeeded);
        assert_eq!(
            report.activation,
            Some(Activation::BroadPass {
                text: Some("Renew".to_string())
            })
        );
        let log = log.lock().unwrap();
        assert!(log.clicked.is_empty());
        assert_eq!(log.scripts.len(), 1);
        // Every configured action selector was tried before the broad pass.
        assert!(log.resolved.iter().any(|s| s == "button"));
    }

    #[tokio::test]
    async fn test_broad_pass_finding_nothing_fails() {
        let config = RenewalConfig::for_tests("srv");
        let page = ScriptedPage::new()
            .with_element(1, &["input"], true, "")
            .with_evaluate_result(json!(null));

        let report = run(&config, page).await;

        assert_eq!(
            report.outcome,
            Outcome::Failed("element not found for role action".to_string())
        );
        assert_eq!(report.error_code.as_deref(), Some("E3002"));
        assert!(!report.activated());
    }

    #[tokio::test]
    async fn test_activation_timeout_fails_and_releases_once() {
        let config = RenewalConfig {
            timeout_ms: 50,
            ..RenewalConfig::for_tests("srv")
        };
        let page = renewal_page()
            .with_click_delay(Duration::from_millis(500))
            .with_text("Server renewed");
        let log = page.log();

        let report = run(&config, page).await;

        assert_eq!(report.outcome, Outcome::Failed("timeout".to_string()));
        assert_eq!(report.error_code.as_deref(), Some("E2001"));
        assert!(report.activated());
        assert!(!report.is_retryable());
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[tokio::test]
    async fn test_navigation_error_is_fatal() {
        let config = RenewalConfig::for_tests("srv");
        let page = renewal_page().with_navigate_error("net::ERR_NAME_NOT_RESOLVED");
        let log = page.log();

        let report = run(&config, page).await;

        match &report.outcome {
            Outcome::Failed(reason) => {
                assert!(reason.starts_with("driver exception"));
                assert!(reason.contains("ERR_NAME_NOT_RESOLVED"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(report.error_code.as_deref(), Some("E2003"));
        let log = log.lock().unwrap();
        assert!(log.filled.is_empty());
        assert_eq!(log.closes, 1);
    }

    #[tokio::test]
    async fn test_unrecognized_page_is_unconfirmed() {
        let config = RenewalConfig::for_tests("srv");
        let page = renewal_page().with_text("An unexpected error occurred");

        let report = run(&config, page).await;
        assert_eq!(report.outcome, Outcome::Unconfirmed);
        assert!(report.outcome.needs_attention());
        assert_eq!(report.text_excerpt.as_deref(), Some("An unexpected error occurred"));
    }

    #[tokio::test]
    async fn test_screenshots_taken_at_checkpoints() {
        let config = RenewalConfig {
            screenshot_dir: Some(PathBuf::from("/tmp/renewer-shots")),
            ..RenewalConfig::for_tests("srv")
        };
        let page = renewal_page().with_text("Server renewed");
        let log = page.log();

        run(&config, page).await;

        let names: Vec<String> = log
            .lock()
            .unwrap()
            .screenshots
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(names, vec!["page_loaded.png", "after_fill.png", "final_result.png"]);
    }

    #[tokio::test]
    async fn test_screenshot_timeout_fails_run() {
        let config = RenewalConfig {
            timeout_ms: 50,
            screenshot_dir: Some(PathBuf::from("/tmp/renewer-shots")),
            ..RenewalConfig::for_tests("srv")
        };
        let page = renewal_page()
            .with_screenshot_delay(Duration::from_millis(300))
            .with_text("Server renewed");
        let log = page.log();

        let report = run(&config, page).await;

        assert_eq!(report.outcome, Outcome::Failed("timeout".to_string()));
        assert_eq!(report.error_code.as_deref(), Some("E2001"));
        let log = log.lock().unwrap();
        assert!(log.filled.is_empty());
        assert_eq!(log.closes, 1);
    }

    #[tokio::test]
    async fn test_timeout_while_locating_input_fails_run() {
        let config = RenewalConfig {
            timeout_ms: 50,
            ..RenewalConfig::for_tests("srv")
        };
        let page = renewal_page().with_resolve_delay(Duration::from_millis(300));
        let log = page.log();

        let report = run(&config, page).await;

        assert_eq!(report.outcome, Outcome::Failed("timeout".to_string()));
        assert_eq!(report.error_code.as_deref(), Some("E2001"));
        assert!(report.input_strategy.is_none());
        assert!(report.is_retryable());
        let log = log.lock().unwrap();
        assert_eq!(log.resolved.len(), 1);
        assert_eq!(log.closes, 1);
    }

    #[tokio::test]
    async fn test_fill_error_fails_run() {
        let config = RenewalConfig::for_tests("srv");
        let page = renewal_page().with_fill_error("element is not editable");
        let log = page.log();

        let report = run(&config, page).await;

        assert_eq!(
            report.outcome,
            Outcome::Failed("driver exception: fill failed: element is not editable".to_string())
        );
        assert_eq!(report.error_code.as_deref(), Some("E2004"));
        assert!(!report.activated());
        let log = log.lock().unwrap();
        assert!(log.clicked.is_empty());
        assert_eq!(log.closes, 1);
    }

    #[tokio::test]
    async fn test_content_read_error_after_activation_fails_run() {
        let config = RenewalConfig::for_tests("srv");
        let page = renewal_page()
            .with_text("Server renewed")
            .with_markup_error("target closed");
        let log = page.log();

        let report = run(&config, page).await;

        assert_eq!(
            report.outcome,
            Outcome::Failed("driver exception: page_markup failed: target closed".to_string())
        );
        assert!(report.activated());
        assert!(!report.is_retryable());
        let log = log.lock().unwrap();
        assert_eq!(log.clicked, vec![2]);
        assert_eq!(log.closes, 1);
    }

    #[test]
    fn test_structured_error_names_role_and_operation() {
        let missing = RunError::ElementNotFound(ElementRole::Action).structured();
        assert_eq!(
            missing.user_message(),
            "[E3002] element not found for role action (papel: action)"
        );

        let timeout = RunError::from(DriverError::Timeout {
            operation: "click",
            limit_ms: 50,
        })
        .structured();
        assert_eq!(timeout.user_message(), "[E2001] timeout (operação: click)");
    }

    #[test]
    fn test_launch_failure_report() {
        let config = RenewalConfig::for_tests("srv");
        let report = launch_failure_report(&config, &DriverError::Launch("no chrome".to_string()));

        assert_eq!(
            report.outcome,
            Outcome::Failed("driver exception: browser launch failed: no chrome".to_string())
        );
        assert_eq!(report.error_code.as_deref(), Some("E2002"));
        assert!(report.is_retryable());
    }
}
