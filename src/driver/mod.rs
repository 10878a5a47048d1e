// Module: Driver
// The page capability the renewal core talks to. Concrete browsers live
// behind the `PageDriver` trait so the locator, classifier and orchestration
// never see chromiumoxide types.

pub mod chrome;
#[cfg(test)]
pub mod scripted;

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::errors::ErrorCode;

/// Failure raised by a single page driver operation.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// The operation did not complete within the per-operation bound.
    #[error("{operation} timed out after {limit_ms}ms")]
    Timeout {
        operation: &'static str,
        limit_ms: u64,
    },

    /// The browser process or its first page could not be started.
    #[error("browser launch failed: {0}")]
    Launch(String),

    /// Any other failure reported by the browser for one operation.
    #[error("{operation} failed: {message}")]
    Operation {
        operation: &'static str,
        message: String,
    },
}

impl DriverError {
    pub fn operation(operation: &'static str, err: impl fmt::Display) -> Self {
        Self::Operation {
            operation,
            message: err.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::DRIVER_TIMEOUT,
            Self::Launch(_) => ErrorCode::DRIVER_LAUNCH,
            Self::Operation { operation: "navigate", .. } => ErrorCode::NAVIGATION_FAILED,
            Self::Operation { .. } => ErrorCode::DRIVER_OPERATION,
        }
    }
}

// ============================================================================
// SELECTOR STRATEGIES
// ============================================================================

/// A declarative rule the driver resolves into zero or more elements.
///
/// Written in configuration with the familiar shorthand:
/// - `input[type="text"]` → plain CSS
/// - `button:has-text("Renew")` → CSS whose matches must contain the text
///   fragment (case-insensitive)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SelectorStrategy {
    Css(String),
    CssWithText { css: String, text: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorParseError {
    #[error("selector is empty")]
    Empty,

    #[error("selector '{0}': :has-text( is not closed by ')'")]
    Unterminated(String),

    #[error("selector '{0}': :has-text argument must be a quoted string")]
    Unquoted(String),
}

const HAS_TEXT: &str = ":has-text(";

impl FromStr for SelectorStrategy {
    type Err = SelectorParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let selector = raw.trim();
        if selector.is_empty() {
            return Err(SelectorParseError::Empty);
        }

        let Some(start) = selector.find(HAS_TEXT) else {
            return Ok(Self::Css(selector.to_string()));
        };

        let css = match selector[..start].trim() {
            "" => "*",
            css => css,
        };
        let argument = selector[start + HAS_TEXT.len()..]
            .strip_suffix(')')
            .ok_or_else(|| SelectorParseError::Unterminated(selector.to_string()))?
            .trim();

        let text = ['"', '\'']
            .iter()
            .find_map(|q| argument.strip_prefix(*q)?.strip_suffix(*q))
            .ok_or_else(|| SelectorParseError::Unquoted(selector.to_string()))?;

        Ok(Self::CssWithText {
            css: css.to_string(),
            text: text.to_string(),
        })
    }
}

impl TryFrom<String> for SelectorStrategy {
    type Error = SelectorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SelectorStrategy> for String {
    fn from(strategy: SelectorStrategy) -> Self {
        strategy.to_string()
    }
}

impl fmt::Display for SelectorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(css) => write!(f, "{}", css),
            Self::CssWithText { css, text } => write!(f, "{}:has-text(\"{}\")", css, text),
        }
    }
}

// ============================================================================
// PAGE CAPABILITY
// ============================================================================

/// Everything the renewal core may ask of a live page.
///
/// Element handles are opaque to the core; they are only passed back into
/// the driver that produced them.
#[async_trait]
pub trait PageDriver: Send + Sync {
    type Element: Send + Sync;

    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// Resolves a strategy into its matches, in document order.
    async fn resolve(&self, strategy: &SelectorStrategy) -> Result<Vec<Self::Element>, DriverError>;

    async fn is_visible(&self, element: &Self::Element) -> Result<bool, DriverError>;

    /// Rendered text of the element (empty when it has none).
    async fn element_text(&self, element: &Self::Element) -> Result<String, DriverError>;

    /// Replaces the element's current value with `value`.
    async fn fill(&self, element: &Self::Element, value: &str) -> Result<(), DriverError>;

    async fn click(&self, element: &Self::Element) -> Result<(), DriverError>;

    /// Evaluates a script expression in the page and returns its JSON value.
    async fn evaluate(&self, script: &str) -> Result<Value, DriverError>;

    async fn page_text(&self) -> Result<String, DriverError>;

    async fn page_markup(&self) -> Result<String, DriverError>;

    async fn screenshot(&self, path: &Path) -> Result<(), DriverError>;

    async fn close(&mut self) -> Result<(), DriverError>;
}

/// Keeps the candidates whose rendered text contains `text`
/// (case-insensitive). A candidate whose text cannot be read is skipped.
pub async fn retain_with_text<D: PageDriver>(
    page: &D,
    candidates: Vec<D::Element>,
    text: &str,
) -> Vec<D::Element> {
    let needle = text.to_lowercase();
    let mut matches = Vec::new();
    for element in candidates {
        match page.element_text(&element).await {
            Ok(rendered) if rendered.to_lowercase().contains(&needle) => matches.push(element),
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Skipping candidate without readable text"),
        }
    }
    matches
}

// ============================================================================
// PER-OPERATION TIMEOUT
// ============================================================================

async fn bounded<T, F>(limit: Duration, operation: &'static str, fut: F) -> Result<T, DriverError>
where
    F: Future<Output = Result<T, DriverError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(DriverError::Timeout {
            operation,
            limit_ms: limit.as_millis() as u64,
        }),
    }
}

/// Wraps a driver so that every operation is bounded by the same timeout.
///
/// An operation that exceeds the bound yields `DriverError::Timeout`
/// instead of hanging the run.
pub struct BoundedPage<D> {
    inner: D,
    limit: Duration,
}

impl<D: PageDriver> BoundedPage<D> {
    pub fn new(inner: D, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl<D: PageDriver> PageDriver for BoundedPage<D> {
    type Element = D::Element;

    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        bounded(self.limit, "navigate", self.inner.navigate(url)).await
    }

    async fn resolve(&self, strategy: &SelectorStrategy) -> Result<Vec<Self::Element>, DriverError> {
        bounded(self.limit, "resolve", self.inner.resolve(strategy)).await
    }

    async fn is_visible(&self, element: &Self::Element) -> Result<bool, DriverError> {
        bounded(self.limit, "is_visible", self.inner.is_visible(element)).await
    }

    async fn element_text(&self, element: &Self::Element) -> Result<String, DriverError> {
        bounded(self.limit, "element_text", self.inner.element_text(element)).await
    }

    async fn fill(&self, element: &Self::Element, value: &str) -> Result<(), DriverError> {
        bounded(self.limit, "fill", self.inner.fill(element, value)).await
    }

    async fn click(&self, element: &Self::Element) -> Result<(), DriverError> {
        bounded(self.limit, "click", self.inner.click(element)).await
    }

    async fn evaluate(&self, script: &str) -> Result<Value, DriverError> {
        bounded(self.limit, "evaluate", self.inner.evaluate(script)).await
    }

    async fn page_text(&self) -> Result<String, DriverError> {
        bounded(self.limit, "page_text", self.inner.page_text()).await
    }

    async fn page_markup(&self) -> Result<String, DriverError> {
        bounded(self.limit, "page_markup", self.inner.page_markup()).await
    }

    async fn screenshot(&self, path: &Path) -> Result<(), DriverError> {
        bounded(self.limit, "screenshot", self.inner.screenshot(path)).await
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        let limit = self.limit;
        bounded(limit, "close", self.inner.close()).await
    }
}
