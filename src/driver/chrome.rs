use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, NavigateParams};
use chromiumoxide::element::Element;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::{retain_with_text, DriverError, PageDriver, SelectorStrategy};
use crate::config::BrowserOptions;

/// Same predicate the page uses to decide whether a user could see the element.
const VISIBILITY_FN: &str = "function() {
    const style = window.getComputedStyle(this);
    const rect = this.getBoundingClientRect();
    return style.visibility !== 'hidden'
        && style.display !== 'none'
        && (rect.width > 0 || rect.height > 0 || this.getClientRects().length > 0);
}";

const CLEAR_VALUE_FN: &str = "function() {
    this.value = '';
    this.dispatchEvent(new Event('input', { bubbles: true }));
}";

const PAGE_TEXT_EXPR: &str = "document.body ? document.body.innerText : ''";

const READY_STATE_EXPR: &str = "document.readyState";
const READY_STATE_POLL: Duration = Duration::from_millis(100);

/// Headless Chromium over CDP.
pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    handler_task: Option<JoinHandle<()>>,
    closed: bool,
}

impl ChromeDriver {
    #[instrument(name = "browser_launch", skip_all, fields(headless = options.headless))]
    pub async fn launch(options: &BrowserOptions) -> Result<Self, DriverError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .window_size(options.window_width, options.window_height);

        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &options.chrome_executable {
            info!(path = %executable.display(), "Using custom Chrome binary");
            builder = builder.chrome_executable(executable);
        }
        for arg in &options.extra_args {
            builder = builder.arg(arg.as_str());
        }

        let config = builder.build().map_err(DriverError::Launch)?;
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler error (ignoring)");
                }
            }
            debug!("Browser handler task ended");
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    warn!(error = %close_err, "Failed to close browser after page creation error");
                }
                handler_task.abort();
                return Err(DriverError::Launch(e.to_string()));
            }
        };

        info!("Headless browser ready");
        Ok(Self {
            browser,
            page,
            handler_task: Some(handler_task),
            closed: false,
        })
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    type Element = Element;

    /// Returns once the DOM is parsed (`DOMContentLoaded`), without waiting
    /// for images, fonts or other subresources.
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let response = self
            .page
            .execute(NavigateParams::new(url))
            .await
            .map_err(|e| DriverError::operation("navigate", e))?;
        if let Some(error) = &response.result.error_text {
            return Err(DriverError::operation("navigate", error));
        }

        // Evaluation can fail while the new document replaces the old one.
        loop {
            let state = match self.page.evaluate(READY_STATE_EXPR).await {
                Ok(result) => result.into_value::<String>().ok(),
                Err(_) => None,
            };
            if matches!(state.as_deref(), Some("interactive" | "complete")) {
                return Ok(());
            }
            tokio::time::sleep(READY_STATE_POLL).await;
        }
    }

    async fn resolve(&self, strategy: &SelectorStrategy) -> Result<Vec<Element>, DriverError> {
        match strategy {
            SelectorStrategy::Css(css) => self
                .page
                .find_elements(css.as_str())
                .await
                .map_err(|e| DriverError::operation("resolve", e)),
            SelectorStrategy::CssWithText { css, text } => {
                let candidates = self
                    .page
                    .find_elements(css.as_str())
                    .await
                    .map_err(|e| DriverError::operation("resolve", e))?;
                Ok(retain_with_text(self, candidates, text).await)
            }
        }
    }

    async fn is_visible(&self, element: &Element) -> Result<bool, DriverError> {
        let returns = element
            .call_js_fn(VISIBILITY_FN, false)
            .await
            .map_err(|e| DriverError::operation("is_visible", e))?;
        Ok(returns
            .result
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    async fn element_text(&self, element: &Element) -> Result<String, DriverError> {
        let text = element
            .inner_text()
            .await
            .map_err(|e| DriverError::operation("element_text", e))?;
        Ok(text.unwrap_or_default())
    }

    async fn fill(&self, element: &Element, value: &str) -> Result<(), DriverError> {
        element
            .call_js_fn(CLEAR_VALUE_FN, false)
            .await
            .map_err(|e| DriverError::operation("fill", e))?;
        element
            .focus()
            .await
            .map_err(|e| DriverError::operation("fill", e))?;
        element
            .type_str(value)
            .await
            .map_err(|e| DriverError::operation("fill", e))?;
        Ok(())
    }

    async fn click(&self, element: &Element) -> Result<(), DriverError> {
        element
            .click()
            .await
            .map_err(|e| DriverError::operation("click", e))?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, DriverError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::operation("evaluate", e))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn page_text(&self) -> Result<String, DriverError> {
        let result = self
            .page
            .evaluate(PAGE_TEXT_EXPR)
            .await
            .map_err(|e| DriverError::operation("page_text", e))?;
        result
            .into_value::<String>()
            .map_err(|e| DriverError::operation("page_text", e))
    }

    async fn page_markup(&self) -> Result<String, DriverError> {
        self.page
            .content()
            .await
            .map_err(|e| DriverError::operation("page_markup", e))
    }

    async fn screenshot(&self, path: &Path) -> Result<(), DriverError> {
        self.page
            .save_screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
                path,
            )
            .await
            .map_err(|e| DriverError::operation("screenshot", e))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let closed = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| DriverError::operation("close", e));

        if let Some(task) = self.handler_task.take() {
            if let Err(e) = task.await {
                debug!(error = %e, "Browser handler task did not finish cleanly");
            }
        }

        info!("Browser closed");
        closed
    }
}
