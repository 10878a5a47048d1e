// In-memory page used by the unit tests.
//
// Elements are matched by the rendered form of a strategy, so a test states
// exactly which selectors "hit" which element.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{DriverError, PageDriver, SelectorStrategy};

#[derive(Debug, Clone)]
pub struct ScriptedElement {
    pub id: usize,
    pub selectors: Vec<String>,
    pub visible: bool,
    pub text: String,
}

/// What the page saw, shared with the test after the driver is moved.
#[derive(Debug, Default)]
pub struct PageLog {
    pub navigated: Vec<String>,
    pub resolved: Vec<String>,
    pub filled: Vec<(usize, String)>,
    pub clicked: Vec<usize>,
    pub scripts: Vec<String>,
    pub screenshots: Vec<PathBuf>,
    pub text_reads: usize,
    pub closes: usize,
}

#[derive(Default)]
pub struct ScriptedPage {
    elements: Vec<ScriptedElement>,
    faulty_selectors: Vec<String>,
    texts: Mutex<VecDeque<String>>,
    markup: String,
    evaluate_result: Value,
    click_delay: Option<Duration>,
    resolve_delay: Option<Duration>,
    screenshot_delay: Option<Duration>,
    visibility_errors: Vec<usize>,
    navigate_error: Option<String>,
    fill_error: Option<String>,
    markup_error: Option<String>,
    log: Arc<Mutex<PageLog>>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(mut self, id: usize, selectors: &[&str], visible: bool, text: &str) -> Self {
        self.elements.push(ScriptedElement {
            id,
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
            visible,
            text: text.to_string(),
        });
        self
    }

    /// Resolving this selector raises a driver error.
    pub fn with_faulty_selector(mut self, selector: &str) -> Self {
        self.faulty_selectors.push(selector.to_string());
        self
    }

    pub fn with_text(self, text: &str) -> Self {
        self.with_text_sequence(&[text])
    }

    /// Successive `page_text` reads return these values; the last one repeats.
    pub fn with_text_sequence(mut self, texts: &[&str]) -> Self {
        self.texts = Mutex::new(texts.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn with_markup(mut self, markup: &str) -> Self {
        self.markup = markup.to_string();
        self
    }

    pub fn with_evaluate_result(mut self, value: Value) -> Self {
        self.evaluate_result = value;
        self
    }

    pub fn with_click_delay(mut self, delay: Duration) -> Self {
        self.click_delay = Some(delay);
        self
    }

    pub fn with_resolve_delay(mut self, delay: Duration) -> Self {
        self.resolve_delay = Some(delay);
        self
    }

    pub fn with_screenshot_delay(mut self, delay: Duration) -> Self {
        self.screenshot_delay = Some(delay);
        self
    }

    /// Asking whether element `id` is visible raises a driver error.
    pub fn with_visibility_error(mut self, id: usize) -> Self {
        self.visibility_errors.push(id);
        self
    }

    pub fn with_navigate_error(mut self, message: &str) -> Self {
        self.navigate_error = Some(message.to_string());
        self
    }

    pub fn with_fill_error(mut self, message: &str) -> Self {
        self.fill_error = Some(message.to_string());
        self
    }

    pub fn with_markup_error(mut self, message: &str) -> Self {
        self.markup_error = Some(message.to_string());
        self
    }

    pub fn log(&self) -> Arc<Mutex<PageLog>> {
        self.log.clone()
    }

    fn element(&self, id: usize) -> Result<&ScriptedElement, DriverError> {
        self.elements
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| DriverError::operation("element", format!("stale handle {}", id)))
    }

    fn record(&self, f: impl FnOnce(&mut PageLog)) {
        let mut log = self.log.lock().expect("page log poisoned");
        f(&mut log);
    }
}

#[async_trait]
impl PageDriver for ScriptedPage {
    type Element = usize;

    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.record(|log| log.navigated.push(url.to_string()));
        match &self.navigate_error {
            Some(message) => Err(DriverError::operation("navigate", message)),
            None => Ok(()),
        }
    }

    async fn resolve(&self, strategy: &SelectorStrategy) -> Result<Vec<usize>, DriverError> {
        let key = strategy.to_string();
        self.record(|log| log.resolved.push(key.clone()));
        if let Some(delay) = self.resolve_delay {
            tokio::time::sleep(delay).await;
        }
        if self.faulty_selectors.contains(&key) {
            return Err(DriverError::operation("resolve", format!("invalid selector {}", key)));
        }
        Ok(self
            .elements
            .iter()
            .filter(|e| e.selectors.contains(&key))
            .map(|e| e.id)
            .collect())
    }

    async fn is_visible(&self, element: &usize) -> Result<bool, DriverError> {
        if self.visibility_errors.contains(element) {
            return Err(DriverError::operation("is_visible", "node is detached from document"));
        }
        Ok(self.element(*element)?.visible)
    }

    async fn element_text(&self, element: &usize) -> Result<String, DriverError> {
        Ok(self.element(*element)?.text.clone())
    }

    async fn fill(&self, element: &usize, value: &str) -> Result<(), DriverError> {
        self.element(*element)?;
        if let Some(message) = &self.fill_error {
            return Err(DriverError::operation("fill", message));
        }
        self.record(|log| log.filled.push((*element, value.to_string())));
        Ok(())
    }

    async fn click(&self, element: &usize) -> Result<(), DriverError> {
        self.element(*element)?;
        if let Some(delay) = self.click_delay {
            tokio::time::sleep(delay).await;
        }
        self.record(|log| log.clicked.push(*element));
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, DriverError> {
        self.record(|log| log.scripts.push(script.to_string()));
        Ok(self.evaluate_result.clone())
    }

    async fn page_text(&self) -> Result<String, DriverError> {
        self.record(|log| log.text_reads += 1);
        let mut texts = self.texts.lock().expect("page texts poisoned");
        let text = if texts.len() > 1 {
            texts.pop_front()
        } else {
            texts.front().cloned()
        };
        Ok(text.unwrap_or_default())
    }

    async fn page_markup(&self) -> Result<String, DriverError> {
        match &self.markup_error {
            Some(message) => Err(DriverError::operation("page_markup", message)),
            None => Ok(self.markup.clone()),
        }
    }

    async fn screenshot(&self, path: &Path) -> Result<(), DriverError> {
        if let Some(delay) = self.screenshot_delay {
            tokio::time::sleep(delay).await;
        }
        self.record(|log| log.screenshots.push(path.to_path_buf()));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.record(|log| log.closes += 1);
        Ok(())
    }
}
