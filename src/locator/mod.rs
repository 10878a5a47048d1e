// Module: Locator
// Finds the input and the submit control by trying selector strategies in
// priority order against the live page.

use tracing::{debug, instrument};

use crate::classifier::PhraseSet;
use crate::driver::{DriverError, PageDriver, SelectorStrategy};

/// An element found by the locator, tagged with the strategy that found it.
#[derive(Debug)]
pub struct Located<E> {
    pub element: E,
    pub strategy_index: usize,
    pub strategy: SelectorStrategy,
    /// Rendered text, read only when a keyword filter applied.
    pub text: Option<String>,
}

/// Result of asking the driver for one strategy's matches.
enum Probe<E> {
    Matches(Vec<E>),
    DriverFault(DriverError),
}

async fn probe<D: PageDriver>(page: &D, strategy: &SelectorStrategy) -> Probe<D::Element> {
    match page.resolve(strategy).await {
        Ok(matches) => Probe::Matches(matches),
        Err(err) => Probe::DriverFault(err),
    }
}

/// Returns the first visible element, trying strategies in order and each
/// strategy's matches in document order.
///
/// `Ok(None)` means every strategy was exhausted. Driver faults on a single
/// strategy or visibility probe are treated as "no match"; only a timeout
/// escapes as `Err`.
pub async fn locate<D: PageDriver>(
    page: &D,
    strategies: &[SelectorStrategy],
) -> Result<Option<Located<D::Element>>, DriverError> {
    scan(page, strategies, None).await
}

/// Like [`locate`], but a visible element must also carry one of `keywords`
/// in its text. All matches of a strategy are checked before the next one.
pub async fn locate_action<D: PageDriver>(
    page: &D,
    strategies: &[SelectorStrategy],
    keywords: &PhraseSet,
) -> Result<Option<Located<D::Element>>, DriverError> {
    scan(page, strategies, Some(keywords)).await
}

#[instrument(level = "debug", skip_all, fields(strategies = strategies.len(), keyword_filter = keywords.is_some()))]
async fn scan<D: PageDriver>(
    page: &D,
    strategies: &[SelectorStrategy],
    keywords: Option<&PhraseSet>,
) -> Result<Option<Located<D::Element>>, DriverError> {
    for (index, strategy) in strategies.iter().enumerate() {
        let matches = match probe(page, strategy).await {
            Probe::Matches(matches) => matches,
            Probe::DriverFault(err) if err.is_timeout() => return Err(err),
            Probe::DriverFault(err) => {
                debug!(index, selector = %strategy, error = %err, "Selector failed, trying next");
                continue;
            }
        };
        debug!(index, selector = %strategy, count = matches.len(), "Selector resolved");

        for element in matches {
            if !visible(page, &element).await? {
                debug!(index, selector = %strategy, "Match not visible");
                continue;
            }

            let text = match keywords {
                None => None,
                Some(keywords) => {
                    let text = text_of(page, &element).await?;
                    if keywords.find(&text).is_none() {
                        debug!(index, selector = %strategy, text = %text, "Visible match without action keyword");
                        continue;
                    }
                    Some(text)
                }
            };

            return Ok(Some(Located {
                element,
                strategy_index: index,
                strategy: strategy.clone(),
                text,
            }));
        }
    }

    Ok(None)
}

async fn visible<D: PageDriver>(page: &D, element: &D::Element) -> Result<bool, DriverError> {
    match page.is_visible(element).await {
        Ok(visible) => Ok(visible),
        Err(err) if err.is_timeout() => Err(err),
        Err(err) => {
            debug!(error = %err, "Visibility probe failed, treating as hidden");
            Ok(false)
        }
    }
}

async fn text_of<D: PageDriver>(page: &D, element: &D::Element) -> Result<String, DriverError> {
    match page.element_text(element).await {
        Ok(text) => Ok(text),
        Err(err) if err.is_timeout() => Err(err),
        Err(err) => {
            debug!(error = %err, "Reading element text failed");
            Ok(String::new())
        }
    }
}

// ============================================================================
// LAST-RESORT BROAD PASS
// ============================================================================

/// Controls scanned by the broad pass, regardless of configured strategies.
const CLICKABLE: &str = r#"button, input[type="submit"], input[type="button"], [role="button"]"#;

/// Script that clicks the first clickable control whose text contains one of
/// the (already lowercased) keywords, returning that control's text or null.
pub fn broad_activation_script(keywords: &PhraseSet) -> String {
    let keywords = serde_json::to_string(keywords.phrases()).unwrap_or_else(|_| "[]".to_string());
    let clickable = serde_json::to_string(CLICKABLE).unwrap_or_else(|_| "\"button\"".to_string());
    format!(
        "((keywords) => {{
    for (const el of document.querySelectorAll({clickable})) {{
        const text = (el.innerText || el.value || el.textContent || '').trim();
        const lower = text.toLowerCase();
        if (keywords.some((k) => lower.includes(k))) {{
            el.click();
            return text;
        }}
    }}
    return null;
}})({keywords})"
    )
}

/// Runs the broad pass. `Ok(Some(text))` when a control was clicked.
pub async fn activate_broadly<D: PageDriver>(
    page: &D,
    keywords: &PhraseSet,
) -> Result<Option<String>, DriverError> {
    let result = page.evaluate(&broad_activation_script(keywords)).await?;
    Ok(result.as_str().map(str::to_string))
}
