//! Page rendering and reply expansion.

use std::time::Duration;

use anyhow::Result;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::Page;
use tracing::{debug, warn};

use super::config::BrowserEngineConfig;

/// JavaScript to wait for page ready state.
const WAIT_FOR_READY_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
            setTimeout(() => resolve('timeout'), 10000);
        }
    })
"#;

/// Clicks every reply toggle not clicked yet and returns how many it hit.
const EXPAND_REPLIES_SCRIPT: &str = r#"
    (() => {
        const toggles = Array.from(document.querySelectorAll(
            '.wpd-toggle.wpd_not_clicked, .wpd-load-more-submit, .wpd-reply-toggle'
        )).filter((el) => !el.hasAttribute('data-tw-clicked') && !el.disabled);
        for (const el of toggles) {
            el.setAttribute('data-tw-clicked', '1');
            el.click();
        }
        return toggles.length;
    })()
"#;

/// Navigate to `url`, expand collapsed replies and return the rendered HTML.
pub(super) async fn render_page(
    page: &Page,
    url: &str,
    config: &BrowserEngineConfig,
) -> Result<String> {
    navigate_to_url(page, url, config.timeout).await?;

    wait_for_page_ready(page, config.timeout).await;
    wait_for_selector_if_configured(page, config.wait_for_selector.as_deref(), config.timeout)
        .await;

    match tokio::time::timeout(config.step_timeout(), expand_replies(page, config)).await {
        Ok(clicked) => debug!("Expanded {} reply toggles on {}", clicked, url),
        Err(_) => warn!(
            "Reply expansion on {} did not finish within {}s, using the page as rendered",
            url, config.timeout
        ),
    }

    let html = tokio::time::timeout(config.step_timeout(), page.content())
        .await
        .map_err(|_| anyhow::anyhow!("Reading the DOM of {} timed out", url))??;
    Ok(html)
}

async fn navigate_to_url(page: &Page, url: &str, timeout_secs: u64) -> Result<()> {
    debug!("Navigating to {}", url);
    let nav_params = NavigateParams::builder()
        .url(url)
        .build()
        .map_err(|e| anyhow::anyhow!("Invalid URL: {}", e))?;

    tokio::time::timeout(Duration::from_secs(timeout_secs), page.execute(nav_params))
        .await
        .map_err(|_| anyhow::anyhow!("Navigation timed out after {}s for {}", timeout_secs, url))?
        .map_err(|e| anyhow::anyhow!("Navigation failed for {}: {}", url, e))?;

    Ok(())
}

async fn wait_for_page_ready(page: &Page, timeout_secs: u64) {
    match tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        page.evaluate(WAIT_FOR_READY_SCRIPT.to_string()),
    )
    .await
    {
        Ok(Ok(result)) => {
            let state: String = result
                .into_value()
                .unwrap_or_else(|_| "unknown".to_string());
            debug!("Page ready state: {}", state);
        }
        Ok(Err(e)) => debug!("Could not check ready state: {}", e),
        Err(_) => warn!("Timeout waiting for page ready state"),
    }
}

async fn wait_for_selector_if_configured(page: &Page, selector: Option<&str>, timeout_secs: u64) {
    if let Some(selector) = selector {
        debug!("Waiting for selector: {}", selector);
        let timeout = Duration::from_secs(timeout_secs);
        match tokio::time::timeout(timeout, page.find_element(selector)).await {
            Ok(Ok(_)) => debug!("Selector found"),
            Ok(Err(e)) => warn!("Selector not found: {}", e),
            Err(_) => warn!("Timeout waiting for selector"),
        }
    }
}

/// Click reply toggles round by round until a round finds none or the round
/// limit is hit. Returns the total number of clicks.
async fn expand_replies(page: &Page, config: &BrowserEngineConfig) -> usize {
    let mut total = 0;

    for round in 1..=config.max_expand_rounds {
        let clicked = match page.evaluate(EXPAND_REPLIES_SCRIPT.to_string()).await {
            Ok(result) => result.into_value::<usize>().unwrap_or(0),
            Err(e) => {
                warn!("Reply expansion failed in round {}: {}", round, e);
                break;
            }
        };
        if clicked == 0 {
            break;
        }
        total += clicked;
        tokio::time::sleep(Duration::from_millis(config.expand_delay_ms)).await;
    }

    total
}
