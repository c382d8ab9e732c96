//! Ordered locator chains for pulling best-effort fields out of a loaded page.
//!
//! Every attempt is bounded by a timeout and any driver error counts as "not
//! found" for that strategy, so nothing in here ever fails.

use std::time::Duration;

use itertools::Itertools;
use tokio::time::timeout;

use crate::{
    domain::Summary,
    services::{BrowserPage, Locator},
};

/// One named way of locating an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    pub name: &'static str,
    pub locator: Locator,
}

impl Strategy {
    pub fn new(name: &'static str, locator: Locator) -> Self {
        Strategy { name, locator }
    }
}

pub fn hero_strategies() -> Vec<Strategy> {
    vec![
        Strategy::new("h1", Locator::css("h1")),
        Strategy::new("h1 span", Locator::css("h1 span")),
        Strategy::new("hero data hook", Locator::css("[data-test='hero']")),
    ]
}

pub fn cta_strategies() -> Vec<Strategy> {
    vec![
        Strategy::new("button role", Locator::css("button, [role='button']")),
        Strategy::new(
            "link or submit button",
            Locator::css(
                "a[class*='btn'], a[class*='button'], a[class*='cta'], input[type='submit']",
            ),
        ),
    ]
}

/// Title, hero text and call to action of the current page.
pub async fn extract_summary(page: &dyn BrowserPage, limit: Duration) -> Summary {
    let title = match timeout(limit, page.title()).await {
        Ok(Ok(title)) => clean_text(&title),
        Ok(Err(e)) => {
            log::warn!("Failed to read page title: {}", e);
            String::new()
        }
        Err(_) => {
            log::warn!("Timed out reading page title after {:?}", limit);
            String::new()
        }
    };
    let hero = first_text(page, &hero_strategies(), limit)
        .await
        .unwrap_or_default();
    let cta = first_text(page, &cta_strategies(), limit)
        .await
        .unwrap_or_default();

    log::info!(
        "Extracted page summary | title: {} chars, hero: {} chars, cta: {} chars",
        title.len(),
        hero.len(),
        cta.len()
    );

    Summary { title, hero, cta }
}

/// First non-empty text produced by the strategies, tried in order.
pub async fn first_text(
    page: &dyn BrowserPage,
    strategies: &[Strategy],
    limit: Duration,
) -> Option<String> {
    for strategy in strategies {
        match timeout(limit, page.texts(&strategy.locator)).await {
            Ok(Ok(texts)) => {
                if let Some(text) = texts.iter().map(|t| clean_text(t)).find(|t| !t.is_empty()) {
                    log::debug!("Strategy '{}' matched text", strategy.name);
                    return Some(text);
                }
            }
            Ok(Err(e)) => log::debug!("Strategy '{}' failed: {}", strategy.name, e),
            Err(_) => log::debug!("Strategy '{}' timed out after {:?}", strategy.name, limit),
        }
    }

    None
}

/// First `href` produced by the strategies that passes `accept`.
pub async fn first_href<F>(
    page: &dyn BrowserPage,
    strategies: &[Strategy],
    limit: Duration,
    accept: F,
) -> Option<String>
where
    F: Fn(&str) -> bool,
{
    for strategy in strategies {
        match timeout(limit, page.hrefs(&strategy.locator)).await {
            Ok(Ok(hrefs)) => {
                if let Some(href) = hrefs.into_iter().map(|h| h.trim().to_string()).find(|h| accept(h)) {
                    log::debug!("Strategy '{}' matched {}", strategy.name, href);
                    return Some(href);
                }
            }
            Ok(Err(e)) => log::debug!("Strategy '{}' failed: {}", strategy.name, e),
            Err(_) => log::debug!("Strategy '{}' timed out after {:?}", strategy.name, limit),
        }
    }

    None
}

fn clean_text(text: &str) -> String {
    text.split_whitespace().join(" ")
}
