use std::time::Duration;

use itertools::Itertools;
use rand::seq::SliceRandom;
use tokio::time::{sleep, timeout};
use url::Url;

use crate::{
    configuration::{DirectorySettings, PageTimeouts},
    domain::{Target, TargetSource},
    services::{
        extraction::{first_href, Strategy},
        BrowserPage, Locator,
    },
};

/// Hosts that show up on directory profiles but are never the company site.
const SOCIAL_DOMAINS: [&str; 8] = [
    "linkedin.com",
    "twitter.com",
    "x.com",
    "facebook.com",
    "instagram.com",
    "youtube.com",
    "crunchbase.com",
    "angel.co",
];

/// Produces the ordered targets of a run.
///
/// Directory mode never fails: anything that goes wrong while crawling is
/// logged and shrinks the returned list instead.
pub async fn resolve_targets(
    page: &dyn BrowserPage,
    source: &TargetSource,
    settings: &DirectorySettings,
    timeouts: PageTimeouts,
) -> Vec<Target> {
    match source {
        TargetSource::Custom { urls } => {
            log::info!("Using {} custom urls", urls.len());
            urls.iter().map(|url| Target::from_url(url)).collect()
        }
        TargetSource::Directory { batch, limit } => {
            let limit = limit
                .unwrap_or(settings.default_limit)
                .min(settings.max_limit);
            let resolver = DirectoryResolver {
                page,
                settings,
                timeouts,
            };
            resolver.resolve(batch.as_deref(), limit).await
        }
    }
}

enum FilterAction {
    Click(Locator),
    Search(Locator),
}

struct DirectoryResolver<'a> {
    page: &'a dyn BrowserPage,
    settings: &'a DirectorySettings,
    timeouts: PageTimeouts,
}

impl DirectoryResolver<'_> {
    async fn resolve(&self, batch: Option<&str>, limit: usize) -> Vec<Target> {
        if limit == 0 {
            return vec![];
        }

        let directory = match Url::parse(&self.settings.base_url) {
            Ok(url) => url,
            Err(e) => {
                log::error!(
                    "Invalid directory base url {}: {:?}",
                    self.settings.base_url,
                    e
                );
                return vec![];
            }
        };
        let listing_url = match directory.join(&self.settings.listing_path) {
            Ok(url) => url,
            Err(e) => {
                log::error!("Invalid directory listing path: {:?}", e);
                return vec![];
            }
        };

        if !self.navigate(listing_url.as_str()).await {
            log::error!("Directory listing unreachable: {}", listing_url);
            return vec![];
        }

        if let Some(batch) = batch {
            self.apply_filter(batch).await;
        }

        self.load_profiles(&directory, limit).await;

        let mut profile_urls = self.profile_urls(&directory).await;
        profile_urls.truncate(limit);
        shuffle(&mut profile_urls);
        log::info!("Found {} directory profile urls", profile_urls.len());

        let mut targets = vec![];
        for (i, profile_url) in profile_urls.iter().enumerate() {
            log::info!(
                "Processing directory profile {}/{}: {}",
                i + 1,
                profile_urls.len(),
                profile_url
            );
            if !self.navigate(profile_url).await {
                log::error!("Failed to load directory profile: {}", profile_url);
                continue;
            }

            match self.website_url(&directory).await {
                Some(website) => {
                    log::info!("Extracted website {} from {}", website, profile_url);
                    targets.push(Target::from_url(&website));
                }
                None => log::warn!("No website url found for: {}", profile_url),
            }
        }

        targets.into_iter().unique_by(|t| t.url.clone()).collect()
    }

    async fn navigate(&self, url: &str) -> bool {
        match timeout(self.timeouts.navigation, self.page.goto(url)).await {
            Ok(Ok(())) => {
                settle(self.timeouts.settle).await;
                true
            }
            Ok(Err(e)) => {
                log::warn!("Navigation to {} failed: {}", url, e);
                false
            }
            Err(_) => {
                log::warn!(
                    "Navigation to {} timed out after {:?}",
                    url,
                    self.timeouts.navigation
                );
                false
            }
        }
    }

    /// Tries the directory's own filter controls in order. Falls back to the
    /// unfiltered listing when none of them respond.
    async fn apply_filter(&self, batch: &str) {
        let batch = sanitize_filter(batch);
        if batch.is_empty() {
            return;
        }

        for (name, action) in filter_actions(&batch) {
            let attempt = match &action {
                FilterAction::Click(locator) => self.page.click(locator),
                FilterAction::Search(locator) => self.page.fill_and_submit(locator, &batch),
            };

            match timeout(self.timeouts.extraction, attempt).await {
                Ok(Ok(true)) => {
                    log::info!("Applied batch filter {} via {}", batch, name);
                    settle(self.settings.scroll_pause()).await;
                    return;
                }
                Ok(Ok(false)) => {}
                Ok(Err(e)) => log::debug!("Batch filter via {} failed: {}", name, e),
                Err(_) => log::debug!("Batch filter via {} timed out", name),
            }
        }

        log::warn!("Could not find batch filter UI for {}", batch);
    }

    /// Scrolls until `limit` distinct profiles are visible or the attempt
    /// budget runs out.
    async fn load_profiles(&self, directory: &Url, limit: usize) {
        for attempt in 0..self.settings.max_scroll_attempts {
            let visible = self.profile_urls(directory).await.len();
            if visible >= limit {
                return;
            }

            log::debug!(
                "Scrolling directory for more profiles | visible: {}, wanted: {}, attempt: {}",
                visible,
                limit,
                attempt + 1
            );
            match timeout(self.timeouts.extraction, self.page.scroll_to_bottom()).await {
                Ok(Ok(())) => settle(self.settings.scroll_pause()).await,
                Ok(Err(e)) => {
                    log::warn!("Failed to scroll for more profiles: {}", e);
                    return;
                }
                Err(_) => {
                    log::warn!("Scrolling for more profiles timed out");
                    return;
                }
            }
        }
    }

    /// Distinct profile urls currently on the page, in document order.
    async fn profile_urls(&self, directory: &Url) -> Vec<String> {
        let locator = Locator::css(format!(
            "a[href*='{}']",
            self.settings.profile_path_prefix
        ));

        let hrefs = match timeout(self.timeouts.extraction, self.page.hrefs(&locator)).await {
            Ok(Ok(hrefs)) => hrefs,
            Ok(Err(e)) => {
                log::warn!("Failed to read profile links: {}", e);
                return vec![];
            }
            Err(_) => {
                log::warn!("Reading profile links timed out");
                return vec![];
            }
        };

        hrefs
            .iter()
            .filter_map(|href| profile_url(directory, &self.settings.profile_path_prefix, href))
            .unique()
            .collect()
    }

    async fn website_url(&self, directory: &Url) -> Option<String> {
        let directory_domain = registrable_host(directory);
        first_href(
            self.page,
            &website_strategies(&directory_domain),
            self.timeouts.extraction,
            |href| is_company_site(href, &directory_domain),
        )
        .await
    }
}

fn filter_actions(batch: &str) -> Vec<(&'static str, FilterAction)> {
    vec![
        (
            "labeled button",
            FilterAction::Click(Locator::xpath(format!(
                "//button[contains(normalize-space(.), '{}')]",
                batch
            ))),
        ),
        (
            "data attribute",
            FilterAction::Click(Locator::css(format!("[data-batch='{}']", batch))),
        ),
        (
            "search box",
            FilterAction::Search(Locator::css(
                "input[type='search'], input[placeholder*='earch'], input[placeholder*='ilter']",
            )),
        ),
    ]
}

pub fn website_strategies(directory_domain: &str) -> Vec<Strategy> {
    vec![
        Strategy::new(
            "labeled website link",
            Locator::xpath(
                "//a[normalize-space(.)='Website'] | //*[normalize-space(text())='Website']/..//a[starts-with(@href, 'http')]",
            ),
        ),
        Strategy::new(
            "external anchor",
            Locator::css(format!(
                "a[href^='http']:not([href*='{}'])",
                directory_domain
            )),
        ),
        Strategy::new(
            "website hooks",
            Locator::css(".website-link, [data-testid='website-link'], a[target='_blank']"),
        ),
    ]
}

/// Absolute profile url for `href` when it points at a single directory
/// profile, e.g. `/companies/acme`.
fn profile_url(directory: &Url, prefix: &str, href: &str) -> Option<String> {
    let mut url = directory.join(href).ok()?;
    if url.host_str() != directory.host_str() {
        return None;
    }

    let slug = url.path().strip_prefix(prefix)?.trim_end_matches('/').to_string();
    if slug.is_empty() || slug.contains('/') {
        return None;
    }

    url.set_path(&format!("{}{}", prefix, slug));
    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}

/// Whether `href` looks like a company's own site rather than a link back
/// into the directory or to a social profile.
fn is_company_site(href: &str, directory_domain: &str) -> bool {
    let Ok(url) = Url::parse(href) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_lowercase();

    let same_domain = |domain: &str| host == domain || host.ends_with(&format!(".{}", domain));
    !same_domain(directory_domain) && !SOCIAL_DOMAINS.iter().any(|&d| same_domain(d))
}

fn registrable_host(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_lowercase();
    match host.strip_prefix("www.") {
        Some(h) => h.to_string(),
        None => host,
    }
}

fn sanitize_filter(batch: &str) -> String {
    batch
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn shuffle(urls: &mut [String]) {
    urls.shuffle(&mut rand::thread_rng());
}

async fn settle(pause: Duration) {
    if !pause.is_zero() {
        sleep(pause).await;
    }
}
