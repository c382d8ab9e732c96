use std::fmt;

use async_trait::async_trait;
use thirtyfour::{
    error::WebDriverError, By, ChromiumLikeCapabilities, DesiredCapabilities, WebDriver,
    WebElement,
};

use crate::{configuration::BrowserSettings, services::BrowserSession};

/// WebDriver code point for the Enter key.
const ENTER_KEY: &str = "\u{E007}";

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("webdriver error: {0}")]
    Driver(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("browser page is closed")]
    Closed,
}

impl From<WebDriverError> for BrowserError {
    fn from(err: WebDriverError) -> Self {
        BrowserError::Driver(err.to_string())
    }
}

/// How to find elements on a page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(path: impl Into<String>) -> Self {
        Locator::XPath(path.into())
    }

    fn by(&self) -> By {
        match self {
            Locator::Css(selector) => By::Css(selector.as_str()),
            Locator::XPath(path) => By::XPath(path.as_str()),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(selector) => write!(f, "css={}", selector),
            Locator::XPath(path) => write!(f, "xpath={}", path),
        }
    }
}

/// A single browser tab driven by one run.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;

    async fn title(&self) -> Result<String, BrowserError>;

    /// Visible text of every element matching `locator`, in document order.
    async fn texts(&self, locator: &Locator) -> Result<Vec<String>, BrowserError>;

    /// `href` of every element matching `locator` that carries one.
    async fn hrefs(&self, locator: &Locator) -> Result<Vec<String>, BrowserError>;

    /// Clicks the first match. `Ok(false)` when nothing matched.
    async fn click(&self, locator: &Locator) -> Result<bool, BrowserError>;

    /// Types `text` into the first match and presses enter. `Ok(false)` when
    /// nothing matched.
    async fn fill_and_submit(&self, locator: &Locator, text: &str) -> Result<bool, BrowserError>;

    async fn scroll_to_bottom(&self) -> Result<(), BrowserError>;

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;
}

/// Opens a page inside an already provisioned remote browser session.
#[async_trait]
pub trait PageConnector: Send + Sync {
    async fn connect(&self, session: &BrowserSession) -> Result<Box<dyn BrowserPage>, BrowserError>;
}

pub struct Droid {
    pub driver: WebDriver,
}

impl Droid {
    async fn first(&self, locator: &Locator) -> Result<Option<WebElement>, BrowserError> {
        let mut elements = self.driver.find_all(locator.by()).await?;
        match elements.is_empty() {
            true => Ok(None),
            false => Ok(Some(elements.swap_remove(0))),
        }
    }
}

#[async_trait]
impl BrowserPage for Droid {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        log::info!("Navigating to url: {}", url);
        self.driver
            .goto(url)
            .await
            .map_err(|e| BrowserError::Navigation(e.to_string()))
    }

    async fn title(&self) -> Result<String, BrowserError> {
        Ok(self.driver.title().await?)
    }

    async fn texts(&self, locator: &Locator) -> Result<Vec<String>, BrowserError> {
        let mut texts = vec![];
        for element in self.driver.find_all(locator.by()).await? {
            texts.push(element.text().await?);
        }
        Ok(texts)
    }

    async fn hrefs(&self, locator: &Locator) -> Result<Vec<String>, BrowserError> {
        let mut hrefs = vec![];
        for a_tag in self.driver.find_all(locator.by()).await? {
            if let Some(href) = a_tag.attr("href").await? {
                hrefs.push(href);
            }
        }
        Ok(hrefs)
    }

    async fn click(&self, locator: &Locator) -> Result<bool, BrowserError> {
        match self.first(locator).await? {
            Some(element) => {
                element.click().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn fill_and_submit(&self, locator: &Locator, text: &str) -> Result<bool, BrowserError> {
        match self.first(locator).await? {
            Some(element) => {
                element.clear().await?;
                element.send_keys(format!("{}{}", text, ENTER_KEY)).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
        self.driver
            .execute("window.scrollTo(0, document.body.scrollHeight);", vec![])
            .await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        Ok(self.driver.screenshot_as_png().await?)
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.driver.clone().quit().await?;
        Ok(())
    }
}

/// Connects a thirtyfour `WebDriver` to the session's remote browser.
pub struct WebDriverConnector {
    settings: BrowserSettings,
}

impl WebDriverConnector {
    pub fn new(settings: BrowserSettings) -> Self {
        WebDriverConnector { settings }
    }
}

#[async_trait]
impl PageConnector for WebDriverConnector {
    async fn connect(&self, session: &BrowserSession) -> Result<Box<dyn BrowserPage>, BrowserError> {
        let endpoint = session
            .webdriver_url
            .clone()
            .unwrap_or_else(|| self.settings.webdriver_url.clone());

        let mut caps = DesiredCapabilities::chrome();
        caps.add_arg(&format!(
            "--window-size={},{}",
            self.settings.window_width, self.settings.window_height
        ))?;
        caps.add_arg(&format!(
            "--user-agent={}",
            fake_user_agent::get_chrome_rua()
        ))?;

        log::info!(
            "Connecting webdriver for session {} at {}",
            session.id,
            endpoint
        );
        let driver = WebDriver::new(endpoint, caps).await?;
        let timeouts = self.settings.timeouts();
        driver.set_page_load_timeout(timeouts.navigation).await?;

        Ok(Box::new(Droid { driver }))
    }
}
