use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::configuration::BrowserbaseSettings;

/// A provisioned remote browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserSession {
    pub id: String,
    pub connect_url: String,
    pub webdriver_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session api request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("session api returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn create_session(&self) -> Result<BrowserSession, SessionError>;

    /// Best effort release. Returns whether the provider confirmed it.
    async fn close_session(&self, id: &str) -> bool;
}

pub struct BrowserbaseClient {
    client: Client,
    api_key: String,
    project_id: String,
    region: String,
    url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionBody<'a> {
    project_id: &'a str,
    region: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    id: String,
    connect_url: String,
    #[serde(default)]
    selenium_remote_url: Option<String>,
}

impl BrowserbaseClient {
    pub fn new(settings: BrowserbaseSettings) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()?;

        Ok(BrowserbaseClient {
            client,
            api_key: settings.api_key,
            project_id: settings.project_id,
            region: settings.region,
            url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SessionProvider for BrowserbaseClient {
    async fn create_session(&self) -> Result<BrowserSession, SessionError> {
        log::info!("Creating browser session in project {}", self.project_id);

        let res = self
            .client
            .post(format!("{}/sessions", self.url))
            .header("x-bb-api-key", &self.api_key)
            .json(&CreateSessionBody {
                project_id: &self.project_id,
                region: &self.region,
            })
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            log::error!("Session api returned {}: {}", status, body);
            return Err(SessionError::Status { status, body });
        }

        let session = res.json::<SessionResponse>().await?;
        log::info!("Created browser session {}", session.id);

        Ok(BrowserSession {
            id: session.id,
            connect_url: session.connect_url,
            webdriver_url: session.selenium_remote_url,
        })
    }

    async fn close_session(&self, id: &str) -> bool {
        match self
            .client
            .delete(format!("{}/sessions/{}", self.url, id))
            .header("x-bb-api-key", &self.api_key)
            .send()
            .await
        {
            Ok(res) if res.status().is_success() => {
                log::info!("Closed browser session {}", id);
                true
            }
            Ok(res) => {
                log::error!(
                    "Session api refused to close session {}: {}",
                    id,
                    res.status()
                );
                false
            }
            Err(e) => {
                log::error!("Got error closing browser session {}: {:?}", id, e);
                false
            }
        }
    }
}
