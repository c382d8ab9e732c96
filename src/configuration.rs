use std::{collections::HashMap, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

use crate::domain::Tone;

#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub browserbase: BrowserbaseSettings,
    pub browser: BrowserSettings,
    pub llm: LlmSettings,
    pub roast: RoastSettings,
    pub directory: DirectorySettings,
    pub storage: StorageSettings,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    #[serde(default)]
    pub json_logs: bool,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub shutdown_grace_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub subscriber_buffer: usize,
}

#[derive(Deserialize, Clone, Debug)]
pub struct BrowserbaseSettings {
    pub api_key: String,
    pub project_id: String,
    pub base_url: String,
    pub region: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub request_timeout_secs: u64,
}

impl BrowserbaseSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct BrowserSettings {
    /// Used when the session API does not hand out its own WebDriver endpoint.
    pub webdriver_url: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub navigation_timeout_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub extraction_timeout_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub screenshot_timeout_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub settle_millis: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub window_width: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub window_height: u32,
}

impl BrowserSettings {
    pub fn timeouts(&self) -> PageTimeouts {
        PageTimeouts {
            navigation: Duration::from_secs(self.navigation_timeout_secs),
            extraction: Duration::from_secs(self.extraction_timeout_secs),
            screenshot: Duration::from_secs(self.screenshot_timeout_secs),
            settle: Duration::from_millis(self.settle_millis),
        }
    }
}

/// Upper bounds for the slow page operations of a single target.
#[derive(Clone, Copy, Debug)]
pub struct PageTimeouts {
    pub navigation: Duration,
    pub extraction: Duration,
    pub screenshot: Duration,
    pub settle: Duration,
}

impl Default for PageTimeouts {
    fn default() -> Self {
        PageTimeouts {
            navigation: Duration::from_secs(30),
            extraction: Duration::from_secs(5),
            screenshot: Duration::from_secs(10),
            settle: Duration::from_millis(300),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct LlmSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_tokens: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub request_timeout_secs: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RoastSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_chars: usize,
    pub fallback: String,
    #[serde(default)]
    pub temperatures: HashMap<Tone, f32>,
}

impl RoastSettings {
    pub fn temperature(&self, tone: Tone) -> f32 {
        self.temperatures
            .get(&tone)
            .copied()
            .unwrap_or_else(|| tone.default_temperature())
    }
}

impl Default for RoastSettings {
    fn default() -> Self {
        RoastSettings {
            max_chars: 180,
            fallback: "Your landing page needs work, but at least it loads!".to_string(),
            temperatures: HashMap::new(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct DirectorySettings {
    pub base_url: String,
    pub listing_path: String,
    pub profile_path_prefix: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub default_limit: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_limit: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_scroll_attempts: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub scroll_pause_millis: u64,
}

impl DirectorySettings {
    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_millis)
    }
}

impl Default for DirectorySettings {
    fn default() -> Self {
        DirectorySettings {
            base_url: "https://www.ycombinator.com".to_string(),
            listing_path: "/companies".to_string(),
            profile_path_prefix: "/companies/".to_string(),
            default_limit: 24,
            max_limit: 100,
            max_scroll_attempts: 10,
            scroll_pause_millis: 1000,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct StorageSettings {
    pub root: PathBuf,
    pub public_base_url: String,
}

pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("Failed to determine cwd: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;
    let environment_filename = format!("{}.yaml", environment.as_str());

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")))
        .add_source(
            config::File::from(configuration_directory.join(environment_filename)).required(false),
        )
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
