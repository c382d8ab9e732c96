use serde::Serialize;
use url::Url;

/// A resolved (name, url) pair waiting to be analysed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub name: String,
    pub url: String,
}

impl Target {
    /// Builds a target whose display name is the host of `url`.
    pub fn from_url(url: &str) -> Self {
        Target {
            name: host_name(url),
            url: url.to_string(),
        }
    }

    /// Filesystem and storage-key safe identifier for this target.
    pub fn slug(&self) -> String {
        let slug: String = self
            .name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '-' })
            .collect();
        let slug = slug.trim_matches('-');

        match slug.is_empty() {
            true => "site".to_string(),
            false => slug.to_string(),
        }
    }
}

/// Host of `url` without a leading `www.`. Strings that do not parse as a url
/// fall back to whatever sits between the scheme and the first `/`.
pub fn host_name(url: &str) -> String {
    let host = match Url::parse(url) {
        Ok(parsed_url) => match parsed_url.host_str() {
            Some(host) if !host.is_empty() => host.to_lowercase(),
            _ => strip_scheme(url),
        },
        Err(_) => strip_scheme(url),
    };

    match host.strip_prefix("www.") {
        Some(h) => h.to_string(),
        None => host,
    }
}

fn strip_scheme(url: &str) -> String {
    let rest = url
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    rest.split('/').next().unwrap_or_default().to_lowercase()
}
