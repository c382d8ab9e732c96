use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Spicy,
    Kind,
    Deadpan,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Spicy => "spicy",
            Tone::Kind => "kind",
            Tone::Deadpan => "deadpan",
        }
    }

    pub fn default_temperature(&self) -> f32 {
        match self {
            Tone::Spicy => 0.9,
            Tone::Kind => 0.6,
            Tone::Deadpan => 0.7,
        }
    }
}

/// Where the targets of a run come from.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetSource {
    Directory {
        batch: Option<String>,
        limit: Option<usize>,
    },
    Custom {
        urls: Vec<String>,
    },
}

impl TargetSource {
    pub fn mode(&self) -> &'static str {
        match self {
            TargetSource::Directory { .. } => "directory",
            TargetSource::Custom { .. } => "custom",
        }
    }
}

/// A run submission.
///
/// Parameters may be given flat (`{"source": "custom", "urls": [..]}`) or
/// nested under the source name (`{"source": "yc", "yc": {"batch": ..}}`).
/// Unknown fields and parameters of the other source are rejected.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawRunRequest")]
pub struct RunRequest {
    pub source: TargetSource,
    pub tone: Tone,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum SourceKind {
    #[serde(alias = "yc")]
    Directory,
    Custom,
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DirectoryParams {
    #[serde(default)]
    batch: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CustomParams {
    urls: Vec<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRunRequest {
    source: SourceKind,
    #[serde(default)]
    batch: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    urls: Option<Vec<String>>,
    #[serde(default, alias = "yc")]
    directory: Option<DirectoryParams>,
    #[serde(default)]
    custom: Option<CustomParams>,
    // Accepted from older clients; runs visit one landing page per target.
    #[serde(default, rename = "max_steps")]
    _max_steps: Option<u32>,
    #[serde(default, alias = "style")]
    tone: Tone,
}

impl TryFrom<RawRunRequest> for RunRequest {
    type Error = String;

    fn try_from(raw: RawRunRequest) -> Result<Self, Self::Error> {
        let source = match raw.source {
            SourceKind::Directory => {
                if raw.urls.is_some() || raw.custom.is_some() {
                    return Err("directory runs do not take urls".to_string());
                }
                let nested = raw.directory.unwrap_or_default();
                TargetSource::Directory {
                    batch: raw.batch.or(nested.batch),
                    limit: raw.limit.or(nested.limit),
                }
            }
            SourceKind::Custom => {
                if raw.batch.is_some() || raw.limit.is_some() || raw.directory.is_some() {
                    return Err("custom runs do not take directory parameters".to_string());
                }
                let urls = raw
                    .urls
                    .or(raw.custom.map(|custom| custom.urls))
                    .ok_or_else(|| "missing field `urls`".to_string())?;
                TargetSource::Custom { urls }
            }
        };

        Ok(RunRequest {
            source,
            tone: raw.tone,
        })
    }
}
