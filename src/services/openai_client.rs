use std::{sync::Arc, time::Duration};

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;

use crate::{
    configuration::{LlmSettings, RoastSettings},
    domain::{Summary, Tone},
};

const SYSTEM_PROMPT: &str = r#"You are "LandingPageRoaster", a witty but constructive copy editor.
Your job: write ONE short sentence that roasts a startup's LANDING PAGE ONLY.

Rules:
- Focus purely on the page UX/copy: hero clarity, value prop, visual hierarchy, CTA, contrast/legibility, nav clutter, jargon.
- No attacks on people, founders, or sensitive attributes.
- No company-level accusations (e.g., "scam", "fraud", "stealing data").
- No profanity or slurs. Be playful, not mean.
- Don't invent facts beyond the provided summary.
- Output MUST be at most {max_chars} characters and exactly one sentence (no lists, no line breaks).
- Add ONE tasteful emoji max if it strengthens the punch; otherwise none.

Tone presets:
- spicy: playful jab with edge; still professional.
- kind: gentle nudge, encouraging.
- deadpan: dry, minimal, slightly ironic.

Return ONLY the sentence, no preamble, no quotes."#;

/// Everything the text model needs for one roast.
#[derive(Debug, Clone, PartialEq)]
pub struct RoastPrompt {
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum RoastError {
    #[error("llm request failed: {0}")]
    Api(#[from] OpenAIError),
    #[error("llm request timed out after {0:?}")]
    Timeout(Duration),
    #[error("llm response had no content")]
    EmptyResponse,
    #[error("failed to encode summary: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The remote text generation call.
#[async_trait]
pub trait RoastModel: Send + Sync {
    async fn complete(&self, prompt: &RoastPrompt) -> Result<String, RoastError>;
}

pub struct OpenaiClient {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenaiClient {
    pub fn new(settings: LlmSettings) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(settings.api_key)
            .with_api_base(settings.base_url);
        OpenaiClient {
            client: Client::with_config(config),
            model: settings.model,
            max_tokens: settings.max_tokens,
            timeout: Duration::from_secs(settings.request_timeout_secs),
        }
    }
}

#[async_trait]
impl RoastModel for OpenaiClient {
    async fn complete(&self, prompt: &RoastPrompt) -> Result<String, RoastError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(prompt.temperature)
            .max_tokens(self.max_tokens)
            .messages([
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(prompt.system.as_str())
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt.user.as_str())
                    .build()?
                    .into(),
            ])
            .build()?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| RoastError::Timeout(self.timeout))??;
        log::debug!("Response: {:?}", response);

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or(RoastError::EmptyResponse)
    }
}

/// Turns a summary into a roast that always honours the output contract:
/// one line, bounded length, no trailing punctuation runs. Any model failure
/// is replaced by the configured fallback sentence.
#[derive(Clone)]
pub struct Roaster {
    model: Arc<dyn RoastModel>,
    settings: RoastSettings,
}

impl Roaster {
    pub fn new(model: Arc<dyn RoastModel>, settings: RoastSettings) -> Self {
        Roaster { model, settings }
    }

    pub async fn generate(&self, summary: &Summary, tone: Tone) -> String {
        log::info!("Generating roast with tone {}", tone.as_str());

        let roast = match self.prompt(summary, tone) {
            Ok(prompt) => self.model.complete(&prompt).await,
            Err(e) => Err(e),
        };

        match roast.map(|text| normalize_roast(&text, self.settings.max_chars)) {
            Ok(text) if !text.is_empty() => {
                log::info!("Generated roast of {} chars", text.chars().count());
                text
            }
            Ok(_) => {
                log::error!("Failed to generate roast: model returned blank text");
                self.settings.fallback.clone()
            }
            Err(e) => {
                log::error!("Failed to generate roast: {}", e);
                self.settings.fallback.clone()
            }
        }
    }

    pub fn prompt(&self, summary: &Summary, tone: Tone) -> Result<RoastPrompt, RoastError> {
        let max_chars = self.settings.max_chars;
        let summary_json = serde_json::to_string_pretty(summary)?;

        Ok(RoastPrompt {
            system: SYSTEM_PROMPT.replace("{max_chars}", &max_chars.to_string()),
            user: format!(
                "Write a one-sentence roast of this startup's LANDING PAGE using the tone: {}.\n\
                 Base it ONLY on this extracted summary (title/hero/cta may be empty strings):\n\n\
                 Summary JSON:\n{}\n\n\
                 Remember: at most {} chars; exactly one sentence; landing page only.",
                tone.as_str(),
                summary_json,
                max_chars
            ),
            temperature: self.settings.temperature(tone),
        })
    }
}

/// Collapses line breaks, truncates to `max_chars` with an ellipsis and drops
/// repeated trailing punctuation.
pub fn normalize_roast(text: &str, max_chars: usize) -> String {
    let mut text = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect::<Vec<_>>().join(" ");

    if text.chars().count() > max_chars {
        let kept: String = text.chars().take(max_chars.saturating_sub(1)).collect();
        text = format!("{}…", kept.trim_end());
    }

    while text.ends_with("..") || text.ends_with("!!") || text.ends_with("??") {
        text.pop();
    }

    text
}
