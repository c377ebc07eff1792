use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::settings::{HexColor, SettingsPatch, VisualStyle};
use crate::subtitle::LyricLine;

pub const SAMPLE_LINE_LIMIT: usize = 20;
pub const SAMPLE_CHAR_LIMIT: usize = 1000;

/// Colors and style proposed for a set of lyrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeSuggestion {
    pub primary_color: HexColor,
    pub secondary_color: HexColor,
    pub background_color: HexColor,
    pub style: VisualStyle,
}

impl ThemeSuggestion {
    pub const FALLBACK: Self = Self {
        primary_color: HexColor::rgb(0x63, 0x66, 0xf1),
        secondary_color: HexColor::rgb(0xc0, 0x84, 0xfc),
        background_color: HexColor::rgb(0x0f, 0x17, 0x2a),
        style: VisualStyle::Neon,
    };

    pub fn to_patch(self) -> SettingsPatch {
        SettingsPatch {
            primary_color: Some(self.primary_color),
            secondary_color: Some(self.secondary_color),
            background_color: Some(self.background_color),
            style: Some(self.style),
            ..SettingsPatch::default()
        }
    }
}

/// Suggests a theme from lyric text. Implementations never fail; they
/// return [`ThemeSuggestion::FALLBACK`] instead.
pub trait ThemeAdvisor: Send + Sync {
    fn suggest_theme(&self, sample_text: &str) -> ThemeSuggestion;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackThemeAdvisor;

impl ThemeAdvisor for FallbackThemeAdvisor {
    fn suggest_theme(&self, _sample_text: &str) -> ThemeSuggestion {
        ThemeSuggestion::FALLBACK
    }
}

/// Text of the first lines, joined by newlines and cut on a char boundary.
pub fn sample_text(lines: &[LyricLine]) -> String {
    let joined = lines
        .iter()
        .take(SAMPLE_LINE_LIMIT)
        .map(|line| line.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    match joined.char_indices().nth(SAMPLE_CHAR_LIMIT) {
        Some((cut, _)) => joined[..cut].to_owned(),
        None => joined,
    }
}

pub fn build_theme_prompt(sample_text: &str) -> String {
    format!(
        "Analyze the mood of these song lyrics and suggest a color theme for a lyric video.\n\
         Respond with ONLY a JSON object with these keys:\n\
         - primaryColor: hex color string like #rrggbb\n\
         - secondaryColor: hex color string like #rrggbb\n\
         - backgroundColor: dark hex color string like #rrggbb\n\
         - style: one of NEON, MINIMAL, NATURE, FIERY\n\n\
         Lyrics:\n{sample_text}\n"
    )
}

pub fn parse_theme_response(raw: &str) -> Result<ThemeSuggestion> {
    let body = strip_markdown_code_fences(raw);
    if body.is_empty() {
        bail!("theme response was empty");
    }
    serde_json::from_str(&body).context("theme response is not a valid theme object")
}

pub fn strip_markdown_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let body = rest.split_once('\n').map_or("", |(_, body)| body).trim_end();
        return body.trim_end_matches("```").trim().to_owned();
    }
    trimmed.to_owned()
}

/// Any advisor error becomes the fallback theme plus a warning.
pub fn or_fallback(result: Result<ThemeSuggestion>) -> ThemeSuggestion {
    result.unwrap_or_else(|error| {
        tracing::warn!("theme suggestion failed, using fallback theme: {error:#}");
        ThemeSuggestion::FALLBACK
    })
}

/// Picks the HTTP advisor when the feature is on and a key is set.
pub fn default_advisor() -> Box<dyn ThemeAdvisor> {
    #[cfg(feature = "theme")]
    {
        if let Some(advisor) = anthropic::AnthropicThemeAdvisor::from_env() {
            return Box::new(advisor);
        }
        tracing::warn!("ANTHROPIC_API_KEY not set; theme requests use the fallback theme");
    }
    #[cfg(not(feature = "theme"))]
    tracing::debug!("built without the `theme` feature; theme requests use the fallback theme");
    Box::new(FallbackThemeAdvisor)
}

#[cfg(feature = "theme")]
pub mod anthropic {
    use anyhow::{anyhow, Context, Result};
    use reqwest::Client;
    use serde::{Deserialize, Serialize};

    use super::{
        build_theme_prompt, or_fallback, parse_theme_response, ThemeAdvisor, ThemeSuggestion,
    };

    const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
    const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
    const ANTHROPIC_API_VERSION: &str = "2023-06-01";

    #[derive(Debug, Clone)]
    pub struct AnthropicThemeAdvisor {
        http: Client,
        api_key: String,
        model: String,
    }

    impl AnthropicThemeAdvisor {
        pub fn new(http: Client, api_key: String, model: Option<String>) -> Self {
            let model = model
                .and_then(|value| (!value.trim().is_empty()).then_some(value))
                .unwrap_or_else(|| DEFAULT_MODEL.to_owned());
            Self {
                http,
                api_key,
                model,
            }
        }

        pub fn from_env() -> Option<Self> {
            let api_key = std::env::var("ANTHROPIC_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty())?;
            let model = std::env::var("ANTHROPIC_MODEL").ok();
            Some(Self::new(Client::new(), api_key, model))
        }

        async fn request_theme(&self, sample_text: &str) -> Result<ThemeSuggestion> {
            let request_body = AnthropicRequest {
                model: self.model.clone(),
                max_tokens: 300,
                system: "You pick color themes for lyric videos. Output only JSON.".to_owned(),
                messages: vec![AnthropicMessage {
                    role: "user".to_owned(),
                    content: build_theme_prompt(sample_text),
                }],
            };

            let response: AnthropicResponse = self
                .http
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_API_VERSION)
                .json(&request_body)
                .send()
                .await
                .context("failed to call Anthropic API")?
                .error_for_status()
                .context("Anthropic API returned an error status")?
                .json()
                .await
                .context("failed to decode Anthropic response")?;

            let text = response
                .content
                .into_iter()
                .find_map(|chunk| chunk.text)
                .ok_or_else(|| anyhow!("Anthropic response had no text content"))?;
            parse_theme_response(&text)
        }
    }

    impl ThemeAdvisor for AnthropicThemeAdvisor {
        fn suggest_theme(&self, sample_text: &str) -> ThemeSuggestion {
            let result = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("failed to start theme request runtime")
                .and_then(|runtime| runtime.block_on(self.request_theme(sample_text)));
            or_fallback(result)
        }
    }

    #[derive(Debug, Serialize)]
    struct AnthropicRequest {
        model: String,
        max_tokens: u32,
        system: String,
        messages: Vec<AnthropicMessage>,
    }

    #[derive(Debug, Serialize)]
    struct AnthropicMessage {
        role: String,
        content: String,
    }

    #[derive(Debug, Deserialize)]
    struct AnthropicResponse {
        content: Vec<AnthropicContent>,
    }

    #[derive(Debug, Deserialize)]
    struct AnthropicContent {
        #[serde(default)]
        text: Option<String>,
    }
}
