use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize, Serializer};

pub const MAX_ANIMATION_SPEED: f32 = 10.0;
pub const MAX_BEAT_SENSITIVITY: f32 = 2.0;
pub const MAX_FONT_SIZE: f32 = 1000.0;

/// Opaque sRGB color written as `#rrggbb` (or the `#rgb` shorthand).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HexColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl HexColor {
    pub const WHITE: Self = Self::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix('#')
            .ok_or_else(|| anyhow!("color '{trimmed}' must start with '#'"))?;
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("color '{trimmed}' contains non-hex digits");
        }

        match digits.len() {
            3 => {
                let expand = |idx: usize| -> Result<u8> {
                    let nibble = u8::from_str_radix(&digits[idx..idx + 1], 16)?;
                    Ok(nibble * 17)
                };
                Ok(Self::rgb(expand(0)?, expand(1)?, expand(2)?))
            }
            6 => {
                let channel =
                    |idx: usize| -> Result<u8> { Ok(u8::from_str_radix(&digits[idx..idx + 2], 16)?) };
                Ok(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
            }
            _ => bail!("color '{trimmed}' must be #rgb or #rrggbb"),
        }
    }

    pub fn with_alpha(self, alpha: f32) -> [u8; 4] {
        let a = (alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
        [self.r, self.g, self.b, a]
    }

    pub fn opaque(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for HexColor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for HexColor {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(|error| D::Error::custom(format!("{error:#}")))
    }
}

impl Serialize for HexColor {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisualStyle {
    #[default]
    #[serde(alias = "neon")]
    Neon,
    #[serde(alias = "minimal")]
    Minimal,
    #[serde(alias = "nature")]
    Nature,
    #[serde(alias = "fiery")]
    Fiery,
}

impl VisualStyle {
    pub const ALL: [Self; 4] = [Self::Neon, Self::Minimal, Self::Nature, Self::Fiery];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Neon => "NEON",
            Self::Minimal => "MINIMAL",
            Self::Nature => "NATURE",
            Self::Fiery => "FIERY",
        }
    }

    pub fn has_glow(self) -> bool {
        matches!(self, Self::Neon | Self::Fiery)
    }
}

impl FromStr for VisualStyle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|style| style.as_str() == normalized)
            .ok_or_else(|| anyhow!("unknown style '{s}'. Supported: NEON, MINIMAL, NATURE, FIERY"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnimationKind {
    #[default]
    #[serde(alias = "fade")]
    Fade,
    #[serde(alias = "slide_up")]
    SlideUp,
    #[serde(alias = "zoom")]
    Zoom,
    #[serde(alias = "bounce")]
    Bounce,
}

impl AnimationKind {
    pub const ALL: [Self; 4] = [Self::Fade, Self::SlideUp, Self::Zoom, Self::Bounce];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fade => "FADE",
            Self::SlideUp => "SLIDE_UP",
            Self::Zoom => "ZOOM",
            Self::Bounce => "BOUNCE",
        }
    }
}

impl FromStr for AnimationKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| {
                anyhow!("unknown animation '{s}'. Supported: FADE, SLIDE_UP, ZOOM, BOUNCE")
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VisualSettings {
    pub primary_color: HexColor,
    pub secondary_color: HexColor,
    pub background_color: HexColor,
    pub font_family: String,
    pub font_size: f32,
    pub particle_count: u32,
    pub beat_sensitivity: f32,
    pub style: VisualStyle,
    pub animation: AnimationKind,
    pub animation_speed: f32,
}

impl Default for VisualSettings {
    fn default() -> Self {
        Self {
            primary_color: HexColor::rgb(0x63, 0x66, 0xf1),
            secondary_color: HexColor::rgb(0xc0, 0x84, 0xfc),
            background_color: HexColor::rgb(0x0f, 0x17, 0x2a),
            font_family: "Inter".to_owned(),
            font_size: 48.0,
            particle_count: 100,
            beat_sensitivity: 1.0,
            style: VisualStyle::Neon,
            animation: AnimationKind::Fade,
            animation_speed: 1.0,
        }
    }
}

impl VisualSettings {
    pub fn validate(&self) -> Result<()> {
        validate_number("font_size", self.font_size)?;
        validate_number("beat_sensitivity", self.beat_sensitivity)?;
        validate_number("animation_speed", self.animation_speed)?;

        if self.font_size <= 0.0 || self.font_size > MAX_FONT_SIZE {
            bail!(
                "font_size must be within (0, {MAX_FONT_SIZE}], got {}",
                self.font_size
            );
        }
        if !(0.0..=MAX_BEAT_SENSITIVITY).contains(&self.beat_sensitivity) {
            bail!(
                "beat_sensitivity must be within 0.0..={MAX_BEAT_SENSITIVITY}, got {}",
                self.beat_sensitivity
            );
        }
        if self.animation_speed <= 0.0 || self.animation_speed > MAX_ANIMATION_SPEED {
            bail!(
                "animation_speed must be within (0, {MAX_ANIMATION_SPEED}], got {}",
                self.animation_speed
            );
        }
        if self.font_family.trim().is_empty() {
            bail!("font_family must not be empty");
        }
        Ok(())
    }

    /// Returns a copy with every field present in `patch` replaced.
    pub fn patched(&self, patch: &SettingsPatch) -> Self {
        let mut next = self.clone();
        if let Some(color) = patch.primary_color {
            next.primary_color = color;
        }
        if let Some(color) = patch.secondary_color {
            next.secondary_color = color;
        }
        if let Some(color) = patch.background_color {
            next.background_color = color;
        }
        if let Some(family) = &patch.font_family {
            next.font_family = family.clone();
        }
        if let Some(size) = patch.font_size {
            next.font_size = size;
        }
        if let Some(count) = patch.particle_count {
            next.particle_count = count;
        }
        if let Some(sensitivity) = patch.beat_sensitivity {
            next.beat_sensitivity = sensitivity;
        }
        if let Some(style) = patch.style {
            next.style = style;
        }
        if let Some(animation) = patch.animation {
            next.animation = animation;
        }
        if let Some(speed) = patch.animation_speed {
            next.animation_speed = speed;
        }
        next
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    pub primary_color: Option<HexColor>,
    pub secondary_color: Option<HexColor>,
    pub background_color: Option<HexColor>,
    pub font_family: Option<String>,
    pub font_size: Option<f32>,
    pub particle_count: Option<u32>,
    pub beat_sensitivity: Option<f32>,
    pub style: Option<VisualStyle>,
    pub animation: Option<AnimationKind>,
    pub animation_speed: Option<f32>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Parses repeated `key=value` overrides, later entries winning.
    pub fn from_overrides<S: AsRef<str>>(raw: &[S]) -> Result<Self> {
        let mut patch = Self::default();
        for entry in raw {
            patch
                .apply_override(entry.as_ref())
                .with_context(|| format!("invalid --set '{}'", entry.as_ref()))?;
        }
        Ok(patch)
    }

    pub fn apply_override(&mut self, raw: &str) -> Result<()> {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("expected key=value"))?;
        let key = key.trim();
        let value = value.trim();
        if value.is_empty() {
            bail!("value for '{key}' is empty");
        }

        match key {
            "primary_color" => self.primary_color = Some(value.parse()?),
            "secondary_color" => self.secondary_color = Some(value.parse()?),
            "background_color" => self.background_color = Some(value.parse()?),
            "font_family" => self.font_family = Some(value.to_owned()),
            "font_size" => self.font_size = Some(parse_float(key, value)?),
            "particle_count" => {
                self.particle_count = Some(
                    value
                        .parse()
                        .with_context(|| format!("'{key}' expects a non-negative integer"))?,
                )
            }
            "beat_sensitivity" => self.beat_sensitivity = Some(parse_float(key, value)?),
            "style" => self.style = Some(value.parse()?),
            "animation" => self.animation = Some(value.parse()?),
            "animation_speed" => self.animation_speed = Some(parse_float(key, value)?),
            other => bail!(
                "unknown setting '{other}'. Supported: primary_color, secondary_color, background_color, font_family, font_size, particle_count, beat_sensitivity, style, animation, animation_speed"
            ),
        }
        Ok(())
    }
}

pub fn load_settings(path: &Path) -> Result<VisualSettings> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings {}", path.display()))?;
    let settings: VisualSettings = serde_yaml::from_str(&contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!(
            "failed to parse yaml in {} at {}: {}",
            path.display(),
            location,
            error
        )
    })?;
    settings
        .validate()
        .with_context(|| format!("invalid settings in {}", path.display()))?;
    Ok(settings)
}

fn parse_float(key: &str, value: &str) -> Result<f32> {
    let parsed: f32 = value
        .parse()
        .with_context(|| format!("'{key}' expects a number"))?;
    validate_number(key, parsed)?;
    Ok(parsed)
}

fn validate_number(label: &str, value: f32) -> Result<()> {
    if !value.is_finite() {
        bail!("{label} must be finite");
    }
    Ok(())
}
