use std::fmt;

use serde::{Deserialize, Serialize};

pub const MIN_VARIANTS: u8 = 1;
pub const MAX_VARIANTS: u8 = 4;
/// Remixing always asks for at least this many alternatives.
pub const REMIX_MIN_VARIANTS: u8 = 2;

pub const BRIEF_VALIDATION_MESSAGE: &str = "Please provide at least a brand name and description.";

/// Aesthetic presets. Each carries the phrase that goes verbatim into prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogoStyle {
    #[default]
    Minimalist,
    Abstract,
    Vintage,
    Mascot,
    Luxury,
    Tech,
}

impl LogoStyle {
    pub const ALL: [LogoStyle; 6] = [
        LogoStyle::Minimalist,
        LogoStyle::Abstract,
        LogoStyle::Vintage,
        LogoStyle::Mascot,
        LogoStyle::Luxury,
        LogoStyle::Tech,
    ];

    pub fn label(self) -> &'static str {
        match self {
            LogoStyle::Minimalist => "MINIMALIST",
            LogoStyle::Abstract => "ABSTRACT",
            LogoStyle::Vintage => "VINTAGE",
            LogoStyle::Mascot => "MASCOT",
            LogoStyle::Luxury => "LUXURY",
            LogoStyle::Tech => "TECH",
        }
    }

    pub fn descriptor(self) -> &'static str {
        match self {
            LogoStyle::Minimalist => "Minimalist, flat design, clean lines, geometric",
            LogoStyle::Abstract => "Abstract, modern art, conceptual, fluid shapes",
            LogoStyle::Vintage => "Vintage, retro, badge style, textured, classic typography",
            LogoStyle::Mascot => "Mascot, character-based, friendly, vibrant, illustration",
            LogoStyle::Luxury => "Luxury, elegant, serif fonts, gold and black, sophisticated",
            LogoStyle::Tech => "Tech, futuristic, cyber, gradients, circuit patterns, neon",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim();
        Self::ALL
            .into_iter()
            .find(|style| style.label().eq_ignore_ascii_case(normalized))
    }
}

impl fmt::Display for LogoStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The user's structured description of the brand. Each action works on an
/// immutable snapshot of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Brief {
    pub brand_name: String,
    #[serde(default)]
    pub tagline: Option<String>,
    pub description: String,
    #[serde(default)]
    pub style: LogoStyle,
    #[serde(default)]
    pub colors: String,
    #[serde(default = "default_variant_count", alias = "variationCount")]
    pub variant_count: u8,
    /// MIME-tagged base64 (`data:image/png;base64,...`) or bare base64.
    #[serde(default)]
    pub reference_image: Option<String>,
}

impl Default for Brief {
    fn default() -> Self {
        Self {
            brand_name: String::new(),
            tagline: None,
            description: String::new(),
            style: LogoStyle::default(),
            colors: String::new(),
            variant_count: default_variant_count(),
            reference_image: None,
        }
    }
}

impl Brief {
    pub fn new(brand_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            brand_name: brand_name.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.brand_name.trim().is_empty() || self.description.trim().is_empty() {
            return Err(BRIEF_VALIDATION_MESSAGE.to_string());
        }
        Ok(())
    }

    pub fn tagline_text(&self) -> Option<&str> {
        self.tagline
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn reference_image_text(&self) -> Option<&str> {
        self.reference_image
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn effective_variant_count(&self) -> u8 {
        clamp_variant_count(self.variant_count)
    }

    pub fn remix_variant_count(&self) -> u8 {
        self.effective_variant_count().max(REMIX_MIN_VARIANTS)
    }
}

pub fn clamp_variant_count(count: u8) -> u8 {
    count.clamp(MIN_VARIANTS, MAX_VARIANTS)
}

fn default_variant_count() -> u8 {
    MIN_VARIANTS
}

/// Which instruction suffix a batch gets. Derived per action, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationMode {
    Fresh,
    Revise,
    Remix,
}

impl GenerationMode {
    /// A remix source wins over an uploaded reference when both are present.
    pub fn resolve(brief: &Brief, has_remix_source: bool) -> Self {
        if has_remix_source {
            GenerationMode::Remix
        } else if brief.reference_image_text().is_some() {
            GenerationMode::Revise
        } else {
            GenerationMode::Fresh
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GenerationMode::Fresh => "fresh",
            GenerationMode::Revise => "revise",
            GenerationMode::Remix => "remix",
        }
    }
}
