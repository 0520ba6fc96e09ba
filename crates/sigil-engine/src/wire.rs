//! Request and response shapes of the `generateContent` call.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sigil_contracts::artifact::EncodedImage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default, alias = "mime_type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub data: String,
}

impl From<&EncodedImage> for InlineData {
    fn from(image: &EncodedImage) -> Self {
        Self {
            mime_type: Some(image.mime_type.clone()),
            data: image.data.clone(),
        }
    }
}

/// One content part. Unknown part shapes are kept as raw JSON so that a new
/// backend field never turns into a parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Image {
        #[serde(rename = "inlineData", alias = "inline_data")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
    Other(Value),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn image(image: &EncodedImage) -> Self {
        Part::Image {
            inline_data: InlineData::from(image),
        }
    }

    /// The inline image of this part, if it actually carries data.
    pub fn image_data(&self) -> Option<&InlineData> {
        match self {
            Part::Image { inline_data } if !inline_data.data.trim().is_empty() => {
                Some(inline_data)
            }
            Part::Image { .. } | Part::Text { .. } | Part::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_modalities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

impl GenerateContentRequest {
    /// Single user turn: the source image (when given) ahead of the
    /// instruction text.
    pub fn new(instruction: &str, source: Option<&EncodedImage>, temperature: f32) -> Self {
        let mut parts = Vec::new();
        if let Some(image) = source {
            parts.push(Part::image(image));
        }
        parts.push(Part::text(instruction));
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: GenerationConfig {
                temperature,
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            },
        }
    }

    pub fn instruction(&self) -> Option<&str> {
        self.contents
            .iter()
            .flat_map(|content| content.parts.iter())
            .find_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                Part::Image { .. } | Part::Other(_) => None,
            })
    }

    pub fn source_image(&self) -> Option<&InlineData> {
        self.contents
            .iter()
            .flat_map(|content| content.parts.iter())
            .find_map(Part::image_data)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    pub fn with_parts(parts: Vec<Part>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(Content {
                    role: Some("model".to_string()),
                    parts,
                }),
            }],
        }
    }

    /// First inline image among the first candidate's parts, in order.
    pub fn first_image(&self) -> Option<&InlineData> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .find_map(Part::image_data)
    }
}
