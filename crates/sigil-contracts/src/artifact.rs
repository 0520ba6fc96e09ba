use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const DEFAULT_IMAGE_MIME: &str = "image/png";

const BASE64_MARKER: &str = "base64,";

/// A base64 image as it travels to the backend: payload text plus MIME type,
/// never decoded on the way through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: String,
    pub data: String,
}

impl EncodedImage {
    /// Accepts a `data:{mime};base64,{payload}` URI or bare base64 text. Only
    /// the text after the `base64,` marker is kept as payload.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let Some(marker_at) = trimmed.find(BASE64_MARKER) else {
            return Self {
                mime_type: DEFAULT_IMAGE_MIME.to_string(),
                data: trimmed.to_string(),
            };
        };
        let header = &trimmed[..marker_at];
        let data = &trimmed[marker_at + BASE64_MARKER.len()..];
        let mime_type = header
            .strip_prefix("data:")
            .map(|rest| rest.trim_end_matches(';').trim())
            .filter(|mime| !mime.is_empty())
            .unwrap_or(DEFAULT_IMAGE_MIME);
        Self {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        }
    }
}

/// Decoded image bytes plus their MIME type.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    mime_type: String,
    bytes: Vec<u8>,
}

impl std::fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl ImagePayload {
    pub fn new(mime_type: Option<&str>, bytes: Vec<u8>) -> Self {
        let mime_type = mime_type
            .map(str::trim)
            .filter(|mime| !mime.is_empty())
            .unwrap_or(DEFAULT_IMAGE_MIME)
            .to_string();
        Self { mime_type, bytes }
    }

    pub fn from_base64(mime_type: Option<&str>, data: &str) -> anyhow::Result<Self> {
        let bytes = BASE64
            .decode(data.trim().as_bytes())
            .context("image base64 decode failed")?;
        Ok(Self::new(mime_type, bytes))
    }

    pub fn from_data_uri(uri: &str) -> anyhow::Result<Self> {
        let encoded = EncodedImage::parse(uri);
        Self::from_base64(Some(&encoded.mime_type), &encoded.data)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }

    pub fn to_encoded(&self) -> EncodedImage {
        EncodedImage {
            mime_type: self.mime_type.clone(),
            data: self.to_base64(),
        }
    }

    pub fn sha256(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }

    pub fn extension(&self) -> &'static str {
        match self.mime_type.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }
}

/// One generated image with its metadata and lineage pointer. Immutable once
/// built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    id: String,
    image: ImagePayload,
    prompt: String,
    created_at: DateTime<Utc>,
    parent_id: Option<String>,
}

impl Artifact {
    pub fn new(image: ImagePayload, prompt: impl Into<String>, parent_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            image,
            prompt: prompt.into(),
            created_at: Utc::now(),
            parent_id,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn image(&self) -> &ImagePayload {
        &self.image
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn is_remix(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn suggested_filename(&self) -> String {
        format!("{}.png", self.id)
    }

    /// Metadata row without the image bytes, for event logs and listings.
    pub fn describe(&self) -> Map<String, Value> {
        let value = json!({
            "artifact_id": self.id,
            "parent_id": self.parent_id,
            "prompt": self.prompt,
            "created_at": self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            "mime_type": self.image.mime_type(),
            "bytes": self.image.len(),
            "sha256": self.image.sha256(),
        });
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}
