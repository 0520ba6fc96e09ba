use std::sync::Arc;

use sigil_contracts::artifact::{EncodedImage, ImagePayload};

use crate::backend::{truncate_text, ImageBackend};
use crate::error::GenerationError;
use crate::wire::{GenerateContentRequest, GenerateContentResponse};

const ERROR_MESSAGE_MAX_CHARS: usize = 512;

/// Issues a single generation call and normalizes its answer into an image
/// payload or a typed failure.
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn ImageBackend>,
    model: String,
    temperature: f32,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn ImageBackend>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            backend,
            model: model.into(),
            temperature,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn dispatch(
        &self,
        instruction: &str,
        source: Option<&EncodedImage>,
    ) -> Result<ImagePayload, GenerationError> {
        let request = GenerateContentRequest::new(instruction, source, self.temperature);
        let response = self
            .backend
            .generate_content(&self.model, &request)
            .map_err(|err| {
                GenerationError::transport(error_chain_text(&err, ERROR_MESSAGE_MAX_CHARS))
            })?;
        extract_image(&response)
    }
}

pub fn extract_image(response: &GenerateContentResponse) -> Result<ImagePayload, GenerationError> {
    let inline = response
        .first_image()
        .ok_or(GenerationError::NoImageInResponse)?;
    ImagePayload::from_base64(inline.mime_type.as_deref(), &inline.data).map_err(|err| {
        GenerationError::transport(format!("backend returned undecodable image data: {err}"))
    })
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}
