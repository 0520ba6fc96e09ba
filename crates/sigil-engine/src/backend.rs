use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use sha2::{Digest, Sha256};
use sigil_contracts::artifact::{EncodedImage, DEFAULT_IMAGE_MIME};

use crate::config::{non_empty_env, EngineConfig};
use crate::wire::{GenerateContentRequest, GenerateContentResponse, Part};

const DRYRUN_IMAGE_SIDE: u32 = 256;

/// One outbound generation call. Implementations make exactly one request per
/// invocation and never retry.
pub trait ImageBackend: Send + Sync {
    fn name(&self) -> &str;
    fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse>;
}

#[derive(Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Arc<dyn ImageBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<B: ImageBackend + 'static>(&mut self, backend: B) {
        self.backends
            .insert(backend.name().to_string(), Arc::new(backend));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ImageBackend>> {
        self.backends.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }
}

pub fn default_backend_registry(config: &EngineConfig) -> BackendRegistry {
    let mut backends = BackendRegistry::new();
    backends.register(DryrunBackend::new());
    backends.register(GeminiBackend::new(config));
    backends
}

pub struct GeminiBackend {
    api_base: String,
    api_key: Option<String>,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiBackend {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY")),
            timeout: config.request_timeout,
            http: HttpClient::new(),
        }
    }

    /// Replaces the key read from the environment. Blank keys count as unset.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        self
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }
}

impl ImageBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let endpoint = self.endpoint_for_model(model);
        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", api_key)
            .timeout(self.timeout)
            .json(request)
            .send()
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        response_json_or_error("Gemini", response)
    }
}

fn response_json_or_error(backend: &str, response: HttpResponse) -> Result<GenerateContentResponse> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{backend} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{backend} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    serde_json::from_str(&body).with_context(|| format!("{backend} returned invalid JSON payload"))
}

/// Offline backend: answers every call with a solid-color PNG whose color is
/// derived from the instruction, the source image and a call counter.
#[derive(Debug, Default)]
pub struct DryrunBackend {
    calls: AtomicU64,
}

impl DryrunBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageBackend for DryrunBackend {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate_content(
        &self,
        _model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let source = request
            .source_image()
            .map(|image| image.data.as_str())
            .unwrap_or_default();
        let (r, g, b) = color_from_prompt(request.instruction().unwrap_or_default(), source, call);
        let png = render_solid_png(DRYRUN_IMAGE_SIDE, DRYRUN_IMAGE_SIDE, Rgb([r, g, b]))?;

        let image = EncodedImage {
            mime_type: DEFAULT_IMAGE_MIME.to_string(),
            data: BASE64.encode(png),
        };
        Ok(GenerateContentResponse::with_parts(vec![
            Part::text(format!("dryrun render #{call}")),
            Part::image(&image),
        ]))
    }
}

fn render_solid_png(width: u32, height: u32, color: Rgb<u8>) -> Result<Vec<u8>> {
    let mut image = RgbImage::new(width, height);
    for pixel in image.pixels_mut() {
        *pixel = color;
    }
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("dryrun PNG encode failed")?;
    Ok(bytes)
}

fn color_from_prompt(prompt: &str, source: &str, seed: u64) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(source.as_bytes());
    hasher.update(seed.to_be_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
