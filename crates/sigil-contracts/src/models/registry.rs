use std::fmt;

use indexmap::IndexMap;

pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

/// What a model can be asked to do in one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Text-to-image.
    Generate,
    /// Image plus instruction to image (revise and remix batches).
    Edit,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Generate => "generate",
            Capability::Edit => "edit",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    /// Name of the backend that serves this model.
    pub provider: String,
    pub capabilities: Vec<Capability>,
}

impl ModelSpec {
    /// An image model that can both generate and edit.
    pub fn image(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            capabilities: vec![Capability::Generate, Capability::Edit],
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Known image models in preference order. The first entry able to serve a
/// capability is the fallback for it.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::from_specs([
            ModelSpec::image(DEFAULT_IMAGE_MODEL, "gemini"),
            ModelSpec::image("gemini-3-pro-image-preview", "gemini"),
            ModelSpec::image("gemini-2.0-flash-preview-image-generation", "gemini"),
            ModelSpec::image("dryrun-image-1", "dryrun"),
        ])
    }
}

impl ModelRegistry {
    pub fn from_specs(specs: impl IntoIterator<Item = ModelSpec>) -> Self {
        Self {
            models: specs
                .into_iter()
                .map(|spec| (spec.name.clone(), spec))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name.trim())
    }

    pub fn names(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }

    pub fn supporting(&self, capability: Capability) -> impl Iterator<Item = &ModelSpec> {
        self.models
            .values()
            .filter(move |model| model.supports(capability))
    }
}
