mod registry;
mod selection;

pub use registry::{Capability, ModelRegistry, ModelSpec, DEFAULT_IMAGE_MODEL};
pub use selection::{Fallback, ModelSelection};
