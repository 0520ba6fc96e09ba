pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod export;
pub mod orchestrator;
pub mod session;
pub mod wire;

use serde_json::{Map, Value};

pub use backend::{default_backend_registry, BackendRegistry, DryrunBackend, GeminiBackend, ImageBackend};
pub use config::EngineConfig;
pub use dispatcher::Dispatcher;
pub use error::GenerationError;
pub use orchestrator::Orchestrator;
pub use session::{Session, SessionStatus};

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
