use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use sigil_contracts::artifact::Artifact;
use sigil_contracts::brief::Brief;
use sigil_contracts::events::EventWriter;
use sigil_contracts::history::History;
use sigil_contracts::models::{Capability, ModelRegistry, ModelSpec};
use sigil_contracts::runs::summary::SessionSummary;

use crate::backend::BackendRegistry;
use crate::config::EngineConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{GenerationError, REMIX_FAILURE_PREFIX};
use crate::export::export_artifact;
use crate::map_object;
use crate::orchestrator::Orchestrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Generating,
    IdleWithError,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Generating => "generating",
            SessionStatus::IdleWithError => "idle_with_error",
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    brief: Brief,
    history: History,
    current_id: Option<String>,
    error: Option<String>,
    batches: u64,
    failed_batches: u64,
}

enum Action<'a> {
    Generate,
    Remix(&'a str),
}

impl Action<'_> {
    fn name(&self) -> &'static str {
        match self {
            Action::Generate => "generate",
            Action::Remix(_) => "remix",
        }
    }
}

/// Holds the in-flight flag for the lifetime of one batch.
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// One interactive logo session: the draft brief, the lineage-aware history,
/// the current artifact and the last error.
///
/// State is only changed through the action methods. At most one batch runs
/// at a time; a generate or remix issued while another batch is in flight is
/// rejected with [`GenerationError::AlreadyInFlight`] and changes nothing.
pub struct Session {
    orchestrator: Orchestrator,
    events: EventWriter,
    model: ModelSpec,
    started_at: String,
    in_flight: AtomicBool,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(orchestrator: Orchestrator, model: ModelSpec, events: EventWriter) -> Self {
        events.emit_quiet(
            "session_started",
            map_object(json!({
                "model": model.name,
                "provider": model.provider,
            })),
        );
        Self {
            orchestrator,
            events,
            model,
            started_at: now_utc_iso(),
            in_flight: AtomicBool::new(false),
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Resolves the configured model, picks the backend its provider names and
    /// wires the dispatcher. The model must support edits since revise and
    /// remix batches send a source image.
    pub fn from_config(
        config: &EngineConfig,
        backends: &BackendRegistry,
        events: EventWriter,
    ) -> anyhow::Result<Self> {
        let selection =
            ModelRegistry::default().resolve(Some(config.model.as_str()), Capability::Edit)?;
        if let Some(reason) = &selection.fallback {
            events.emit_quiet(
                "model_fallback",
                map_object(json!({
                    "requested": config.model,
                    "model": selection.model.name,
                    "reason": reason.to_string(),
                })),
            );
        }
        let backend = backends.get(&selection.model.provider).with_context(|| {
            format!(
                "no backend registered for provider '{}' (available: {})",
                selection.model.provider,
                backends.names().join(", ")
            )
        })?;
        let dispatcher = Dispatcher::new(backend, selection.model.name.clone(), config.temperature);
        let orchestrator = Orchestrator::new(dispatcher, events.clone());
        Ok(Self::new(orchestrator, selection.model, events))
    }

    pub fn session_id(&self) -> &str {
        self.events.session_id()
    }

    pub fn model(&self) -> &ModelSpec {
        &self.model
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn status(&self) -> SessionStatus {
        if self.in_flight.load(Ordering::Acquire) {
            return SessionStatus::Generating;
        }
        if self.lock_state().error.is_some() {
            SessionStatus::IdleWithError
        } else {
            SessionStatus::Idle
        }
    }

    pub fn is_generating(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock_state().error.clone()
    }

    pub fn brief(&self) -> Brief {
        self.lock_state().brief.clone()
    }

    /// Applies a field edit to the draft brief. Any edit clears the last error.
    pub fn edit_brief(&self, edit: impl FnOnce(&mut Brief)) {
        let mut state = self.lock_state();
        edit(&mut state.brief);
        state.error = None;
    }

    pub fn set_brief(&self, brief: Brief) {
        self.edit_brief(|draft| *draft = brief);
    }

    pub fn current(&self) -> Option<Artifact> {
        let state = self.lock_state();
        let id = state.current_id.as_deref()?;
        state.history.get(id).cloned()
    }

    pub fn history_len(&self) -> usize {
        self.lock_state().history.len()
    }

    /// Read access to the history without cloning every image.
    pub fn with_history<R>(&self, read: impl FnOnce(&History) -> R) -> R {
        read(&self.lock_state().history)
    }

    pub fn artifact(&self, id: &str) -> Option<Artifact> {
        self.lock_state().history.get(id).cloned()
    }

    /// Runs a fresh batch (or a revision when the brief carries a reference
    /// image) using a snapshot of the draft brief.
    pub fn generate(&self) -> Result<Vec<Artifact>, GenerationError> {
        self.run_action(Action::Generate)
    }

    /// Runs a variation batch from an artifact already in history. Asks for at
    /// least two variants and writes that raised count back into the draft.
    pub fn remix(&self, artifact_id: &str) -> Result<Vec<Artifact>, GenerationError> {
        self.run_action(Action::Remix(artifact_id))
    }

    /// Makes `artifact_id` current. History order is untouched.
    pub fn select(&self, artifact_id: &str) -> Result<Artifact, GenerationError> {
        let mut state = self.lock_state();
        let Some(artifact) = state.history.get(artifact_id).cloned() else {
            return Err(GenerationError::UnknownArtifact {
                id: artifact_id.to_string(),
            });
        };
        state.current_id = Some(artifact.id().to_string());
        state.error = None;
        drop(state);

        self.events.emit_quiet(
            "artifact_selected",
            map_object(json!({ "artifact_id": artifact.id() })),
        );
        Ok(artifact)
    }

    pub fn export(&self, artifact_id: &str, dir: &Path) -> anyhow::Result<PathBuf> {
        let artifact = self
            .artifact(artifact_id)
            .ok_or_else(|| GenerationError::UnknownArtifact {
                id: artifact_id.to_string(),
            })?;
        let path = export_artifact(&artifact, dir)?;
        self.events.emit_quiet(
            "artifact_exported",
            map_object(json!({
                "artifact_id": artifact.id(),
                "path": path.to_string_lossy(),
            })),
        );
        Ok(path)
    }

    pub fn summary(&self) -> SessionSummary {
        let state = self.lock_state();
        SessionSummary {
            session_id: self.session_id().to_string(),
            started_at: self.started_at.clone(),
            finished_at: now_utc_iso(),
            total_batches: state.batches,
            failed_batches: state.failed_batches,
            total_artifacts: state.history.len() as u64,
            total_remixes: state.history.remix_count() as u64,
            current_artifact_id: state.current_id.clone(),
        }
    }

    /// Writes the session receipt and records the end of the session.
    pub fn finish(&self, summary_path: &Path) -> anyhow::Result<SessionSummary> {
        let summary = self.summary();
        let mut extra = serde_json::Map::new();
        extra.insert("model".to_string(), json!(self.model.name));
        summary.write(summary_path, &extra)?;
        self.events.emit(
            "session_finished",
            map_object(json!({
                "total_batches": summary.total_batches,
                "total_artifacts": summary.total_artifacts,
                "summary_path": summary_path.to_string_lossy(),
            })),
        )?;
        Ok(summary)
    }

    fn run_action(&self, action: Action<'_>) -> Result<Vec<Artifact>, GenerationError> {
        let Some(_flight) = FlightGuard::acquire(&self.in_flight) else {
            self.events.emit_quiet(
                "batch_rejected",
                map_object(json!({ "action": action.name() })),
            );
            return Err(GenerationError::AlreadyInFlight);
        };

        let (brief, count, source) = self.prepare(&action)?;
        let outcome = self.orchestrator.run_batch(&brief, count, source.as_ref());

        let mut state = self.lock_state();
        let committed = outcome.and_then(|batch| {
            state.history.append(batch.clone()).map_err(|err| {
                GenerationError::transport(format!("failed to record batch: {err}"))
            })?;
            Ok(batch)
        });
        match committed {
            Ok(batch) => {
                state.current_id = batch.first().map(|artifact| artifact.id().to_string());
                state.error = None;
                state.batches += 1;
                Ok(batch)
            }
            Err(err) => {
                let message = match action {
                    Action::Generate => err.user_message(),
                    Action::Remix(_) => format!("{REMIX_FAILURE_PREFIX}{}", err.user_message()),
                };
                eprintln!("sigil: {} failed: {err}", action.name());
                state.error = Some(message);
                state.failed_batches += 1;
                Err(err)
            }
        }
    }

    /// Validates the draft and snapshots what the batch needs. Failures land
    /// in the error slot without any network call.
    fn prepare(&self, action: &Action<'_>) -> Result<(Brief, u8, Option<Artifact>), GenerationError> {
        let mut state = self.lock_state();
        state.error = None;

        if let Err(message) = state.brief.validate() {
            self.events.emit_quiet(
                "validation_failed",
                map_object(json!({
                    "action": action.name(),
                    "error": message,
                })),
            );
            state.error = Some(message.clone());
            return Err(GenerationError::Validation { message });
        }

        match action {
            Action::Generate => {
                let brief = state.brief.clone();
                let count = brief.effective_variant_count();
                Ok((brief, count, None))
            }
            Action::Remix(id) => {
                let Some(source) = state.history.get(id).cloned() else {
                    let err = GenerationError::UnknownArtifact { id: id.to_string() };
                    state.error = Some(err.user_message());
                    return Err(err);
                };
                let count = state.brief.remix_variant_count();
                if state.brief.variant_count < count {
                    state.brief.variant_count = count;
                }
                Ok((state.brief.clone(), count, Some(source)))
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::{mpsc, Arc};
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use sigil_contracts::brief::LogoStyle;

    use super::*;
    use crate::backend::{default_backend_registry, DryrunBackend, ImageBackend};
    use crate::wire::{GenerateContentRequest, GenerateContentResponse, Part};

    fn orbit_brief() -> Brief {
        Brief {
            style: LogoStyle::Minimalist,
            colors: "navy and gold".to_string(),
            variant_count: 2,
            ..Brief::new("Orbit Coffee", "space-station coffee shop")
        }
    }

    fn session_with(backend: Arc<dyn ImageBackend>, dir: &Path) -> Session {
        let events = EventWriter::new(dir.join("events.jsonl"), "session-test");
        let model = ModelSpec::image("dryrun-image-1", backend.name());
        let orchestrator =
            Orchestrator::new(Dispatcher::new(backend, model.name.clone(), 1.0), events.clone());
        Session::new(orchestrator, model, events)
    }

    struct TextOnlyBackend;

    impl ImageBackend for TextOnlyBackend {
        fn name(&self) -> &str {
            "text-only"
        }

        fn generate_content(
            &self,
            _model: &str,
            _request: &GenerateContentRequest,
        ) -> Result<GenerateContentResponse> {
            Ok(GenerateContentResponse::with_parts(vec![Part::text(
                "I would rather describe it.",
            )]))
        }
    }

    /// Succeeds until `healthy_calls` calls have been made, then fails.
    struct FlakyBackend {
        calls: AtomicUsize,
        healthy_calls: usize,
    }

    impl ImageBackend for FlakyBackend {
        fn name(&self) -> &str {
            "flaky"
        }

        fn generate_content(
            &self,
            model: &str,
            request: &GenerateContentRequest,
        ) -> Result<GenerateContentResponse> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.healthy_calls {
                return Err(anyhow!("503 Service Unavailable"));
            }
            DryrunBackend::new().generate_content(model, request)
        }
    }

    /// Parks every call until the test releases it.
    struct GatedBackend {
        started: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl ImageBackend for GatedBackend {
        fn name(&self) -> &str {
            "gated"
        }

        fn generate_content(
            &self,
            model: &str,
            request: &GenerateContentRequest,
        ) -> Result<GenerateContentResponse> {
            self.started
                .lock()
                .map_err(|_| anyhow!("poisoned"))?
                .send(())?;
            self.release
                .lock()
                .map_err(|_| anyhow!("poisoned"))?
                .recv_timeout(Duration::from_secs(5))?;
            DryrunBackend::new().generate_content(model, request)
        }
    }

    #[test]
    fn generate_commits_batch_and_selects_first() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let session = session_with(Arc::new(DryrunBackend::new()), temp.path());
        session.set_brief(orbit_brief());

        let batch = session.generate()?;
        assert_eq!(batch.len(), 2);
        assert_eq!(session.history_len(), 2);
        assert_eq!(session.current().as_ref().map(Artifact::id), Some(batch[0].id()));
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.last_error().is_none());
        Ok(())
    }

    #[test]
    fn invalid_brief_sets_error_without_dispatching() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let backend = Arc::new(DryrunBackend::new());
        let session = session_with(backend.clone(), temp.path());
        session.set_brief(Brief::new("", "space-station coffee shop"));

        let outcome = session.generate();
        assert!(matches!(outcome, Err(GenerationError::Validation { .. })));
        assert_eq!(backend.calls(), 0);
        assert_eq!(session.status(), SessionStatus::IdleWithError);
        assert_eq!(
            session.last_error().as_deref(),
            Some("Please provide at least a brand name and description.")
        );

        session.edit_brief(|brief| brief.brand_name = "Orbit Coffee".to_string());
        assert_eq!(session.status(), SessionStatus::Idle);
        Ok(())
    }

    #[test]
    fn text_only_response_leaves_history_and_current_untouched() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let session = session_with(Arc::new(TextOnlyBackend), temp.path());
        session.set_brief(orbit_brief());

        assert_eq!(session.generate(), Err(GenerationError::NoImageInResponse));
        assert_eq!(session.history_len(), 0);
        assert!(session.current().is_none());
        assert_eq!(session.status(), SessionStatus::IdleWithError);
        assert_eq!(
            session.last_error(),
            Some(GenerationError::NoImageInResponse.user_message())
        );
        Ok(())
    }

    #[test]
    fn remix_raises_count_and_parents_batch() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let session = session_with(Arc::new(DryrunBackend::new()), temp.path());
        let mut brief = orbit_brief();
        brief.variant_count = 1;
        session.set_brief(brief);

        let first = session.generate()?;
        assert_eq!(first.len(), 1);
        let source_id = first[0].id().to_string();

        let remixed = session.remix(&source_id)?;
        assert_eq!(remixed.len(), 2);
        assert!(remixed
            .iter()
            .all(|artifact| artifact.parent_id() == Some(source_id.as_str())));
        assert_eq!(session.brief().variant_count, 2);
        assert_eq!(session.history_len(), 3);
        session.with_history(|history| {
            let ids: Vec<&str> = history.iter().map(Artifact::id).collect();
            assert_eq!(ids, vec![remixed[0].id(), remixed[1].id(), source_id.as_str()]);
        });
        Ok(())
    }

    #[test]
    fn failed_remix_is_prefixed_and_keeps_history() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let backend = Arc::new(FlakyBackend {
            calls: AtomicUsize::new(0),
            healthy_calls: 2,
        });
        let session = session_with(backend, temp.path());
        session.set_brief(orbit_brief());
        let first = session.generate()?;
        let current_before = session.current();

        let outcome = session.remix(first[0].id());
        assert!(matches!(outcome, Err(GenerationError::Transport { .. })));
        assert_eq!(session.history_len(), 2);
        assert_eq!(session.current(), current_before);
        let error = session.last_error().unwrap_or_default();
        assert!(error.starts_with("Failed to create variations. "));
        assert!(error.contains("503 Service Unavailable"));
        Ok(())
    }

    #[test]
    fn remix_of_unknown_artifact_is_rejected() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let backend = Arc::new(DryrunBackend::new());
        let session = session_with(backend.clone(), temp.path());
        session.set_brief(orbit_brief());

        assert!(matches!(
            session.remix("missing"),
            Err(GenerationError::UnknownArtifact { .. })
        ));
        assert_eq!(backend.calls(), 0);
        assert_eq!(session.status(), SessionStatus::IdleWithError);
        Ok(())
    }

    #[test]
    fn select_changes_current_but_not_order() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let session = session_with(Arc::new(DryrunBackend::new()), temp.path());
        session.set_brief(orbit_brief());
        let batch = session.generate()?;
        let order_before: Vec<String> =
            session.with_history(|history| history.iter().map(|a| a.id().to_string()).collect());

        session.select(batch[1].id())?;
        assert_eq!(session.current().as_ref().map(Artifact::id), Some(batch[1].id()));
        let order_after: Vec<String> =
            session.with_history(|history| history.iter().map(|a| a.id().to_string()).collect());
        assert_eq!(order_before, order_after);
        assert!(matches!(
            session.select("missing"),
            Err(GenerationError::UnknownArtifact { .. })
        ));
        Ok(())
    }

    #[test]
    fn second_action_while_in_flight_is_rejected() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let backend = Arc::new(GatedBackend {
            started: Mutex::new(started_tx),
            release: Mutex::new(release_rx),
        });
        let session = session_with(backend, temp.path());
        let mut brief = orbit_brief();
        brief.variant_count = 1;
        session.set_brief(brief);

        std::thread::scope(|scope| -> Result<()> {
            let first = scope.spawn(|| session.generate());
            started_rx.recv_timeout(Duration::from_secs(5))?;

            assert_eq!(session.status(), SessionStatus::Generating);
            assert_eq!(session.generate(), Err(GenerationError::AlreadyInFlight));
            assert_eq!(session.history_len(), 0);

            release_tx.send(())?;
            let batch = first
                .join()
                .map_err(|_| anyhow!("generate thread panicked"))??;
            assert_eq!(batch.len(), 1);
            Ok(())
        })?;

        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(session.history_len(), 1);
        Ok(())
    }

    #[test]
    fn finish_writes_summary_and_closing_event() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let session = session_with(Arc::new(DryrunBackend::new()), temp.path());
        session.set_brief(orbit_brief());
        let batch = session.generate()?;
        session.remix(batch[0].id())?;

        let summary = session.finish(&temp.path().join("summary.json"))?;
        assert_eq!(summary.total_batches, 2);
        assert_eq!(summary.total_artifacts, 4);
        assert_eq!(summary.total_remixes, 2);

        let raw = std::fs::read_to_string(temp.path().join("events.jsonl"))?;
        assert!(raw.lines().any(|line| line.contains("\"session_finished\"")));
        Ok(())
    }

    #[test]
    fn from_config_falls_back_for_unknown_models() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = EngineConfig::default().with_model(Some("dryrun-image-1".to_string()));
        let events = EventWriter::new(temp.path().join("events.jsonl"), "session-test");
        let session = Session::from_config(&config, &default_backend_registry(&config), events)?;
        assert_eq!(session.model().provider, "dryrun");

        let config = EngineConfig::default().with_model(Some("no-such-model".to_string()));
        let events = EventWriter::new(temp.path().join("events2.jsonl"), "session-test");
        let session = Session::from_config(&config, &default_backend_registry(&config), events)?;
        assert_eq!(session.model().name, "gemini-2.5-flash-image");
        let raw = std::fs::read_to_string(temp.path().join("events2.jsonl"))?;
        assert!(raw.contains("\"model_fallback\""));
        Ok(())
    }
}
