use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use serde_json::json;
use sigil_contracts::artifact::Artifact;
use sigil_contracts::brief::{Brief, GenerationMode, LogoStyle};
use sigil_contracts::events::EventWriter;
use sigil_contracts::models::ModelSpec;
use sigil_contracts::prompt::compose_prompt;
use sigil_engine::wire::{GenerateContentRequest, GenerateContentResponse};
use sigil_engine::{
    Dispatcher, DryrunBackend, GenerationError, ImageBackend, Orchestrator, Session, SessionStatus,
};

/// Dry-run images, but remembers every instruction and source it was sent.
#[derive(Default)]
struct ObservedBackend {
    inner: DryrunBackend,
    instructions: Mutex<Vec<String>>,
    sources: Mutex<Vec<Option<String>>>,
}

impl ImageBackend for ObservedBackend {
    fn name(&self) -> &str {
        "observed"
    }

    fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        self.instructions
            .lock()
            .map_err(|_| anyhow!("poisoned"))?
            .push(request.instruction().unwrap_or_default().to_string());
        self.sources
            .lock()
            .map_err(|_| anyhow!("poisoned"))?
            .push(request.source_image().map(|image| image.data.clone()));
        self.inner.generate_content(model, request)
    }
}

/// Fails exactly one call (the `fail_on`-th, zero based) of the whole session.
struct FailNthBackend {
    calls: AtomicUsize,
    fail_on: usize,
}

impl ImageBackend for FailNthBackend {
    fn name(&self) -> &str {
        "fail-nth"
    }

    fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_on {
            return Err(anyhow!("upstream closed the connection"));
        }
        DryrunBackend::new().generate_content(model, request)
    }
}

/// Answers every call with a single text-only candidate.
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
        Ok(serde_json::from_value(json!({
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": "Here is a description of a logo."}]}}
            ]
        }))?)
    }
}

fn session_with(backend: Arc<dyn ImageBackend>, dir: &std::path::Path) -> Session {
    let events = EventWriter::new(dir.join("events.jsonl"), "flow");
    let model = ModelSpec::image("dryrun-image-1", backend.name());
    let dispatcher = Dispatcher::new(backend, model.name.clone(), 1.0);
    Session::new(Orchestrator::new(dispatcher, events.clone()), model, events)
}

fn orbit_coffee() -> Brief {
    Brief {
        style: LogoStyle::Minimalist,
        colors: "navy and gold".to_string(),
        variant_count: 2,
        ..Brief::new("Orbit Coffee", "space-station coffee shop")
    }
}

fn history_ids(session: &Session) -> Vec<String> {
    session.with_history(|history| history.iter().map(|a| a.id().to_string()).collect())
}

#[test]
fn orbit_coffee_generate_then_remix() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let backend = Arc::new(ObservedBackend::default());
    let session = session_with(backend.clone(), temp.path());
    session.set_brief(orbit_coffee());

    let first = session.generate()?;
    assert_eq!(first.len(), 2);
    assert_eq!(session.history_len(), 2);
    assert!(first.iter().all(|artifact| artifact.parent_id().is_none()));
    assert_eq!(first[0].prompt(), first[1].prompt());
    assert_eq!(first[0].prompt(), "space-station coffee shop");
    assert_ne!(first[0].id(), first[1].id());
    assert_eq!(session.current().as_ref().map(Artifact::id), Some(first[0].id()));
    {
        let instructions = backend.instructions.lock().map_err(|_| anyhow!("poisoned"))?;
        assert_eq!(instructions.len(), 2);
        assert!(instructions[0].contains("Orbit Coffee"));
        assert!(instructions[0].contains("space-station coffee shop"));
        assert!(instructions[0].contains("navy and gold"));
    }

    let remixed = session.remix(first[0].id())?;
    assert_eq!(remixed.len(), 2);
    assert!(remixed
        .iter()
        .all(|artifact| artifact.parent_id() == Some(first[0].id())));
    assert_eq!(
        history_ids(&session),
        vec![remixed[0].id(), remixed[1].id(), first[0].id(), first[1].id()]
    );

    let sources = backend.sources.lock().map_err(|_| anyhow!("poisoned"))?;
    let expected_source = first[0].image().to_base64();
    assert!(sources[2..]
        .iter()
        .all(|source| source.as_deref() == Some(expected_source.as_str())));
    Ok(())
}

#[test]
fn generate_yields_exactly_the_requested_count() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let session = session_with(Arc::new(DryrunBackend::new()), temp.path());
    for count in 1..=4u8 {
        session.edit_brief(|brief| {
            *brief = orbit_coffee();
            brief.variant_count = count;
        });
        let before = session.history_len();
        let batch = session.generate()?;
        assert_eq!(batch.len(), usize::from(count));
        assert_eq!(session.history_len(), before + usize::from(count));
        let mut ids: Vec<&str> = batch.iter().map(Artifact::id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), usize::from(count));
    }
    Ok(())
}

#[test]
fn remix_of_single_variant_brief_dispatches_two_calls() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let backend = Arc::new(ObservedBackend::default());
    let session = session_with(backend.clone(), temp.path());
    session.edit_brief(|brief| {
        *brief = orbit_coffee();
        brief.variant_count = 1;
    });

    let source = session.generate()?;
    let remixed = session.remix(source[0].id())?;
    assert_eq!(remixed.len(), 2);

    let instructions = backend.instructions.lock().map_err(|_| anyhow!("poisoned"))?;
    assert_eq!(instructions.len(), 3);
    let remix_prompt = compose_prompt(&session.brief(), GenerationMode::Remix);
    assert_eq!(instructions[1], remix_prompt);
    assert_eq!(instructions[2], remix_prompt);
    Ok(())
}

#[test]
fn one_failed_call_commits_nothing() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let backend = Arc::new(FailNthBackend {
        calls: AtomicUsize::new(0),
        fail_on: 4,
    });
    let session = session_with(backend, temp.path());
    session.edit_brief(|brief| {
        *brief = orbit_coffee();
        brief.variant_count = 3;
    });

    let first = session.generate()?;
    let ids_before = history_ids(&session);

    let outcome = session.generate();
    assert!(matches!(outcome, Err(GenerationError::Transport { .. })));
    assert_eq!(history_ids(&session), ids_before);
    assert_eq!(session.status(), SessionStatus::IdleWithError);
    assert_eq!(session.current().as_ref().map(Artifact::id), Some(first[0].id()));
    assert!(session
        .last_error()
        .is_some_and(|message| message.contains("upstream closed the connection")));

    session.edit_brief(|brief| brief.colors = "teal".to_string());
    assert_eq!(session.status(), SessionStatus::Idle);
    Ok(())
}

#[test]
fn history_is_newest_batch_first() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let session = session_with(Arc::new(DryrunBackend::new()), temp.path());
    session.set_brief(orbit_coffee());

    let mut batches: Vec<Vec<Artifact>> = Vec::new();
    batches.push(session.generate()?);
    let source = batches[0][1].id().to_string();
    batches.push(session.remix(&source)?);
    session.edit_brief(|brief| brief.variant_count = 3);
    batches.push(session.generate()?);

    let expected: Vec<String> = batches
        .iter()
        .rev()
        .flat_map(|batch| batch.iter().map(|artifact| artifact.id().to_string()))
        .collect();
    assert_eq!(history_ids(&session), expected);

    session.select(&source)?;
    assert_eq!(history_ids(&session), expected);
    session.with_history(|history| {
        let lineage: Vec<&str> = history
            .lineage(batches[1][0].id())
            .into_iter()
            .map(Artifact::id)
            .collect();
        assert_eq!(lineage, vec![source.as_str()]);
        assert_eq!(history.children_of(&source).len(), 2);
    });
    Ok(())
}

#[test]
fn text_only_candidate_fails_without_touching_history() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let session = session_with(Arc::new(TextOnlyBackend), temp.path());
    session.set_brief(orbit_coffee());

    assert_eq!(session.generate(), Err(GenerationError::NoImageInResponse));
    assert_eq!(session.history_len(), 0);
    assert!(session.current().is_none());
    assert_eq!(
        session.last_error().as_deref(),
        Some("Generation failed: no image data found in response.")
    );

    let events = std::fs::read_to_string(temp.path().join("events.jsonl"))?;
    let kinds: Vec<String> = events
        .lines()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
        .filter_map(|event| event["type"].as_str().map(str::to_string))
        .collect();
    assert_eq!(kinds.iter().filter(|kind| *kind == "dispatch_failed").count(), 2);
    assert!(kinds.contains(&"batch_failed".to_string()));
    assert!(!kinds.contains(&"artifact_created".to_string()));
    Ok(())
}

#[test]
fn reference_image_switches_to_revise_and_is_sent_without_header() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let backend = Arc::new(ObservedBackend::default());
    let session = session_with(backend.clone(), temp.path());
    session.edit_brief(|brief| {
        *brief = orbit_coffee();
        brief.variant_count = 1;
        brief.reference_image = Some("data:image/png;base64,U0tFVENI".to_string());
    });

    session.generate()?;
    let instructions = backend.instructions.lock().map_err(|_| anyhow!("poisoned"))?;
    assert_eq!(
        instructions[0],
        compose_prompt(&session.brief(), GenerationMode::Revise)
    );
    let sources = backend.sources.lock().map_err(|_| anyhow!("poisoned"))?;
    assert_eq!(sources[0].as_deref(), Some("U0tFVENI"));
    Ok(())
}

#[test]
fn remix_source_wins_over_reference_image() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let backend = Arc::new(ObservedBackend::default());
    let session = session_with(backend.clone(), temp.path());
    session.edit_brief(|brief| {
        *brief = orbit_coffee();
        brief.variant_count = 1;
    });
    let source = session.generate()?;
    session.edit_brief(|brief| brief.reference_image = Some("U0tFVENI".to_string()));

    session.remix(source[0].id())?;
    let sources = backend.sources.lock().map_err(|_| anyhow!("poisoned"))?;
    let expected = source[0].image().to_base64();
    assert_eq!(sources.len(), 3);
    assert!(sources[1..]
        .iter()
        .all(|sent| sent.as_deref() == Some(expected.as_str())));
    Ok(())
}

#[test]
fn text_parts_before_the_image_are_skipped() -> Result<()> {
    struct ChattyBackend;

    impl ImageBackend for ChattyBackend {
        fn name(&self) -> &str {
            "chatty"
        }

        fn generate_content(
            &self,
            model: &str,
            request: &GenerateContentRequest,
        ) -> Result<GenerateContentResponse> {
            let rendered = DryrunBackend::new().generate_content(model, request)?;
            let image = rendered
                .first_image()
                .cloned()
                .ok_or_else(|| anyhow!("dryrun rendered no image"))?;
            Ok(serde_json::from_value(json!({
                "candidates": [{"content": {"parts": [
                    {"text": "Sure! "},
                    {"text": "Here is your logo."},
                    {"inline_data": {"mime_type": "image/png", "data": image.data}},
                ]}}]
            }))?)
        }
    }

    let temp = tempfile::tempdir()?;
    let session = session_with(Arc::new(ChattyBackend), temp.path());
    session.set_brief(orbit_coffee());
    let batch = session.generate()?;
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].image().mime_type(), "image/png");
    assert!(image::load_from_memory(batch[0].image().bytes()).is_ok());
    Ok(())
}
