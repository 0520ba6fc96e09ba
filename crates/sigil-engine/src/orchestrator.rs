use std::thread;

use serde_json::json;
use sigil_contracts::artifact::{Artifact, EncodedImage, ImagePayload};
use sigil_contracts::brief::{clamp_variant_count, Brief, GenerationMode};
use sigil_contracts::events::EventWriter;
use sigil_contracts::prompt::compose_prompt;
use uuid::Uuid;

use crate::dispatcher::Dispatcher;
use crate::error::GenerationError;
use crate::map_object;

/// Fans one user action out into N concurrent dispatcher calls and folds the
/// results back into a batch of artifacts.
///
/// Aggregation is all-or-nothing: a single failed call fails the batch and no
/// artifact from it is returned, even the ones that succeeded.
#[derive(Clone)]
pub struct Orchestrator {
    dispatcher: Dispatcher,
    events: EventWriter,
}

impl Orchestrator {
    pub fn new(dispatcher: Dispatcher, events: EventWriter) -> Self {
        Self { dispatcher, events }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Produces exactly `count` artifacts (clamped to 1..=4), in call order.
    /// With a remix source every artifact is parented to it and its image is
    /// sent instead of any reference image on the brief.
    pub fn run_batch(
        &self,
        brief: &Brief,
        count: u8,
        remix_source: Option<&Artifact>,
    ) -> Result<Vec<Artifact>, GenerationError> {
        let count = clamp_variant_count(count);
        let mode = GenerationMode::resolve(brief, remix_source.is_some());
        let instruction = compose_prompt(brief, mode);
        let source = match remix_source {
            Some(artifact) => Some(artifact.image().to_encoded()),
            None => brief.reference_image_text().map(EncodedImage::parse),
        };
        let parent_id = remix_source.map(|artifact| artifact.id().to_string());
        let batch_id = Uuid::new_v4().to_string();

        self.events.emit_quiet(
            "batch_started",
            map_object(json!({
                "batch_id": batch_id,
                "mode": mode.as_str(),
                "count": count,
                "parent_id": parent_id,
                "backend": self.dispatcher.backend_name(),
                "model": self.dispatcher.model(),
                "temperature": self.dispatcher.temperature(),
            })),
        );

        let outcomes = self.dispatch_all(&instruction, source.as_ref(), usize::from(count));

        let mut payloads = Vec::with_capacity(outcomes.len());
        let mut first_error = None;
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(payload) => payloads.push(payload),
                Err(err) => {
                    self.events.emit_quiet(
                        "dispatch_failed",
                        map_object(json!({
                            "batch_id": batch_id,
                            "index": index,
                            "error_kind": err.kind(),
                            "error": err.to_string(),
                        })),
                    );
                    first_error.get_or_insert(err);
                }
            }
        }

        if let Some(err) = first_error {
            self.events.emit_quiet(
                "batch_failed",
                map_object(json!({
                    "batch_id": batch_id,
                    "mode": mode.as_str(),
                    "succeeded": payloads.len(),
                    "requested": count,
                    "error_kind": err.kind(),
                    "error": err.to_string(),
                })),
            );
            return Err(err);
        }

        let batch: Vec<Artifact> = payloads
            .into_iter()
            .map(|payload| Artifact::new(payload, brief.description.clone(), parent_id.clone()))
            .collect();

        for artifact in &batch {
            let mut payload = artifact.describe();
            payload.insert("batch_id".to_string(), json!(batch_id));
            self.events.emit_quiet("artifact_created", payload);
        }
        self.events.emit_quiet(
            "batch_finished",
            map_object(json!({
                "batch_id": batch_id,
                "mode": mode.as_str(),
                "artifact_ids": batch.iter().map(Artifact::id).collect::<Vec<&str>>(),
            })),
        );
        Ok(batch)
    }

    /// Runs every call on its own scoped worker and joins them in issue
    /// order, so slot `i` always holds the result of call `i`.
    fn dispatch_all(
        &self,
        instruction: &str,
        source: Option<&EncodedImage>,
        count: usize,
    ) -> Vec<Result<ImagePayload, GenerationError>> {
        let dispatcher = &self.dispatcher;
        thread::scope(|scope| {
            let handles: Vec<_> = (0..count)
                .map(|index| {
                    thread::Builder::new()
                        .name(format!("sigil-dispatch-{index}"))
                        .spawn_scoped(scope, move || dispatcher.dispatch(instruction, source))
                })
                .collect();

            handles
                .into_iter()
                .map(|spawned| match spawned {
                    Ok(handle) => handle.join().unwrap_or_else(|_| {
                        Err(GenerationError::transport("generation worker panicked"))
                    }),
                    Err(err) => Err(GenerationError::transport(format!(
                        "failed to spawn generation worker: {err}"
                    ))),
                })
                .collect()
        })
    }
}
