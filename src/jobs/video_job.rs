// src/jobs/video_job.rs
//! Deck-to-video run executor - prepares a run's workspace and drives the
//! pipeline either inline (synchronous endpoint) or in the background.

use super::{new_run_id, RunId, RunRecord, RunRegistry, RunState, SharedRunRegistry};
use crate::pipeline::{DeckToVideoPipeline, PipelineError, RunWorkspace};
use crate::types::{SourceDocument, VideoArtifact};
use std::path::Path;
use std::sync::Arc;

/// A registered run whose source deck is already on disk.
pub struct DeckVideoJob {
    workspace: RunWorkspace,
    source: SourceDocument,
    pipeline: Arc<DeckToVideoPipeline>,
    runs: SharedRunRegistry,
}

impl DeckVideoJob {
    /// Create the run's workspace, store the uploaded deck in it and register
    /// the run as Uploaded.
    pub async fn prepare(
        work_dir: &Path,
        owner: Option<String>,
        file_name: &str,
        bytes: &[u8],
        pipeline: Arc<DeckToVideoPipeline>,
        runs: SharedRunRegistry,
    ) -> Result<Self, PipelineError> {
        let run_id = new_run_id();
        let workspace = RunWorkspace::create(work_dir, &run_id).await?;
        let source = match workspace.save_source(file_name, bytes).await {
            Ok(source) => source,
            Err(e) => {
                let _ = workspace.remove().await;
                return Err(e);
            }
        };

        runs.register(RunRecord::new(
            run_id,
            owner,
            file_name.to_string(),
            workspace.root().to_path_buf(),
        ))
        .await;

        Ok(Self {
            workspace,
            source,
            pipeline,
            runs,
        })
    }

    pub fn run_id(&self) -> &str {
        self.workspace.run_id()
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.runs
    }

    /// Run the pipeline to completion on the current task.
    ///
    /// If the returned future is dropped first (the HTTP client went away),
    /// the run is marked Failed so it does not linger in a working state.
    pub async fn execute(&self) -> Result<VideoArtifact, PipelineError> {
        let guard = AbandonGuard {
            runs: self.runs.clone(),
            run_id: self.run_id().to_string(),
            armed: true,
        };
        let result = self.pipeline.run(&self.workspace, &self.source, &self.runs).await;
        guard.disarm();
        result
    }
}

struct AbandonGuard {
    runs: SharedRunRegistry,
    run_id: RunId,
    armed: bool,
}

impl AbandonGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let runs = self.runs.clone();
        let run_id = std::mem::take(&mut self.run_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let abandoned = RunState::Failed {
                        stage: "abandoned".to_string(),
                        error: "Request was cancelled before the video was assembled".to_string(),
                        slide: None,
                    };
                    match runs.advance(&run_id, abandoned).await {
                        Ok(()) => tracing::warn!(run_id = %run_id, "Run abandoned by its caller"),
                        Err(e) => tracing::debug!(run_id = %run_id, "Abandoned run not updated: {}", e),
                    }
                });
            }
            Err(_) => tracing::warn!(run_id = %run_id, "Run abandoned outside a runtime; left for the janitor"),
        }
    }
}

/// Spawn a deck-to-video run in background
pub fn spawn_deck_video_run(job: DeckVideoJob) -> RunId {
    let run_id = job.run_id().to_string();
    let run_id_for_spawn = run_id.clone();

    tokio::spawn(async move {
        match job.execute().await {
            Ok(artifact) => {
                tracing::info!(
                    run_id = %run_id_for_spawn,
                    slides = artifact.slide_count,
                    "Background run completed"
                );
            }
            Err(e) => {
                tracing::error!(run_id = %run_id_for_spawn, "Background run failed: {}", e);
            }
        }
    });

    tracing::info!(run_id = %run_id, "Spawned deck-to-video run");
    run_id
}
