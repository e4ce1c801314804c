// src/jobs/mod.rs
//! Pipeline run tracking
//! Holds the state of every deck-to-video run in memory, enforces the run
//! state machine and hands out the finished video exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

pub mod video_job;

/// Unique identifier for a pipeline run
pub type RunId = String;

pub fn new_run_id() -> RunId {
    Uuid::new_v4().to_string()
}

/// Run state: Uploaded → Rasterized → Narrated → Synthesized → Assembled → Downloaded,
/// with Failed reachable from any non-terminal state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum RunState {
    Uploaded,
    Rasterized {
        slide_count: usize,
    },
    Narrated {
        slide_count: usize,
    },
    Synthesized {
        slide_count: usize,
        total_duration_secs: f64,
    },
    Assembled {
        slide_count: usize,
        total_duration_secs: f64,
        video_path: PathBuf,
    },
    Downloaded {
        downloaded_at: DateTime<Utc>,
    },
    Failed {
        stage: String,
        error: String,
        slide: Option<usize>,
    },
}

impl RunState {
    fn step(&self) -> Option<u8> {
        match self {
            Self::Uploaded => Some(0),
            Self::Rasterized { .. } => Some(1),
            Self::Narrated { .. } => Some(2),
            Self::Synthesized { .. } => Some(3),
            Self::Assembled { .. } => Some(4),
            Self::Downloaded { .. } => Some(5),
            Self::Failed { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Rasterized { .. } => "rasterized",
            Self::Narrated { .. } => "narrated",
            Self::Synthesized { .. } => "synthesized",
            Self::Assembled { .. } => "assembled",
            Self::Downloaded { .. } => "downloaded",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Downloaded { .. } | Self::Failed { .. })
    }

    /// Forward by exactly one step, or to Failed from any non-terminal state.
    pub fn can_advance_to(&self, next: &RunState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.step(), next.step()) {
            (_, None) => true,
            (Some(current), Some(following)) => following == current + 1,
            (None, Some(_)) => false,
        }
    }
}

/// Metadata and current state of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: RunId,
    pub owner: Option<String>,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: RunState,
    #[serde(skip)]
    pub workspace_root: PathBuf,
}

impl RunRecord {
    pub fn new(id: RunId, owner: Option<String>, file_name: String, workspace_root: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner,
            file_name,
            created_at: now,
            updated_at: now,
            finished_at: None,
            state: RunState::Uploaded,
            workspace_root,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RunError {
    #[error("Run {0} not found")]
    NotFound(RunId),
    #[error("Run {run_id} cannot move from {from} to {to}")]
    IllegalTransition {
        run_id: RunId,
        from: &'static str,
        to: &'static str,
    },
    #[error("Run {run_id} has no video to download (state: {state})")]
    NotReady { run_id: RunId, state: &'static str },
    #[error("The video of run {0} was already downloaded")]
    AlreadyDownloaded(RunId),
}

/// In-memory registry of pipeline runs
pub struct RunRegistry {
    runs: Arc<RwLock<HashMap<RunId, RunRecord>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Store a new run in the Uploaded state
    pub async fn register(&self, record: RunRecord) -> RunId {
        let run_id = record.id.clone();
        let mut runs = self.runs.write().await;
        runs.insert(run_id.clone(), record);
        tracing::info!("🎬 Registered run: {}", run_id);
        run_id
    }

    pub async fn get(&self, run_id: &str) -> Option<RunRecord> {
        let runs = self.runs.read().await;
        runs.get(run_id).cloned()
    }

    pub async fn state(&self, run_id: &str) -> Option<RunState> {
        let runs = self.runs.read().await;
        runs.get(run_id).map(|run| run.state.clone())
    }

    /// Move a run to `next`, rejecting transitions the state machine forbids.
    pub async fn advance(&self, run_id: &str, next: RunState) -> Result<(), RunError> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| RunError::NotFound(run_id.to_string()))?;

        if !run.state.can_advance_to(&next) {
            tracing::warn!(
                run_id = %run_id,
                "Rejected run transition {} → {}",
                run.state.name(),
                next.name()
            );
            return Err(RunError::IllegalTransition {
                run_id: run_id.to_string(),
                from: run.state.name(),
                to: next.name(),
            });
        }

        tracing::debug!(run_id = %run_id, "📊 Run {} → {}", run.state.name(), next.name());
        let now = Utc::now();
        run.updated_at = now;
        if next.is_terminal() {
            run.finished_at = Some(now);
        }
        run.state = next;
        Ok(())
    }

    /// Hand out the video path once; the run becomes Downloaded.
    pub async fn take_download(&self, run_id: &str) -> Result<PathBuf, RunError> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| RunError::NotFound(run_id.to_string()))?;

        let video_path = match &run.state {
            RunState::Assembled { video_path, .. } => video_path.clone(),
            RunState::Downloaded { .. } => return Err(RunError::AlreadyDownloaded(run_id.to_string())),
            other => {
                return Err(RunError::NotReady {
                    run_id: run_id.to_string(),
                    state: other.name(),
                })
            }
        };

        let now = Utc::now();
        run.state = RunState::Downloaded { downloaded_at: now };
        run.updated_at = now;
        run.finished_at = Some(now);
        tracing::info!(run_id = %run_id, "📤 Video handed out for download");
        Ok(video_path)
    }

    /// All runs of an owner, newest first. `None` lists anonymous runs.
    pub async fn runs_for_owner(&self, owner: Option<&str>) -> Vec<RunRecord> {
        let runs = self.runs.read().await;
        let mut owned: Vec<RunRecord> = runs
            .values()
            .filter(|run| run.owner.as_deref() == owner)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    /// Drop runs idle for longer than `max_age_hours` and delete their directories.
    ///
    /// A run's age counts from its last state change, so videos that were never
    /// downloaded and runs whose request was abandoned mid-pipeline expire too.
    pub async fn cleanup_old_runs(&self, max_age_hours: i64) -> usize {
        let Some(cutoff) =
            chrono::Duration::try_hours(max_age_hours).and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };

        let removed: Vec<RunRecord> = {
            let mut runs = self.runs.write().await;
            let expired: Vec<RunId> = runs
                .iter()
                .filter(|(_, run)| run.finished_at.unwrap_or(run.updated_at) < cutoff)
                .map(|(id, _)| id.clone())
                .collect();
            expired.iter().filter_map(|id| runs.remove(id)).collect()
        };

        for run in &removed {
            match tokio::fs::remove_dir_all(&run.workspace_root).await {
                Ok(()) => tracing::debug!("🗑️ Cleaned up run {} ({})", run.id, run.state.name()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove directory of run {}: {}", run.id, e),
            }
        }

        removed.len()
    }

    #[cfg(test)]
    pub(crate) async fn backdate(&self, run_id: &str, hours: i64) {
        let mut runs = self.runs.write().await;
        if let Some(run) = runs.get_mut(run_id) {
            let then = Utc::now() - chrono::Duration::hours(hours);
            run.updated_at = then;
            if run.finished_at.is_some() {
                run.finished_at = Some(then);
            }
        }
    }
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared registry instance (stored in AppState)
pub type SharedRunRegistry = Arc<RunRegistry>;

#[cfg(test)]
mod tests {
    use super::*;

    fn assembled(path: &str) -> RunState {
        RunState::Assembled {
            slide_count: 3,
            total_duration_secs: 6.7,
            video_path: PathBuf::from(path),
        }
    }

    async fn registry_with_run(id: &str) -> RunRegistry {
        let registry = RunRegistry::new();
        registry
            .register(RunRecord::new(id.to_string(), None, "deck.pdf".to_string(), PathBuf::from("/nonexistent")))
            .await;
        registry
    }

    async fn walk_to_assembled(registry: &RunRegistry, id: &str) {
        registry.advance(id, RunState::Rasterized { slide_count: 3 }).await.unwrap();
        registry.advance(id, RunState::Narrated { slide_count: 3 }).await.unwrap();
        registry
            .advance(id, RunState::Synthesized { slide_count: 3, total_duration_secs: 6.7 })
            .await
            .unwrap();
        registry.advance(id, assembled("/runs/r1/slideshow.mp4")).await.unwrap();
    }

    #[test]
    fn test_transition_table() {
        let failed = RunState::Failed {
            stage: "narrate".to_string(),
            error: "boom".to_string(),
            slide: Some(1),
        };
        assert!(RunState::Uploaded.can_advance_to(&RunState::Rasterized { slide_count: 1 }));
        assert!(!RunState::Uploaded.can_advance_to(&RunState::Narrated { slide_count: 1 }));
        assert!(RunState::Narrated { slide_count: 1 }.can_advance_to(&failed));
        assert!(!failed.can_advance_to(&RunState::Uploaded));
        assert!(!failed.can_advance_to(&failed.clone()));
        assert!(!RunState::Downloaded { downloaded_at: Utc::now() }.can_advance_to(&failed));
    }

    #[tokio::test]
    async fn test_skipping_a_stage_is_rejected() {
        let registry = registry_with_run("r1").await;
        let err = registry
            .advance("r1", RunState::Synthesized { slide_count: 1, total_duration_secs: 1.0 })
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::IllegalTransition { from: "uploaded", to: "synthesized", .. }));
        assert_eq!(registry.state("r1").await, Some(RunState::Uploaded));
    }

    #[tokio::test]
    async fn test_download_is_handed_out_once() {
        let registry = registry_with_run("r1").await;
        assert!(matches!(
            registry.take_download("r1").await,
            Err(RunError::NotReady { state: "uploaded", .. })
        ));

        walk_to_assembled(&registry, "r1").await;
        assert_eq!(
            registry.take_download("r1").await.unwrap(),
            PathBuf::from("/runs/r1/slideshow.mp4")
        );
        assert_eq!(
            registry.take_download("r1").await,
            Err(RunError::AlreadyDownloaded("r1".to_string()))
        );
        assert_eq!(registry.take_download("missing").await, Err(RunError::NotFound("missing".to_string())));
    }

    #[tokio::test]
    async fn test_failed_run_cannot_resume() {
        let registry = registry_with_run("r1").await;
        registry
            .advance(
                "r1",
                RunState::Failed {
                    stage: "rasterize".to_string(),
                    error: "corrupt".to_string(),
                    slide: None,
                },
            )
            .await
            .unwrap();
        assert!(registry.advance("r1", RunState::Rasterized { slide_count: 1 }).await.is_err());
        assert!(registry.get("r1").await.unwrap().finished_at.is_some());
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_old_finished_runs() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RunRegistry::new();
        for id in ["old", "fresh", "active"] {
            let root = dir.path().join(id);
            tokio::fs::create_dir_all(&root).await.unwrap();
            registry
                .register(RunRecord::new(id.to_string(), Some("uid".to_string()), "d.pdf".to_string(), root))
                .await;
        }
        for id in ["old", "fresh"] {
            walk_to_assembled(&registry, id).await;
            registry.take_download(id).await.unwrap();
        }
        registry.backdate("old", 48).await;

        assert_eq!(registry.cleanup_old_runs(24).await, 1);
        assert!(registry.get("old").await.is_none());
        assert!(!dir.path().join("old").exists());
        assert!(registry.get("fresh").await.is_some());
        assert!(registry.get("active").await.is_some());
        assert_eq!(registry.runs_for_owner(Some("uid")).await.len(), 2);
        assert!(registry.runs_for_owner(None).await.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_expires_idle_unfinished_runs() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RunRegistry::new();
        for id in ["undownloaded", "stalled", "busy"] {
            let root = dir.path().join(id);
            tokio::fs::create_dir_all(&root).await.unwrap();
            registry
                .register(RunRecord::new(id.to_string(), None, "d.pdf".to_string(), root))
                .await;
        }
        walk_to_assembled(&registry, "undownloaded").await;
        registry.advance("stalled", RunState::Rasterized { slide_count: 3 }).await.unwrap();
        registry.advance("busy", RunState::Rasterized { slide_count: 3 }).await.unwrap();
        registry.backdate("undownloaded", 30).await;
        registry.backdate("stalled", 30).await;

        assert_eq!(registry.cleanup_old_runs(24).await, 2);
        assert!(registry.get("undownloaded").await.is_none());
        assert!(!dir.path().join("undownloaded").exists());
        assert!(registry.get("stalled").await.is_none());
        assert!(!dir.path().join("stalled").exists());
        assert!(registry.get("busy").await.is_some());
        assert!(dir.path().join("busy").exists());
    }

    #[tokio::test]
    async fn test_cleanup_with_unrepresentable_age_removes_nothing() {
        let registry = registry_with_run("r1").await;
        registry.backdate("r1", 48).await;
        assert_eq!(registry.cleanup_old_runs(i64::MAX).await, 0);
        assert_eq!(registry.len().await, 1);
    }
}
