//! Deck-to-video pipeline.
//!
//! Rasterize → narrate (per slide) → synthesize (per narration) → assemble.
//! Stages run strictly in sequence and the first error fails the whole run;
//! nothing is retried and finished intermediates are not salvaged. Within the
//! narration and synthesis stages, slides may be processed by a bounded number
//! of concurrent workers, but results are always consumed in slide order.

pub mod assembler;
pub mod error;
pub mod narrator;
pub mod rasterizer;
pub mod synthesizer;
pub mod workspace;

pub use assembler::{FfmpegMuxer, MuxSegment, VideoAssembler, VideoMuxer};
pub use error::PipelineError;
pub use narrator::{NarrationGenerator, TextGenerator};
pub use rasterizer::{PdfiumRasterizer, Rasterizer};
pub use synthesizer::{DurationProbe, FfprobeDurationProbe, SpeechService, SpeechSynthesizer};
pub use workspace::RunWorkspace;

use crate::jobs::{RunRegistry, RunState};
use crate::types::{AudioClip, Narration, SlideImage, SourceDocument, VideoArtifact, VoiceParams};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Service handles the pipeline is built from. Constructed once at startup
/// (or per test) and injected, never looked up globally.
#[derive(Clone)]
pub struct PipelineServices {
    pub rasterizer: Arc<dyn Rasterizer>,
    pub text: Arc<dyn TextGenerator>,
    pub speech: Arc<dyn SpeechService>,
    pub probe: Arc<dyn DurationProbe>,
    pub muxer: Arc<dyn VideoMuxer>,
    pub voice: VoiceParams,
    /// Concurrent slides during narration and synthesis; 1 is fully sequential.
    pub slide_concurrency: usize,
}

pub struct DeckToVideoPipeline {
    rasterizer: Arc<dyn Rasterizer>,
    narrator: NarrationGenerator,
    synthesizer: SpeechSynthesizer,
    assembler: VideoAssembler,
    slide_concurrency: usize,
}

impl DeckToVideoPipeline {
    pub fn new(services: PipelineServices) -> Self {
        Self {
            rasterizer: services.rasterizer,
            narrator: NarrationGenerator::new(services.text),
            synthesizer: SpeechSynthesizer::new(services.speech, services.probe, services.voice),
            assembler: VideoAssembler::new(services.muxer),
            slide_concurrency: services.slide_concurrency.max(1),
        }
    }

    /// Execute one run inside `workspace`, recording every stage in `runs`.
    /// On error the run is marked Failed and no artifact is returned.
    pub async fn run(
        &self,
        workspace: &RunWorkspace,
        source: &SourceDocument,
        runs: &RunRegistry,
    ) -> Result<VideoArtifact, PipelineError> {
        let run_id = workspace.run_id();
        info!(run_id = %run_id, file = %source.original_name, "Starting deck-to-video run");

        match self.execute(workspace, source, runs).await {
            Ok(artifact) => {
                info!(
                    run_id = %run_id,
                    slides = artifact.slide_count,
                    duration = %crate::utils::format_duration(artifact.total_duration_secs),
                    "Run assembled"
                );
                Ok(artifact)
            }
            Err(e) => {
                error!(run_id = %run_id, stage = e.stage(), "Run failed: {}", e);
                track(
                    runs,
                    run_id,
                    RunState::Failed {
                        stage: e.stage().to_string(),
                        error: e.to_string(),
                        slide: e.slide_index(),
                    },
                )
                .await;
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        workspace: &RunWorkspace,
        source: &SourceDocument,
        runs: &RunRegistry,
    ) -> Result<VideoArtifact, PipelineError> {
        let run_id = workspace.run_id();

        // Reject unknown formats before any tool or service is involved.
        rasterizer::detect_format(Path::new(&source.original_name))?;

        let pages = self
            .rasterizer
            .rasterize(&source.path, &workspace.images_dir())
            .await?;
        let slides = rasterizer::into_slides(pages);
        if slides.is_empty() {
            return Err(PipelineError::RasterizationFailed {
                path: source.path.clone(),
                detail: "document has no pages".to_string(),
            });
        }
        track(runs, run_id, RunState::Rasterized { slide_count: slides.len() }).await;

        let narrations = self.narrate_all(&slides).await?;
        ensure_in_order("narration", slides.len(), narrations.iter().map(|n| n.index))?;
        track(runs, run_id, RunState::Narrated { slide_count: narrations.len() }).await;

        let clips = self.synthesize_all(&narrations, &workspace.audio_dir()).await?;
        ensure_in_order("audio clip", slides.len(), clips.iter().map(|c| c.index))?;
        let total_duration_secs = clips.iter().map(|c| c.duration_secs).sum();
        track(
            runs,
            run_id,
            RunState::Synthesized {
                slide_count: clips.len(),
                total_duration_secs,
            },
        )
        .await;

        let artifact = self
            .assembler
            .assemble(&slides, &clips, &workspace.segments_dir(), &workspace.video_path())
            .await?;
        track(
            runs,
            run_id,
            RunState::Assembled {
                slide_count: artifact.slide_count,
                total_duration_secs: artifact.total_duration_secs,
                video_path: artifact.path.clone(),
            },
        )
        .await;

        Ok(artifact)
    }

    async fn narrate_all(&self, slides: &[SlideImage]) -> Result<Vec<Narration>, PipelineError> {
        let pending: Vec<_> = slides.iter().map(|slide| self.narrator.narrate(slide)).collect();
        stream::iter(pending)
            .buffered(self.slide_concurrency)
            .try_collect()
            .await
    }

    async fn synthesize_all(
        &self,
        narrations: &[Narration],
        audio_dir: &Path,
    ) -> Result<Vec<AudioClip>, PipelineError> {
        let pending: Vec<_> = narrations
            .iter()
            .map(|narration| self.synthesizer.synthesize(narration, audio_dir))
            .collect();
        stream::iter(pending)
            .buffered(self.slide_concurrency)
            .try_collect()
            .await
    }
}

/// Stage output must hold exactly one item per slide, at its own position.
fn ensure_in_order(
    what: &str,
    expected: usize,
    indices: impl ExactSizeIterator<Item = usize>,
) -> Result<(), PipelineError> {
    if indices.len() != expected {
        return Err(PipelineError::Misaligned {
            detail: format!("{} slides but {} {}s", expected, indices.len(), what),
        });
    }
    for (position, index) in indices.enumerate() {
        if index != position {
            return Err(PipelineError::Misaligned {
                detail: format!("{} at position {} belongs to slide {}", what, position, index),
            });
        }
    }
    Ok(())
}

async fn track(runs: &RunRegistry, run_id: &str, state: RunState) {
    if let Err(e) = runs.advance(run_id, state).await {
        warn!(run_id = %run_id, "Run state not recorded: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini_client::ImageAttachment;
    use crate::jobs::RunRecord;
    use crate::types::BoxError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeRasterizer {
        pages: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Rasterizer for FakeRasterizer {
        async fn rasterize(&self, document: &Path, output_dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            rasterizer::detect_format(document)?;
            let mut paths = Vec::new();
            for index in 0..self.pages {
                let path = output_dir.join(rasterizer::page_file_name(index));
                tokio::fs::write(&path, format!("page {}", index + 1)).await.unwrap();
                paths.push(path);
            }
            Ok(paths)
        }
    }

    /// Answers with a fixed narration per slide, later slides answering first.
    struct ScriptedText {
        replies: Vec<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for ScriptedText {
        async fn generate(&self, prompt: &str, images: &[ImageAttachment]) -> Result<String, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(images.len(), 1);
            let slide: usize = prompt
                .split("\"slide ")
                .nth(1)
                .and_then(|rest| rest.split(' ').next())
                .and_then(|n| n.parse().ok())
                .ok_or("prompt without slide reference")?;
            let delay = (self.replies.len() - slide) as u64 * 10;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(format!(" {} ", self.replies[slide - 1]))
        }
    }

    /// Audio bytes are the narration text; fails for one chosen narration.
    struct FakeSpeech {
        fail_on: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechService for FakeSpeech {
        async fn synthesize(&self, text: &str, _voice: &VoiceParams) -> Result<Vec<u8>, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(text) {
                return Err("RESOURCE_EXHAUSTED: quota exceeded".into());
            }
            Ok(text.as_bytes().to_vec())
        }
    }

    /// Duration looked up from the audio content (the narration text).
    struct TableProbe(HashMap<&'static str, f64>);

    #[async_trait]
    impl DurationProbe for TableProbe {
        async fn duration_secs(&self, audio: &Path) -> Result<f64, BoxError> {
            let content = tokio::fs::read_to_string(audio).await?;
            self.0
                .get(content.as_str())
                .copied()
                .ok_or_else(|| format!("unknown audio '{}'", content).into())
        }
    }

    #[derive(Default)]
    struct RecordingMuxer {
        segments: Mutex<Vec<MuxSegment>>,
    }

    #[async_trait]
    impl VideoMuxer for RecordingMuxer {
        async fn mux(&self, segments: &[MuxSegment], _scratch: &Path, output: &Path) -> Result<(), BoxError> {
            self.segments.lock().unwrap().extend_from_slice(segments);
            tokio::fs::write(output, b"mp4").await?;
            Ok(())
        }
    }

    struct Harness {
        rasterizer: Arc<FakeRasterizer>,
        text: Arc<ScriptedText>,
        speech: Arc<FakeSpeech>,
        muxer: Arc<RecordingMuxer>,
        pipeline: DeckToVideoPipeline,
    }

    fn harness(fail_on: Option<&'static str>, slide_concurrency: usize) -> Harness {
        let rasterizer = Arc::new(FakeRasterizer {
            pages: 3,
            calls: AtomicUsize::new(0),
        });
        let text = Arc::new(ScriptedText {
            replies: vec!["A.", "B.", "C."],
            calls: AtomicUsize::new(0),
        });
        let speech = Arc::new(FakeSpeech {
            fail_on,
            calls: AtomicUsize::new(0),
        });
        let probe = Arc::new(TableProbe(HashMap::from([("A.", 2.0), ("B.", 3.5), ("C.", 1.2)])));
        let muxer = Arc::new(RecordingMuxer::default());

        let pipeline = DeckToVideoPipeline::new(PipelineServices {
            rasterizer: rasterizer.clone(),
            text: text.clone(),
            speech: speech.clone(),
            probe,
            muxer: muxer.clone(),
            voice: VoiceParams::default(),
            slide_concurrency,
        });

        Harness {
            rasterizer,
            text,
            speech,
            muxer,
            pipeline,
        }
    }

    async fn start_run(
        base: &Path,
        run_id: &str,
        file_name: &str,
        runs: &RunRegistry,
    ) -> (RunWorkspace, SourceDocument) {
        let workspace = RunWorkspace::create(base, run_id).await.unwrap();
        let source = workspace.save_source(file_name, b"%PDF-1.7").await.unwrap();
        runs.register(RunRecord::new(
            run_id.to_string(),
            None,
            file_name.to_string(),
            workspace.root().to_path_buf(),
        ))
        .await;
        (workspace, source)
    }

    #[tokio::test]
    async fn test_three_slide_deck_is_assembled_in_order() {
        let base = tempfile::tempdir().unwrap();
        let runs = RunRegistry::new();
        let h = harness(None, 1);
        let (workspace, source) = start_run(base.path(), "run-1", "deck.pdf", &runs).await;

        let artifact = h.pipeline.run(&workspace, &source, &runs).await.unwrap();

        assert_eq!(artifact.slide_count, 3);
        assert!((artifact.total_duration_secs - 6.7).abs() < 1e-9);
        assert_eq!(artifact.path, workspace.video_path());
        assert!(artifact.path.exists());

        let segments = h.muxer.segments.lock().unwrap().clone();
        let durations: Vec<f64> = segments.iter().map(|s| s.duration_secs).collect();
        assert_eq!(durations, vec![2.0, 3.5, 1.2]);
        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(segment.index, i);
            assert_eq!(segment.image, workspace.images_dir().join(rasterizer::page_file_name(i)));
            let audio = tokio::fs::read_to_string(&segment.audio).await.unwrap();
            assert_eq!(audio, ["A.", "B.", "C."][i]);
        }

        assert!(matches!(
            runs.state("run-1").await,
            Some(RunState::Assembled { slide_count: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_slides_keep_alignment() {
        let base = tempfile::tempdir().unwrap();
        let runs = RunRegistry::new();
        let h = harness(None, 3);
        let (workspace, source) = start_run(base.path(), "run-1", "deck.pdf", &runs).await;

        h.pipeline.run(&workspace, &source, &runs).await.unwrap();

        let segments = h.muxer.segments.lock().unwrap().clone();
        let durations: Vec<f64> = segments.iter().map(|s| s.duration_secs).collect();
        assert_eq!(durations, vec![2.0, 3.5, 1.2]);
        assert_eq!(h.text.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rerun_with_deterministic_services_gives_same_duration() {
        let base = tempfile::tempdir().unwrap();
        let runs = RunRegistry::new();
        let h = harness(None, 1);

        let mut totals = Vec::new();
        for run_id in ["run-1", "run-2"] {
            let (workspace, source) = start_run(base.path(), run_id, "deck.pdf", &runs).await;
            let artifact = h.pipeline.run(&workspace, &source, &runs).await.unwrap();
            totals.push(artifact.total_duration_secs);
        }

        assert!((totals[0] - totals[1]).abs() < 1e-9);
        assert!((totals[0] - (2.0 + 3.5 + 1.2)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_synthesis_failure_on_second_slide_fails_run() {
        let base = tempfile::tempdir().unwrap();
        let runs = RunRegistry::new();
        let h = harness(Some("B."), 1);
        let (workspace, source) = start_run(base.path(), "run-1", "deck.pdf", &runs).await;

        let err = h.pipeline.run(&workspace, &source, &runs).await.unwrap_err();

        assert!(matches!(err, PipelineError::SynthesisFailed { index: 1, .. }));
        assert_eq!(h.speech.calls.load(Ordering::SeqCst), 2);
        assert!(h.muxer.segments.lock().unwrap().is_empty());
        assert!(!workspace.video_path().exists());
        match runs.state("run-1").await {
            Some(RunState::Failed { stage, slide, .. }) => {
                assert_eq!(stage, "synthesize");
                assert_eq!(slide, Some(1));
            }
            other => panic!("expected failed run, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsupported_format_fails_before_any_service_call() {
        let base = tempfile::tempdir().unwrap();
        let runs = RunRegistry::new();
        let h = harness(None, 1);
        let (workspace, source) = start_run(base.path(), "run-1", "slides.key", &runs).await;

        let err = h.pipeline.run(&workspace, &source, &runs).await.unwrap_err();

        assert!(matches!(err, PipelineError::UnsupportedFormat { .. }));
        assert_eq!(h.rasterizer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.text.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.speech.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(runs.state("run-1").await, Some(RunState::Failed { .. })));
    }

    #[test]
    fn test_ensure_in_order() {
        assert!(ensure_in_order("clip", 3, vec![0, 1, 2].into_iter()).is_ok());
        assert!(ensure_in_order("clip", 3, vec![0, 1].into_iter()).is_err());
        assert!(ensure_in_order("clip", 2, vec![1, 0].into_iter()).is_err());
    }
}
