//! Video assembly: hold each slide for its narration's duration and mux the
//! ordered segments into one mp4.

use super::error::PipelineError;
use crate::media::{self, FrameSpec};
use crate::types::{AudioClip, BoxError, SlideImage, VideoArtifact};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One slide's worth of output: `image` on screen for `duration_secs` while `audio` plays.
#[derive(Debug, Clone, PartialEq)]
pub struct MuxSegment {
    pub index: usize,
    pub image: PathBuf,
    pub audio: PathBuf,
    pub duration_secs: f64,
}

#[async_trait]
pub trait VideoMuxer: Send + Sync {
    /// Encode `segments` in order into `output`. `scratch_dir` may hold intermediates.
    async fn mux(&self, segments: &[MuxSegment], scratch_dir: &Path, output: &Path) -> Result<(), BoxError>;
}

/// Encodes every slide as its own still-image segment, then concatenates the
/// segments with the concat demuxer (stream copy).
#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    frame: FrameSpec,
}

impl FfmpegMuxer {
    pub fn new(frame: FrameSpec) -> Self {
        Self { frame: frame.even() }
    }
}

#[async_trait]
impl VideoMuxer for FfmpegMuxer {
    async fn mux(&self, segments: &[MuxSegment], scratch_dir: &Path, output: &Path) -> Result<(), BoxError> {
        let mut encoded = Vec::with_capacity(segments.len());
        for segment in segments {
            let segment_path = scratch_dir.join(format!("segment-{:03}.mp4", segment.index + 1));
            media::render_still_segment(
                &segment.image,
                &segment.audio,
                segment.duration_secs,
                self.frame,
                &segment_path,
            )
            .await?;
            tracing::debug!(slide = segment.index + 1, "Encoded slide segment");
            encoded.push(segment_path);
        }

        media::concat_segments(&encoded, output).await?;
        Ok(())
    }
}

/// Pair slides with clips by index. Lengths must match and every position
/// must carry the same index in both sequences.
pub fn align_segments(slides: &[SlideImage], clips: &[AudioClip]) -> Result<Vec<MuxSegment>, PipelineError> {
    if slides.len() != clips.len() {
        return Err(PipelineError::Misaligned {
            detail: format!("{} slides but {} audio clips", slides.len(), clips.len()),
        });
    }

    slides
        .iter()
        .zip(clips)
        .enumerate()
        .map(|(position, (slide, clip))| {
            if slide.index != position || clip.index != position {
                return Err(PipelineError::Misaligned {
                    detail: format!(
                        "position {} holds slide {} and clip {}",
                        position, slide.index, clip.index
                    ),
                });
            }
            Ok(MuxSegment {
                index: position,
                image: slide.path.clone(),
                audio: clip.path.clone(),
                duration_secs: clip.duration_secs,
            })
        })
        .collect()
}

#[derive(Clone)]
pub struct VideoAssembler {
    muxer: Arc<dyn VideoMuxer>,
}

impl VideoAssembler {
    pub fn new(muxer: Arc<dyn VideoMuxer>) -> Self {
        Self { muxer }
    }

    pub async fn assemble(
        &self,
        slides: &[SlideImage],
        clips: &[AudioClip],
        scratch_dir: &Path,
        output: &Path,
    ) -> Result<VideoArtifact, PipelineError> {
        let segments = align_segments(slides, clips)?;
        if segments.is_empty() {
            return Err(PipelineError::AssemblyFailed {
                detail: "no slides to assemble".to_string(),
            });
        }

        // A stale artifact must never pass for this run's output.
        if let Err(e) = tokio::fs::remove_file(output).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(PipelineError::workspace(output, e));
            }
        }

        self.muxer
            .mux(&segments, scratch_dir, output)
            .await
            .map_err(|e| PipelineError::AssemblyFailed { detail: e.to_string() })?;

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(PipelineError::AssemblyFailed {
                detail: "muxer reported success but wrote no file".to_string(),
            });
        }

        let total_duration_secs = segments.iter().map(|s| s.duration_secs).sum();
        Ok(VideoArtifact {
            path: output.to_path_buf(),
            slide_count: segments.len(),
            total_duration_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slide(index: usize) -> SlideImage {
        SlideImage {
            index,
            path: PathBuf::from(format!("page-{:03}.png", index + 1)),
        }
    }

    fn clip(index: usize, duration_secs: f64) -> AudioClip {
        AudioClip {
            index,
            path: PathBuf::from(format!("audio-{:03}.mp3", index + 1)),
            duration_secs,
        }
    }

    #[test]
    fn test_align_pairs_by_index() {
        let segments = align_segments(&[slide(0), slide(1)], &[clip(0, 2.0), clip(1, 3.5)]).unwrap();
        assert_eq!(segments[1].image, PathBuf::from("page-002.png"));
        assert_eq!(segments[1].audio, PathBuf::from("audio-002.mp3"));
        assert_eq!(segments[1].duration_secs, 3.5);
    }

    #[test]
    fn test_align_rejects_length_mismatch() {
        let err = align_segments(&[slide(0), slide(1)], &[clip(0, 1.0)]).unwrap_err();
        assert!(matches!(err, PipelineError::Misaligned { .. }));
    }

    #[test]
    fn test_align_rejects_swapped_clips() {
        let err = align_segments(&[slide(0), slide(1)], &[clip(1, 1.0), clip(0, 1.0)]).unwrap_err();
        assert!(matches!(err, PipelineError::Misaligned { .. }));
    }

    struct FailingMuxer;

    #[async_trait]
    impl VideoMuxer for FailingMuxer {
        async fn mux(&self, _: &[MuxSegment], _: &Path, _: &Path) -> Result<(), BoxError> {
            Err("Invalid data found when processing input".into())
        }
    }

    #[tokio::test]
    async fn test_muxer_failure_leaves_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("slideshow.mp4");
        tokio::fs::write(&output, b"previous run").await.unwrap();

        let assembler = VideoAssembler::new(Arc::new(FailingMuxer));
        let err = assembler
            .assemble(&[slide(0)], &[clip(0, 1.0)], dir.path(), &output)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::AssemblyFailed { .. }));
        assert!(!output.exists());
    }
}
