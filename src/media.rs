// media.rs - Duration probing and slide segment muxing on top of ffmpeg
use crate::utils::{execute_ffmpeg_command, execute_ffprobe_command};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Output frame geometry and rate for assembled slideshows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for FrameSpec {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

impl FrameSpec {
    // libx264 with yuv420p rejects odd dimensions.
    pub fn even(self) -> Self {
        Self {
            width: (self.width / 2).max(1) * 2,
            height: (self.height / 2).max(1) * 2,
            fps: self.fps.max(1),
        }
    }

    /// Letterbox any slide into the frame without distorting it.
    pub fn video_filter(&self) -> String {
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=white,setsar=1,format=yuv420p",
            w = self.width,
            h = self.height
        )
    }
}

/// Probe a media file and return its container duration in seconds.
pub async fn probe_duration(file_path: &Path) -> Result<f64, String> {
    let path = file_path.to_string_lossy();
    let args = &[
        "-v",
        "error",
        "-print_format",
        "json",
        "-show_format",
        path.as_ref(),
    ];
    let ffprobe_output = execute_ffprobe_command(args).await?;
    parse_ffprobe_duration(&ffprobe_output)
}

pub fn parse_ffprobe_duration(ffprobe_output: &str) -> Result<f64, String> {
    let json: Value = serde_json::from_str(ffprobe_output)
        .map_err(|e| format!("Failed to parse ffprobe output: {}", e))?;

    let raw = &json["format"]["duration"];
    let duration = match raw {
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|e| format!("Invalid duration '{}': {}", s, e))?,
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("Invalid duration '{}'", n))?,
        _ => return Err("ffprobe reported no duration".to_string()),
    };

    if !duration.is_finite() || duration <= 0.0 {
        return Err(format!("ffprobe reported a non-positive duration: {}", duration));
    }

    Ok(duration)
}

/// Render one still image held for exactly `duration_secs` over its narration.
pub async fn render_still_segment(
    image: &Path,
    audio: &Path,
    duration_secs: f64,
    frame: FrameSpec,
    output_file: &Path,
) -> Result<String, String> {
    let frame = frame.even();
    let mut command = Command::new("ffmpeg");
    command
        .arg("-y")
        .arg("-loop")
        .arg("1")
        .arg("-framerate")
        .arg(frame.fps.to_string())
        .arg("-i")
        .arg(image)
        .arg("-i")
        .arg(audio)
        .arg("-map")
        .arg("0:v:0")
        .arg("-map")
        .arg("1:a:0")
        .arg("-vf")
        .arg(frame.video_filter())
        .arg("-af")
        .arg("apad")
        .arg("-c:v")
        .arg("libx264")
        .arg("-tune")
        .arg("stillimage")
        .arg("-r")
        .arg(frame.fps.to_string())
        .arg("-c:a")
        .arg("aac")
        .arg("-b:a")
        .arg("192k")
        .arg("-ar")
        .arg("44100")
        .arg("-ac")
        .arg("2")
        .arg("-t")
        .arg(format!("{:.3}", duration_secs))
        .arg(output_file);

    execute_ffmpeg_command(command).await
}

/// Concatenate uniformly encoded segments in order without re-encoding.
pub async fn concat_segments(segments: &[PathBuf], output_file: &Path) -> Result<String, String> {
    if segments.is_empty() {
        return Err("No segments to concatenate".to_string());
    }

    let mut absolute = Vec::with_capacity(segments.len());
    for segment in segments {
        let path = tokio::fs::canonicalize(segment)
            .await
            .map_err(|e| format!("Segment {} is missing: {}", segment.display(), e))?;
        absolute.push(path);
    }

    let concat_file_path = output_file.with_extension("concat.txt");
    tokio::fs::write(&concat_file_path, build_concat_list(&absolute))
        .await
        .map_err(|e| e.to_string())?;

    let mut command = Command::new("ffmpeg");
    command
        .arg("-y")
        .arg("-f")
        .arg("concat")
        .arg("-safe")
        .arg("0")
        .arg("-i")
        .arg(&concat_file_path)
        .arg("-c")
        .arg("copy")
        .arg("-movflags")
        .arg("+faststart")
        .arg(output_file);

    let result = execute_ffmpeg_command(command).await;
    tokio::fs::remove_file(&concat_file_path).await.ok();
    result
}

/// Concat demuxer list; single quotes inside paths are closed, escaped and reopened.
pub fn build_concat_list(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("file '{}'", p.to_string_lossy().replace('\'', "'\\''")))
        .collect::<Vec<String>>()
        .join("\n")
}
