// utils.rs - External tool invocation helpers (ffmpeg, ffprobe, soffice)
use tokio::process::Command;

/// Format duration in HH:MM:SS.mmm format
pub fn format_duration(seconds: f64) -> String {
    let total_millis = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis % 3_600_000) / 60_000;
    let secs = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
}

/// Run an external tool to completion, returning stdout or the tool's stderr as error.
pub async fn execute_tool_command(tool: &str, mut command: Command) -> Result<String, String> {
    tracing::debug!("Executing {}: {:?}", tool, command.as_std());

    let output = command
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| format!("Failed to execute {}: {}", tool, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("{} error: {}", tool, last_lines(&stderr, 12)));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Execute FFmpeg command with error handling
pub async fn execute_ffmpeg_command(command: Command) -> Result<String, String> {
    execute_tool_command("FFmpeg", command).await
}

/// Execute FFprobe for media analysis
pub async fn execute_ffprobe_command(args: &[&str]) -> Result<String, String> {
    let mut command = Command::new("ffprobe");
    command.args(args);
    execute_tool_command("FFprobe", command).await
}

/// Check if FFmpeg and FFprobe are available
pub async fn check_ffmpeg_available() -> Result<(), String> {
    Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
        .map_err(|_| "FFmpeg not found. Please install FFmpeg.")?;

    Command::new("ffprobe")
        .arg("-version")
        .output()
        .await
        .map_err(|_| "FFprobe not found. Please install FFmpeg with FFprobe.")?;

    Ok(())
}

// ffmpeg prints its whole banner to stderr; only the tail carries the failure.
fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "00:00:00.000");
        assert_eq!(format_duration(6.7), "00:00:06.700");
        assert_eq!(format_duration(3723.25), "01:02:03.250");
    }

    #[test]
    fn test_last_lines_keeps_tail() {
        let text = "a\nb\nc\nd\n";
        assert_eq!(last_lines(text, 2), "c\nd");
        assert_eq!(last_lines(text, 10), "a\nb\nc\nd");
    }
}
