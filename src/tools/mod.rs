//! External media capabilities.
//!
//! The pipeline only talks to [`MediaTools`]; how a capability is fulfilled
//! (local binaries, containers, or a test double) is up to the implementation.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

pub mod command;

pub use command::{CommandTools, ToolBackend};

/// Failure of an external capability invocation
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error("Failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("{tool} timed out after {}s", .after.as_secs())]
    TimedOut { tool: String, after: Duration },

    #[error("Path {} is outside the shared media directory", .0.display())]
    UnmappedPath(std::path::PathBuf),

    #[error("{0}")]
    Unavailable(String),
}

impl ToolError {
    /// Diagnostic output captured from the tool, if any
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            ToolError::Failed { stderr, .. } if !stderr.is_empty() => Some(stderr),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ToolError::TimedOut { .. })
    }
}

/// The three media capabilities the pipeline depends on, plus a reachability probe
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaTools: Send + Sync {
    /// Short name of the backend, for status reporting
    fn backend_name(&self) -> &'static str;

    /// Verify that the tools can be invoked at all
    async fn check_available(&self) -> Result<(), ToolError>;

    /// Fetch a fixed-quality rendition of `source_url` to exactly `destination`
    async fn download(&self, source_url: &str, destination: &Path) -> Result<(), ToolError>;

    /// Cut `[start, start + duration)` of the audio stream out of `source` without re-encoding
    async fn extract_range(
        &self,
        source: &Path,
        start_secs: u64,
        duration_secs: u64,
        destination: &Path,
    ) -> Result<(), ToolError>;

    /// Join the files listed in `manifest`, in order, without re-encoding
    async fn concatenate(&self, manifest: &Path, destination: &Path) -> Result<(), ToolError>;
}

/// yt-dlp arguments for downloading one rendition to an exact path
pub fn download_args(format_selector: &str, source_url: &str, destination: &str) -> Vec<String> {
    [
        "-f",
        format_selector,
        "--no-playlist",
        "--no-progress",
        "--output",
        destination,
        source_url,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// ffmpeg arguments for copying one audio range out of a video
pub fn extract_args(source: &str, start_secs: u64, duration_secs: u64, destination: &str) -> Vec<String> {
    let start = start_secs.to_string();
    let duration = duration_secs.to_string();

    [
        "-y",
        "-hide_banner",
        "-loglevel",
        "error",
        "-ss",
        start.as_str(),
        "-i",
        source,
        "-t",
        duration.as_str(),
        "-vn",
        "-acodec",
        "copy",
        destination,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// ffmpeg arguments for concatenating a manifest with stream copy
pub fn concat_args(manifest: &str, destination: &str) -> Vec<String> {
    [
        "-y",
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "concat",
        "-safe",
        "0",
        "-i",
        manifest,
        "-c",
        "copy",
        destination,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_args() {
        let args = download_args("18", "https://youtu.be/dQw4w9WgXcQ", "/cache/x.mp4");
        assert_eq!(
            args,
            vec![
                "-f",
                "18",
                "--no-playlist",
                "--no-progress",
                "--output",
                "/cache/x.mp4",
                "https://youtu.be/dQw4w9WgXcQ"
            ]
        );
    }

    #[test]
    fn test_extract_args_seek_before_input() {
        let args = extract_args("in.mp4", 65, 10, "out.m4a");
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < input);
        assert_eq!(args[ss + 1], "65");
        assert_eq!(args[input + 1], "in.mp4");
        assert!(args.windows(2).any(|w| w[0] == "-t" && w[1] == "10"));
        assert!(args.windows(2).any(|w| w[0] == "-acodec" && w[1] == "copy"));
        assert!(args.contains(&"-vn".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("out.m4a"));
    }

    #[test]
    fn test_concat_args_copy_codec() {
        let args = concat_args("list.txt", "out.m4a");
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "concat"));
        assert!(args.windows(2).any(|w| w[0] == "-safe" && w[1] == "0"));
        assert!(args.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
        assert_eq!(args.last().map(String::as_str), Some("out.m4a"));
    }

    #[test]
    fn test_diagnostics_only_for_failures() {
        let failed = ToolError::Failed {
            tool: "ffmpeg".into(),
            status: "exit status: 1".into(),
            stderr: "Invalid data found".into(),
        };
        assert_eq!(failed.diagnostics(), Some("Invalid data found"));

        let timeout = ToolError::TimedOut {
            tool: "yt-dlp".into(),
            after: Duration::from_secs(30),
        };
        assert!(timeout.is_timeout());
        assert_eq!(timeout.diagnostics(), None);
        assert_eq!(timeout.to_string(), "yt-dlp timed out after 30s");
    }
}
