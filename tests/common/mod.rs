#![allow(dead_code)]

use async_trait::async_trait;
use parody_generator::pipeline::{GenerationPipeline, PipelineSettings, StorageLayout};
use parody_generator::retention::RetentionScheduler;
use parody_generator::{MediaTools, ToolError};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Media tools that work on plain text files.
///
/// A download writes `video:<url>`, an extraction writes
/// `[<source contents>@<start>+<duration>]`, and a concatenation joins the
/// manifest entries in order.
#[derive(Default)]
pub struct FakeTools {
    pub downloads: AtomicUsize,
    pub extractions: AtomicUsize,
    pub merges: AtomicUsize,
    /// Fail the n-th extraction call (1-based)
    pub fail_extraction_at: Option<usize>,
    pub unavailable: bool,
}

impl FakeTools {
    pub fn failing_extraction(at: usize) -> Self {
        Self {
            fail_extraction_at: Some(at),
            ..Default::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn extractions(&self) -> usize {
        self.extractions.load(Ordering::SeqCst)
    }

    pub fn merges(&self) -> usize {
        self.merges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaTools for FakeTools {
    fn backend_name(&self) -> &'static str {
        "fake"
    }

    async fn check_available(&self) -> Result<(), ToolError> {
        if self.unavailable {
            return Err(ToolError::Unavailable(
                "Docker containers are not running. Please run: docker compose up -d".into(),
            ));
        }
        Ok(())
    }

    async fn download(&self, source_url: &str, destination: &Path) -> Result<(), ToolError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        std::fs::write(destination, format!("video:{}", source_url)).map_err(|source| ToolError::Spawn {
            tool: "yt-dlp".into(),
            source,
        })
    }

    async fn extract_range(
        &self,
        source: &Path,
        start_secs: u64,
        duration_secs: u64,
        destination: &Path,
    ) -> Result<(), ToolError> {
        let call = self.extractions.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_extraction_at == Some(call) {
            return Err(ToolError::Failed {
                tool: "ffmpeg".into(),
                status: "exit status: 1".into(),
                stderr: "Output file #0 does not contain any stream".into(),
            });
        }

        let video = std::fs::read_to_string(source).map_err(|source| ToolError::Spawn {
            tool: "ffmpeg".into(),
            source,
        })?;
        std::fs::write(destination, format!("[{}@{}+{}]", video, start_secs, duration_secs)).map_err(
            |source| ToolError::Spawn {
                tool: "ffmpeg".into(),
                source,
            },
        )
    }

    async fn concatenate(&self, manifest: &Path, destination: &Path) -> Result<(), ToolError> {
        self.merges.fetch_add(1, Ordering::SeqCst);
        let io_error = |source: std::io::Error| ToolError::Spawn {
            tool: "ffmpeg".into(),
            source,
        };

        let listing = std::fs::read_to_string(manifest).map_err(io_error)?;
        let base = manifest.parent().unwrap_or_else(|| Path::new("."));

        let mut joined = String::new();
        for line in listing.lines() {
            let name = line
                .strip_prefix("file '")
                .and_then(|rest| rest.strip_suffix('\''))
                .unwrap_or(line);
            joined.push_str(&std::fs::read_to_string(base.join(name)).map_err(io_error)?);
        }

        std::fs::write(destination, joined).map_err(io_error)
    }
}

pub fn pipeline_with(tools: Arc<FakeTools>, media_root: &Path) -> (GenerationPipeline, Arc<RetentionScheduler>) {
    let retention = Arc::new(RetentionScheduler::start());
    let pipeline = GenerationPipeline::new(
        tools,
        StorageLayout::under(media_root),
        PipelineSettings::default(),
        retention.clone(),
    );
    (pipeline, retention)
}

pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}
