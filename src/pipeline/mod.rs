//! Segment-to-audio generation pipeline.
//!
//! A run validates the request, checks that the media tools are reachable,
//! then downloads, extracts and merges strictly in request order. The first
//! failing segment aborts the whole run. The per-run scratch directory is
//! removed whatever the outcome, and a delivered artifact is handed to the
//! [`RetentionScheduler`] for deletion after the retention window.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::audio::{self, ExtractionError, MergeError};
use crate::cache::{DownloadError, VideoCache};
use crate::config::Config;
use crate::retention::RetentionScheduler;
use crate::segments::{PlannedSegment, Segment, SegmentValidator, ValidationLimits, ValidationResult};
use crate::tools::{MediaTools, ToolError};
use crate::utils::sanitize_filename;

/// Extension of every generated artifact
pub const ARTIFACT_EXTENSION: &str = "m4a";

/// On-disk locations shared by all runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub media_root: PathBuf,
    pub cache_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl StorageLayout {
    /// Standard layout below `media_root`
    pub fn under(media_root: impl Into<PathBuf>) -> Self {
        let media_root = media_root.into();
        Self {
            cache_dir: media_root.join(".youtube_cache"),
            scratch_dir: media_root.join(".temp_segments"),
            output_dir: media_root.join("output"),
            media_root,
        }
    }

    /// Create every directory that does not exist yet
    pub async fn ensure(&self) -> std::io::Result<()> {
        for dir in [&self.cache_dir, &self.scratch_dir, &self.output_dir] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }
}

/// Pipeline stage, as reported with failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validation,
    Prerequisites,
    Download,
    Extraction,
    Merge,
    Storage,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validation => "validation",
            Stage::Prerequisites => "prerequisites",
            Stage::Download => "download",
            Stage::Extraction => "extraction",
            Stage::Merge => "merge",
            Stage::Storage => "storage",
        };
        f.write_str(name)
    }
}

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    CheckingPrerequisites,
    Downloading,
    Extracting,
    Merging,
    CleaningUp,
    Delivered,
    Failed(Stage),
}

/// Progress notification emitted during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    StateChanged(RunState),
    /// `index` counts from 1
    SegmentDownloaded {
        index: usize,
        total: usize,
        content_key: String,
        cache_hit: bool,
    },
    SegmentExtracted {
        index: usize,
        total: usize,
    },
    Merged {
        path: PathBuf,
    },
}

/// Why a run failed
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Media tools are not available: {0}")]
    Prerequisite(#[source] ToolError),

    #[error("Invalid request: {0}")]
    Validation(ValidationResult),

    #[error("Download failed for segment {index}: {source}")]
    Download {
        index: usize,
        #[source]
        source: DownloadError,
    },

    #[error("Audio extraction failed for segment {index}: {source}")]
    Extraction {
        index: usize,
        #[source]
        source: ExtractionError,
    },

    #[error("Audio merge failed: {0}")]
    Merge(#[from] MergeError),

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Prerequisite(_) => Stage::Prerequisites,
            PipelineError::Validation(_) => Stage::Validation,
            PipelineError::Download { .. } => Stage::Download,
            PipelineError::Extraction { .. } => Stage::Extraction,
            PipelineError::Merge(_) => Stage::Merge,
            PipelineError::Io(_) => Stage::Storage,
        }
    }

    /// Operator-facing detail, preferring the tool's own output
    pub fn details(&self) -> Option<String> {
        match self {
            PipelineError::Prerequisite(e) => Some(e.to_string()),
            PipelineError::Validation(result) => Some(result.to_string()),
            PipelineError::Download { source, .. } => {
                Some(source.diagnostics().map_or_else(|| source.to_string(), str::to_string))
            }
            PipelineError::Extraction { source, .. } => {
                Some(source.diagnostics().map_or_else(|| source.to_string(), str::to_string))
            }
            PipelineError::Merge(e) => Some(e.diagnostics().map_or_else(|| e.to_string(), str::to_string)),
            PipelineError::Io(e) => Some(e.to_string()),
        }
    }
}

/// A delivered artifact
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutput {
    pub artifact_path: PathBuf,
    pub file_name: String,
    /// Name offered to the caller for saving
    pub suggested_name: String,
    pub segments: usize,
    pub total_duration_secs: u64,
    pub created_at: DateTime<Utc>,
}

/// Tunables of a pipeline instance
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub limits: ValidationLimits,
    pub quality: String,
    pub extension: String,
    pub retention: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            limits: ValidationLimits::default(),
            quality: "360p".to_string(),
            extension: "mp4".to_string(),
            retention: crate::retention::DEFAULT_RETENTION,
        }
    }
}

/// Runs generation requests end to end
pub struct GenerationPipeline {
    tools: Arc<dyn MediaTools>,
    validator: SegmentValidator,
    cache: VideoCache,
    layout: StorageLayout,
    retention: Arc<RetentionScheduler>,
    retention_window: Duration,
}

impl GenerationPipeline {
    pub fn new(
        tools: Arc<dyn MediaTools>,
        layout: StorageLayout,
        settings: PipelineSettings,
        retention: Arc<RetentionScheduler>,
    ) -> Self {
        let cache = VideoCache::new(
            layout.cache_dir.clone(),
            settings.quality,
            settings.extension,
            tools.clone(),
        );

        Self {
            tools,
            validator: SegmentValidator::new(settings.limits),
            cache,
            layout,
            retention,
            retention_window: settings.retention,
        }
    }

    /// Build a pipeline backed by the configured command-line tools
    pub fn from_config(config: &Config, retention: Arc<RetentionScheduler>) -> Self {
        Self::new(
            Arc::new(config.media_tools()),
            config.storage.layout(),
            config.pipeline_settings(),
            retention,
        )
    }

    pub fn tools(&self) -> &Arc<dyn MediaTools> {
        &self.tools
    }

    pub fn validator(&self) -> &SegmentValidator {
        &self.validator
    }

    pub fn cache(&self) -> &VideoCache {
        &self.cache
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Validate a request without running anything
    pub fn validate(&self, segments: &[Segment]) -> ValidationResult {
        self.validator.validate(segments)
    }

    /// Run a request with no progress observer
    pub async fn run(
        &self,
        project_name: Option<&str>,
        segments: &[Segment],
    ) -> Result<GenerationOutput, PipelineError> {
        self.run_with_progress(project_name, segments, &|_| {}).await
    }

    /// Run a request, reporting progress to `observer`
    pub async fn run_with_progress(
        &self,
        project_name: Option<&str>,
        segments: &[Segment],
        observer: &(dyn Fn(&RunEvent) + Send + Sync),
    ) -> Result<GenerationOutput, PipelineError> {
        let started = std::time::Instant::now();

        match self.execute(project_name, segments, observer).await {
            Ok(output) => {
                tracing::info!(
                    "Generated {} ({} segments, {}s of audio) in {:.1}s",
                    output.file_name,
                    output.segments,
                    output.total_duration_secs,
                    started.elapsed().as_secs_f64()
                );
                Ok(output)
            }
            Err(e) => {
                observer(&RunEvent::StateChanged(RunState::Failed(e.stage())));
                tracing::error!("Generation failed at {}: {}", e.stage(), e);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        project_name: Option<&str>,
        segments: &[Segment],
        observer: &(dyn Fn(&RunEvent) + Send + Sync),
    ) -> Result<GenerationOutput, PipelineError> {
        let planned = self.validator.plan(segments).map_err(PipelineError::Validation)?;
        let total_duration_secs: u64 = planned.iter().map(PlannedSegment::duration_secs).sum();

        observer(&RunEvent::StateChanged(RunState::CheckingPrerequisites));
        self.tools
            .check_available()
            .await
            .map_err(PipelineError::Prerequisite)?;
        self.layout.ensure().await?;

        let run_dir = tempfile::Builder::new()
            .prefix("run-")
            .tempdir_in(&self.layout.scratch_dir)?;
        tracing::debug!("Run directory: {}", run_dir.path().display());

        let produced = self.produce(&planned, run_dir.path(), observer).await;

        observer(&RunEvent::StateChanged(RunState::CleaningUp));
        let run_path = run_dir.path().to_path_buf();
        if let Err(e) = run_dir.close() {
            tracing::warn!("Failed to clean up {}: {}", run_path.display(), e);
        }

        let artifact_path = produced?;
        let file_name = artifact_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.retention.schedule(&artifact_path, self.retention_window);
        observer(&RunEvent::StateChanged(RunState::Delivered));

        Ok(GenerationOutput {
            suggested_name: suggested_name(project_name, &file_name),
            artifact_path,
            file_name,
            segments: planned.len(),
            total_duration_secs,
            created_at: Utc::now(),
        })
    }

    async fn produce(
        &self,
        planned: &[PlannedSegment],
        run_dir: &Path,
        observer: &(dyn Fn(&RunEvent) + Send + Sync),
    ) -> Result<PathBuf, PipelineError> {
        let total = planned.len();

        observer(&RunEvent::StateChanged(RunState::Downloading));
        let mut videos = Vec::with_capacity(total);
        for segment in planned {
            let index = segment.index + 1;
            tracing::info!("Processing segment {}/{}", index, total);

            let cached = self
                .cache
                .acquire(&segment.source.url)
                .await
                .map_err(|source| PipelineError::Download { index, source })?;

            observer(&RunEvent::SegmentDownloaded {
                index,
                total,
                content_key: cached.content_key,
                cache_hit: cached.cache_hit,
            });
            videos.push(cached.path);
        }

        observer(&RunEvent::StateChanged(RunState::Extracting));
        let mut extracted = Vec::with_capacity(total);
        for (segment, video) in planned.iter().zip(&videos) {
            let index = segment.index + 1;
            let output = run_dir.join(format!("audio_segment_{}.{}", index, ARTIFACT_EXTENSION));

            let path = audio::extract(self.tools.as_ref(), video, segment.start, segment.end, &output)
                .await
                .map_err(|source| PipelineError::Extraction { index, source })?;

            observer(&RunEvent::SegmentExtracted { index, total });
            extracted.push(path);
        }

        observer(&RunEvent::StateChanged(RunState::Merging));
        let artifact = self.layout.output_dir.join(artifact_name());
        let merged = audio::merge(self.tools.as_ref(), &extracted, &artifact, run_dir).await?;

        observer(&RunEvent::Merged {
            path: merged.clone(),
        });
        Ok(merged)
    }
}

/// Unique, timestamp-qualified artifact file name
pub fn artifact_name() -> String {
    format!(
        "parody_{}_{}.{}",
        Utc::now().timestamp_millis(),
        &Uuid::new_v4().simple().to_string()[..8],
        ARTIFACT_EXTENSION
    )
}

/// File name offered to the caller: the project name when usable, else the artifact's
pub fn suggested_name(project_name: Option<&str>, file_name: &str) -> String {
    let base = project_name.map(sanitize_filename).unwrap_or_default();
    let base = base.trim_end_matches(&format!(".{}", ARTIFACT_EXTENSION));

    if base.is_empty() || base.chars().all(|c| c == '_' || c == '.') {
        file_name.to_string()
    } else {
        format!("{}.{}", base, ARTIFACT_EXTENSION)
    }
}
