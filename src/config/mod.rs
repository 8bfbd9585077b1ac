use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pipeline::{PipelineSettings, StorageLayout};
use crate::segments::ValidationLimits;
use crate::tools::{CommandTools, ToolBackend};
use crate::utils::path_within;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Media directories
    pub storage: StorageConfig,

    /// External download and transcode tools
    pub tools: ToolsConfig,

    /// Request limits
    pub limits: ValidationLimits,

    /// Artifact retention
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of all media directories
    pub media_dir: PathBuf,

    /// Downloaded source videos (default: `<media_dir>/.youtube_cache`)
    pub cache_dir: Option<PathBuf>,

    /// Per-run scratch space (default: `<media_dir>/.temp_segments`)
    pub scratch_dir: Option<PathBuf>,

    /// Generated artifacts (default: `<media_dir>/output`)
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Docker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Run tools locally or inside docker compose services
    pub backend: BackendKind,

    pub yt_dlp: String,
    pub ffmpeg: String,
    pub docker: String,

    /// Directory holding the compose file
    pub compose_dir: PathBuf,
    pub yt_dlp_service: String,
    pub ffmpeg_service: String,

    /// Where the media directory is mounted inside the containers
    pub container_workdir: String,

    /// yt-dlp format selector
    pub format: String,

    /// Quality tier recorded in cache file names
    pub quality: String,

    /// Container extension of downloaded videos
    pub extension: String,

    /// Upper bound for a single tool invocation, in seconds
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// How long generated artifacts are kept
    pub hours: u64,

    /// Interval of the age-based sweep
    pub sweep_interval_minutes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3032,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            media_dir: PathBuf::from("media"),
            cache_dir: None,
            scratch_dir: None,
            output_dir: None,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            yt_dlp: "yt-dlp".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            docker: "docker".to_string(),
            compose_dir: PathBuf::from("."),
            yt_dlp_service: "ytdlp".to_string(),
            ffmpeg_service: "ffmpeg".to_string(),
            container_workdir: "/workdir".to_string(),
            format: "18".to_string(),
            quality: "360p".to_string(),
            extension: "mp4".to_string(),
            timeout_secs: Some(600),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            hours: 24,
            sweep_interval_minutes: 60,
        }
    }
}

impl StorageConfig {
    pub fn layout(&self) -> StorageLayout {
        let mut layout = StorageLayout::under(&self.media_dir);
        if let Some(dir) = &self.cache_dir {
            layout.cache_dir = dir.clone();
        }
        if let Some(dir) = &self.scratch_dir {
            layout.scratch_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            layout.output_dir = dir.clone();
        }
        layout
    }
}

impl Config {
    /// Load configuration from `explicit`, the usual locations, or create default
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = match explicit {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                path.to_path_buf()
            }
            None => Self::config_path()?,
        };

        let mut config = if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            serde_yaml::from_str(&content).context("Failed to parse config file")?
        } else {
            let config = Self::default();
            if let Err(e) = config.save_to(&config_path).await {
                tracing::warn!("Could not write default config: {:#}", e);
            }
            config
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("parody-generator").join("config.yaml"))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("PARODY_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PARODY_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid PARODY_PORT: {}", port))?;
        }
        if let Some(dir) = lookup("PARODY_MEDIA_DIR") {
            self.storage.media_dir = PathBuf::from(dir);
        }
        if let Some(backend) = lookup("PARODY_TOOL_BACKEND") {
            self.tools.backend = match backend.to_ascii_lowercase().as_str() {
                "local" => BackendKind::Local,
                "docker" => BackendKind::Docker,
                other => anyhow::bail!("Invalid PARODY_TOOL_BACKEND: {} (use local or docker)", other),
            };
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be non-zero");
        }

        let limits = &self.limits;
        if limits.min_segments == 0 || limits.max_segments < limits.min_segments {
            anyhow::bail!(
                "Segment limits must satisfy 1 <= min_segments <= max_segments (got {}..={})",
                limits.min_segments,
                limits.max_segments
            );
        }
        if limits.max_total_secs == 0 || limits.min_segment_secs == 0 {
            anyhow::bail!("Duration limits must be positive");
        }
        if limits.min_segment_secs > limits.max_total_secs {
            anyhow::bail!("Minimum segment length exceeds the total duration limit");
        }

        if self.retention.hours == 0 || self.retention.sweep_interval_minutes == 0 {
            anyhow::bail!("Retention hours and sweep interval must be positive");
        }

        if self.tools.format.is_empty() || self.tools.quality.is_empty() || self.tools.extension.is_empty() {
            anyhow::bail!("Tool format, quality and extension must be set");
        }

        // Containers only see the media directory.
        if self.tools.backend == BackendKind::Docker {
            let layout = self.storage.layout();
            for (name, dir) in [
                ("cache_dir", &layout.cache_dir),
                ("scratch_dir", &layout.scratch_dir),
                ("output_dir", &layout.output_dir),
            ] {
                if path_within(dir, &layout.media_root).is_none() {
                    anyhow::bail!(
                        "storage.{} ({}) must be inside media_dir ({}) when using the docker backend",
                        name,
                        dir.display(),
                        layout.media_root.display()
                    );
                }
            }
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        let layout = self.storage.layout();
        println!("Current Configuration:");
        println!("  Server: {}:{}", self.server.host, self.server.port);
        println!("  Media Directory: {}", layout.media_root.display());
        println!("  Cache Directory: {}", layout.cache_dir.display());
        println!("  Scratch Directory: {}", layout.scratch_dir.display());
        println!("  Output Directory: {}", layout.output_dir.display());
        match self.tools.backend {
            BackendKind::Local => {
                println!("  Tools: local ({}, {})", self.tools.yt_dlp, self.tools.ffmpeg)
            }
            BackendKind::Docker => println!(
                "  Tools: docker compose in {} (services {}, {})",
                self.tools.compose_dir.display(),
                self.tools.yt_dlp_service,
                self.tools.ffmpeg_service
            ),
        }
        if let Some(timeout) = self.tools.timeout_secs {
            println!("  Tool Timeout: {}s", timeout);
        }
        println!(
            "  Limits: {}-{} segments, {}s total, {}s minimum",
            self.limits.min_segments,
            self.limits.max_segments,
            self.limits.max_total_secs,
            self.limits.min_segment_secs
        );
        println!("  Retention: {}h (sweep every {}m)", self.retention.hours, self.retention.sweep_interval_minutes);
    }

    pub fn retention_window(&self) -> Duration {
        Duration::from_secs(self.retention.hours * 60 * 60)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention.sweep_interval_minutes * 60)
    }

    /// Tool backend described by this configuration
    pub fn tool_backend(&self) -> ToolBackend {
        match self.tools.backend {
            BackendKind::Local => ToolBackend::Local {
                yt_dlp: self.tools.yt_dlp.clone(),
                ffmpeg: self.tools.ffmpeg.clone(),
            },
            BackendKind::Docker => ToolBackend::DockerCompose {
                docker: self.tools.docker.clone(),
                project_dir: self.tools.compose_dir.clone(),
                yt_dlp_service: self.tools.yt_dlp_service.clone(),
                ffmpeg_service: self.tools.ffmpeg_service.clone(),
                host_root: self.storage.media_dir.clone(),
                container_root: self.tools.container_workdir.clone(),
            },
        }
    }

    pub fn media_tools(&self) -> CommandTools {
        CommandTools::new(self.tool_backend(), self.tools.format.clone())
            .with_timeout(self.tools.timeout_secs.map(Duration::from_secs))
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            limits: self.limits,
            quality: self.tools.quality.clone(),
            extension: self.tools.extension.clone(),
            retention: self.retention_window(),
        }
    }
}
