use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

use super::{concat_args, download_args, extract_args, MediaTools, ToolError};
use crate::utils::path_within;

/// Where the external binaries run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolBackend {
    /// Binaries on this host
    Local { yt_dlp: String, ffmpeg: String },

    /// Binaries inside `docker compose` services sharing the media directory
    DockerCompose {
        docker: String,
        project_dir: PathBuf,
        yt_dlp_service: String,
        ffmpeg_service: String,
        /// Media directory as seen from this host
        host_root: PathBuf,
        /// The same directory as mounted inside the containers
        container_root: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tool {
    YtDlp,
    Ffmpeg,
}

impl Tool {
    fn name(&self) -> &'static str {
        match self {
            Tool::YtDlp => "yt-dlp",
            Tool::Ffmpeg => "ffmpeg",
        }
    }
}

/// [`MediaTools`] backed by yt-dlp and ffmpeg processes
pub struct CommandTools {
    backend: ToolBackend,
    format_selector: String,
    timeout: Option<Duration>,
}

impl CommandTools {
    pub fn new(backend: ToolBackend, format_selector: impl Into<String>) -> Self {
        Self {
            backend,
            format_selector: format_selector.into(),
            timeout: None,
        }
    }

    /// Local binaries looked up on `PATH`
    pub fn local() -> Self {
        Self::new(
            ToolBackend::Local {
                yt_dlp: "yt-dlp".to_string(),
                ffmpeg: "ffmpeg".to_string(),
            },
            "18",
        )
    }

    /// Bound every invocation by `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backend(&self) -> &ToolBackend {
        &self.backend
    }

    /// Path as the tool will see it
    pub fn tool_path(&self, path: &Path) -> Result<String, ToolError> {
        match &self.backend {
            ToolBackend::Local { .. } => Ok(path.to_string_lossy().into_owned()),
            ToolBackend::DockerCompose {
                host_root,
                container_root,
                ..
            } => {
                let relative = path_within(path, host_root)
                    .ok_or_else(|| ToolError::UnmappedPath(path.to_path_buf()))?;

                let mut mapped = container_root.trim_end_matches('/').to_string();
                for component in relative.components() {
                    mapped.push('/');
                    mapped.push_str(&component.as_os_str().to_string_lossy());
                }
                Ok(mapped)
            }
        }
    }

    fn command(&self, tool: Tool) -> Command {
        match &self.backend {
            ToolBackend::Local { yt_dlp, ffmpeg } => match tool {
                Tool::YtDlp => Command::new(yt_dlp),
                Tool::Ffmpeg => Command::new(ffmpeg),
            },
            ToolBackend::DockerCompose {
                docker,
                project_dir,
                yt_dlp_service,
                ffmpeg_service,
                ..
            } => {
                let service = match tool {
                    Tool::YtDlp => yt_dlp_service,
                    Tool::Ffmpeg => ffmpeg_service,
                };
                let mut command = Command::new(docker);
                command
                    .args(["compose", "exec", "-T"])
                    .arg(service)
                    .arg(tool.name())
                    .current_dir(project_dir);
                command
            }
        }
    }

    async fn execute(&self, label: &str, mut command: Command) -> Result<Output, ToolError> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!("Executing: {:?}", command.as_std());

        let pending = command.output();
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, pending)
                .await
                .map_err(|_| ToolError::TimedOut {
                    tool: label.to_string(),
                    after: limit,
                })?,
            None => pending.await,
        };

        let output = result.map_err(|source| ToolError::Spawn {
            tool: label.to_string(),
            source,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ToolError::Failed {
                tool: label.to_string(),
                status: output.status.to_string(),
                stderr,
            });
        }

        Ok(output)
    }

    async fn run(&self, tool: Tool, args: Vec<String>) -> Result<Output, ToolError> {
        let mut command = self.command(tool);
        command.args(args);
        self.execute(tool.name(), command).await
    }

    async fn check_local(&self, tool: Tool) -> Result<(), ToolError> {
        let version_flag = match tool {
            Tool::YtDlp => "--version",
            Tool::Ffmpeg => "-version",
        };

        self.run(tool, vec![version_flag.to_string()])
            .await
            .map(|_| ())
            .map_err(|e| ToolError::Unavailable(format!("{} is not available: {}", tool.name(), e)))
    }

    async fn check_compose(
        &self,
        docker: &str,
        project_dir: &Path,
        services: [&str; 2],
    ) -> Result<(), ToolError> {
        let mut command = Command::new(docker);
        command
            .args(["compose", "ps", "--services", "--filter", "status=running"])
            .current_dir(project_dir);

        let output = self.execute("docker compose", command).await.map_err(|e| {
            ToolError::Unavailable(format!(
                "Docker containers are not running ({}). Please run: docker compose up -d",
                e
            ))
        })?;

        let running = String::from_utf8_lossy(&output.stdout);
        let missing: Vec<&str> = services
            .into_iter()
            .filter(|service| !running.lines().any(|line| line.trim() == *service))
            .collect();

        if !missing.is_empty() {
            return Err(ToolError::Unavailable(format!(
                "Docker services not running: {}. Please run: docker compose up -d",
                missing.join(", ")
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl MediaTools for CommandTools {
    fn backend_name(&self) -> &'static str {
        match self.backend {
            ToolBackend::Local { .. } => "local",
            ToolBackend::DockerCompose { .. } => "docker",
        }
    }

    async fn check_available(&self) -> Result<(), ToolError> {
        match &self.backend {
            ToolBackend::Local { .. } => {
                self.check_local(Tool::YtDlp).await?;
                self.check_local(Tool::Ffmpeg).await
            }
            ToolBackend::DockerCompose {
                docker,
                project_dir,
                yt_dlp_service,
                ffmpeg_service,
                ..
            } => {
                self.check_compose(docker, project_dir, [yt_dlp_service.as_str(), ffmpeg_service.as_str()])
                    .await
            }
        }
    }

    async fn download(&self, source_url: &str, destination: &Path) -> Result<(), ToolError> {
        let destination = self.tool_path(destination)?;
        let args = download_args(&self.format_selector, source_url, &destination);
        self.run(Tool::YtDlp, args).await.map(|_| ())
    }

    async fn extract_range(
        &self,
        source: &Path,
        start_secs: u64,
        duration_secs: u64,
        destination: &Path,
    ) -> Result<(), ToolError> {
        let source = self.tool_path(source)?;
        let destination = self.tool_path(destination)?;
        let args = extract_args(&source, start_secs, duration_secs, &destination);
        self.run(Tool::Ffmpeg, args).await.map(|_| ())
    }

    async fn concatenate(&self, manifest: &Path, destination: &Path) -> Result<(), ToolError> {
        let manifest = self.tool_path(manifest)?;
        let destination = self.tool_path(destination)?;
        let args = concat_args(&manifest, &destination);
        self.run(Tool::Ffmpeg, args).await.map(|_| ())
    }
}
