//! Client for a running parody generator server.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::server::handlers::{GenerateRequest, StatusResponse, ARTIFACT_HEADER};
use crate::utils::{normalize_server_url, sanitize_filename};

/// Default address of a local server
pub const DEFAULT_SERVER: &str = "http://localhost:3032";

/// An artifact saved from a remote generation
#[derive(Debug, Clone)]
pub struct RemoteArtifact {
    pub path: PathBuf,
    pub bytes: u64,
    /// Name of the artifact on the server
    pub artifact_name: Option<String>,
}

pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
}

impl RemoteClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("parody-generator/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: normalize_server_url(base_url)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ask the server whether its media tools are reachable
    pub async fn status(&self) -> Result<StatusResponse> {
        let response = self
            .http
            .get(format!("{}/api/status", self.base_url))
            .send()
            .await
            .with_context(|| format!("Failed to reach server at {}", self.base_url))?;

        response
            .json::<StatusResponse>()
            .await
            .context("Failed to parse status response")
    }

    /// Submit a generation request and save the returned audio.
    ///
    /// Without `destination` the file is saved in the current directory under
    /// the name suggested by the server.
    pub async fn generate(
        &self,
        request: &GenerateRequest,
        destination: Option<&Path>,
        show_progress: bool,
    ) -> Result<RemoteArtifact> {
        let progress = if show_progress {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .unwrap(),
            );
            spinner.enable_steady_tick(std::time::Duration::from_millis(120));
            spinner.set_message("Generating on server...");
            spinner
        } else {
            ProgressBar::hidden()
        };

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to reach server at {}", self.base_url))?;

        if !response.status().is_success() {
            progress.finish_and_clear();
            let status = response.status();
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            anyhow::bail!(describe_error(status.as_u16(), &body));
        }

        let artifact_name = response
            .headers()
            .get(ARTIFACT_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let path = match destination {
            Some(path) => path.to_path_buf(),
            None => {
                let suggested = response
                    .headers()
                    .get(header::CONTENT_DISPOSITION)
                    .and_then(|value| value.to_str().ok())
                    .and_then(filename_from_disposition)
                    .or_else(|| artifact_name.clone())
                    .unwrap_or_else(|| "parody.m4a".to_string());
                PathBuf::from(suggested)
            }
        };

        let total_size = response.content_length().unwrap_or(0);
        if show_progress && total_size > 0 {
            progress.set_length(total_size);
            progress.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                    .unwrap(),
            );
        }
        progress.set_message("Downloading audio...");

        let mut file = fs_err::File::create(&path)?;
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Download interrupted")?;
            file.write_all(&chunk)?;
            downloaded += chunk.len() as u64;
            progress.set_position(downloaded);
        }
        file.flush()?;

        progress.finish_with_message("Download complete");

        Ok(RemoteArtifact {
            path,
            bytes: downloaded,
            artifact_name,
        })
    }
}

/// Human-readable summary of an API error body
pub fn describe_error(status: u16, body: &serde_json::Value) -> String {
    let mut message = format!(
        "Server returned {}: {}",
        status,
        body["error"].as_str().unwrap_or("unknown error")
    );

    if let Some(details) = body["details"].as_str() {
        message.push_str(&format!("\n  {}", details));
    }

    let validation = &body["validation"];
    if let Some(errors) = validation["globalErrors"].as_array() {
        for error in errors.iter().filter_map(|e| e.as_str()) {
            message.push_str(&format!("\n  {}", error));
        }
    }
    if let Some(segments) = validation["perSegmentErrors"].as_object() {
        for (key, errors) in segments {
            for error in errors.as_array().into_iter().flatten().filter_map(|e| e.as_str()) {
                message.push_str(&format!("\n  {}: {}", key, error));
            }
        }
    }

    message
}

/// File name carried by a `Content-Disposition` header, made safe for the local filesystem
pub fn filename_from_disposition(value: &str) -> Option<String> {
    let extended = value.split(';').map(str::trim).find_map(|part| {
        part.strip_prefix("filename*=UTF-8''")
            .and_then(|encoded| urlencoding::decode(encoded).ok())
            .map(|decoded| decoded.into_owned())
    });

    let name = extended.or_else(|| {
        value.split(';').map(str::trim).find_map(|part| {
            part.strip_prefix("filename=")
                .map(|quoted| quoted.trim_matches('"').to_string())
        })
    })?;

    let safe = sanitize_filename(&name);
    (!safe.is_empty()).then_some(safe)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_prefers_utf8_form() {
        assert_eq!(
            filename_from_disposition(
                "attachment; filename=\"Caf_ mix.m4a\"; filename*=UTF-8''Caf%C3%A9%20mix.m4a"
            )
            .as_deref(),
            Some("Café mix.m4a")
        );
        assert_eq!(
            filename_from_disposition("attachment; filename=\"plain.m4a\"").as_deref(),
            Some("plain.m4a")
        );
        assert_eq!(
            filename_from_disposition("attachment; filename*=UTF-8''..%2F..%2Fetc%2Fpasswd").as_deref(),
            Some("_.._etc_passwd")
        );
        assert_eq!(filename_from_disposition("inline"), None);
    }

    #[test]
    fn test_describe_validation_error() {
        let body = serde_json::json!({
            "error": "Invalid segments",
            "validation": {
                "isValid": false,
                "globalErrors": ["Maximum 10 segments allowed"],
                "perSegmentErrors": { "segment-2": ["Invalid source URL"] },
                "totalDurationSecs": 0
            }
        });

        assert_eq!(
            describe_error(400, &body),
            "Server returned 400: Invalid segments\n  Maximum 10 segments allowed\n  segment-2: Invalid source URL"
        );
    }

    #[test]
    fn test_describe_stage_error() {
        let body = serde_json::json!({
            "error": "Media tools are not available: ffmpeg is not available",
            "stage": "prerequisites",
            "details": "ffmpeg is not available"
        });
        let message = describe_error(503, &body);
        assert!(message.starts_with("Server returned 503: Media tools"));
        assert!(message.ends_with("\n  ffmpeg is not available"));
    }

    #[test]
    fn test_rejects_non_http_server() {
        assert!(RemoteClient::new("ftp://localhost").is_err());
        let client = RemoteClient::new("http://localhost:3032/").unwrap();
        assert_eq!(client.base_url(), DEFAULT_SERVER);
    }
}
