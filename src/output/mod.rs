use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pipeline::{GenerationOutput, RunEvent, RunState};
use crate::retention::SweepReport;
use crate::segments::ValidationResult;
use crate::server::handlers::StatusResponse;
use crate::utils::{format_duration, format_file_size};

/// Renders pipeline progress as a spinner
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new(quiet: bool) -> Self {
        if quiet {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }

        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap(),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    pub fn observe(&self, event: &RunEvent) {
        match event {
            RunEvent::StateChanged(state) => {
                if let Some(message) = state_message(state) {
                    self.bar.set_message(message);
                }
            }
            RunEvent::SegmentDownloaded {
                index,
                total,
                content_key,
                cache_hit,
            } => {
                let source = if *cache_hit { "cached" } else { "downloaded" };
                self.bar
                    .println(format!("  {} video {}/{} {} ({})", style("✓").green(), index, total, content_key, source));
            }
            RunEvent::SegmentExtracted { index, total } => {
                self.bar.set_message(format!("Extracting audio... {}/{}", index, total));
            }
            RunEvent::Merged { .. } => self.bar.set_message("Finishing up..."),
        }
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn abandon(&self) {
        self.bar.finish_and_clear();
    }
}

fn state_message(state: &RunState) -> Option<&'static str> {
    match state {
        RunState::CheckingPrerequisites => Some("Checking media tools..."),
        RunState::Downloading => Some("Downloading videos..."),
        RunState::Extracting => Some("Extracting audio..."),
        RunState::Merging => Some("Merging audio segments..."),
        RunState::CleaningUp => Some("Cleaning up..."),
        _ => None,
    }
}

/// Copy a generated artifact to `destination`, creating parent directories
pub async fn save_artifact(output: &GenerationOutput, destination: &Path) -> Result<PathBuf> {
    let target = if destination.is_dir() {
        destination.join(&output.suggested_name)
    } else {
        destination.to_path_buf()
    };

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs_err::create_dir_all(parent)?;
    }

    tokio::fs::copy(&output.artifact_path, &target)
        .await
        .with_context(|| format!("Failed to copy audio to {}", target.display()))?;

    Ok(target)
}

/// Print the outcome of a local generation
pub fn print_generation(output: &GenerationOutput, saved: Option<&Path>, retention_hours: u64) {
    let size = fs_err::metadata(&output.artifact_path)
        .map(|m| format_file_size(m.len()))
        .unwrap_or_else(|_| "unknown size".to_string());

    println!(
        "{} Generated {} ({} segments, {}, {})",
        style("✓").green().bold(),
        style(&output.suggested_name).bold(),
        output.segments,
        format_duration(output.total_duration_secs),
        size
    );
    println!("  Artifact: {}", output.artifact_path.display());
    if let Some(saved) = saved {
        println!("  Saved to: {}", saved.display());
    }
    println!(
        "  {}",
        style(format!("The artifact is deleted automatically after {} hours", retention_hours)).dim()
    );
}

/// Render a validation result, one line per problem
pub fn format_validation(result: &ValidationResult) -> String {
    if result.is_valid {
        return format!(
            "{} Request is valid ({} of audio)",
            style("✓").green().bold(),
            format_duration(result.total_duration_secs)
        );
    }

    let mut lines = vec![format!(
        "{} Request is invalid ({} problems)",
        style("✗").red().bold(),
        result.issue_count()
    )];
    for error in &result.global_errors {
        lines.push(format!("  • {}", error));
    }
    for (key, issues) in &result.per_segment_errors {
        for issue in issues {
            lines.push(format!("  • {}: {}", style(key).yellow(), issue));
        }
    }
    lines.join("\n")
}

pub fn print_status(status: &StatusResponse) {
    let mark = if status.is_running() {
        style("✓").green().bold()
    } else {
        style("✗").red().bold()
    };
    println!("{} Tools {} ({} backend)", mark, status.tools, status.backend);
    println!("  {}", status.message);
}

pub fn print_sweep(dir: &Path, report: &SweepReport) {
    println!(
        "{} Removed {} expired entries from {}",
        style("✓").green().bold(),
        report.removed.len(),
        dir.display()
    );
    for path in &report.removed {
        println!("  • {}", path.display());
    }
    if report.failed > 0 {
        println!("  {} {} entries could not be removed", style("!").yellow(), report.failed);
    }
}
