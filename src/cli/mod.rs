use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::segments::Segment;

#[derive(Parser)]
#[command(
    name = "parody",
    about = "Parody Generator - Cut and stitch YouTube audio segments into a single track",
    version,
    long_about = "Assemble a parody/mashup audio track from time ranges of YouTube videos. Runs the download, extraction and merge pipeline locally, serves it over HTTP, or submits requests to a running server."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./config.yaml or the user config directory)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to bind (overrides the configuration)
        #[arg(long, value_name = "HOST")]
        host: Option<String>,

        /// Port to listen on (overrides the configuration)
        #[arg(short, long, value_name = "PORT")]
        port: Option<u16>,
    },

    /// Generate an audio track from segments
    Generate {
        #[command(flatten)]
        input: SegmentInput,

        /// Project name, used for the saved file name
        #[arg(short, long, value_name = "NAME")]
        name: Option<String>,

        /// Where to save the audio (file or directory)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Submit to a running server instead of generating locally
        #[arg(long, value_name = "URL")]
        server: Option<String>,
    },

    /// Check segments against the request limits without running anything
    Validate {
        #[command(flatten)]
        input: SegmentInput,
    },

    /// Check whether the media tools are reachable
    Status {
        /// Ask a running server instead of probing locally
        #[arg(long, value_name = "URL")]
        server: Option<String>,
    },

    /// Delete generated files older than the retention window
    Sweep {
        /// Maximum age in hours (defaults to the configured retention)
        #[arg(long, value_name = "HOURS")]
        max_age_hours: Option<u64>,
    },

    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

/// Segments given on the command line or in a file
#[derive(Args, Debug, Clone)]
pub struct SegmentInput {
    /// Segment as URL,START,END (repeatable, kept in order)
    #[arg(
        short,
        long = "segment",
        value_name = "URL,START,END",
        value_parser = parse_segment_arg
    )]
    pub segments: Vec<Segment>,

    /// YAML or JSON file with `name` and `segments`
    #[arg(short, long, value_name = "FILE", conflicts_with = "segments")]
    pub file: Option<PathBuf>,
}

/// A request read from the command line
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SegmentRequest {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub segments: Vec<Segment>,
}

impl SegmentInput {
    pub fn load(&self) -> Result<SegmentRequest> {
        match &self.file {
            Some(path) => load_segment_file(path),
            None => Ok(SegmentRequest {
                name: None,
                segments: self.segments.clone(),
            }),
        }
    }
}

/// Parse `URL,START,END`; the URL itself may contain commas
pub fn parse_segment_arg(value: &str) -> Result<Segment, String> {
    let mut parts = value.rsplitn(3, ',');
    let end = parts.next().map(str::trim);
    let start = parts.next().map(str::trim);
    let url = parts.next().map(str::trim);

    match (url, start, end) {
        (Some(url), Some(start), Some(end)) if !url.is_empty() => Ok(Segment::new(url, start, end)),
        _ => Err(format!("expected URL,START,END but got {:?}", value)),
    }
}

/// Read a segment file, choosing the parser by extension
pub fn load_segment_file(path: &Path) -> Result<SegmentRequest> {
    let content = fs_err::read_to_string(path).context("Failed to read segment file")?;

    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        serde_json::from_str(&content).context("Failed to parse segment file as JSON")
    } else {
        serde_yaml::from_str(&content).context("Failed to parse segment file as YAML")
    }
}
