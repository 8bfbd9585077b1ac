//! Audio stages: cutting one range out of a cached video, and joining the
//! cut ranges into a single artifact.

use std::path::PathBuf;

use crate::timecode::TimecodeError;
use crate::tools::ToolError;

pub mod extract;
pub mod merge;

pub use extract::extract;
pub use merge::{build_manifest, merge, MANIFEST_NAME};

/// Failure while cutting a range out of a video
#[derive(thiserror::Error, Debug)]
pub enum ExtractionError {
    #[error("Invalid segment range: {0}")]
    Range(#[from] TimecodeError),

    #[error("Failed to extract audio from {}: {source}", .video.display())]
    Tool {
        video: PathBuf,
        #[source]
        source: ToolError,
    },
}

impl ExtractionError {
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            ExtractionError::Tool { source, .. } => source.diagnostics(),
            ExtractionError::Range(_) => None,
        }
    }
}

/// Failure while joining extracted segments
#[derive(thiserror::Error, Debug)]
pub enum MergeError {
    #[error("No audio segments to merge")]
    NoInputs,

    #[error("Failed to write concat manifest {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to merge audio segments: {0}")]
    Tool(#[source] ToolError),

    #[error("Failed to finalize {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MergeError {
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            MergeError::Tool(source) => source.diagnostics(),
            _ => None,
        }
    }
}
