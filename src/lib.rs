//! Parody Generator - builds one audio track out of time ranges of YouTube videos
//!
//! The library validates segment requests, downloads and caches source videos,
//! cuts and joins their audio with external tools, and retires generated
//! artifacts after a retention window. It can be driven directly, over HTTP, or
//! from the `parody` command line.

pub mod audio;
pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod output;
pub mod pipeline;
pub mod retention;
pub mod segments;
pub mod server;
pub mod sources;
pub mod timecode;
pub mod tools;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use pipeline::{GenerationOutput, GenerationPipeline, PipelineError, RunEvent, RunState, Stage, StorageLayout};
pub use segments::{Segment, SegmentValidator, ValidationLimits, ValidationResult};
pub use tools::{MediaTools, ToolError};

/// Result type used by the application layers
pub type Result<T> = anyhow::Result<T>;
