use std::path::{Path, PathBuf};

use super::ExtractionError;
use crate::timecode::Timecode;
use crate::tools::MediaTools;

/// Copy the audio of `[start, end)` from `video` into `output`
pub async fn extract(
    tools: &dyn MediaTools,
    video: &Path,
    start: Timecode,
    end: Timecode,
    output: &Path,
) -> Result<PathBuf, ExtractionError> {
    let duration = start.duration_until(end)?;

    tracing::debug!(
        "Extracting {} + {}s from {} to {}",
        start,
        duration,
        video.display(),
        output.display()
    );

    tools
        .extract_range(video, start.as_secs(), duration, output)
        .await
        .map_err(|source| ExtractionError::Tool {
            video: video.to_path_buf(),
            source,
        })?;

    Ok(output.to_path_buf())
}
