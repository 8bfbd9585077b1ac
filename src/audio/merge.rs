use std::path::{Path, PathBuf};

use super::MergeError;
use crate::tools::MediaTools;

/// Name of the concat manifest written into the work directory
pub const MANIFEST_NAME: &str = "concat_list.txt";

/// Render the concat manifest for `inputs`, one `file '...'` line each, in order.
///
/// Inputs inside `work_dir` are listed by bare file name, since the
/// concatenation tool resolves entries relative to the manifest.
pub fn build_manifest(inputs: &[PathBuf], work_dir: &Path) -> String {
    inputs
        .iter()
        .map(|input| {
            let entry = match (input.parent(), input.file_name()) {
                (Some(parent), Some(name)) if parent == work_dir => {
                    name.to_string_lossy().into_owned()
                }
                _ => input.to_string_lossy().into_owned(),
            };
            format!("file '{}'\n", entry.replace('\'', r"'\''"))
        })
        .collect()
}

/// Join `inputs` in order into `output`.
///
/// The tool writes to a hidden sibling of `output` which is renamed into
/// place only on success, so `output` never holds a partial file.
pub async fn merge(
    tools: &dyn MediaTools,
    inputs: &[PathBuf],
    output: &Path,
    work_dir: &Path,
) -> Result<PathBuf, MergeError> {
    if inputs.is_empty() {
        return Err(MergeError::NoInputs);
    }

    let manifest = work_dir.join(MANIFEST_NAME);
    tokio::fs::write(&manifest, build_manifest(inputs, work_dir))
        .await
        .map_err(|source| MergeError::Manifest {
            path: manifest.clone(),
            source,
        })?;

    let partial = partial_path(output);
    tracing::info!("Merging {} audio segments...", inputs.len());

    if let Err(e) = tools.concatenate(&manifest, &partial).await {
        discard(&partial).await;
        return Err(MergeError::Tool(e));
    }

    if let Err(source) = tokio::fs::rename(&partial, output).await {
        discard(&partial).await;
        return Err(MergeError::Io {
            path: output.to_path_buf(),
            source,
        });
    }

    Ok(output.to_path_buf())
}

fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    let extension = output
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "m4a".to_string());

    output.with_file_name(format!(".{}.partial.{}", stem, extension))
}

async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{MockMediaTools, ToolError};

    #[test]
    fn test_manifest_preserves_order_and_escapes_quotes() {
        let work = Path::new("/scratch/run-1");
        let inputs = vec![
            work.join("audio_segment_2.m4a"),
            work.join("audio_segment_1.m4a"),
            PathBuf::from("/elsewhere/it's.m4a"),
        ];

        assert_eq!(
            build_manifest(&inputs, work),
            "file 'audio_segment_2.m4a'\nfile 'audio_segment_1.m4a'\nfile '/elsewhere/it'\\''s.m4a'\n"
        );
    }

    #[test]
    fn test_partial_path_is_hidden_sibling() {
        assert_eq!(
            partial_path(Path::new("/media/output/parody_1_ab.m4a")),
            PathBuf::from("/media/output/.parody_1_ab.partial.m4a")
        );
    }

    #[tokio::test]
    async fn test_merge_requires_inputs() {
        let tools = MockMediaTools::new();
        let dir = tempfile::tempdir().unwrap();
        let err = merge(&tools, &[], &dir.path().join("out.m4a"), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, MergeError::NoInputs));
    }

    #[tokio::test]
    async fn test_merge_renames_into_place() {
        let work = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("parody.m4a");

        let mut tools = MockMediaTools::new();
        tools
            .expect_concatenate()
            .times(1)
            .returning(|manifest, destination| {
                assert!(manifest.ends_with(MANIFEST_NAME));
                std::fs::write(destination, b"joined").unwrap();
                Ok(())
            });

        let inputs = vec![work.path().join("audio_segment_1.m4a")];
        let merged = merge(&tools, &inputs, &output, work.path()).await.unwrap();

        assert_eq!(merged, output);
        assert_eq!(std::fs::read(&output).unwrap(), b"joined");
        assert_eq!(std::fs::read_dir(out_dir.path()).unwrap().count(), 1);
        assert_eq!(
            std::fs::read_to_string(work.path().join(MANIFEST_NAME)).unwrap(),
            "file 'audio_segment_1.m4a'\n"
        );
    }

    #[tokio::test]
    async fn test_failed_merge_leaves_no_output() {
        let work = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("parody.m4a");

        let mut tools = MockMediaTools::new();
        tools.expect_concatenate().returning(|_, destination| {
            std::fs::write(destination, b"half").unwrap();
            Err(ToolError::Failed {
                tool: "ffmpeg".into(),
                status: "exit status: 1".into(),
                stderr: "Non-monotonous DTS".into(),
            })
        });

        let inputs = vec![work.path().join("audio_segment_1.m4a")];
        let err = merge(&tools, &inputs, &output, work.path()).await.unwrap_err();

        assert_eq!(err.diagnostics(), Some("Non-monotonous DTS"));
        assert_eq!(std::fs::read_dir(out_dir.path()).unwrap().count(), 0);
    }
}
