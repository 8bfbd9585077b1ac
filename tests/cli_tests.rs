use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};

fn parody() -> Command {
    let mut cmd = Command::cargo_bin("parody").unwrap();
    for key in ["PARODY_HOST", "PARODY_PORT", "PARODY_MEDIA_DIR", "PARODY_TOOL_BACKEND"] {
        cmd.env_remove(key);
    }
    cmd
}

fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let path = dir.join("config.yaml");
    let media = dir.join("media");
    std::fs::write(
        &path,
        format!("storage:\n  media_dir: {}\n{}", media.display(), extra),
    )
    .unwrap();
    path
}

#[test]
fn test_help_lists_commands() {
    parody()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("generate"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("validate"));
}

#[test]
fn test_validate_accepts_good_segments() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "");

    parody()
        .arg("--config")
        .arg(&config)
        .args([
            "validate",
            "--segment",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ,0:10,0:20",
            "--segment",
            "https://youtu.be/aaaaaaaaaaa,1:00,1:30",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Request is valid (40s of audio)"));
}

#[test]
fn test_validate_rejects_bad_segments() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "");

    parody()
        .arg("--config")
        .arg(&config)
        .args(["validate", "--segment", "https://youtu.be/dQw4w9WgXcQ,abc,0:20"])
        .assert()
        .failure()
        .stdout(predicate::str::contains(
            "segment-1: Invalid start time format. Use HH:MM:SS, MM:SS, or SS",
        ));
}

#[test]
fn test_validate_honours_configured_limits() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "limits:\n  max_segments: 1\n");

    parody()
        .arg("--config")
        .arg(&config)
        .args([
            "validate",
            "-s",
            "https://youtu.be/dQw4w9WgXcQ,0,5",
            "-s",
            "https://youtu.be/dQw4w9WgXcQ,5,10",
        ])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Maximum 1 segments allowed"));
}

#[test]
fn test_validate_reads_segment_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "");
    let file = dir.path().join("mix.json");
    std::fs::write(
        &file,
        r#"{"name": "Mix", "segments": [{"sourceUrl": "https://youtu.be/dQw4w9WgXcQ", "startTime": "5", "endTime": "1"}]}"#,
    )
    .unwrap();

    parody()
        .arg("--config")
        .arg(&config)
        .arg("validate")
        .arg("--file")
        .arg(&file)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Start time must precede end time"));
}

#[test]
fn test_malformed_segment_argument_is_usage_error() {
    parody()
        .args(["validate", "--segment", "https://youtu.be/dQw4w9WgXcQ,0:10"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("URL,START,END"));
}

#[test]
fn test_config_show() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "server:\n  port: 4010\n");

    parody()
        .arg("--config")
        .arg(&config)
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Server: 0.0.0.0:4010"))
        .stdout(predicate::str::contains(".youtube_cache"));
}

#[test]
fn test_sweep_removes_expired_output() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "");
    let output = dir.path().join("media").join("output");
    std::fs::create_dir_all(&output).unwrap();
    std::fs::write(output.join("parody_1_abcdef01.m4a"), b"old").unwrap();
    std::thread::sleep(std::time::Duration::from_millis(20));

    parody()
        .arg("--config")
        .arg(&config)
        .args(["sweep", "--max-age-hours", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 expired entries"));

    assert!(!output.join("parody_1_abcdef01.m4a").exists());
}
