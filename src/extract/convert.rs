//! Legacy Word conversion through an external headless office suite.
//!
//! Runs `<converter> --headless --convert-to <ext> --outdir <tmp> <input>`
//! into a private temporary directory and returns the converted bytes. The
//! directory is removed afterwards; a failed removal is only logged.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::ExtractError;
use crate::config::ExtractConfig;

pub async fn convert_with_office(
    input: &Path,
    target_ext: &str,
    cfg: &ExtractConfig,
) -> Result<Vec<u8>, ExtractError> {
    let outdir = std::env::temp_dir().join(format!("sow-convert-{}", uuid::Uuid::new_v4()));
    tokio::fs::create_dir_all(&outdir).await?;

    let result = run_converter(input, target_ext, &outdir, cfg).await;

    if let Err(e) = tokio::fs::remove_dir_all(&outdir).await {
        tracing::warn!(dir = %outdir.display(), error = %e, "failed to remove conversion dir");
    }
    result
}

async fn run_converter(
    input: &Path,
    target_ext: &str,
    outdir: &Path,
    cfg: &ExtractConfig,
) -> Result<Vec<u8>, ExtractError> {
    let child = Command::new(&cfg.office_converter)
        .arg("--headless")
        .arg("--convert-to")
        .arg(target_ext)
        .arg("--outdir")
        .arg(outdir)
        .arg(input)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            ExtractError::Conversion(format!(
                "failed to run {} (is an office suite installed?): {}",
                cfg.office_converter, e
            ))
        })?;

    let timeout = Duration::from_secs(cfg.convert_timeout_secs);
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| {
            ExtractError::Conversion(format!(
                "{} timed out after {}s",
                cfg.office_converter, cfg.convert_timeout_secs
            ))
        })??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ExtractError::Conversion(format!(
            "{} exited with {}: {}",
            cfg.office_converter,
            output.status,
            stderr.trim()
        )));
    }

    let converted = converted_path(input, target_ext, outdir).await?;
    Ok(tokio::fs::read(converted).await?)
}

/// The converter names its output after the input stem; fall back to any
/// file with the target extension.
async fn converted_path(
    input: &Path,
    target_ext: &str,
    outdir: &Path,
) -> Result<PathBuf, ExtractError> {
    if let Some(stem) = input.file_stem() {
        let expected = outdir.join(format!("{}.{}", stem.to_string_lossy(), target_ext));
        if tokio::fs::try_exists(&expected).await.unwrap_or(false) {
            return Ok(expected);
        }
    }

    let mut entries = tokio::fs::read_dir(outdir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(target_ext));
        if matches {
            return Ok(path);
        }
    }

    Err(ExtractError::Conversion(format!(
        "converter produced no .{} output",
        target_ext
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_converter_is_conversion_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("in.doc");
        std::fs::write(&input, b"x").unwrap();
        let cfg = ExtractConfig {
            office_converter: "/nonexistent/soffice".to_string(),
            convert_timeout_secs: 5,
        };
        let err = convert_with_office(&input, "docx", &cfg).await.unwrap_err();
        assert!(matches!(err, ExtractError::Conversion(_)));
    }

    #[tokio::test]
    async fn failing_converter_reports_exit_status() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("in.doc");
        std::fs::write(&input, b"x").unwrap();
        let cfg = ExtractConfig {
            office_converter: "false".to_string(),
            convert_timeout_secs: 5,
        };
        let err = convert_with_office(&input, "docx", &cfg).await.unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }
}
