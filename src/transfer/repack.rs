//! Container repackaging for the transfer pipeline.
//!
//! Two container shapes exist: a single-entry deflated zip for cartridge
//! systems, and a compressed optical-disc image produced by an external
//! conversion tool for disc systems. Both write into the run's staging
//! directory; the engine copies the staged file out afterwards.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Source extensions eligible for optical-image conversion.
pub const OPTICAL_SOURCE_EXTS: &[&str] = &[".cue", ".bin", ".iso", ".gdi", ".img"];

/// Extension of the compressed optical container.
pub const OPTICAL_CONTAINER_EXT: &str = ".chd";

/// Sources already in an archive container pass through unchanged.
pub const ARCHIVE_PASSTHROUGH_EXTS: &[&str] = &[".zip", ".7z"];

#[derive(Debug, Error)]
pub enum RepackError {
    #[error("conversion tool `{tool}` could not be started: {source}")]
    ToolUnavailable {
        tool: String,
        #[source]
        source: io::Error,
    },
    #[error("conversion tool exited with {status}: {stderr}")]
    ConversionFailed { status: String, stderr: String },
    #[error("archive write failed: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Write a deflated zip at `out_path` containing exactly one entry named
/// `entry_name` with the content of `source`.
pub fn write_single_entry_zip(
    source: &Path,
    entry_name: &str,
    out_path: &Path,
) -> Result<(), RepackError> {
    debug!(source = %source.display(), entry = entry_name, "archiving");

    let mut reader = BufReader::new(File::open(source)?);
    let mut writer = ZipWriter::new(File::create(out_path)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    writer.start_file(entry_name, options)?;
    io::copy(&mut reader, &mut writer)?;
    writer.finish()?;
    Ok(())
}

/// Convert an optical source (cue/bin/iso/gdi/img) into a compressed disc
/// image at `out_path` by invoking the external conversion tool.
pub async fn convert_optical(
    tool: &str,
    source: &Path,
    out_path: &Path,
) -> Result<(), RepackError> {
    info!(source = %source.display(), tool, "converting disc image");

    let output = Command::new(tool)
        .arg("createcd")
        .arg("-i")
        .arg(source)
        .arg("-o")
        .arg(out_path)
        .arg("-f")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| RepackError::ToolUnavailable {
            tool: tool.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(RepackError::ConversionFailed {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn zip_holds_exactly_one_named_entry() {
        let temp = tempdir().unwrap();
        let source = temp.path().join("game.sfc");
        std::fs::write(&source, b"rom payload bytes").unwrap();
        let out = temp.path().join("Game.zip");

        write_single_entry_zip(&source, "Game.sfc", &out).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&out).unwrap()).unwrap();
        assert_eq!(archive.len(), 1);
        let mut entry = archive.by_index(0).unwrap();
        assert_eq!(entry.name(), "Game.sfc");
        let mut extracted = Vec::new();
        entry.read_to_end(&mut extracted).unwrap();
        assert_eq!(extracted, b"rom payload bytes");
    }

    #[tokio::test]
    async fn missing_tool_reports_unavailable() {
        let temp = tempdir().unwrap();
        let source = temp.path().join("disc.cue");
        std::fs::write(&source, b"FILE \"disc.bin\" BINARY").unwrap();

        let err = convert_optical(
            "/nonexistent/chdman",
            &source,
            &temp.path().join("disc.chd"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RepackError::ToolUnavailable { .. }));
    }
}
