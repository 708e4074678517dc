//! Transfer engine.
//!
//! Consumes confirmed (source, platform, base name) triples, resolves the
//! device content root, repackages where the platform profile and compress
//! set ask for it, and copies into the per-platform folder layout. Items
//! fail independently; only an unusable destination root aborts the run.

pub mod repack;

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::{ContainerKind, PlatformTable, PlatformTag};
use repack::{
    ARCHIVE_PASSTHROUGH_EXTS, OPTICAL_CONTAINER_EXT, OPTICAL_SOURCE_EXTS, RepackError,
};

const COPY_BUFFER_SIZE: usize = 128 * 1024;

/// Folder used for tags without a profile.
const FALLBACK_FOLDER: &str = "roms";

/// Conventional content-root subdirectory on device storage.
const CONTENT_SUBDIR: &str = "roms";

/// One confirmed file to transfer. Produced by the caller after reviewing
/// identification output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferItem {
    pub source: PathBuf,
    pub system: PlatformTag,
    /// Display title; becomes the destination file stem.
    pub name: String,
}

/// Per-item result.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub item: String,
    /// Resolved destination path, when the item got far enough to have one.
    pub destination: Option<PathBuf>,
    pub error: Option<String>,
}

impl TransferOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a whole run.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// True when the run reached the end of the item list; individual items
    /// may still have failed. False when the run aborted before processing.
    pub completed: bool,
    pub outcomes: Vec<TransferOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn failures(&self) -> impl Iterator<Item = &TransferOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }
}

/// Ordered notifications emitted during a run.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    Log(String),
    /// Integer percentage of items processed so far.
    Progress(u8),
    ItemFinished(TransferOutcome),
    Done { completed: bool, failures: usize },
}

#[derive(Debug, Error)]
#[error("no usable destination root: {reason}")]
pub struct DestinationUnresolved {
    reason: String,
}

pub struct TransferEngine {
    table: Arc<PlatformTable>,
    compress: HashSet<PlatformTag>,
    convert_tool: String,
}

impl TransferEngine {
    pub fn new(
        table: Arc<PlatformTable>,
        compress: impl IntoIterator<Item = PlatformTag>,
        convert_tool: &str,
    ) -> Self {
        Self {
            table,
            compress: compress.into_iter().collect(),
            convert_tool: convert_tool.to_string(),
        }
    }

    /// Run the pipeline over `items` in input order.
    ///
    /// Sources are only ever read. Repackaging output goes to a staging
    /// directory that is removed when the run ends on any path.
    pub async fn run(
        &self,
        items: Vec<TransferItem>,
        destination_root: &Path,
        tx: mpsc::Sender<TransferEvent>,
        cancel: CancellationToken,
    ) -> RunSummary {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, items = items.len(), root = %destination_root.display(), "transfer starting");

        let target_base = match resolve_destination(destination_root) {
            Ok(base) => base,
            Err(err) => {
                warn!(%run_id, error = %err, "transfer aborted");
                let _ = tx.send(TransferEvent::Log(err.to_string())).await;
                let _ = tx
                    .send(TransferEvent::Done {
                        completed: false,
                        failures: 0,
                    })
                    .await;
                return RunSummary {
                    run_id,
                    completed: false,
                    outcomes: Vec::new(),
                    started_at,
                    finished_at: Utc::now(),
                };
            }
        };
        let _ = tx
            .send(TransferEvent::Log(format!(
                "destination: {}",
                target_base.display()
            )))
            .await;

        // Scoped staging for repackaged intermediates; dropped (removed) on
        // every exit path of this function.
        let staging = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(err) => {
                let reason = format!("cannot create staging directory: {err}");
                warn!(%run_id, error = %reason, "transfer aborted");
                let _ = tx.send(TransferEvent::Log(reason)).await;
                let _ = tx
                    .send(TransferEvent::Done {
                        completed: false,
                        failures: 0,
                    })
                    .await;
                return RunSummary {
                    run_id,
                    completed: false,
                    outcomes: Vec::new(),
                    started_at,
                    finished_at: Utc::now(),
                };
            }
        };

        let total = items.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut completed = true;

        for (index, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                let _ = tx.send(TransferEvent::Log("transfer cancelled".into())).await;
                completed = false;
                break;
            }

            let item_staging = staging.path().join(index.to_string());
            let outcome = match self.process_item(item, &target_base, &item_staging, &tx).await {
                Ok(destination) => TransferOutcome {
                    item: item.name.clone(),
                    destination: Some(destination),
                    error: None,
                },
                Err(reason) => {
                    warn!(item = %item.name, error = %reason, "item failed");
                    let _ = tx
                        .send(TransferEvent::Log(format!("{}: {reason}", item.name)))
                        .await;
                    TransferOutcome {
                        item: item.name.clone(),
                        destination: None,
                        error: Some(reason),
                    }
                }
            };

            let _ = tx.send(TransferEvent::ItemFinished(outcome.clone())).await;
            outcomes.push(outcome);

            let percentage = (((index + 1) * 100) / total.max(1)) as u8;
            let _ = tx.send(TransferEvent::Progress(percentage)).await;
        }

        let failures = outcomes.iter().filter(|o| !o.succeeded()).count();
        info!(%run_id, total, failures, completed, "transfer finished");
        let _ = tx.send(TransferEvent::Done { completed, failures }).await;

        RunSummary {
            run_id,
            completed,
            outcomes,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Prepare (repackage if asked) and copy one item. Any failure is
    /// reported as a reason string and recorded against this item alone.
    async fn process_item(
        &self,
        item: &TransferItem,
        target_base: &Path,
        item_staging: &Path,
        tx: &mpsc::Sender<TransferEvent>,
    ) -> Result<PathBuf, String> {
        let source_ext = dotted_extension(&item.source);
        let profile = self.table.profile(&item.system);

        let folder = profile.map_or(FALLBACK_FOLDER, |p| p.folder.as_str());
        let canonical_ext = profile.map_or(source_ext.as_str(), |p| p.extension.as_str());
        let container = profile.map_or(ContainerKind::None, |p| p.container);

        let target_folder = target_base.join(folder);
        std::fs::create_dir_all(&target_folder)
            .map_err(|e| format!("cannot create {}: {e}", target_folder.display()))?;

        let mut target_name = format!("{}{}", item.name, canonical_ext);
        let mut file_to_copy = item.source.clone();

        if self.compress.contains(&item.system) {
            if container == ContainerKind::OpticalImage
                && OPTICAL_SOURCE_EXTS.contains(&source_ext.as_str())
            {
                target_name = format!("{}{}", item.name, OPTICAL_CONTAINER_EXT);
                let staged = self.stage_dir(item_staging)?.join(&target_name);
                let _ = tx
                    .send(TransferEvent::Log(format!("converting {}", item.name)))
                    .await;
                repack::convert_optical(&self.convert_tool, &item.source, &staged)
                    .await
                    .map_err(describe_repack)?;
                file_to_copy = staged;
            } else if source_ext == OPTICAL_CONTAINER_EXT && container == ContainerKind::OpticalImage
            {
                // Already in the disc container; pass through.
                target_name = format!("{}{}", item.name, OPTICAL_CONTAINER_EXT);
            } else if self.table.archive_safe(&item.system) {
                target_name = format!("{}.zip", item.name);
                if !ARCHIVE_PASSTHROUGH_EXTS.contains(&source_ext.as_str()) {
                    let entry_name = format!("{}{}", item.name, source_ext);
                    let staged = self.stage_dir(item_staging)?.join(&target_name);
                    let _ = tx
                        .send(TransferEvent::Log(format!("archiving {}", item.name)))
                        .await;
                    let source = item.source.clone();
                    let staged_for_task = staged.clone();
                    tokio::task::spawn_blocking(move || {
                        repack::write_single_entry_zip(&source, &entry_name, &staged_for_task)
                    })
                    .await
                    .map_err(|e| e.to_string())?
                    .map_err(describe_repack)?;
                    file_to_copy = staged;
                }
            } else if source_ext != canonical_ext {
                let _ = tx
                    .send(TransferEvent::Log(format!(
                        "renaming {source_ext} -> {canonical_ext}"
                    )))
                    .await;
            }
        }

        let dest_path = target_folder.join(&target_name);
        let _ = tx
            .send(TransferEvent::Log(format!("copying {target_name}")))
            .await;

        let prepared = file_to_copy.clone();
        let dest = dest_path.clone();
        tokio::task::spawn_blocking(move || copy_into_place(&prepared, &dest))
            .await
            .map_err(|e| e.to_string())??;

        debug!(item = %item.name, dest = %dest_path.display(), "item delivered");
        Ok(dest_path)
    }

    fn stage_dir(&self, item_staging: &Path) -> Result<PathBuf, String> {
        std::fs::create_dir_all(item_staging).map_err(|e| format!("staging: {e}"))?;
        Ok(item_staging.to_path_buf())
    }
}

/// Apply the content-root structural rule: descend into the conventional
/// `roms` subdirectory when the supplied root does not already look like
/// one and the subdirectory exists.
fn resolve_destination(root: &Path) -> Result<PathBuf, DestinationUnresolved> {
    if !root.is_dir() {
        return Err(DestinationUnresolved {
            reason: format!("{} is not an accessible directory", root.display()),
        });
    }
    let looks_like_content_root = root
        .to_string_lossy()
        .to_ascii_lowercase()
        .contains(CONTENT_SUBDIR);
    let subdir = root.join(CONTENT_SUBDIR);
    if !looks_like_content_root && subdir.is_dir() {
        return Ok(subdir);
    }
    Ok(root.to_path_buf())
}

/// Copy preserving permissions and timestamps, overwriting any existing
/// target. The source is only ever read.
fn copy_into_place(source: &Path, dest: &Path) -> Result<u64, String> {
    let metadata = std::fs::metadata(source).map_err(|e| copy_reason("read metadata", &e))?;

    let mut reader = BufReader::with_capacity(
        COPY_BUFFER_SIZE,
        File::open(source).map_err(|e| copy_reason("open source", &e))?,
    );
    let mut writer = BufWriter::with_capacity(
        COPY_BUFFER_SIZE,
        File::create(dest).map_err(|e| copy_reason("create destination", &e))?,
    );

    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut bytes_written = 0u64;
    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| copy_reason("read source", &e))?;
        if bytes_read == 0 {
            break;
        }
        writer
            .write_all(&buffer[..bytes_read])
            .map_err(|e| copy_reason("write destination", &e))?;
        bytes_written += bytes_read as u64;
    }

    writer.flush().map_err(|e| copy_reason("flush", &e))?;
    let file = writer
        .into_inner()
        .map_err(|e| copy_reason("flush", &e.into_error()))?;
    file.sync_all().map_err(|e| copy_reason("sync", &e))?;

    if let Err(err) = std::fs::set_permissions(dest, metadata.permissions()) {
        debug!(dest = %dest.display(), error = %err, "permissions not preserved");
    }
    let atime = filetime::FileTime::from_last_access_time(&metadata);
    let mtime = filetime::FileTime::from_last_modification_time(&metadata);
    if let Err(err) = filetime::set_file_times(dest, atime, mtime) {
        debug!(dest = %dest.display(), error = %err, "timestamps not preserved");
    }

    Ok(bytes_written)
}

fn copy_reason(stage: &str, error: &io::Error) -> String {
    if is_media_gone(error) {
        format!("failed to {stage}: {error} (destination media may have been removed)")
    } else {
        format!("failed to {stage}: {error}")
    }
}

/// Whether an I/O error smells like removable media going away under us.
fn is_media_gone(error: &io::Error) -> bool {
    match error.kind() {
        ErrorKind::BrokenPipe
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected => true,
        _ => matches!(
            error.raw_os_error(),
            Some(libc::EIO) | Some(libc::ENODEV) | Some(libc::ENXIO) | Some(libc::ENOMEDIUM)
        ),
    }
}

fn describe_repack(err: RepackError) -> String {
    err.to_string()
}

/// Lowercased extension with leading dot; empty for extensionless paths.
fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_ascii_lowercase()))
        .unwrap_or_default()
}
