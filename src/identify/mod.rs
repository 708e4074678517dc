//! Identification engine: signature sniffing, digest catalogs, and the
//! directory sweep that classifies a library of candidate files.

pub mod fetch;
pub mod hashdb;
pub mod signature;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::catalog::PlatformTag;
use crate::logging::LogThrottle;
use hashdb::HashCatalogIdentifier;

pub use hashdb::{CatalogStore, Identification};
pub use signature::SignatureIdentifier;

/// Files smaller than this are never ROM images.
const MIN_CANDIDATE_SIZE: u64 = 1024;

/// Sidecar extensions that ship alongside dumps and are never candidates.
const SIDECAR_EXTENSIONS: &[&str] = &[".txt", ".nfo", ".xml", ".dat"];

/// Ordered notifications emitted by the identification sweep.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Log(String),
    /// Integer percentage of candidate files processed so far.
    Progress(u8),
    /// One classified file. Files that stay `unknown` are not reported.
    Identified {
        path: PathBuf,
        title: String,
        tag: PlatformTag,
    },
    Done {
        scanned: usize,
        identified: usize,
    },
}

/// Sweep the files of `source` (non-recursive), classify each candidate and
/// report over the channel. Never fails per-file; an unreadable directory is
/// the only fatal condition.
pub async fn scan_directory(
    source: PathBuf,
    identifier: Arc<HashCatalogIdentifier>,
    tx: mpsc::Sender<ScanEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    let files = list_files(&source)
        .with_context(|| format!("listing {}", source.display()))?;

    if files.is_empty() {
        let _ = tx.send(ScanEvent::Log("source folder is empty".into())).await;
        let _ = tx
            .send(ScanEvent::Done {
                scanned: 0,
                identified: 0,
            })
            .await;
        return Ok(());
    }

    info!(source = %source.display(), files = files.len(), "identification sweep starting");
    let _ = tx
        .send(ScanEvent::Log(format!("inspecting {} files", files.len())))
        .await;

    // Hashing and header reads are blocking I/O.
    tokio::task::spawn_blocking(move || {
        let throttle = LogThrottle::new(Duration::from_millis(500));
        let total = files.len();
        let mut identified = 0usize;

        for (index, path) in files.iter().enumerate() {
            if cancel.is_cancelled() {
                let _ = tx.blocking_send(ScanEvent::Log("sweep cancelled".into()));
                break;
            }

            if is_candidate(path) {
                let id = identifier.identify(path);
                // Unknown zips are almost always arcade sets.
                let tag = if id.tag.is_unknown() && has_extension(path, ".zip") {
                    PlatformTag::new("arcade")
                } else {
                    id.tag
                };

                if throttle.should_log() {
                    debug!(file = %path.display(), tag = %tag, "classified");
                }

                if !tag.is_unknown() {
                    identified += 1;
                    let _ = tx.blocking_send(ScanEvent::Identified {
                        path: path.clone(),
                        title: id.title,
                        tag,
                    });
                }
            }

            let percentage = (((index + 1) * 100) / total) as u8;
            let _ = tx.blocking_send(ScanEvent::Progress(percentage));
        }

        let _ = tx.blocking_send(ScanEvent::Done {
            scanned: total,
            identified,
        });
    })
    .await?;

    Ok(())
}

fn list_files(source: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(source)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

fn is_candidate(path: &Path) -> bool {
    let size = match path.metadata() {
        Ok(metadata) => metadata.len(),
        Err(_) => return false,
    };
    if size < MIN_CANDIDATE_SIZE {
        return false;
    }
    !SIDECAR_EXTENSIONS.iter().any(|ext| has_extension(path, ext))
}

fn has_extension(path: &Path, dotted: &str) -> bool {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_ascii_lowercase()))
        .is_some_and(|ext| ext == dotted)
}
