//! Integrity audit engine.
//!
//! Walks the reference integrity database against a [`ContentSource`] and
//! reports one status per catalog entry, incrementally, over an ordered
//! channel. Channel establishment failure aborts the run with a single
//! error; a read or hash failure on one file degrades only that entry.

pub mod source;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::{ExpectedDigest, ReferenceIntegrityDatabase};
use source::{ContentSource, SourceError};

/// Outcome for a single reference entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    /// Present with the expected digest.
    Ok,
    /// Present but the digest differs.
    HashMismatch,
    /// Not present at the source, or unreadable.
    Missing,
    /// Present; contents intentionally vary, so only presence was checked.
    PresentUnverifiable,
}

impl AuditStatus {
    pub fn describe(&self) -> &'static str {
        match self {
            AuditStatus::Ok => "OK",
            AuditStatus::HashMismatch => "HASH MISMATCH",
            AuditStatus::Missing => "MISSING",
            AuditStatus::PresentUnverifiable => "PRESENT (unverifiable)",
        }
    }
}

/// One per catalog entry, carried independently.
#[derive(Debug, Clone)]
pub struct AuditResult {
    pub name: String,
    pub status: AuditStatus,
    pub platform: String,
    pub note: String,
}

/// Ordered notifications emitted by an audit run.
#[derive(Debug, Clone)]
pub enum AuditEvent {
    Log(String),
    /// One reference entry checked.
    Entry(AuditResult),
    /// The channel to the source failed; no per-entry results were or will
    /// be produced.
    Aborted(String),
    Done {
        checked: usize,
    },
}

/// Sweeps a [`ReferenceIntegrityDatabase`] against a content source.
pub struct IntegrityAuditor {
    catalog: ReferenceIntegrityDatabase,
}

impl IntegrityAuditor {
    pub fn new(catalog: ReferenceIntegrityDatabase) -> Self {
        Self { catalog }
    }

    /// Run the sweep. Every catalog entry yields exactly one
    /// [`AuditEvent::Entry`], in catalog order, unless the listing itself
    /// fails (one [`AuditEvent::Aborted`]) or the run is cancelled.
    pub async fn run(
        &self,
        source: &dyn ContentSource,
        tx: mpsc::Sender<AuditEvent>,
        cancel: CancellationToken,
    ) {
        info!(target_source = %source.describe(), entries = self.catalog.len(), "audit starting");
        let _ = tx
            .send(AuditEvent::Log(format!(
                "auditing {} reference files on {}",
                self.catalog.len(),
                source.describe()
            )))
            .await;

        let present = match source.list().await {
            Ok(names) => names,
            Err(err) => {
                warn!(error = %err, "audit aborted");
                let _ = tx.send(AuditEvent::Aborted(err.to_string())).await;
                return;
            }
        };

        let mut checked = 0usize;
        for entry in self.catalog.entries() {
            if cancel.is_cancelled() {
                let _ = tx.send(AuditEvent::Log("audit cancelled".into())).await;
                break;
            }

            let status = if !present.iter().any(|name| name == &entry.name) {
                AuditStatus::Missing
            } else {
                match &entry.digest {
                    ExpectedDigest::Varies => AuditStatus::PresentUnverifiable,
                    ExpectedDigest::Fixed(expected) => match source.digest(&entry.name).await {
                        Ok(digest) if digest.eq_ignore_ascii_case(expected) => AuditStatus::Ok,
                        Ok(_) => AuditStatus::HashMismatch,
                        Err(SourceError::Channel(reason)) => {
                            // The session died mid-sweep; nothing further can
                            // be checked.
                            warn!(entry = %entry.name, error = %reason, "channel lost mid-audit");
                            let _ = tx.send(AuditEvent::Aborted(reason)).await;
                            return;
                        }
                        Err(SourceError::Read(reason)) => {
                            warn!(entry = %entry.name, error = %reason, "digest failed");
                            AuditStatus::Missing
                        }
                    },
                }
            };

            checked += 1;
            let _ = tx
                .send(AuditEvent::Entry(AuditResult {
                    name: entry.name.clone(),
                    status,
                    platform: entry.platform.clone(),
                    note: entry.note.clone(),
                }))
                .await;
        }

        let _ = tx.send(AuditEvent::Done { checked }).await;
    }
}
