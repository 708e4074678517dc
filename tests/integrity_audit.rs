use std::path::Path;

use romferry::audit::source::{LocalDirSource, md5_of_file};
use romferry::audit::{AuditEvent, AuditResult, AuditStatus, IntegrityAuditor};
use romferry::catalog::{ExpectedDigest, ReferenceEntry, ReferenceIntegrityDatabase};
use tempfile::tempdir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

async fn audit_dir(catalog: ReferenceIntegrityDatabase, dir: &Path) -> Vec<AuditEvent> {
    let auditor = IntegrityAuditor::new(catalog);
    let source = LocalDirSource::new(dir);
    let (tx, mut rx) = mpsc::channel(128);
    auditor.run(&source, tx, CancellationToken::new()).await;

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn entry_results(events: &[AuditEvent]) -> Vec<AuditResult> {
    events
        .iter()
        .filter_map(|e| match e {
            AuditEvent::Entry(result) => Some(result.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn bit_exact_blob_audits_ok() {
    let temp = tempdir().unwrap();
    let blob = temp.path().join("gba_bios.bin");
    std::fs::write(&blob, b"boot rom payload").unwrap();
    let expected = md5_of_file(&blob).unwrap();

    let catalog = ReferenceIntegrityDatabase::from_entries(vec![ReferenceEntry::fixed(
        "gba_bios.bin",
        &expected,
        "GBA",
        "Game Boy Advance boot ROM",
    )]);

    let results = entry_results(&audit_dir(catalog, temp.path()).await);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, AuditStatus::Ok);
    assert_eq!(results[0].platform, "GBA");
}

#[tokio::test]
async fn one_flipped_byte_is_a_hash_mismatch() {
    let temp = tempdir().unwrap();
    let blob = temp.path().join("gba_bios.bin");
    std::fs::write(&blob, b"boot rom payload").unwrap();
    let expected = md5_of_file(&blob).unwrap();

    let mut corrupted = b"boot rom payload".to_vec();
    corrupted[0] ^= 0x01;
    std::fs::write(&blob, corrupted).unwrap();

    let catalog = ReferenceIntegrityDatabase::from_entries(vec![ReferenceEntry::fixed(
        "gba_bios.bin",
        &expected,
        "GBA",
        "",
    )]);

    let results = entry_results(&audit_dir(catalog, temp.path()).await);
    assert_eq!(results[0].status, AuditStatus::HashMismatch);
}

#[tokio::test]
async fn absent_blob_is_missing() {
    let temp = tempdir().unwrap();
    let catalog = ReferenceIntegrityDatabase::from_entries(vec![ReferenceEntry::fixed(
        "gba_bios.bin",
        "a860e8c0b6ec573d1e1e61f1bc566d7f",
        "GBA",
        "",
    )]);

    let results = entry_results(&audit_dir(catalog, temp.path()).await);
    assert_eq!(results[0].status, AuditStatus::Missing);
}

#[tokio::test]
async fn varies_sentinel_only_checks_presence() {
    let temp = tempdir().unwrap();
    std::fs::write(temp.path().join("neogeo.zip"), b"whatever the set is").unwrap();

    let catalog = ReferenceIntegrityDatabase::from_entries(vec![
        ReferenceEntry::varies("neogeo.zip", "Neo Geo", ""),
        ReferenceEntry::varies("naomi.zip", "Naomi Arcade", ""),
    ]);

    let results = entry_results(&audit_dir(catalog, temp.path()).await);
    assert_eq!(results[0].status, AuditStatus::PresentUnverifiable);
    assert_eq!(results[1].status, AuditStatus::Missing);
}

#[tokio::test]
async fn builtin_catalog_sweeps_one_result_per_entry() {
    let temp = tempdir().unwrap();
    let catalog = ReferenceIntegrityDatabase::builtin();
    let total = catalog.len();

    let events = audit_dir(catalog, temp.path()).await;
    let results = entry_results(&events);
    assert_eq!(results.len(), total);
    assert!(results.iter().all(|r| r.status == AuditStatus::Missing));
    assert!(matches!(events.last(), Some(AuditEvent::Done { checked }) if *checked == total));
}

#[test]
fn shipped_catalog_carries_the_gba_reference_digest() {
    let catalog = ReferenceIntegrityDatabase::builtin();
    let entry = catalog.get("gba_bios.bin").unwrap();
    assert_eq!(
        entry.digest,
        ExpectedDigest::Fixed("a860e8c0b6ec573d1e1e61f1bc566d7f".into())
    );
    assert_eq!(
        catalog.get("neogeo.zip").unwrap().digest,
        ExpectedDigest::Varies
    );
}
