//! Digest-catalog identification.
//!
//! When a reference dataset is available for a file's extension, the file is
//! classified and renamed by looking its full-content SHA-1 digest up in a
//! digest→title catalog. The catalogs are plain JSON files in a local cache
//! directory, populated by the fetch collaborator; this module never touches
//! the network. On a catalog miss (or when no catalog covers the extension)
//! identification defers to the signature identifier and the filename stem.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::catalog::PlatformTag;
use crate::identify::signature::SignatureIdentifier;

const HASH_BUFFER_SIZE: usize = 128 * 1024;

/// On-disk shape of one per-extension catalog file (`<ext>.json`).
#[derive(Debug, Serialize, Deserialize)]
pub struct CatalogFile {
    /// Platform every title in this catalog belongs to.
    pub platform: String,
    /// Lowercase 40-hex SHA-1 digest → canonical title.
    pub titles: HashMap<String, String>,
}

struct ExtensionCatalog {
    platform: PlatformTag,
    titles: HashMap<String, String>,
}

/// Immutable, load-once store of per-extension title catalogs.
pub struct CatalogStore {
    catalogs: HashMap<String, ExtensionCatalog>,
}

impl CatalogStore {
    /// Load every `<ext>.json` catalog under `cache_dir`. A missing cache
    /// directory yields an empty store; malformed files are skipped with a
    /// warning.
    pub fn open(cache_dir: &Path) -> Self {
        let mut catalogs = HashMap::new();
        let entries = match std::fs::read_dir(cache_dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(dir = %cache_dir.display(), error = %err, "no catalog cache");
                return Self { catalogs };
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match load_catalog_file(&path) {
                Ok(file) => {
                    debug!(
                        ext = stem,
                        platform = %file.platform,
                        titles = file.titles.len(),
                        "loaded title catalog"
                    );
                    catalogs.insert(
                        format!(".{}", stem.to_ascii_lowercase()),
                        ExtensionCatalog {
                            platform: PlatformTag::new(&file.platform),
                            titles: file.titles,
                        },
                    );
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping malformed catalog");
                }
            }
        }

        Self { catalogs }
    }

    pub fn empty() -> Self {
        Self {
            catalogs: HashMap::new(),
        }
    }

    /// Whether any catalog covers the given dotted extension.
    pub fn covers(&self, ext: &str) -> bool {
        self.catalogs.contains_key(ext)
    }

    pub fn lookup(&self, ext: &str, digest: &str) -> Option<(&PlatformTag, &str)> {
        let catalog = self.catalogs.get(ext)?;
        let title = catalog.titles.get(digest)?;
        Some((&catalog.platform, title.as_str()))
    }

    pub fn catalog_count(&self) -> usize {
        self.catalogs.len()
    }
}

fn load_catalog_file(path: &Path) -> anyhow::Result<CatalogFile> {
    let reader = BufReader::new(File::open(path)?);
    let file: CatalogFile = serde_json::from_reader(reader)?;
    for digest in file.titles.keys() {
        if digest.len() != 40 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            anyhow::bail!("invalid digest key `{digest}`");
        }
    }
    Ok(file)
}

/// Result of one identification: platform tag plus display title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    pub tag: PlatformTag,
    pub title: String,
}

/// Catalog-first identifier with signature fallback.
pub struct HashCatalogIdentifier {
    store: CatalogStore,
    fallback: SignatureIdentifier,
}

impl HashCatalogIdentifier {
    pub fn new(store: CatalogStore) -> Self {
        Self {
            store,
            fallback: SignatureIdentifier::new(),
        }
    }

    /// Classify a file and pick its display title.
    ///
    /// The full-content digest is only computed when a catalog actually
    /// covers the file's extension; otherwise this is exactly a signature
    /// identification with the filename stem as title.
    pub fn identify(&self, path: &Path) -> Identification {
        if let Some(ext) = dotted_extension(path)
            && self.store.covers(&ext)
        {
            match sha1_of_file(path) {
                Ok(digest) => {
                    if let Some((tag, title)) = self.store.lookup(&ext, &digest) {
                        return Identification {
                            tag: tag.clone(),
                            title: title.to_string(),
                        };
                    }
                    debug!(path = %path.display(), "digest not in catalog, using signature");
                }
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "digest failed, using signature");
                }
            }
        }

        Identification {
            tag: self.fallback.identify(path),
            title: stem_of(path),
        }
    }
}

fn dotted_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_ascii_lowercase()))
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Streaming SHA-1 of a file, lowercase hex.
pub fn sha1_of_file(path: &Path) -> std::io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(HASH_BUFFER_SIZE, file);
    let mut hasher = Sha1::new();
    let mut buffer = [0u8; HASH_BUFFER_SIZE];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_catalog(dir: &Path, ext: &str, platform: &str, digest: &str, title: &str) {
        let file = CatalogFile {
            platform: platform.to_string(),
            titles: HashMap::from([(digest.to_string(), title.to_string())]),
        };
        std::fs::write(
            dir.join(format!("{ext}.json")),
            serde_json::to_vec(&file).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn catalog_hit_wins_over_signature() {
        let temp = tempdir().unwrap();
        let cache = temp.path().join("cache");
        std::fs::create_dir_all(&cache).unwrap();

        let rom = temp.path().join("dump_0231.sfc");
        std::fs::write(&rom, b"catalogued rom body").unwrap();
        let digest = sha1_of_file(&rom).unwrap();
        write_catalog(&cache, "sfc", "snes", &digest, "Actual Title (USA)");

        let identifier = HashCatalogIdentifier::new(CatalogStore::open(&cache));
        let id = identifier.identify(&rom);
        assert_eq!(id.tag, PlatformTag::new("snes"));
        assert_eq!(id.title, "Actual Title (USA)");
    }

    #[test]
    fn catalog_miss_defers_to_signature_and_stem() {
        let temp = tempdir().unwrap();
        let cache = temp.path().join("cache");
        std::fs::create_dir_all(&cache).unwrap();
        write_catalog(&cache, "sfc", "snes", &"0".repeat(40), "Someone Else");

        let rom = temp.path().join("My Game.sfc");
        std::fs::write(&rom, b"not in the catalog").unwrap();

        let identifier = HashCatalogIdentifier::new(CatalogStore::open(&cache));
        let id = identifier.identify(&rom);
        assert_eq!(id.tag, PlatformTag::new("snes"));
        assert_eq!(id.title, "My Game");
    }

    #[test]
    fn absent_cache_directory_yields_empty_store() {
        let store = CatalogStore::open(Path::new("/definitely/not/here"));
        assert_eq!(store.catalog_count(), 0);
        assert!(!store.covers(".sfc"));
    }

    #[test]
    fn malformed_catalogs_are_skipped() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("sfc.json"), b"{ not json").unwrap();
        std::fs::write(
            temp.path().join("gba.json"),
            serde_json::json!({"platform": "gba", "titles": {"tooshort": "X"}}).to_string(),
        )
        .unwrap();
        let store = CatalogStore::open(temp.path());
        assert_eq!(store.catalog_count(), 0);
    }
}
