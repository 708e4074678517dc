//! Platform profile table.
//!
//! Every supported system is described by one immutable [`PlatformProfile`]:
//! the canonical file extension, the folder segment the device expects under
//! its content root, and which container the platform prefers when
//! compression is requested. The table is built once at startup and passed
//! into the engines explicitly.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier for an emulated platform, e.g. `snes` or `megadrive`.
///
/// `unknown` is the explicit non-match sentinel; identification never fails,
/// it degrades to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformTag(String);

impl PlatformTag {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(tag: impl AsRef<str>) -> Self {
        Self(tag.as_ref().trim().to_ascii_lowercase())
    }

    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlatformTag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Container a platform prefers when repackaging is requested for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// Single-entry deflated zip archive.
    Archive,
    /// Compressed optical-disc image produced by an external conversion tool.
    OpticalImage,
    /// No repackaging; the file is renamed to the canonical extension only.
    None,
}

/// Immutable per-platform record.
#[derive(Debug, Clone)]
pub struct PlatformProfile {
    pub tag: PlatformTag,
    /// Canonical extension, with leading dot.
    pub extension: String,
    /// Folder segment under the device content root.
    pub folder: String,
    pub container: ContainerKind,
}

/// Tag, canonical extension, destination folder, preferred container.
///
/// Folder and extension values follow the device's stock layout; the archive
/// set is restricted to cartridge/arcade systems whose emulators read zips
/// directly.
#[rustfmt::skip]
const PROFILES: &[(&str, &str, &str, ContainerKind)] = &[
    ("nes",               ".nes",    "nes",               ContainerKind::Archive),
    ("snes",              ".sfc",    "snes",              ContainerKind::Archive),
    ("n64",               ".z64",    "n64",               ContainerKind::None),
    ("gc",                ".rvz",    "gc",                ContainerKind::None),
    ("wii",               ".wbfs",   "wii",               ContainerKind::None),
    ("wiiu",              ".wua",    "wiiu",              ContainerKind::None),
    ("gb",                ".gb",     "gb",                ContainerKind::Archive),
    ("gbc",               ".gbc",    "gbc",               ContainerKind::Archive),
    ("gba",               ".gba",    "gba",               ContainerKind::Archive),
    ("nds",               ".nds",    "nds",               ContainerKind::Archive),
    ("3ds",               ".3ds",    "3ds",               ContainerKind::None),
    ("virtualboy",        ".vb",     "virtualboy",        ContainerKind::None),
    ("pokemonmini",       ".min",    "pokemonmini",       ContainerKind::None),
    ("mastersystem",      ".sms",    "mastersystem",      ContainerKind::Archive),
    ("megadrive",         ".md",     "megadrive",         ContainerKind::Archive),
    ("sega32x",           ".32x",    "sega32x",           ContainerKind::Archive),
    ("segacd",            ".chd",    "segacd",            ContainerKind::OpticalImage),
    ("saturn",            ".iso",    "saturn",            ContainerKind::OpticalImage),
    ("dreamcast",         ".cdi",    "dreamcast",         ContainerKind::OpticalImage),
    ("gamegear",          ".gg",     "gamegear",          ContainerKind::None),
    ("sg1000",            ".sg",     "sg1000",            ContainerKind::None),
    ("psx",               ".pbp",    "psx",               ContainerKind::OpticalImage),
    ("ps2",               ".iso",    "ps2",               ContainerKind::OpticalImage),
    ("psp",               ".cso",    "psp",               ContainerKind::None),
    ("psvita",            ".zip",    "psvita",            ContainerKind::None),
    ("atari2600",         ".a26",    "atari2600",         ContainerKind::Archive),
    ("atari5200",         ".a52",    "atari5200",         ContainerKind::None),
    ("atari7800",         ".a78",    "atari7800",         ContainerKind::None),
    ("atarijaguar",       ".j64",    "atarijaguar",       ContainerKind::None),
    ("atarilynx",         ".lnx",    "atarilynx",         ContainerKind::None),
    ("arcade",            ".zip",    "arcade",            ContainerKind::Archive),
    ("neogeo",            ".zip",    "neogeo",            ContainerKind::Archive),
    ("cps1",              ".zip",    "cps1",              ContainerKind::None),
    ("cps2",              ".zip",    "cps2",              ContainerKind::None),
    ("cps3",              ".zip",    "cps3",              ContainerKind::None),
    ("mame",              ".zip",    "mame",              ContainerKind::Archive),
    ("fbneo",             ".zip",    "fbneo",             ContainerKind::Archive),
    ("atomiswave",        ".zip",    "atomiswave",        ContainerKind::None),
    ("naomi",             ".zip",    "naomi",             ContainerKind::None),
    ("amiga",             ".lha",    "amiga",             ContainerKind::None),
    ("c64",               ".d64",    "c64",               ContainerKind::None),
    ("msx",               ".rom",    "msx",               ContainerKind::Archive),
    ("zxspectrum",        ".tzx",    "zxspectrum",        ContainerKind::None),
    ("amstradcpc",        ".dsk",    "amstradcpc",        ContainerKind::None),
    ("dos",               ".zip",    "dos",               ContainerKind::Archive),
    ("x68000",            ".dim",    "x68000",            ContainerKind::None),
    ("3do",               ".iso",    "3do",               ContainerKind::OpticalImage),
    ("pce",               ".pce",    "pcengine",          ContainerKind::Archive),
    ("pcecd",             ".cue",    "pcenginecd",        ContainerKind::OpticalImage),
    ("colecovision",      ".col",    "colecovision",      ContainerKind::None),
    ("intellivision",     ".int",    "intellivision",     ContainerKind::None),
    ("vectrex",           ".vec",    "vectrex",           ContainerKind::None),
    ("wonderswan",        ".ws",     "wonderswan",        ContainerKind::None),
    ("wonderswancolor",   ".wsc",    "wonderswancolor",   ContainerKind::None),
    ("neogeopocket",      ".ngp",    "neogeopocket",      ContainerKind::None),
    ("neogeopocketcolor", ".ngc",    "neogeopocketcolor", ContainerKind::None),
    ("pico8",             ".p8.png", "pico8",             ContainerKind::None),
    ("tic80",             ".tic",    "tic80",             ContainerKind::None),
];

/// Immutable lookup table of [`PlatformProfile`] records, indexed by tag.
#[derive(Debug, Clone)]
pub struct PlatformTable {
    profiles: HashMap<PlatformTag, PlatformProfile>,
}

impl PlatformTable {
    /// Build the built-in table. Load once and share.
    pub fn builtin() -> Self {
        let profiles = PROFILES
            .iter()
            .map(|&(tag, extension, folder, container)| {
                let tag = PlatformTag::new(tag);
                (
                    tag.clone(),
                    PlatformProfile {
                        tag,
                        extension: extension.to_string(),
                        folder: folder.to_string(),
                        container,
                    },
                )
            })
            .collect();
        Self { profiles }
    }

    pub fn profile(&self, tag: &PlatformTag) -> Option<&PlatformProfile> {
        self.profiles.get(tag)
    }

    pub fn contains(&self, tag: &PlatformTag) -> bool {
        self.profiles.contains_key(tag)
    }

    /// Whether the platform's preferred container is a generic archive.
    pub fn archive_safe(&self, tag: &PlatformTag) -> bool {
        self.profile(tag)
            .is_some_and(|p| p.container == ContainerKind::Archive)
    }

    /// All known tags, sorted for stable presentation.
    pub fn tags(&self) -> Vec<&PlatformTag> {
        let mut tags: Vec<_> = self.profiles.keys().collect();
        tags.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        tags
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_covers_core_systems() {
        let table = PlatformTable::builtin();
        for tag in ["snes", "megadrive", "psx", "gba", "neogeo", "pce"] {
            assert!(table.contains(&PlatformTag::new(tag)), "missing {tag}");
        }
        assert!(!table.contains(&PlatformTag::unknown()));
    }

    #[test]
    fn pc_engine_folders_differ_from_tags() {
        let table = PlatformTable::builtin();
        let pce = table.profile(&PlatformTag::new("pce")).unwrap();
        assert_eq!(pce.folder, "pcengine");
        let pcecd = table.profile(&PlatformTag::new("pcecd")).unwrap();
        assert_eq!(pcecd.folder, "pcenginecd");
        assert_eq!(pcecd.container, ContainerKind::OpticalImage);
    }

    #[test]
    fn archive_set_matches_cartridge_systems() {
        let table = PlatformTable::builtin();
        for tag in [
            "snes",
            "megadrive",
            "nes",
            "gba",
            "gb",
            "gbc",
            "nds",
            "mastersystem",
            "sega32x",
            "arcade",
            "neogeo",
            "fbneo",
            "mame",
            "pce",
            "msx",
            "dos",
            "atari2600",
        ] {
            assert!(table.archive_safe(&PlatformTag::new(tag)), "{tag}");
        }
        // Optical and passthrough systems are never zipped.
        assert!(!table.archive_safe(&PlatformTag::new("psx")));
        assert!(!table.archive_safe(&PlatformTag::new("naomi")));
        assert!(!table.archive_safe(&PlatformTag::new("n64")));
    }

    #[test]
    fn tag_normalizes_case_and_whitespace() {
        assert_eq!(PlatformTag::new(" SNES ").as_str(), "snes");
        assert!(PlatformTag::new("UNKNOWN").is_unknown());
    }
}
