//! Reference blob integrity database.
//!
//! Firmware and BIOS images have to be bit-exact for emulation to behave, so
//! each catalog entry carries the known-good 128-bit digest of the blob.
//! Archive bundles whose internal contents legitimately vary between
//! releases (arcade BIOS sets) carry the `Varies` sentinel instead and can
//! only be checked for presence.

/// Expected digest of a reference blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedDigest {
    /// Lowercase hex digest the blob must hash to.
    Fixed(String),
    /// Contents vary release-to-release; only presence is meaningful.
    Varies,
}

/// One required firmware/BIOS file.
#[derive(Debug, Clone)]
pub struct ReferenceEntry {
    /// File name as it must appear in the device's bios directory.
    pub name: String,
    pub digest: ExpectedDigest,
    /// Platform label for display, e.g. "PS1 (US)".
    pub platform: String,
    pub note: String,
}

impl ReferenceEntry {
    pub fn fixed(name: &str, digest: &str, platform: &str, note: &str) -> Self {
        Self {
            name: name.to_string(),
            digest: ExpectedDigest::Fixed(digest.to_string()),
            platform: platform.to_string(),
            note: note.to_string(),
        }
    }

    pub fn varies(name: &str, platform: &str, note: &str) -> Self {
        Self {
            name: name.to_string(),
            digest: ExpectedDigest::Varies,
            platform: platform.to_string(),
            note: note.to_string(),
        }
    }
}

/// Immutable catalog of required reference blobs, identical across audit
/// targets. Iteration order is catalog order.
#[derive(Debug, Clone)]
pub struct ReferenceIntegrityDatabase {
    entries: Vec<ReferenceEntry>,
}

impl ReferenceIntegrityDatabase {
    /// The shipped catalog covering every supported platform family.
    pub fn builtin() -> Self {
        let entries = vec![
            // Sony
            ReferenceEntry::fixed(
                "scph5500.bin",
                "8dd7d5296a650fac7319bce665a6a53c",
                "PS1 (JP)",
                "Required for Japanese titles",
            ),
            ReferenceEntry::fixed(
                "scph5501.bin",
                "490f666e1afb15b7362b406ed1cea246",
                "PS1 (US)",
                "Required for US titles",
            ),
            ReferenceEntry::fixed(
                "scph5502.bin",
                "32736f17079d0b2b7024407c39ad3050",
                "PS1 (EU)",
                "Required for European titles",
            ),
            ReferenceEntry::fixed(
                "psxonpsp660.bin",
                "c53ca5908936d412331790f4426c6c33",
                "PS1 (PSP)",
                "Best performance under DuckStation",
            ),
            ReferenceEntry::fixed(
                "scph39001.bin",
                "d5ce2c7d119f563ce04bc04dbc3a323e",
                "PS2 (US)",
                "Works with PCSX2 and Play!",
            ),
            // Sega
            ReferenceEntry::fixed(
                "bios_CD_U.bin",
                "2efd743390ffad365a45330c6a463c61",
                "Sega CD (US)",
                "Model 1 v1.10",
            ),
            ReferenceEntry::fixed(
                "bios_CD_E.bin",
                "e66fa1dc5820d254611fdcdba0662372",
                "Sega CD (EU)",
                "Model 1 v1.10",
            ),
            ReferenceEntry::fixed(
                "bios_CD_J.bin",
                "278a93da838174dadabe39d897c51591",
                "Sega CD (JP)",
                "Model 1 v1.00",
            ),
            ReferenceEntry::fixed(
                "saturn_bios.bin",
                "af58e0fd19355465bcde8a00508933b9",
                "Saturn (JP)",
                "Stock Saturn BIOS",
            ),
            ReferenceEntry::fixed(
                "mpr-17933.bin",
                "3240872c70984b6cbfda1586cab68dbe",
                "Saturn (US/EU)",
                "Common alternative",
            ),
            ReferenceEntry::fixed(
                "dc_boot.bin",
                "e10c53c2f8b90bab96ead2d368858623",
                "Dreamcast",
                "Bootloader",
            ),
            ReferenceEntry::fixed(
                "dc_flash.bin",
                "0a93f7940c455902bea6e392dfde92a4",
                "Dreamcast",
                "Flash (region free)",
            ),
            ReferenceEntry::varies("naomi.zip", "Naomi Arcade", "MAME/FBNeo BIOS set"),
            ReferenceEntry::varies("awbios.zip", "Atomiswave", "Atomiswave BIOS set"),
            // Nintendo
            ReferenceEntry::fixed(
                "gba_bios.bin",
                "a860e8c0b6ec573d1e1e61f1bc566d7f",
                "GBA",
                "Game Boy Advance boot ROM",
            ),
            ReferenceEntry::fixed(
                "bios7.bin",
                "df692a80a5b1bc3129f3c163e596ba93",
                "NDS",
                "ARM7 BIOS",
            ),
            ReferenceEntry::fixed(
                "bios9.bin",
                "a392174eb3e572fed6c453309e67250a",
                "NDS",
                "ARM9 BIOS",
            ),
            ReferenceEntry::fixed(
                "firmware.bin",
                "e45033d9c0fa367bf1609fe794715278",
                "NDS",
                "Firmware (optional)",
            ),
            ReferenceEntry::fixed(
                "disksys.rom",
                "ca30b6d9c025f6e804f58f7004f98d78",
                "Famicom Disk",
                "FDS BIOS",
            ),
            // SNK / arcade
            ReferenceEntry::varies("neogeo.zip", "Neo Geo", "Essential; use a recent FBNeo/MAME set"),
            ReferenceEntry::fixed(
                "panafz10.bin",
                "51f2f43ae2f3508a14d9f54597e2d365",
                "3DO",
                "Panasonic FZ-10",
            ),
            ReferenceEntry::fixed(
                "goldstar.bin",
                "92bd8942200701b223067eb0155a3062",
                "3DO",
                "Goldstar model",
            ),
            // Computers
            ReferenceEntry::fixed(
                "kick34005.A500",
                "854084365796a5b51f0f443836173d32",
                "Amiga 500",
                "Kickstart 1.3",
            ),
            ReferenceEntry::fixed(
                "kick40068.A1200",
                "646773759326fbac3a2311fdc8cfef39",
                "Amiga 1200",
                "Kickstart 3.1",
            ),
            ReferenceEntry::fixed(
                "syscard3.pce",
                "38179df8f4d9d9a936d102a3a24b3d74",
                "PC Engine CD",
                "System Card 3.0",
            ),
            ReferenceEntry::fixed(
                "msx2.rom",
                "ec1657490d292425510b64d8a1c6a084",
                "MSX2",
                "Japanese",
            ),
            ReferenceEntry::fixed(
                "keropi.rom",
                "2f78326a575c755c06495df0240d43a6",
                "X68000",
                "IPL ROM",
            ),
        ];
        Self { entries }
    }

    /// Catalog with caller-supplied entries; used where the reference set is
    /// parameterized.
    pub fn from_entries(entries: Vec<ReferenceEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&ReferenceEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_carries_gba_boot_digest() {
        let db = ReferenceIntegrityDatabase::builtin();
        let entry = db.get("gba_bios.bin").unwrap();
        assert_eq!(
            entry.digest,
            ExpectedDigest::Fixed("a860e8c0b6ec573d1e1e61f1bc566d7f".to_string())
        );
        assert_eq!(entry.platform, "GBA");
    }

    #[test]
    fn arcade_bundles_use_the_varies_sentinel() {
        let db = ReferenceIntegrityDatabase::builtin();
        for name in ["neogeo.zip", "naomi.zip", "awbios.zip"] {
            assert_eq!(db.get(name).unwrap().digest, ExpectedDigest::Varies);
        }
    }

    #[test]
    fn fixed_digests_are_lowercase_hex() {
        let db = ReferenceIntegrityDatabase::builtin();
        for entry in db.entries() {
            if let ExpectedDigest::Fixed(digest) = &entry.digest {
                assert_eq!(digest.len(), 32, "{}", entry.name);
                assert!(
                    digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()),
                    "{}",
                    entry.name
                );
            }
        }
    }
}
