//! Header-based platform identification.
//!
//! Classifies a file by inspecting fixed byte offsets in its header for
//! known platform signatures. Rules live in an ordered table and are
//! evaluated uniformly; the first match wins. Files whose header matches
//! nothing fall back to an extension table, and an unmatched extension
//! degrades to the `unknown` sentinel. I/O errors never surface: an
//! unreadable file is classified by extension alone.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::catalog::PlatformTag;

/// The PSP marker sits exactly at the 32 KiB boundary, so the probe reads
/// four bytes past it.
const PROBE_LEN: usize = 32 * 1024 + 4;

/// Header window plus the total file length, which two rules need.
struct Probe {
    header: Vec<u8>,
    file_len: u64,
}

impl Probe {
    fn bytes(&self, start: usize, len: usize) -> Option<&[u8]> {
        self.header.get(start..start + len)
    }

    fn byte(&self, offset: usize) -> Option<u8> {
        self.header.get(offset).copied()
    }

    /// Whether `needle` occurs anywhere in the probed header.
    fn contains(&self, needle: &[u8]) -> bool {
        self.header
            .windows(needle.len())
            .any(|window| window == needle)
    }

    /// Whether `needle` occurs within `header[start..end]`.
    fn contains_within(&self, start: usize, end: usize, needle: &[u8]) -> bool {
        match self.header.get(start..end.min(self.header.len())) {
            Some(slice) => slice.windows(needle.len()).any(|window| window == needle),
            None => false,
        }
    }
}

type DetectFn = fn(&Probe) -> Option<&'static str>;

struct HeaderRule {
    name: &'static str,
    detect: DetectFn,
}

/// Ordered signature rules; first match wins.
static HEADER_RULES: &[HeaderRule] = &[
    HeaderRule { name: "sega-cartridge", detect: detect_megadrive },
    HeaderRule { name: "sega-saturn", detect: detect_saturn },
    HeaderRule { name: "sega-dreamcast", detect: detect_dreamcast },
    HeaderRule { name: "n64-boot", detect: detect_n64 },
    HeaderRule { name: "ines", detect: detect_nes },
    HeaderRule { name: "gameboy-logo", detect: detect_gameboy },
    HeaderRule { name: "gba-entry", detect: detect_gba },
    HeaderRule { name: "playstation", detect: detect_psx },
    HeaderRule { name: "psp-image", detect: detect_psp },
    HeaderRule { name: "pce-padding", detect: detect_pce },
    HeaderRule { name: "coleco-header", detect: detect_colecovision },
];

fn detect_megadrive(probe: &Probe) -> Option<&'static str> {
    probe
        .contains_within(0x100, 0x108, b"SEGA")
        .then_some("megadrive")
}

fn detect_saturn(probe: &Probe) -> Option<&'static str> {
    probe.contains(b"SEGA SEGASATURN").then_some("saturn")
}

fn detect_dreamcast(probe: &Probe) -> Option<&'static str> {
    probe.contains(b"SEGA SEGAKATANA").then_some("dreamcast")
}

fn detect_n64(probe: &Probe) -> Option<&'static str> {
    // Big-endian, byte-swapped and little-endian dumps of the boot magic.
    const MAGICS: [[u8; 4]; 3] = [
        [0x80, 0x37, 0x12, 0x40],
        [0x40, 0x12, 0x37, 0x80],
        [0x37, 0x80, 0x40, 0x12],
    ];
    let head = probe.bytes(0, 4)?;
    MAGICS
        .iter()
        .any(|magic| head == magic.as_slice())
        .then_some("n64")
}

fn detect_nes(probe: &Probe) -> Option<&'static str> {
    (probe.bytes(0, 4)? == b"NES\x1a".as_slice()).then_some("nes")
}

fn detect_gameboy(probe: &Probe) -> Option<&'static str> {
    const BOOT_LOGO: &[u8] = &[0xCE, 0xED, 0x66, 0x66, 0xCC, 0x0D, 0x00, 0x0B];
    if !probe.contains_within(0x104, 0x114, BOOT_LOGO) {
        return None;
    }
    // Cartridge type byte distinguishes Color carts.
    match probe.byte(0x143) {
        Some(0x80) | Some(0xC0) => Some("gbc"),
        _ => Some("gb"),
    }
}

fn detect_gba(probe: &Probe) -> Option<&'static str> {
    const ENTRY_MAGIC: [u8; 6] = [0x24, 0xFF, 0xAE, 0x51, 0x69, 0x9A];
    (probe.bytes(0x04, 6)? == ENTRY_MAGIC.as_slice()).then_some("gba")
}

fn detect_psx(probe: &Probe) -> Option<&'static str> {
    (probe.contains(b"PLAYSTATION") || probe.contains(b"Sony Computer Entertainment"))
        .then_some("psx")
}

fn detect_psp(probe: &Probe) -> Option<&'static str> {
    if probe.bytes(0x8000, 4).is_some_and(|w| w == b"PSP ".as_slice()) {
        return Some("psp");
    }
    (probe.bytes(0, 4)? == b"CISO".as_slice()).then_some("psp")
}

fn detect_pce(probe: &Probe) -> Option<&'static str> {
    // Raw dumps carry a 512-byte copier header over 8 KiB banks.
    (probe.file_len > 0x200 && probe.file_len % 8192 == 512).then_some("pce")
}

fn detect_colecovision(probe: &Probe) -> Option<&'static str> {
    (probe.bytes(0, 2)? == [0xAA, 0x55].as_slice() && probe.contains(b"COLECO"))
        .then_some("colecovision")
}

/// Extension fallback, consulted when no header rule matches.
#[rustfmt::skip]
static EXTENSION_FALLBACK: &[(&str, &str)] = &[
    (".smc", "snes"), (".sfc", "snes"),
    (".gen", "megadrive"), (".md", "megadrive"), (".bin", "megadrive"),
    (".nes", "nes"),
    (".z64", "n64"), (".n64", "n64"),
    (".iso", "ps2"), (".pbp", "psx"), (".cso", "psp"),
    (".rvz", "gc"), (".wbfs", "wii"), (".wua", "wiiu"),
    (".gba", "gba"), (".gbc", "gbc"), (".gb", "gb"), (".nds", "nds"),
    (".sms", "mastersystem"), (".gg", "gamegear"),
    (".a26", "atari2600"),
    (".zip", "arcade"),
    (".lha", "amiga"), (".d64", "c64"), (".rom", "msx"),
    (".pce", "pce"),
    (".ws", "wonderswan"), (".wsc", "wonderswancolor"),
    (".ngc", "neogeopocketcolor"), (".ngp", "neogeopocket"),
    (".p8", "pico8"), (".tic", "tic80"),
];

/// Classifies files by binary signature with an extension fallback.
///
/// `identify` is a pure function of file content plus extension: no side
/// effects, never errors.
#[derive(Debug, Default, Clone)]
pub struct SignatureIdentifier;

impl SignatureIdentifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a file. Unreadable content degrades to the extension
    /// fallback; an unmatched extension degrades to `unknown`.
    pub fn identify(&self, path: &Path) -> PlatformTag {
        match read_probe(path) {
            Ok(probe) => {
                if let Some(tag) = sniff(&probe) {
                    return tag;
                }
            }
            Err(err) => {
                debug!(path = %path.display(), error = %err, "header unreadable, using extension");
            }
        }
        self.identify_by_extension(path)
    }

    /// Extension-table classification only.
    pub fn identify_by_extension(&self, path: &Path) -> PlatformTag {
        let Some(ext) = extension_of(path) else {
            return PlatformTag::unknown();
        };
        EXTENSION_FALLBACK
            .iter()
            .find(|(candidate, _)| *candidate == ext)
            .map(|(_, tag)| PlatformTag::new(tag))
            .unwrap_or_else(PlatformTag::unknown)
    }
}

fn sniff(probe: &Probe) -> Option<PlatformTag> {
    for rule in HEADER_RULES {
        if let Some(tag) = (rule.detect)(probe) {
            debug!(rule = rule.name, tag, "header signature matched");
            return Some(PlatformTag::new(tag));
        }
    }
    None
}

fn read_probe(path: &Path) -> std::io::Result<Probe> {
    let file_len = std::fs::metadata(path)?.len();
    let mut file = File::open(path)?;
    let mut header = vec![0u8; PROBE_LEN.min(file_len as usize)];
    file.read_exact(&mut header)?;
    Ok(Probe { header, file_len })
}

/// Lowercased extension with leading dot, e.g. `.sfc`.
fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(header: Vec<u8>) -> Probe {
        let file_len = header.len() as u64;
        Probe { header, file_len }
    }

    #[test]
    fn sega_marker_window_is_half_open() {
        let mut header = vec![0u8; 0x200];
        header[0x104..0x108].copy_from_slice(b"SEGA");
        assert_eq!(sniff(&probe(header)), Some(PlatformTag::new("megadrive")));

        let mut outside = vec![0u8; 0x200];
        outside[0x108..0x10C].copy_from_slice(b"SEGA");
        assert_eq!(sniff(&probe(outside)), None);
    }

    #[test]
    fn n64_matches_all_three_byte_orders() {
        for magic in [
            [0x80, 0x37, 0x12, 0x40],
            [0x40, 0x12, 0x37, 0x80],
            [0x37, 0x80, 0x40, 0x12],
        ] {
            let mut header = vec![0u8; 64];
            header[..4].copy_from_slice(&magic);
            assert_eq!(sniff(&probe(header)), Some(PlatformTag::new("n64")));
        }
    }

    #[test]
    fn cartridge_type_byte_splits_gb_and_gbc() {
        let mut header = vec![0u8; 0x150];
        header[0x104..0x10C].copy_from_slice(&[0xCE, 0xED, 0x66, 0x66, 0xCC, 0x0D, 0x00, 0x0B]);
        header[0x143] = 0x00;
        assert_eq!(sniff(&probe(header.clone())), Some(PlatformTag::new("gb")));
        header[0x143] = 0xC0;
        assert_eq!(sniff(&probe(header)), Some(PlatformTag::new("gbc")));
    }

    #[test]
    fn pce_heuristic_requires_copier_padding() {
        let padded = Probe {
            header: vec![0u8; 64],
            file_len: 8192 * 32 + 512,
        };
        assert_eq!(sniff(&padded), Some(PlatformTag::new("pce")));

        let unpadded = Probe {
            header: vec![0u8; 64],
            file_len: 8192 * 32,
        };
        assert_eq!(sniff(&unpadded), None);
    }

    #[test]
    fn ciso_image_is_psp() {
        let mut header = vec![0u8; 64];
        header[..4].copy_from_slice(b"CISO");
        assert_eq!(sniff(&probe(header)), Some(PlatformTag::new("psp")));
    }

    #[test]
    fn extension_fallback_is_case_insensitive() {
        let identifier = SignatureIdentifier::new();
        assert_eq!(
            identifier.identify_by_extension(Path::new("Game.SMC")),
            PlatformTag::new("snes")
        );
        assert_eq!(
            identifier.identify_by_extension(Path::new("game.xyz")),
            PlatformTag::unknown()
        );
        assert_eq!(
            identifier.identify_by_extension(Path::new("noext")),
            PlatformTag::unknown()
        );
    }
}
