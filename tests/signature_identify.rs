use std::path::{Path, PathBuf};

use romferry::catalog::PlatformTag;
use romferry::identify::SignatureIdentifier;
use tempfile::tempdir;

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn sega_cartridge() -> Vec<u8> {
    let mut body = vec![0u8; 0x400];
    body[0x100..0x104].copy_from_slice(b"SEGA");
    body
}

#[test]
fn sega_marker_wins_regardless_of_extension() {
    let temp = tempdir().unwrap();
    let identifier = SignatureIdentifier::new();

    for name in ["dump.weird", "dump.sfc", "dump"] {
        let path = write_file(temp.path(), name, &sega_cartridge());
        assert_eq!(
            identifier.identify(&path),
            PlatformTag::new("megadrive"),
            "{name}"
        );
    }
}

#[test]
fn unknown_header_falls_back_to_extension() {
    let temp = tempdir().unwrap();
    let identifier = SignatureIdentifier::new();
    let body = vec![0x01u8; 4096];

    let smc = write_file(temp.path(), "game.smc", &body);
    assert_eq!(identifier.identify(&smc), PlatformTag::new("snes"));

    let xyz = write_file(temp.path(), "game.xyz", &body);
    assert_eq!(identifier.identify(&xyz), PlatformTag::unknown());
}

#[test]
fn unreadable_file_degrades_to_extension() {
    let identifier = SignatureIdentifier::new();
    assert_eq!(
        identifier.identify(Path::new("/no/such/file.sfc")),
        PlatformTag::new("snes")
    );
    assert_eq!(
        identifier.identify(Path::new("/no/such/file")),
        PlatformTag::unknown()
    );
}

#[test]
fn ines_magic_beats_misleading_extension() {
    let temp = tempdir().unwrap();
    let mut body = vec![0x01u8; 2048];
    body[..4].copy_from_slice(b"NES\x1a");
    let path = write_file(temp.path(), "cart.smc", &body);
    assert_eq!(
        SignatureIdentifier::new().identify(&path),
        PlatformTag::new("nes")
    );
}

#[test]
fn boot_logo_and_cartridge_type_split_gameboy_color() {
    let temp = tempdir().unwrap();
    let identifier = SignatureIdentifier::new();
    let logo = [0xCEu8, 0xED, 0x66, 0x66, 0xCC, 0x0D, 0x00, 0x0B];

    let mut mono = vec![0u8; 0x150];
    mono[0x104..0x10C].copy_from_slice(&logo);
    let path = write_file(temp.path(), "tetris.bin", &mono);
    assert_eq!(identifier.identify(&path), PlatformTag::new("gb"));

    let mut color = mono.clone();
    color[0x143] = 0x80;
    let path = write_file(temp.path(), "zelda.bin", &color);
    assert_eq!(identifier.identify(&path), PlatformTag::new("gbc"));
}

#[test]
fn psp_marker_at_the_32k_boundary() {
    let temp = tempdir().unwrap();
    let mut body = vec![0u8; 0x9000];
    body[0x8000..0x8004].copy_from_slice(b"PSP ");
    let path = write_file(temp.path(), "game.dat2", &body);
    assert_eq!(
        SignatureIdentifier::new().identify(&path),
        PlatformTag::new("psp")
    );
}

#[test]
fn pce_copier_padding_heuristic() {
    let temp = tempdir().unwrap();
    let identifier = SignatureIdentifier::new();

    let padded = write_file(temp.path(), "game.bonk", &vec![0u8; 8192 * 4 + 512]);
    assert_eq!(identifier.identify(&padded), PlatformTag::new("pce"));

    // Without the 512-byte copier header the heuristic must not fire.
    let exact = write_file(temp.path(), "other.bonk", &vec![0u8; 8192 * 4]);
    assert_eq!(identifier.identify(&exact), PlatformTag::unknown());
}

#[test]
fn coleco_needs_both_marker_and_string() {
    let temp = tempdir().unwrap();
    let identifier = SignatureIdentifier::new();

    let mut body = vec![0x01u8; 4096];
    body[0] = 0xAA;
    body[1] = 0x55;
    body[64..70].copy_from_slice(b"COLECO");
    let path = write_file(temp.path(), "donkey.xyz", &body);
    assert_eq!(identifier.identify(&path), PlatformTag::new("colecovision"));

    let mut no_string = vec![0x01u8; 4096];
    no_string[0] = 0xAA;
    no_string[1] = 0x55;
    let path = write_file(temp.path(), "other.xyz", &no_string);
    assert_eq!(identifier.identify(&path), PlatformTag::unknown());
}
