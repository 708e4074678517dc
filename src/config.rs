//! Layered application configuration.
//!
//! Precedence, lowest to highest: built-in defaults, `romferry.toml`,
//! `ROMFERRY_*` environment variables, then any serialized CLI arguments
//! merged on top.

use std::path::PathBuf;

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "romferry.toml";

/// Platforms zipped/converted by default when compression is enabled.
const DEFAULT_COMPRESS: &[&str] = &[
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
    "atari2600",
    "pce",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Resolved destination root (local directory or mounted share).
    pub destination: Option<PathBuf>,
    /// Remote device for audits over the shell channel.
    pub remote_host: Option<String>,
    pub remote_user: String,
    /// Bios directory on the remote device.
    pub remote_bios_dir: String,
    /// Where fetched digest→title catalogs live.
    pub catalog_cache_dir: PathBuf,
    /// External optical-image conversion tool.
    pub convert_tool: String,
    /// Platform tags to repackage during transfer.
    pub compress: Vec<String>,
    pub verbose: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            destination: None,
            remote_host: None,
            remote_user: "root".to_string(),
            remote_bios_dir: "/storage/roms/bios".to_string(),
            catalog_cache_dir: default_cache_dir(),
            convert_tool: "chdman".to_string(),
            compress: DEFAULT_COMPRESS.iter().map(|s| s.to_string()).collect(),
            verbose: false,
        }
    }
}

impl AppConfig {
    /// Load the layered configuration, optionally overlaying serialized CLI
    /// arguments on top.
    pub fn load<A: Serialize>(args: Option<&A>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed("ROMFERRY_"));
        if let Some(args) = args {
            figment = figment.merge(Serialized::defaults(args));
        }
        figment.extract().context("invalid configuration")
    }
}

fn default_cache_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".cache").join("romferry"))
        .unwrap_or_else(|| PathBuf::from(".romferry-cache"))
}
