//! Content sources the integrity audit can sweep.
//!
//! A [`ContentSource`] supplies two capabilities: a one-shot listing of the
//! bios directory, and a per-file 128-bit digest. The remote implementation
//! computes digests on the device itself through a shell channel, so the
//! blob never crosses to the auditor.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use md5::{Digest, Md5};
use regex::Regex;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

const DIGEST_BUFFER_SIZE: usize = 128 * 1024;

/// How a source operation failed.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The channel to the source is unusable; fatal to the whole sweep.
    #[error("content source unavailable: {0}")]
    Channel(String),
    /// A single file could not be read or hashed; degrades that entry only.
    #[error("{0}")]
    Read(String),
}

/// Listing plus digest capability over a bios directory, local or remote.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Human-readable target for logs.
    fn describe(&self) -> String;

    /// File names present at the source. Failure is fatal to the sweep.
    async fn list(&self) -> Result<Vec<String>, SourceError>;

    /// Lowercase hex digest of one file.
    async fn digest(&self, name: &str) -> Result<String, SourceError>;
}

/// Local filesystem directory.
pub struct LocalDirSource {
    dir: PathBuf,
}

impl LocalDirSource {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl ContentSource for LocalDirSource {
    fn describe(&self) -> String {
        self.dir.display().to_string()
    }

    async fn list(&self) -> Result<Vec<String>, SourceError> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || {
            let entries = std::fs::read_dir(&dir)
                .map_err(|e| SourceError::Channel(format!("cannot list {}: {e}", dir.display())))?;
            let mut names = Vec::new();
            for entry in entries.flatten() {
                if entry.path().is_file() {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
            Ok(names)
        })
        .await
        .map_err(|e| SourceError::Channel(e.to_string()))?
    }

    async fn digest(&self, name: &str) -> Result<String, SourceError> {
        let path = self.dir.join(name);
        tokio::task::spawn_blocking(move || {
            md5_of_file(&path).map_err(|e| SourceError::Read(format!("{}: {e}", path.display())))
        })
        .await
        .map_err(|e| SourceError::Read(e.to_string()))?
    }
}

/// Streaming MD5 of a local file, lowercase hex.
pub fn md5_of_file(path: &Path) -> std::io::Result<String> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::with_capacity(DIGEST_BUFFER_SIZE, file);
    let mut hasher = Md5::new();
    let mut buffer = [0u8; DIGEST_BUFFER_SIZE];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Remote device reached through an OpenSSH command channel.
///
/// `connect` establishes a multiplexed master session (ControlMaster) that
/// every subsequent command rides on, so authentication happens once and the
/// session spans the sweep. `close` tears the master down.
pub struct RemoteShellSource {
    host: String,
    user: String,
    remote_dir: String,
    /// Keeps the control socket directory alive for the session.
    control_dir: tempfile::TempDir,
}

impl RemoteShellSource {
    /// Open the session and probe the channel. Authentication or connection
    /// failure surfaces as [`SourceError::Channel`].
    pub async fn connect(host: &str, user: &str, remote_dir: &str) -> Result<Self, SourceError> {
        let control_dir = tempfile::tempdir()
            .map_err(|e| SourceError::Channel(format!("cannot create control dir: {e}")))?;

        let source = Self {
            host: host.to_string(),
            user: user.to_string(),
            remote_dir: remote_dir.trim_end_matches('/').to_string(),
            control_dir,
        };

        info!(host = %source.host, user = %source.user, "opening remote channel");
        // `true` establishes the master and verifies authentication.
        source
            .exec("true")
            .await
            .map_err(|e| SourceError::Channel(format!("{}@{}: {e}", source.user, source.host)))?;
        Ok(source)
    }

    /// Close the multiplexed session. Errors are ignored; the control
    /// socket dies with its temp directory regardless.
    pub async fn close(&self) {
        let result = Command::new("ssh")
            .args(self.control_args())
            .args(["-O", "exit"])
            .arg(self.target())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(err) = result {
            debug!(host = %self.host, error = %err, "session teardown failed");
        }
    }

    fn target(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn control_args(&self) -> [String; 6] {
        let socket = self.control_dir.path().join("channel.sock");
        [
            "-o".into(),
            "ControlMaster=auto".into(),
            "-o".into(),
            format!("ControlPath={}", socket.display()),
            "-o".into(),
            "ControlPersist=60".into(),
        ]
    }

    async fn exec(&self, command: &str) -> Result<String, SourceError> {
        let output = Command::new("ssh")
            .args(self.control_args())
            .args(["-o", "ConnectTimeout=5"])
            .arg(self.target())
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| SourceError::Channel(format!("cannot spawn ssh: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SourceError::Read(format!(
                "remote command `{command}` failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ContentSource for RemoteShellSource {
    fn describe(&self) -> String {
        format!("{}:{}", self.target(), self.remote_dir)
    }

    async fn list(&self) -> Result<Vec<String>, SourceError> {
        let listing = self
            .exec(&format!("ls -1 '{}'", self.remote_dir))
            .await
            .map_err(|e| SourceError::Channel(e.to_string()))?;
        Ok(listing.lines().map(|line| line.to_string()).collect())
    }

    async fn digest(&self, name: &str) -> Result<String, SourceError> {
        let output = self
            .exec(&format!("md5sum '{}/{}'", self.remote_dir, name))
            .await?;
        parse_md5sum(&output).ok_or_else(|| {
            SourceError::Read(format!("unparseable md5sum output for {name}: {output}"))
        })
    }
}

/// First token of `md5sum` output, validated as a 32-hex digest.
fn parse_md5sum(output: &str) -> Option<String> {
    let re = Regex::new(r"^([0-9a-f]{32})\s").expect("static regex");
    re.captures(output.trim_start())
        .map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn local_source_lists_only_files() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("gba_bios.bin"), b"blob").unwrap();
        std::fs::create_dir(temp.path().join("subdir")).unwrap();

        let source = LocalDirSource::new(temp.path());
        let names = source.list().await.unwrap();
        assert_eq!(names, vec!["gba_bios.bin".to_string()]);
    }

    #[tokio::test]
    async fn local_source_digests_content() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("blob.bin"), b"hello world").unwrap();

        let source = LocalDirSource::new(temp.path());
        let digest = source.digest("blob.bin").await.unwrap();
        // md5("hello world")
        assert_eq!(digest, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[tokio::test]
    async fn missing_file_degrades_not_fatal() {
        let temp = tempdir().unwrap();
        let source = LocalDirSource::new(temp.path());
        assert!(matches!(
            source.digest("absent.bin").await,
            Err(SourceError::Read(_))
        ));
    }

    #[tokio::test]
    async fn unlistable_directory_is_a_channel_failure() {
        let source = LocalDirSource::new(Path::new("/definitely/not/here"));
        assert!(matches!(source.list().await, Err(SourceError::Channel(_))));
    }

    #[test]
    fn md5sum_output_parses() {
        assert_eq!(
            parse_md5sum("a860e8c0b6ec573d1e1e61f1bc566d7f  /storage/roms/bios/gba_bios.bin\n"),
            Some("a860e8c0b6ec573d1e1e61f1bc566d7f".to_string())
        );
        assert_eq!(parse_md5sum("md5sum: no such file"), None);
        assert_eq!(parse_md5sum("DEADBEEF  x"), None);
    }
}
