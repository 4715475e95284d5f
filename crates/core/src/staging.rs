//! Private on-disk staging of verification inputs.
//!
//! The online toolchain consumes files, so decoded inputs are written into a
//! process-unique temporary directory. The directory is owned by
//! [`StagingArea`] and removed when it is dropped, on every exit path.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, VerifyError};

const DIR_PREFIX: &str = "manifest-sig-";

/// Inputs that can be staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedFile {
    Message,
    Signature,
    Certificate,
}

impl StagedFile {
    pub fn file_name(&self) -> &'static str {
        match self {
            StagedFile::Message => "manifest-sig-message",
            StagedFile::Signature => "manifest-sig-signature",
            StagedFile::Certificate => "manifest-sig-certificate",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            StagedFile::Message => "message",
            StagedFile::Signature => "signature",
            StagedFile::Certificate => "certificate",
        }
    }
}

/// A private temporary directory holding staged inputs.
#[derive(Debug)]
pub struct StagingArea {
    dir: tempfile::TempDir,
}

impl StagingArea {
    #[tracing::instrument]
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(DIR_PREFIX)
            .tempdir()
            .map_err(|source| VerifyError::Staging {
                what: "temporary directory",
                source,
            })?;
        tracing::debug!(path = %dir.path().display(), "Created staging directory");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `bytes` into the staging directory, readable by the owner only.
    pub fn stage(&self, file: StagedFile, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.dir.path().join(file.file_name());
        let staging_err = |source| VerifyError::Staging {
            what: file.label(),
            source,
        };
        let mut out = owner_only(&path).map_err(staging_err)?;
        out.write_all(bytes).map_err(staging_err)?;
        out.flush().map_err(staging_err)?;
        Ok(path)
    }
}

#[cfg(unix)]
fn owner_only(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn owner_only(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}
