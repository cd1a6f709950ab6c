//! File storage for a single password hash.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::crypto::{OsRandom, SecureRandom};
use crate::envelope::Envelope;
use crate::error::Result;

/// A file holding one envelope.
///
/// The file content is the raw envelope, so reading it back goes through
/// the same structural check as any other stored value.
#[derive(Debug, Clone)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads the stored envelope. An empty file yields the absent envelope.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or its content is not a
    /// structurally valid envelope.
    pub fn load(&self) -> Result<Envelope> {
        let data = fs::read(&self.path)?;
        debug!(path = %self.path.display(), len = data.len(), "loaded password hash");
        Envelope::from_bytes(data)
    }

    /// Replaces the stored envelope.
    ///
    /// The bytes go to a randomly named sibling file which is synced and
    /// then renamed over the target, so readers see either the old or the
    /// new hash. Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Fails on any I/O error; the temporary file is removed if the final
    /// rename does not happen.
    pub fn save(&self, envelope: &Envelope) -> Result<()> {
        if let Some(parent) = self.parent_dir() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.random_tmp_path()?;
        write_synced(&tmp_path, envelope.as_bytes())?;

        if let Err(e) = self.atomic_replace(&tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        // persist the rename itself
        if let Some(parent) = self.parent_dir() {
            File::open(parent)?.sync_all()?;
        }

        debug!(path = %self.path.display(), len = envelope.len(), "saved password hash");
        Ok(())
    }

    /// Directory holding the target; `None` for a bare file name, whose
    /// parent is the empty path.
    fn parent_dir(&self) -> Option<&Path> {
        self.path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
    }

    /// `<file name>.tmp.<16 hex digits>` next to the target.
    fn random_tmp_path(&self) -> Result<PathBuf> {
        let mut suffix = [0u8; 8];
        OsRandom.fill_bytes(&mut suffix)?;

        let hex: String = suffix.iter().map(|b| format!("{b:02x}")).collect();
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "hash".to_string());

        Ok(self.path.with_file_name(format!("{file_name}.tmp.{hex}")))
    }

    /// `ReplaceFileW` with write-through; plain rename does not replace
    /// atomically on Windows.
    #[cfg(target_os = "windows")]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

        fn to_wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        let target_w = to_wide(self.path.as_os_str());
        let tmp_w = to_wide(tmp_path.as_os_str());

        // SAFETY: both buffers are NUL-terminated UTF-16 that outlive the
        // call, and the API does not keep the pointers.
        let replaced = unsafe {
            ReplaceFileW(
                target_w.as_ptr(),
                tmp_w.as_ptr(),
                std::ptr::null(),
                REPLACEFILE_WRITE_THROUGH,
                std::ptr::null(),
                std::ptr::null(),
            )
        };

        if replaced == 0 {
            // the target does not exist yet on first save
            if !self.path.exists() {
                fs::rename(tmp_path, &self.path)?;
                return Ok(());
            }
            return Err(std::io::Error::last_os_error().into());
        }

        Ok(())
    }

    #[cfg(not(target_os = "windows"))]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }
}

fn write_synced(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}
