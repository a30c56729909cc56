//! File reading utilities with memory mapping support.
//!
//! The ingest pipeline reads whole source files; large files go through a
//! read-only memory map instead of a buffered copy.

// Memory mapping requires unsafe but is well-documented and safe for read-only access
#![allow(unsafe_code)]

use crate::error::{IoError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Threshold for using memory mapping (1MB).
const MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Maximum file size accepted for indexing (256MB).
const MAX_FILE_SIZE: u64 = 256 * 1024 * 1024;

/// File reader with support for memory mapping.
///
/// # Examples
///
/// ```no_run
/// use codesift::io::FileReader;
///
/// let reader = FileReader::open("src/main.rs").unwrap();
/// let content = reader.read_to_string().unwrap();
/// ```
#[derive(Debug)]
pub struct FileReader {
    /// File handle.
    file: File,
    /// File size in bytes.
    size: u64,
    /// Modification time (Unix seconds), when the filesystem reports one.
    mtime: Option<i64>,
    /// File path for error messages.
    path: String,
}

impl FileReader {
    /// Opens a file for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the file doesn't exist, can't be opened, or
    /// exceeds the size cap.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy().to_string();

        if !path_ref.exists() {
            return Err(IoError::FileNotFound { path: path_str }.into());
        }

        let file = File::open(path_ref).map_err(|e| IoError::ReadFailed {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;

        let metadata = file.metadata().map_err(|e| IoError::ReadFailed {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;

        let size = metadata.len();
        if size > MAX_FILE_SIZE {
            return Err(IoError::ReadFailed {
                path: path_str,
                reason: format!("file too large: {size} bytes (max: {MAX_FILE_SIZE} bytes)"),
            }
            .into());
        }

        #[allow(clippy::cast_possible_wrap)]
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64);

        Ok(Self {
            file,
            size,
            mtime,
            path: path_str,
        })
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns the modification time (Unix seconds), when known.
    #[must_use]
    pub const fn mtime(&self) -> Option<i64> {
        self.mtime
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Reads the file content as a string.
    ///
    /// Uses memory mapping for large files.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or content is not valid UTF-8.
    pub fn read_to_string(&self) -> Result<String> {
        if self.size >= MMAP_THRESHOLD {
            self.read_mmap()
        } else {
            self.read_direct()
        }
    }

    fn read_direct(&self) -> Result<String> {
        let mut content = String::with_capacity(self.size as usize);
        let mut file = &self.file;
        file.read_to_string(&mut content)
            .map_err(|e| IoError::ReadFailed {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        Ok(content)
    }

    fn read_mmap(&self) -> Result<String> {
        // SAFETY: the map is read-only and dropped before this call returns.
        let mmap = unsafe {
            Mmap::map(&self.file).map_err(|e| IoError::MmapFailed {
                path: self.path.clone(),
                reason: e.to_string(),
            })?
        };

        std::str::from_utf8(&mmap)
            .map(str::to_string)
            .map_err(|e| {
                IoError::ReadFailed {
                    path: self.path.clone(),
                    reason: format!("invalid UTF-8: {e}"),
                }
                .into()
            })
    }
}

/// Convenience wrapper: open and read a file in one call.
///
/// # Errors
///
/// See [`FileReader::open`] and [`FileReader::read_to_string`].
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<String> {
    FileReader::open(path)?.read_to_string()
}
