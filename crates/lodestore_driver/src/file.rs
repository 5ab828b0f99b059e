//! File-based storage driver for persistent storage.
//!
//! This module handles the file system layout for a Lodestore root:
//!
//! ```text
//! <root>/
//! ├─ LOCK                      # Advisory lock for single-writer
//! ├─ TYPES.bin                 # Serialized type index
//! └─ tables/<table>/
//!    ├─ KEYS.bin               # Serialized key table
//!    ├─ IDX_<index>.bin        # Serialized index tables
//!    └─ <slot>.rec             # One file per stored instance
//! ```
//!
//! The LOCK file ensures only one process can write to the store at a
//! time. Metadata blobs are written to a temporary file and renamed
//! into place so a crash never leaves a half-written blob.

use crate::driver::StorageDriver;
use crate::error::{DriverError, DriverResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const TYPES_FILE: &str = "TYPES.bin";
const KEYS_FILE: &str = "KEYS.bin";
const TABLES_DIR: &str = "tables";

const DRIVER_NAME: &str = "file";

/// A file-based storage driver.
///
/// Data survives process restarts. The driver holds an exclusive
/// advisory lock on the root directory for its whole lifetime.
///
/// # Example
///
/// ```no_run
/// use lodestore_driver::{FileDriver, StorageDriver};
/// use std::path::Path;
///
/// let driver = FileDriver::open(Path::new("my_store")).unwrap();
/// driver.save_instance("users", 0, b"payload").unwrap();
/// ```
#[derive(Debug)]
pub struct FileDriver {
    root: PathBuf,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl FileDriver {
    /// Opens or creates a file driver rooted at the given directory.
    ///
    /// # Errors
    ///
    /// Returns `Locked` if another process holds the lock, or an
    /// access error if the directory cannot be created or opened.
    pub fn open(root: &Path) -> DriverResult<Self> {
        if !root.exists() {
            fs::create_dir_all(root)
                .map_err(|e| DriverError::access(DRIVER_NAME, root.display().to_string(), e))?;
        }
        if !root.is_dir() {
            return Err(DriverError::InvalidLayout(format!(
                "path is not a directory: {}",
                root.display()
            )));
        }

        let lock_path = root.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| DriverError::access(DRIVER_NAME, lock_path.display().to_string(), e))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(DriverError::Locked);
        }

        Ok(Self {
            root: root.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the root directory of this driver.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a table name onto a file-system-safe directory name.
    ///
    /// ASCII alphanumerics pass through; every other byte, `_`
    /// included, becomes `_` plus two hex digits. The mapping is
    /// injective, so distinct table names never share a directory.
    fn sanitize(name: &str) -> String {
        let mut out = String::with_capacity(name.len());
        for b in name.bytes() {
            if b.is_ascii_alphanumeric() {
                out.push(b as char);
            } else {
                out.push_str(&format!("_{b:02x}"));
            }
        }
        out
    }

    fn table_dir(&self, table: &str) -> PathBuf {
        self.root.join(TABLES_DIR).join(Self::sanitize(table))
    }

    fn slot_path(&self, table: &str, slot: u64) -> PathBuf {
        self.table_dir(table).join(format!("{slot}.rec"))
    }

    fn write_file(&self, path: &Path, bytes: &[u8]) -> DriverResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| DriverError::access(DRIVER_NAME, parent.display().to_string(), e))?;
        }

        // Write-then-rename so readers never observe a partial file.
        let tmp = path.with_extension("tmp");
        let ctx = || path.display().to_string();
        let mut file =
            File::create(&tmp).map_err(|e| DriverError::access(DRIVER_NAME, ctx(), e))?;
        file.write_all(bytes)
            .map_err(|e| DriverError::access(DRIVER_NAME, ctx(), e))?;
        file.sync_all()
            .map_err(|e| DriverError::access(DRIVER_NAME, ctx(), e))?;
        fs::rename(&tmp, path).map_err(|e| DriverError::access(DRIVER_NAME, ctx(), e))?;
        Ok(())
    }

    fn read_file(&self, path: &Path) -> DriverResult<Option<Vec<u8>>> {
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(DriverError::access(
                    DRIVER_NAME,
                    path.display().to_string(),
                    e,
                ))
            }
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| DriverError::access(DRIVER_NAME, path.display().to_string(), e))?;
        Ok(Some(bytes))
    }
}

impl StorageDriver for FileDriver {
    fn save_instance(&self, table: &str, slot: u64, bytes: &[u8]) -> DriverResult<()> {
        self.write_file(&self.slot_path(table, slot), bytes)
    }

    fn load_instance(&self, table: &str, slot: u64) -> DriverResult<Vec<u8>> {
        self.read_file(&self.slot_path(table, slot))?
            .ok_or_else(|| DriverError::SlotNotFound {
                table: table.to_string(),
                slot,
            })
    }

    fn delete_instance(&self, table: &str, slot: u64) -> DriverResult<()> {
        let path = self.slot_path(table, slot);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DriverError::access(
                DRIVER_NAME,
                path.display().to_string(),
                e,
            )),
        }
    }

    fn truncate(&self, table: &str) -> DriverResult<()> {
        let dir = self.table_dir(table);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DriverError::access(
                DRIVER_NAME,
                dir.display().to_string(),
                e,
            )),
        }
    }

    fn purge(&self) -> DriverResult<()> {
        let tables = self.root.join(TABLES_DIR);
        match fs::remove_dir_all(&tables) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(DriverError::access(
                    DRIVER_NAME,
                    tables.display().to_string(),
                    e,
                ))
            }
        }
        let types = self.root.join(TYPES_FILE);
        match fs::remove_file(&types) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DriverError::access(
                DRIVER_NAME,
                types.display().to_string(),
                e,
            )),
        }
    }

    fn save_keys(&self, table: &str, bytes: &[u8]) -> DriverResult<()> {
        self.write_file(&self.table_dir(table).join(KEYS_FILE), bytes)
    }

    fn load_keys(&self, table: &str) -> DriverResult<Option<Vec<u8>>> {
        self.read_file(&self.table_dir(table).join(KEYS_FILE))
    }

    fn save_index(&self, table: &str, index: &str, bytes: &[u8]) -> DriverResult<()> {
        let name = format!("IDX_{}.bin", Self::sanitize(index));
        self.write_file(&self.table_dir(table).join(name), bytes)
    }

    fn load_index(&self, table: &str, index: &str) -> DriverResult<Option<Vec<u8>>> {
        let name = format!("IDX_{}.bin", Self::sanitize(index));
        self.read_file(&self.table_dir(table).join(name))
    }

    fn save_type_index(&self, bytes: &[u8]) -> DriverResult<()> {
        self.write_file(&self.root.join(TYPES_FILE), bytes)
    }

    fn load_type_index(&self) -> DriverResult<Option<Vec<u8>>> {
        self.read_file(&self.root.join(TYPES_FILE))
    }
}
