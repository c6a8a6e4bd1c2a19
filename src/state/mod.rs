//! Single-slot persistence for the temporary role grant.
//!
//! The slot holds one role-assignment resource id between runs. There is no
//! locking: two processes sharing the same state file race.

use std::cell::RefCell;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("grant state I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Durable create/read/delete slot for the grant record.
pub trait GrantStore {
    fn read(&self) -> Result<Option<String>, StoreError>;

    fn write(&self, assignment_id: &str) -> Result<(), StoreError>;

    fn delete(&self) -> Result<(), StoreError>;
}

/// Grant record kept as a single line in a local file.
#[derive(Debug, Clone)]
pub struct FileGrantStore {
    path: PathBuf,
}

impl FileGrantStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl GrantStore for FileGrantStore {
    fn read(&self) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let line = content.lines().next().unwrap_or("").trim();
                if line.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(line.to_string()))
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn write(&self, assignment_id: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }
        fs::write(&self.path, format!("{}\n", assignment_id.trim())).map_err(|e| self.io_error(e))
    }

    fn delete(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// In-process grant slot used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryGrantStore {
    slot: RefCell<Option<String>>,
}

impl MemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(assignment_id: impl Into<String>) -> Self {
        Self {
            slot: RefCell::new(Some(assignment_id.into())),
        }
    }
}

impl GrantStore for MemoryGrantStore {
    fn read(&self) -> Result<Option<String>, StoreError> {
        Ok(self.slot.borrow().clone())
    }

    fn write(&self, assignment_id: &str) -> Result<(), StoreError> {
        *self.slot.borrow_mut() = Some(assignment_id.trim().to_string());
        Ok(())
    }

    fn delete(&self) -> Result<(), StoreError> {
        self.slot.borrow_mut().take();
        Ok(())
    }
}
