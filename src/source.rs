use crate::util;
use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Supplies the text of a source file by absolute path.
pub trait SourceProvider {
    fn read(&self, path: &Path) -> Result<String>;
}

/// Reads straight from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskSource;

impl SourceProvider for DiskSource {
    fn read(&self, path: &Path) -> Result<String> {
        util::read_to_string(path)
    }
}

#[derive(Debug, Clone)]
struct Buffer {
    text: String,
    version: i64,
    closed: bool,
}

/// Editor buffers layered over disk.
///
/// An open buffer shadows the file on disk so unsaved edits are visible to
/// the parser. Closed buffers fall through to disk.
#[derive(Debug, Default)]
pub struct BufferOverlay {
    buffers: HashMap<PathBuf, Buffer>,
}

impl BufferOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, path: PathBuf, text: String, version: i64) {
        self.buffers.insert(
            path,
            Buffer {
                text,
                version,
                closed: false,
            },
        );
    }

    /// Replaces the text of an open buffer. Stale versions are ignored, and
    /// an update for an unknown path opens it.
    pub fn update(&mut self, path: PathBuf, text: String, version: i64) {
        match self.buffers.get_mut(&path) {
            Some(buffer) if buffer.version > version => {
                tracing::debug!(
                    path = %path.display(),
                    current = buffer.version,
                    incoming = version,
                    "ignoring stale buffer update"
                );
            }
            Some(buffer) => {
                buffer.text = text;
                buffer.version = version;
                buffer.closed = false;
            }
            None => self.open(path, text, version),
        }
    }

    pub fn close(&mut self, path: &Path) {
        if let Some(buffer) = self.buffers.get_mut(path) {
            buffer.closed = true;
        }
    }

    pub fn is_open(&self, path: &Path) -> bool {
        self.buffers
            .get(path)
            .map(|buffer| !buffer.closed)
            .unwrap_or(false)
    }
}

impl SourceProvider for BufferOverlay {
    fn read(&self, path: &Path) -> Result<String> {
        match self.buffers.get(path) {
            Some(buffer) if !buffer.closed => Ok(buffer.text.clone()),
            _ => util::read_to_string(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_buffer_shadows_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.controller.ts");
        std::fs::write(&path, "disk").unwrap();

        let mut overlay = BufferOverlay::new();
        assert_eq!(overlay.read(&path).unwrap(), "disk");

        overlay.open(path.clone(), "memory".to_string(), 1);
        assert_eq!(overlay.read(&path).unwrap(), "memory");

        overlay.close(&path);
        assert!(!overlay.is_open(&path));
        assert_eq!(overlay.read(&path).unwrap(), "disk");
    }

    #[test]
    fn stale_updates_are_ignored() {
        let mut overlay = BufferOverlay::new();
        let path = PathBuf::from("/virtual/a.ts");
        overlay.open(path.clone(), "v2".to_string(), 2);
        overlay.update(path.clone(), "v1".to_string(), 1);
        assert_eq!(overlay.read(&path).unwrap(), "v2");
        overlay.update(path.clone(), "v3".to_string(), 3);
        assert_eq!(overlay.read(&path).unwrap(), "v3");
    }

    #[test]
    fn missing_file_is_an_error() {
        let overlay = BufferOverlay::new();
        assert!(overlay.read(Path::new("/definitely/not/here.ts")).is_err());
    }
}
