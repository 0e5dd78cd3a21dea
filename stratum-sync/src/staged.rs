//! In-memory staging tree layered over the project directory.
//!
//! Rendering, post actions and consolidation all write here. Reads see staged
//! content first and fall back to disk, so every stage observes the effects
//! of the ones before it without anything touching the filesystem.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use stratum_renderer::RenderedTree;

use crate::error::{io_err, ReconcileError};

#[derive(Debug, Clone)]
pub struct Staged {
    root: PathBuf,
    files: BTreeMap<PathBuf, Vec<u8>>,
}

impl Staged {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Staged {
            root: root.into(),
            files: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stage(&mut self, rel: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        self.files.insert(rel.into(), contents.into());
    }

    /// Stage every file of `tree` beneath `prefix`.
    pub fn stage_tree(&mut self, prefix: &Path, tree: RenderedTree) {
        for (rel, bytes) in tree {
            self.files.insert(prefix.join(rel), bytes);
        }
    }

    pub fn is_staged(&self, rel: &Path) -> bool {
        self.files.contains_key(rel)
    }

    pub fn exists(&self, rel: &Path) -> bool {
        self.is_staged(rel) || self.root.join(rel).is_file()
    }

    /// Staged content, else on-disk content, else `None`.
    pub fn read(&self, rel: &Path) -> Result<Option<Vec<u8>>, ReconcileError> {
        if let Some(bytes) = self.files.get(rel) {
            return Ok(Some(bytes.clone()));
        }
        let path = self.root.join(rel);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(path, e)),
        }
    }

    pub fn read_string(&self, rel: &Path) -> Result<Option<String>, ReconcileError> {
        match self.read(rel)? {
            Some(bytes) => String::from_utf8(bytes).map(Some).map_err(|e| {
                io_err(
                    self.root.join(rel),
                    std::io::Error::new(ErrorKind::InvalidData, e),
                )
            }),
            None => Ok(None),
        }
    }

    pub fn files(&self) -> &BTreeMap<PathBuf, Vec<u8>> {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
