//! Document tree types
//!
//! [`FolderNode`] and [`FileRecord`] are recomputed on every traversal and
//! never persisted. Their `ancestry` is the root-to-leaf list of names from
//! the container code down to, but not including, the item itself.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Root of one document tree (e.g. a course), supplied by an external
/// module-listing service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub code: String,
    pub name: String,
}

impl Container {
    pub fn new(id: impl Into<String>, code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            name: name.into(),
        }
    }
}

/// A folder discovered under a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderNode {
    pub id: String,
    pub name: String,
    /// `is_active && !allow_upload`, as reported by the server
    pub downloadable: bool,
    pub has_children: bool,
    /// Names from the container code down to and including this folder
    pub ancestry: Vec<String>,
}

impl FolderNode {
    /// Builds a node from the server-reported flags
    ///
    /// Upload-enabled folders are student drop boxes and are never mirrored.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        is_active: bool,
        allow_upload: bool,
        has_children: bool,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            downloadable: is_active && !allow_upload,
            has_children,
            ancestry: Vec::new(),
        }
    }

    /// Returns this node placed under `parent_ancestry`
    pub fn under(mut self, parent_ancestry: &[String]) -> Self {
        let mut ancestry = parent_ancestry.to_vec();
        ancestry.push(self.name.clone());
        self.ancestry = ancestry;
        self
    }
}

/// A file discovered inside a folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    /// Ancestry of the containing folder; excludes the file's own name
    pub ancestry: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

impl FileRecord {
    /// Server modification time truncated to whole seconds, as stored in the index
    pub fn last_updated_secs(&self) -> i64 {
        self.last_updated.timestamp()
    }

    /// Local destination: `root / ancestry... / name`
    ///
    /// Each component is passed through [`sanitize_component`] so that a
    /// server-supplied name can never escape `root`.
    pub fn local_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for component in &self.ancestry {
            path.push(sanitize_component(component));
        }
        path.push(sanitize_component(&self.name));
        path
    }
}

/// Makes a server-supplied name safe to use as a single path component
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim();

    match trimmed {
        "" | "." | ".." => "_".to_string(),
        _ => trimmed.to_string(),
    }
}
