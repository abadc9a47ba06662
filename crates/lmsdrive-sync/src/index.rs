//! Persisted change index
//!
//! The index remembers, per file id, the server modification time of the
//! copy on disk. It is stored as a flat comma-separated table without a
//! header, one row per file with the fixed column order
//! `id,fileName,lastUpdatedUnixSeconds`. Fields containing a comma, a quote
//! or a line break are double-quoted, with embedded quotes doubled.
//!
//! Loading is all-or-nothing: the first malformed row rejects the whole file.
//! Committing rewrites the whole table through a temporary file and a rename.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use lmsdrive_core::domain::{FileRecord, IndexEntry, IndexError, IndexTable};

/// The change index file at a fixed path
#[derive(Debug, Clone)]
pub struct ChangeIndex {
    path: PathBuf,
}

impl ChangeIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the full index
    ///
    /// # Errors
    ///
    /// - [`IndexError::NotFound`] when no index has been committed yet
    /// - [`IndexError::Corrupt`] for the first row that does not parse, or a
    ///   repeated file id
    /// - [`IndexError::IoFailure`] for any other read failure
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<IndexTable, IndexError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IndexError::NotFound(self.path.clone()))
            }
            Err(e) => return Err(IndexError::IoFailure(e.to_string())),
        };

        let table = decode(&text)?;
        debug!(entries = table.len(), "Index loaded");
        Ok(table)
    }

    /// Returns the files that must be downloaded, in discovery order
    ///
    /// A file is stale when its id is not indexed, or when the indexed
    /// timestamp is older than the server's. Equal timestamps are current.
    pub fn diff(discovered: &[FileRecord], index: &IndexTable) -> Vec<FileRecord> {
        discovered
            .iter()
            .filter(|file| match index.get(&file.id) {
                Some(entry) => entry.last_synced < file.last_updated_secs(),
                None => true,
            })
            .cloned()
            .collect()
    }

    /// Replaces the persisted index with `entries`
    #[instrument(skip(self, entries), fields(path = %self.path.display(), entries = entries.len()))]
    pub async fn commit(&self, entries: &IndexTable) -> Result<(), IndexError> {
        let io = |e: std::io::Error| IndexError::IoFailure(e.to_string());

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io)?;
        }

        let tmp_path = {
            let mut p = self.path.as_os_str().to_owned();
            p.push(".tmp");
            PathBuf::from(p)
        };

        tokio::fs::write(&tmp_path, encode(entries)).await.map_err(io)?;
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(io)?;

        debug!("Index committed");
        Ok(())
    }
}

// ============================================================================
// Table codec
// ============================================================================

fn encode(entries: &IndexTable) -> String {
    let mut out = String::new();
    for entry in entries.values() {
        out.push_str(&encode_field(&entry.file_id));
        out.push(',');
        out.push_str(&encode_field(&entry.file_name));
        out.push(',');
        out.push_str(&entry.last_synced.to_string());
        out.push('\n');
    }
    out
}

fn encode_field(value: &str) -> String {
    if value.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn decode(text: &str) -> Result<IndexTable, IndexError> {
    let mut table = IndexTable::new();

    for (line, fields) in parse_rows(text)? {
        let [id, name, secs]: [String; 3] = fields.try_into().map_err(|f: Vec<String>| {
            corrupt(line, format!("expected 3 columns, found {}", f.len()))
        })?;

        if id.is_empty() {
            return Err(corrupt(line, "empty file id"));
        }
        let last_synced: i64 = secs
            .trim()
            .parse()
            .map_err(|_| corrupt(line, format!("invalid timestamp '{}'", secs)))?;

        if table.contains_key(&id) {
            return Err(corrupt(line, format!("duplicate file id '{}'", id)));
        }
        table.insert(id.clone(), IndexEntry::new(id, name, last_synced));
    }

    Ok(table)
}

fn corrupt(line: usize, reason: impl Into<String>) -> IndexError {
    IndexError::Corrupt {
        line,
        reason: reason.into(),
    }
}

/// Splits the table into rows of fields, tagged with their starting line
///
/// Blank lines are skipped.
fn parse_rows(text: &str) -> Result<Vec<(usize, Vec<String>)>, IndexError> {
    let mut rows = Vec::new();
    let mut chars = text.chars().peekable();
    let mut line = 1;

    while chars.peek().is_some() {
        let start_line = line;
        let mut fields = Vec::new();
        let mut field = String::new();
        let mut quoted = false;
        let mut any_quoted = false;

        loop {
            match chars.next() {
                None => {
                    fields.push(std::mem::take(&mut field));
                    break;
                }
                Some('\n') => {
                    line += 1;
                    fields.push(std::mem::take(&mut field));
                    break;
                }
                Some('\r') if chars.peek() == Some(&'\n') => {}
                Some(',') => {
                    fields.push(std::mem::take(&mut field));
                    quoted = false;
                }
                Some('"') if field.is_empty() && !quoted => {
                    quoted = true;
                    any_quoted = true;
                    loop {
                        match chars.next() {
                            None => return Err(corrupt(start_line, "unterminated quoted field")),
                            Some('"') if chars.peek() == Some(&'"') => {
                                chars.next();
                                field.push('"');
                            }
                            Some('"') => break,
                            Some(c) => {
                                if c == '\n' {
                                    line += 1;
                                }
                                field.push(c);
                            }
                        }
                    }
                    if !matches!(chars.peek(), None | Some(',') | Some('\n') | Some('\r')) {
                        return Err(corrupt(line, "unexpected character after quoted field"));
                    }
                }
                Some('"') => return Err(corrupt(line, "stray quote in unquoted field")),
                Some(c) => field.push(c),
            }
        }

        let blank = fields.len() == 1 && fields[0].is_empty() && !any_quoted;
        if !blank {
            rows.push((start_line, fields));
        }
    }

    Ok(rows)
}
