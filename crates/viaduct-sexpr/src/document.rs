//! File-bound documents: a parsed tree plus the raw text it came from.
//!
//! The retained raw text is the canonical deep-copy mechanism: cloning a
//! tree is done by re-parsing the text, which sidesteps recursive clone
//! plumbing and is what the session layer relies on.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::{Node, ParseError, parse};

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: ParseError,
    },
}

/// A loaded KiCad S-expression file.
///
/// ```no_run
/// use viaduct_sexpr::Document;
///
/// let doc = Document::load("board.kicad_pcb").unwrap();
/// assert_eq!(doc.root.name(), Some("kicad_pcb"));
/// doc.save(None).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub root: Node,
    raw_text: String,
}

impl Document {
    /// Load and parse a KiCad S-expression file. Invalid UTF-8 byte
    /// sequences are replaced rather than rejected.
    pub fn load(path: impl AsRef<Path>) -> Result<Document, DocumentError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(DocumentError::NotFound(path));
        }
        let bytes = std::fs::read(&path).map_err(|source| DocumentError::Read {
            path: path.clone(),
            source,
        })?;
        let raw_text = String::from_utf8_lossy(&bytes).into_owned();
        let root = parse(&raw_text).map_err(|source| DocumentError::Parse {
            path: path.clone(),
            source,
        })?;
        log::debug!("loaded {} ({} bytes)", path.display(), raw_text.len());
        Ok(Document {
            path,
            root,
            raw_text,
        })
    }

    /// Build a document from in-memory text, as if loaded from `path`.
    pub fn from_text(path: impl Into<PathBuf>, text: &str) -> Result<Document, ParseError> {
        Ok(Document {
            path: path.into(),
            root: parse(text)?,
            raw_text: text.to_string(),
        })
    }

    /// Write the tree back to disk. With `None`, overwrites the original
    /// path. Returns the path written.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, DocumentError> {
        let target = path.unwrap_or(&self.path).to_path_buf();
        let text = self.root.serialize(0) + "\n";
        std::fs::write(&target, text).map_err(|source| DocumentError::Write {
            path: target.clone(),
            source,
        })?;
        log::debug!("saved {}", target.display());
        Ok(target)
    }

    /// The file type from the extension, e.g. `kicad_pcb`.
    pub fn file_type(&self) -> &str {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
    }

    /// The text retained at load (or last root replacement).
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    /// Deep-copy by re-parsing the retained raw text.
    pub fn deep_copy(&self) -> Result<Document, ParseError> {
        Ok(Document {
            path: self.path.clone(),
            root: parse(&self.raw_text)?,
            raw_text: self.raw_text.clone(),
        })
    }

    /// Replace the root and refresh the retained raw text so later deep
    /// copies reflect the new tree. Used when a session commits.
    pub fn replace_root(&mut self, root: Node) {
        self.raw_text = root.serialize(0) + "\n";
        self.root = root;
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Document({:?}, root={:?})",
            self.path.file_name().and_then(|n| n.to_str()).unwrap_or(""),
            self.root.name().unwrap_or("")
        )
    }
}
