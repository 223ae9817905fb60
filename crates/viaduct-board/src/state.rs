//! Process-wide "currently loaded board" state.
//!
//! The enclosing server keeps one board (and one schematic) open at a time.
//! The triple (document, cached summary, cached footprints) is guarded by a
//! single mutex; file I/O and extraction happen outside the lock, which is
//! held only for the reference swap.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::Lazy;
use thiserror::Error;
use viaduct_sexpr::{Document, DocumentError};

use crate::board::{extract_board_summary, extract_footprints};
use crate::model::{BoardSummary, Footprint};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("no board loaded")]
    NoBoardLoaded,
    #[error(transparent)]
    Document(#[from] DocumentError),
}

struct Loaded {
    doc: Arc<Mutex<Document>>,
    summary: BoardSummary,
    footprints: Vec<Footprint>,
}

static CURRENT: Lazy<Mutex<Option<Loaded>>> = Lazy::new(|| Mutex::new(None));

fn current() -> MutexGuard<'static, Option<Loaded>> {
    CURRENT.lock().unwrap_or_else(|e| e.into_inner())
}

/// Load a board file and install it as the current board. Parsing and
/// extraction run before the lock is taken.
pub fn load_board(path: impl Into<PathBuf>) -> Result<BoardSummary, StateError> {
    let path = path.into();
    let doc = Document::load(&path)?;
    let summary = extract_board_summary(&doc);
    let footprints = extract_footprints(&doc);
    log::info!(
        "loaded board {} ({} footprints, {} nets)",
        path.display(),
        footprints.len(),
        summary.net_count
    );
    let mut slot = current();
    *slot = Some(Loaded {
        doc: Arc::new(Mutex::new(doc)),
        summary: summary.clone(),
        footprints,
    });
    Ok(summary)
}

/// Handle to the currently loaded document.
pub fn get_document() -> Result<Arc<Mutex<Document>>, StateError> {
    current()
        .as_ref()
        .map(|l| Arc::clone(&l.doc))
        .ok_or(StateError::NoBoardLoaded)
}

/// Cached summary of the current board.
pub fn get_summary() -> Result<BoardSummary, StateError> {
    current()
        .as_ref()
        .map(|l| l.summary.clone())
        .ok_or(StateError::NoBoardLoaded)
}

/// Cached footprint list of the current board.
pub fn get_footprints() -> Result<Vec<Footprint>, StateError> {
    current()
        .as_ref()
        .map(|l| l.footprints.clone())
        .ok_or(StateError::NoBoardLoaded)
}

/// Whether a board is loaded.
pub fn is_loaded() -> bool {
    current().is_some()
}

/// Path of the currently loaded board, if any.
pub fn board_path() -> Option<PathBuf> {
    current().as_ref().map(|l| {
        let doc = l.doc.lock().unwrap_or_else(|e| e.into_inner());
        doc.path.clone()
    })
}

/// Re-extract the cached summary and footprints from the current document.
/// Called after a session commit changes the document root in place.
pub fn refresh() -> Result<BoardSummary, StateError> {
    let doc = get_document()?;
    let (summary, footprints) = {
        let doc = doc.lock().unwrap_or_else(|e| e.into_inner());
        (extract_board_summary(&doc), extract_footprints(&doc))
    };
    let mut slot = current();
    if let Some(loaded) = slot.as_mut() {
        loaded.summary = summary.clone();
        loaded.footprints = footprints;
    }
    Ok(summary)
}

/// Drop the current board.
pub fn close_board() {
    let mut slot = current();
    *slot = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    // State is process-global, so exercise the lifecycle in one test.
    #[test]
    fn lifecycle() {
        close_board();
        assert!(!is_loaded());
        assert!(matches!(get_summary(), Err(StateError::NoBoardLoaded)));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.kicad_pcb");
        std::fs::write(
            &path,
            "(kicad_pcb (version 20241229) (net 0 \"\") (net 1 \"GND\"))\n",
        )
        .unwrap();

        let summary = load_board(&path).unwrap();
        assert_eq!(summary.net_count, 2);
        assert!(is_loaded());
        assert_eq!(board_path(), Some(path.clone()));

        let doc = get_document().unwrap();
        {
            let mut doc = doc.lock().unwrap();
            let root = viaduct_sexpr::parse(
                "(kicad_pcb (version 20241229) (net 0 \"\") (net 1 \"GND\") (net 2 \"VCC\"))",
            )
            .unwrap();
            doc.replace_root(root);
        }
        let summary = refresh().unwrap();
        assert_eq!(summary.net_count, 3);

        close_board();
        assert!(!is_loaded());
    }
}
