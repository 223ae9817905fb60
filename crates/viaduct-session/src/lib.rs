//! Transactional mutation sessions over KiCad board documents.
//!
//! The session model gives the caller a query-before-commit workflow:
//!
//! ```text
//! start_session -> query_move (preview) -> apply_move -> undo -> commit/rollback
//! ```
//!
//! Every `apply_*` operation edits a working copy of the board (deep-copied
//! by re-parsing the original document's raw text), appends a
//! [`ChangeRecord`], and journals the tree edits it made so [`Session::undo`]
//! can restore the prior state exactly. `commit` writes the working copy to
//! disk and swaps it into the original document; `rollback` discards it.
//! Both transitions are terminal.

mod board_setup_ops;
mod change;
mod helpers;
mod net_zone_ops;
mod placement_ops;
mod routing_ops;

pub use change::ChangeRecord;
pub use routing_ops::ratsnest_of;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;
use viaduct_sexpr::{Document, DocumentError, Node, ParseError};

use change::{revert, short_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Committed,
    RolledBack,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Active => "active",
            SessionState::Committed => "committed",
            SessionState::RolledBack => "rolled_back",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {id} is {state}, not active")]
    NotActive { id: String, state: SessionState },
    #[error("no session with id {0:?}")]
    UnknownSession(String),
    #[error("component {0:?} not found")]
    ComponentNotFound(String),
    #[error("component {0:?} already exists on the board")]
    DuplicateReference(String),
    #[error("net {0:?} not found on the board")]
    NetNotFound(String),
    #[error("net {0:?} already exists")]
    DuplicateNet(String),
    #[error("pad {pad:?} not found on {reference}")]
    PadNotFound { reference: String, pad: String },
    #[error("{kind} with uuid {uuid:?} not found")]
    UuidNotFound { kind: &'static str, uuid: String },
    #[error("board has no setup section")]
    NoSetupSection,
    #[error(
        "design rule {0:?} belongs in the design-rules file (.kicad_dru), not the board setup"
    )]
    DesignRuleNotInSetup(String),
    #[error("unknown design rule {key:?}; valid setup keys: {valid}")]
    UnknownDesignRule { key: String, valid: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("document root is not a list")]
    MalformedDocument,
    #[error("undo failed: {0}")]
    UndoFailed(String),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Serializable overview of a session and its change history.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub board_path: String,
    pub state: SessionState,
    pub change_count: usize,
    pub changes: Vec<ChangeRecord>,
}

/// Result of a successful commit.
#[derive(Debug, Clone, Serialize)]
pub struct CommitReport {
    pub status: &'static str,
    pub changes_written: usize,
    pub board_path: String,
}

/// Result of a rollback.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    pub status: &'static str,
    pub discarded_changes: usize,
}

/// A mutation session: a working copy of one board document plus the
/// ordered list of changes applied to it.
pub struct Session {
    session_id: String,
    board_path: PathBuf,
    state: SessionState,
    changes: Vec<ChangeRecord>,
    original: Arc<Mutex<Document>>,
    working: Option<Document>,
}

impl Session {
    fn start(original: Arc<Mutex<Document>>) -> Result<Session, SessionError> {
        let working = {
            let doc = original.lock().unwrap_or_else(|e| e.into_inner());
            doc.deep_copy()?
        };
        Ok(Session {
            session_id: short_id(),
            board_path: working.path.clone(),
            state: SessionState::Active,
            changes: Vec::new(),
            original,
            working: Some(working),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn board_path(&self) -> &std::path::Path {
        &self.board_path
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn changes(&self) -> &[ChangeRecord] {
        &self.changes
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            board_path: self.board_path.display().to_string(),
            state: self.state,
            change_count: self.changes.len(),
            changes: self.changes.clone(),
        }
    }

    fn require_active(&self) -> Result<(), SessionError> {
        if self.state != SessionState::Active {
            return Err(SessionError::NotActive {
                id: self.session_id.clone(),
                state: self.state,
            });
        }
        Ok(())
    }

    /// The working tree, for read-only inspection and queries.
    pub fn working_root(&self) -> Result<&Node, SessionError> {
        self.require_active()?;
        self.working
            .as_ref()
            .map(|doc| &doc.root)
            .ok_or(SessionError::MalformedDocument)
    }

    /// The working tree, for mutations.
    pub(crate) fn working_root_mut(&mut self) -> Result<&mut Node, SessionError> {
        self.require_active()?;
        self.working
            .as_mut()
            .map(|doc| &mut doc.root)
            .ok_or(SessionError::MalformedDocument)
    }

    /// Mutable children of the working tree's root list.
    pub(crate) fn root_children_mut(&mut self) -> Result<&mut Vec<Node>, SessionError> {
        self.working_root_mut()?
            .children_mut()
            .ok_or(SessionError::MalformedDocument)
    }

    pub(crate) fn record(&mut self, record: ChangeRecord) -> ChangeRecord {
        log::debug!(
            "session {}: {} ({})",
            self.session_id,
            record.operation,
            record.description
        );
        self.changes.push(record.clone());
        record
    }

    /// Undo the most recent applied change, restoring the exact prior
    /// subtree. Returns `None` when there is nothing to undo.
    pub fn undo(&mut self) -> Result<Option<ChangeRecord>, SessionError> {
        self.require_active()?;
        let Some(idx) = self.changes.iter().rposition(|c| c.applied) else {
            return Ok(None);
        };
        let edits = self.changes[idx].edits.clone();
        let root = self.working_root_mut()?;
        revert(root, &edits)?;
        self.changes[idx].applied = false;
        let record = self.changes[idx].clone();
        log::debug!(
            "session {}: undid {} ({})",
            self.session_id,
            record.operation,
            record.change_id
        );
        Ok(Some(record))
    }

    /// Write the working copy to disk at the session's board path, swap it
    /// into the original document, and end the session.
    pub fn commit(&mut self) -> Result<CommitReport, SessionError> {
        self.require_active()?;
        let applied = self.changes.iter().filter(|c| c.applied).count();
        let working = self
            .working
            .take()
            .ok_or(SessionError::MalformedDocument)?;
        if applied > 0 {
            working.save(None)?;
        }
        {
            let mut original = self.original.lock().unwrap_or_else(|e| e.into_inner());
            original.replace_root(working.root);
        }
        self.state = SessionState::Committed;
        log::info!(
            "session {}: committed {} changes to {}",
            self.session_id,
            applied,
            self.board_path.display()
        );
        Ok(CommitReport {
            status: "committed",
            changes_written: applied,
            board_path: self.board_path.display().to_string(),
        })
    }

    /// Discard the working copy and end the session. The original document
    /// and the file on disk are untouched.
    pub fn rollback(&mut self) -> Result<RollbackReport, SessionError> {
        self.require_active()?;
        self.working = None;
        self.state = SessionState::RolledBack;
        log::info!(
            "session {}: rolled back, discarding {} changes",
            self.session_id,
            self.changes.len()
        );
        Ok(RollbackReport {
            status: "rolled_back",
            discarded_changes: self.changes.len(),
        })
    }
}

/// Owns the live sessions. The enclosing server may hold several sessions
/// concurrently, but each session must only ever be driven from one thread
/// at a time.
#[derive(Default)]
pub struct SessionManager {
    sessions: HashMap<String, Session>,
}

impl SessionManager {
    pub fn new() -> SessionManager {
        SessionManager::default()
    }

    /// Start a session over a deep copy of the document's tree. The
    /// original is not touched until the session commits.
    pub fn start_session(
        &mut self,
        doc: &Arc<Mutex<Document>>,
    ) -> Result<String, SessionError> {
        let session = Session::start(Arc::clone(doc))?;
        let id = session.session_id.clone();
        log::info!(
            "started session {id} for {}",
            session.board_path.display()
        );
        self.sessions.insert(id.clone(), session);
        Ok(id)
    }

    pub fn session(&self, id: &str) -> Result<&Session, SessionError> {
        self.sessions
            .get(id)
            .ok_or_else(|| SessionError::UnknownSession(id.to_string()))
    }

    pub fn session_mut(&mut self, id: &str) -> Result<&mut Session, SessionError> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::UnknownSession(id.to_string()))
    }

    pub fn remove_session(&mut self, id: &str) -> Option<Session> {
        self.sessions.remove(id)
    }

    pub fn session_ids(&self) -> Vec<&str> {
        self.sessions.keys().map(String::as_str).collect()
    }
}
