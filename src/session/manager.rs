//! Session manager for opening and tracking multiple analysis databases.

use super::types::{Session, SessionInfo};
use crate::engine::{AnalysisEngine, Database, EngineError};
use crate::expand_path;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Length of generated session ids.
const GENERATED_ID_LEN: usize = 8;

/// Error type for session management operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("File not found: {0}")]
    PathNotFound(String),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Session ID already in use: {0}")]
    Conflict(String),
    #[error("Invalid session ID {0:?}: use ASCII letters, digits, '-', '_' or '.'")]
    InvalidId(String),
    #[error("No active session. Use open_database() to open a binary first.")]
    NoCurrentSession,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Default)]
struct SessionTable {
    sessions: Vec<Session>,
    current: Option<String>,
}

impl SessionTable {
    fn find(&self, session_id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.session_id == session_id)
    }

    fn find_path(&self, path: &std::path::Path) -> Option<&Session> {
        self.sessions.iter().find(|s| s.input_path == path)
    }

    fn is_current(&self, session_id: &str) -> bool {
        self.current.as_deref() == Some(session_id)
    }

    fn info(&self, session: &Session) -> SessionInfo {
        session.info(self.is_current(&session.session_id))
    }

    fn unused_id(&self) -> String {
        loop {
            let mut id = Uuid::new_v4().simple().to_string();
            id.truncate(GENERATED_ID_LEN);
            if self.find(&id).is_none() {
                return id;
            }
        }
    }
}

/// Close a database that never became a session.
fn discard(database: &dyn Database, path: &Path, session_id: Option<&str>) {
    if let Err(e) = database.close() {
        warn!(
            session_id = session_id.unwrap_or("-"),
            path = %path.display(),
            error = %e,
            "Engine failed to close discarded database"
        );
    }
}

fn validate_id(id: &str) -> Result<(), SessionError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(SessionError::InvalidId(id.to_string()))
    }
}

/// Manager for the analysis sessions of one process.
///
/// All state lives behind a single mutex. Engine work (loading, analysis,
/// closing) runs with the lock released.
pub struct SessionManager {
    engine: Arc<dyn AnalysisEngine>,
    table: Mutex<SessionTable>,
}

impl SessionManager {
    pub fn new(engine: Arc<dyn AnalysisEngine>) -> Self {
        Self {
            engine,
            table: Mutex::new(SessionTable::default()),
        }
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    fn lock(&self) -> MutexGuard<'_, SessionTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open `input_path` and make it the current session.
    ///
    /// Opening a path that is already open returns the existing session id
    /// and makes that session current.
    pub fn open(
        &self,
        input_path: &str,
        run_auto_analysis: bool,
        requested_id: Option<&str>,
    ) -> Result<String, SessionError> {
        if let Some(id) = requested_id {
            validate_id(id)?;
        }
        let path = expand_path(input_path)
            .canonicalize()
            .map_err(|_| SessionError::PathNotFound(input_path.to_string()))?;

        {
            let mut table = self.lock();
            if let Some(existing) = table.find_path(&path).map(|s| s.session_id.clone()) {
                debug!(session_id = %existing, path = %path.display(), "Binary already open");
                table.current = Some(existing.clone());
                return Ok(existing);
            }
            if let Some(id) = requested_id {
                if table.find(id).is_some() {
                    return Err(SessionError::Conflict(id.to_string()));
                }
            }
        }

        info!(path = %path.display(), engine = self.engine.name(), "Opening database");
        let database = self.engine.load(&path)?;
        if run_auto_analysis {
            if let Err(e) = database.auto_analyze() {
                discard(database.as_ref(), &path, None);
                return Err(e.into());
            }
        }

        let mut table = self.lock();
        // Another open of the same path or id may have won the race while
        // the engine was loading.
        if let Some(existing) = table.find_path(&path).map(|s| s.session_id.clone()) {
            table.current = Some(existing.clone());
            drop(table);
            discard(database.as_ref(), &path, Some(&existing));
            return Ok(existing);
        }
        let session_id = match requested_id {
            Some(id) if table.find(id).is_some() => {
                drop(table);
                discard(database.as_ref(), &path, Some(id));
                return Err(SessionError::Conflict(id.to_string()));
            }
            Some(id) => id.to_string(),
            None => table.unused_id(),
        };

        table.sessions.push(Session::new(
            session_id.clone(),
            path.clone(),
            run_auto_analysis,
            database,
        ));
        table.current = Some(session_id.clone());
        info!(
            session_id = %session_id,
            path = %path.display(),
            analysis_complete = run_auto_analysis,
            "Session opened"
        );
        Ok(session_id)
    }

    /// Close a session. Returns `false` if no such session exists.
    pub fn close(&self, session_id: &str) -> bool {
        let session = {
            let mut table = self.lock();
            let Some(pos) = table
                .sessions
                .iter()
                .position(|s| s.session_id == session_id)
            else {
                return false;
            };
            if table.is_current(session_id) {
                table.current = None;
            }
            table.sessions.remove(pos)
        };

        if let Err(e) = session.database.close() {
            warn!(session_id = %session_id, error = %e, "Engine failed to close database");
        }
        info!(session_id = %session_id, "Session closed");
        true
    }

    /// Make `session_id` the current session.
    pub fn switch(&self, session_id: &str) -> Result<SessionInfo, SessionError> {
        let mut table = self.lock();
        if table.find(session_id).is_none() {
            return Err(SessionError::SessionNotFound(session_id.to_string()));
        }
        table.current = Some(session_id.to_string());
        let info = table
            .find(session_id)
            .map(|s| s.info(true))
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))?;
        info!(session_id = %session_id, "Switched current session");
        Ok(info)
    }

    /// Snapshot of all sessions in open order.
    pub fn list(&self) -> Vec<SessionInfo> {
        let table = self.lock();
        table.sessions.iter().map(|s| table.info(s)).collect()
    }

    pub fn get(&self, session_id: &str) -> Result<SessionInfo, SessionError> {
        let table = self.lock();
        table
            .find(session_id)
            .map(|s| table.info(s))
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))
    }

    pub fn current(&self) -> Option<SessionInfo> {
        let table = self.lock();
        let id = table.current.as_deref()?;
        table.find(id).map(|s| s.info(true))
    }

    pub fn has_current(&self) -> bool {
        self.lock().current.is_some()
    }

    /// Descriptor and database handle of the current session.
    pub fn current_database(&self) -> Result<(SessionInfo, Arc<dyn Database>), SessionError> {
        let table = self.lock();
        let id = table
            .current
            .as_deref()
            .ok_or(SessionError::NoCurrentSession)?;
        let session = table.find(id).ok_or(SessionError::NoCurrentSession)?;
        Ok((session.info(true), Arc::clone(&session.database)))
    }

    /// Run auto-analysis on `session_id` (or the current session) and mark
    /// it complete.
    pub fn analyze(&self, session_id: Option<&str>) -> Result<SessionInfo, SessionError> {
        let (id, database, done) = {
            let table = self.lock();
            let id = match session_id {
                Some(id) => id.to_string(),
                None => table.current.clone().ok_or(SessionError::NoCurrentSession)?,
            };
            let session = table
                .find(&id)
                .ok_or_else(|| SessionError::SessionNotFound(id.clone()))?;
            (id, Arc::clone(&session.database), session.analysis_complete)
        };

        if !done {
            info!(session_id = %id, "Running auto-analysis");
            database.auto_analyze()?;
        }

        let mut table = self.lock();
        let current = table.is_current(&id);
        let session = table
            .sessions
            .iter_mut()
            .find(|s| s.session_id == id)
            .ok_or_else(|| SessionError::SessionNotFound(id.clone()))?;
        session.analysis_complete = true;
        Ok(session.info(current))
    }

    /// Close every session. Engine failures are logged and skipped.
    pub fn close_all(&self) -> usize {
        let sessions = {
            let mut table = self.lock();
            table.current = None;
            std::mem::take(&mut table.sessions)
        };

        let count = sessions.len();
        for session in sessions {
            if let Err(e) = session.database.close() {
                warn!(
                    session_id = %session.session_id,
                    error = %e,
                    "Failed to close session during shutdown"
                );
            }
        }
        if count > 0 {
            info!(count, "Closed all sessions");
        }
        count
    }
}
