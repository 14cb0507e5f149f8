//! Session and session info types.

use crate::engine::Database;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Information about a session (serializable for API responses).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Unique session identifier.
    pub session_id: String,
    /// Canonical path of the binary being analyzed.
    pub input_path: String,
    /// When the session was opened.
    pub opened_at: DateTime<Utc>,
    /// Whether this is the session tools target implicitly.
    pub is_current: bool,
    /// Whether auto-analysis has finished for this database.
    pub analysis_complete: bool,
}

/// An open analysis database. Owned by the session manager.
pub struct Session {
    pub(crate) session_id: String,
    pub(crate) input_path: PathBuf,
    pub(crate) opened_at: DateTime<Utc>,
    pub(crate) analysis_complete: bool,
    pub(crate) database: Arc<dyn Database>,
}

impl Session {
    pub(crate) fn new(
        session_id: String,
        input_path: PathBuf,
        analysis_complete: bool,
        database: Arc<dyn Database>,
    ) -> Self {
        Self {
            session_id,
            input_path,
            opened_at: Utc::now(),
            analysis_complete,
            database,
        }
    }

    /// Descriptor for API responses.
    pub fn info(&self, is_current: bool) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id.clone(),
            input_path: self.input_path.display().to_string(),
            opened_at: self.opened_at,
            is_current,
            analysis_complete: self.analysis_complete,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("input_path", &self.input_path)
            .field("opened_at", &self.opened_at)
            .field("analysis_complete", &self.analysis_complete)
            .finish_non_exhaustive()
    }
}
