//! Session management for multi-binary analysis.
//!
//! Each session is one database loaded through the local analysis engine.
//! Several binaries can be open at once; exactly one of them (or none) is the
//! *current* session that tools target when no session id is given.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ SessionManager                               │
//! │  table: Mutex<SessionTable>                  │
//! │   ├─ sessions: Vec<Session>  (open order)    │
//! │   └─ current:  Option<String>                │
//! │  engine: Arc<dyn AnalysisEngine>             │
//! └──────────────────────────────────────────────┘
//! ```

mod manager;
mod types;

pub use manager::{SessionError, SessionManager};
pub use types::{Session, SessionInfo};
