//! Analysis engine interface.
//!
//! The session manager loads binaries through [`AnalysisEngine`] and keeps the
//! returned [`Database`] handles. Engine calls block; callers on the async
//! runtime run them on the blocking pool.
//!
//! [`ImageEngine`] is the built-in engine. It identifies the container format
//! of a binary (ELF, PE, Mach-O), fingerprints it and extracts printable
//! strings during auto-analysis.

mod image;

pub use image::ImageEngine;

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by an analysis engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Failed to load {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    #[error("Offset {offset:#x} is outside the database (size {size:#x})")]
    OutOfRange { offset: u64, size: u64 },

    #[error("Database has been closed")]
    Closed,

    #[error("Auto-analysis failed: {0}")]
    Analysis(String),
}

impl EngineError {
    /// True when the database handle can no longer serve any request.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, EngineError::Closed)
    }
}

/// Summary of a loaded database.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DatabaseSummary {
    pub path: String,
    pub format: String,
    pub architecture: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bits: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endianness: Option<String>,
    pub size: u64,
    pub sha256: String,
}

/// A printable string found during analysis.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StringInfo {
    pub address: String,
    pub content: String,
    pub length: usize,
}

/// One loaded analysis database.
pub trait Database: Send + Sync {
    fn summary(&self) -> Result<DatabaseSummary, EngineError>;

    /// Run automatic analysis. Idempotent.
    fn auto_analyze(&self) -> Result<(), EngineError>;

    /// Read up to `size` bytes starting at `offset`.
    fn read_bytes(&self, offset: u64, size: usize) -> Result<Vec<u8>, EngineError>;

    /// Printable strings, in file order. Runs the string scan on demand.
    fn strings(&self) -> Result<Arc<Vec<StringInfo>>, EngineError>;

    /// Release engine resources. Further calls fail with [`EngineError::Closed`].
    fn close(&self) -> Result<(), EngineError>;
}

/// Loader for analysis databases.
pub trait AnalysisEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Load the file at `path` (already canonicalized) into a fresh context.
    fn load(&self, path: &Path) -> Result<Arc<dyn Database>, EngineError>;
}
