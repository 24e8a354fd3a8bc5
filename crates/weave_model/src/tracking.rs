//! Bind paths, tracked files, deferred fields and cancellation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

use crate::message::SourceLineNumber;
use crate::symbol::SymbolHandle;

/// Binding stage a search root applies to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindStage {
    #[default]
    Normal,
    Target,
    Updated,
}

/// A named or unnamed search root for relative source paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindPath {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub path: PathBuf,
    #[serde(default)]
    pub stage: BindStage,
}

impl BindPath {
    pub fn unnamed(path: impl Into<PathBuf>) -> Self {
        Self { name: None, path: path.into(), stage: BindStage::Normal }
    }

    pub fn named(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { name: Some(name.into()), path: path.into(), stage: BindStage::Normal }
    }
}

impl FromStr for BindPath {
    type Err = std::convert::Infallible;

    /// `name=path` or a bare path
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((name, path)) if !name.is_empty() => Ok(BindPath::named(name, path)),
            _ => Ok(BindPath::unnamed(s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrackedFileType {
    Input,
    Intermediate,
    Temporary,
    Final,
    CopiedOutput,
}

impl fmt::Display for TrackedFileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrackedFileType::Input => "Input",
            TrackedFileType::Intermediate => "Intermediate",
            TrackedFileType::Temporary => "Temporary",
            TrackedFileType::Final => "Final",
            TrackedFileType::CopiedOutput => "CopiedOutput",
        };
        write!(f, "{}", s)
    }
}

/// A file recorded for the build manifest and cleanup
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackedFile {
    pub path: PathBuf,
    pub ty: TrackedFileType,
    pub source: Option<SourceLineNumber>,
}

impl TrackedFile {
    pub fn new(path: impl Into<PathBuf>, ty: TrackedFileType) -> Self {
        Self { path: path.into(), ty, source: None }
    }
}

/// A field whose substitution waits for bind-time values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayedField {
    pub symbol: SymbolHandle,
    pub field: usize,
    /// Text still containing `bind.*` references
    pub raw: String,
}

/// A library-embedded file the binder must extract
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpectedEmbeddedFile {
    pub library_id: String,
    pub path: String,
    pub source: Option<SourceLineNumber>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation was cancelled")]
pub struct Cancelled;

/// Cooperative cancellation signal shared between the caller and a stage
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() { Err(Cancelled) } else { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_path_parse() {
        let named: BindPath = "media=/src/media".parse().unwrap();
        assert_eq!(named.name.as_deref(), Some("media"));
        assert_eq!(named.path, PathBuf::from("/src/media"));

        let unnamed: BindPath = "/src/bin".parse().unwrap();
        assert_eq!(unnamed.name, None);
    }

    #[test]
    fn test_cancellation_is_shared() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());
        other.cancel();
        assert_eq!(token.check(), Err(Cancelled));
    }
}
