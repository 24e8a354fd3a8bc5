//! Diagnostics: numbered, located messages collected across a whole pass

use serde::{Deserialize, Serialize};
use std::fmt;

/// Location of a definition in its source document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLineNumber {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl SourceLineNumber {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self { file: file.into(), line: Some(line) }
    }

    pub fn file_only(file: impl Into<String>) -> Self {
        Self { file: file.into(), line: None }
    }
}

impl fmt::Display for SourceLineNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}({})", self.file, line),
            None => write!(f, "{}", self.file),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Verbose,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Verbose => write!(f, "verbose"),
        }
    }
}

/// A diagnostic kind that knows its number and severity.
///
/// Numbers are partitioned by subsystem so tools can filter by range:
/// 1-99 pipeline, 100-199 variables, 200-299 linking, 300-399 harvesting,
/// 400-499 libraries, 500-599 layout.
pub trait Diagnostic: fmt::Display {
    fn id(&self) -> u32;

    fn severity(&self) -> Severity {
        Severity::Error
    }
}

/// One formatted diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub source: Option<SourceLineNumber>,
    pub severity: Severity,
    pub id: u32,
    pub text: String,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "{}: ", source)?;
        }
        write!(f, "{} WV{:04}: {}", self.severity, self.id, self.text)
    }
}

/// Accumulator threaded through every stage
#[derive(Debug, Default)]
pub struct Diagnostics {
    messages: Vec<Message>,
    errors: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, source: Option<&SourceLineNumber>, diagnostic: impl Diagnostic) {
        self.push(Message {
            source: source.cloned(),
            severity: diagnostic.severity(),
            id: diagnostic.id(),
            text: diagnostic.to_string(),
        });
    }

    pub fn push(&mut self, message: Message) {
        tracing::debug!(id = message.id, severity = %message.severity, "{}", message.text);
        if message.severity == Severity::Error {
            self.errors += 1;
        }
        self.messages.push(message);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        for message in other.messages {
            self.push(message);
        }
    }

    pub fn encountered_error(&self) -> bool {
        self.errors > 0
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn with_id(&self, id: u32) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.id == id)
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}
