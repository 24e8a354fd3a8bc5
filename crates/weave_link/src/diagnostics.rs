//! Linking and harvesting diagnostics

use thiserror::Error;
use weave_model::{Diagnostic, ReferenceType, Severity, SymbolKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkDiagnostic {
    #[error("duplicate symbol '{kind}:{id}' found; the original definition is at {original}")]
    DuplicateSymbol {
        kind: SymbolKind,
        id: String,
        original: String,
    },

    #[error("duplicate definition of virtual symbol '{kind}:{id}'; the other definition is at {original}")]
    DuplicateVirtualSymbol {
        kind: SymbolKind,
        id: String,
        original: String,
    },

    #[error("'{kind}:{id}' is declared as an override, but no virtual symbol with that id exists")]
    OverrideWithoutVirtual { kind: SymbolKind, id: String },

    #[error("unresolved reference to symbol '{kind}:{id}'")]
    UnresolvedReference { kind: SymbolKind, id: String },

    #[error("payload '{0}' is not referenced by any package, container, or group")]
    OrphanedPayload(String),

    #[error("package '{0}' is not scheduled in any package group or chain")]
    UnscheduledPackage(String),

    #[error("rollback boundary '{0}' is not scheduled in any package group or chain")]
    UnscheduledRollbackBoundary(String),

    #[error("'{kind}:{id}' is placed in more than one container: {containers}")]
    MultipleContainers {
        kind: SymbolKind,
        id: String,
        containers: String,
    },

    #[error("payload '{id}' is shared with the bootstrapper UI and cannot also be placed in container '{container}'")]
    UxPayloadInContainer { id: String, container: String },

    #[error("payload '{id}' is not compressed and cannot be placed in container '{container}'")]
    UncompressedPayloadInContainer { id: String, container: String },

    #[error("remote payload '{id}' cannot be placed in container '{container}', which embeds its contents")]
    RemotePayloadInEmbeddedContainer { id: String, container: String },

    #[error("could not find an entry section (product, module or bundle) among the inputs")]
    MissingEntrySection,

    #[error("multiple entry sections found; the first one is at {first}")]
    MultipleEntrySections { first: String },

    #[error("'{kind}:{id}' has {access} access and is not visible from this reference")]
    SymbolNotAccessible {
        kind: SymbolKind,
        id: String,
        access: weave_model::AccessModifier,
    },

    #[error("'{child_type}:{child}' has more than one primary {parent_type} parent")]
    MultiplePrimaryReferences {
        child_type: ReferenceType,
        child: String,
        parent_type: ReferenceType,
    },
}

impl Diagnostic for LinkDiagnostic {
    fn id(&self) -> u32 {
        match self {
            LinkDiagnostic::DuplicateSymbol { .. } => 201,
            LinkDiagnostic::DuplicateVirtualSymbol { .. } => 203,
            LinkDiagnostic::OverrideWithoutVirtual { .. } => 204,
            LinkDiagnostic::UnresolvedReference { .. } => 205,
            LinkDiagnostic::OrphanedPayload(_) => 206,
            LinkDiagnostic::UnscheduledPackage(_) => 207,
            LinkDiagnostic::UnscheduledRollbackBoundary(_) => 208,
            LinkDiagnostic::MultipleContainers { .. } => 209,
            LinkDiagnostic::UxPayloadInContainer { .. } => 210,
            LinkDiagnostic::UncompressedPayloadInContainer { .. } => 211,
            LinkDiagnostic::RemotePayloadInEmbeddedContainer { .. } => 212,
            LinkDiagnostic::MissingEntrySection => 213,
            LinkDiagnostic::MultipleEntrySections { .. } => 214,
            LinkDiagnostic::SymbolNotAccessible { .. } => 215,
            LinkDiagnostic::MultiplePrimaryReferences { .. } => 216,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarvestDiagnostic {
    #[error("expected a directory for bind path '{0}', but no bind path with that name is defined")]
    ExpectedDirectory(String),

    #[error("no files were harvested by inclusions '{0}'")]
    ZeroFilesHarvested(String),

    #[error("file '{0}' was already harvested, skipping duplicate")]
    DuplicateHarvestedFile(String),

    #[error("harvest directory '{0}' does not exist")]
    DirectoryMissing(String),

    #[error("invalid harvest pattern '{0}'")]
    InvalidPattern(String),
}

impl Diagnostic for HarvestDiagnostic {
    fn id(&self) -> u32 {
        match self {
            HarvestDiagnostic::ExpectedDirectory(_) => 301,
            HarvestDiagnostic::ZeroFilesHarvested(_) => 302,
            HarvestDiagnostic::DuplicateHarvestedFile(_) => 303,
            HarvestDiagnostic::DirectoryMissing(_) => 304,
            HarvestDiagnostic::InvalidPattern(_) => 305,
        }
    }

    fn severity(&self) -> Severity {
        match self {
            HarvestDiagnostic::ExpectedDirectory(_) | HarvestDiagnostic::InvalidPattern(_) => Severity::Error,
            _ => Severity::Warning,
        }
    }
}

/// Child kinds with dedicated "never referenced" diagnostics
pub(crate) fn unreferenced(child_type: ReferenceType, id: &str) -> Option<LinkDiagnostic> {
    match child_type {
        ReferenceType::Payload => Some(LinkDiagnostic::OrphanedPayload(id.to_string())),
        ReferenceType::ChainPackage => Some(LinkDiagnostic::UnscheduledPackage(id.to_string())),
        ReferenceType::RollbackBoundary => Some(LinkDiagnostic::UnscheduledRollbackBoundary(id.to_string())),
        _ => None,
    }
}
