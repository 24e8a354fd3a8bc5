//! Sections and intermediates

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::localization::Localization;
use crate::symbol::{Symbol, SymbolHandle, SymbolKind};

/// Type tag of a section; every non-fragment type can be an entry section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectionType {
    Fragment,
    Product,
    Module,
    Bundle,
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SectionType::Fragment => "fragment",
            SectionType::Product => "product",
            SectionType::Module => "module",
            SectionType::Bundle => "bundle",
        };
        write!(f, "{}", s)
    }
}

/// An ordered set of symbols
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub ty: SectionType,
    /// Id of the compilation that produced the section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compilation_id: Option<String>,
    /// Set when the section was combined into a library
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_id: Option<String>,
    #[serde(default)]
    pub symbols: Vec<Symbol>,
}

impl Section {
    pub fn new(id: Option<String>, ty: SectionType) -> Self {
        Self {
            id,
            ty,
            compilation_id: None,
            library_id: None,
            symbols: Vec::new(),
        }
    }

    pub fn fragment(id: impl Into<String>) -> Self {
        Self::new(Some(id.into()), SectionType::Fragment)
    }

    pub fn with_symbol(mut self, symbol: Symbol) -> Self {
        self.symbols.push(symbol);
        self
    }

    /// Library id if combined, otherwise the compilation id
    pub fn owner(&self) -> Option<&str> {
        self.library_id.as_deref().or(self.compilation_id.as_deref())
    }

    pub fn is_entry(&self) -> bool {
        self.ty != SectionType::Fragment
    }

    pub fn symbols_of(&self, kind: SymbolKind) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(move |s| s.kind == kind)
    }
}

/// Processing level of an intermediate; only ever advances
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IntermediateLevel {
    Compiled,
    Combined,
    Linked,
    Resolved,
    Bound,
}

impl fmt::Display for IntermediateLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntermediateLevel::Compiled => "compiled",
            IntermediateLevel::Combined => "combined",
            IntermediateLevel::Linked => "linked",
            IntermediateLevel::Resolved => "resolved",
            IntermediateLevel::Bound => "bound",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Error)]
pub enum IntermediateError {
    #[error("intermediate '{id}' is at level {actual}, but {stage} requires {expected}")]
    WrongLevel {
        id: String,
        stage: &'static str,
        expected: String,
        actual: IntermediateLevel,
    },

    #[error("intermediate '{id}' cannot move from level {from} back to {to}")]
    Regressed {
        id: String,
        from: IntermediateLevel,
        to: IntermediateLevel,
    },

    #[error("cannot read intermediate {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("malformed intermediate {0}: {1}")]
    Json(PathBuf, #[source] serde_json::Error),
}

/// Immutable-by-convention snapshot of sections and localizations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intermediate {
    pub id: String,
    pub level: IntermediateLevel,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub localizations: Vec<Localization>,
}

impl Intermediate {
    pub fn new(id: impl Into<String>, level: IntermediateLevel) -> Self {
        Self {
            id: id.into(),
            level,
            sections: Vec::new(),
            localizations: Vec::new(),
        }
    }

    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    /// Check the level before a stage runs on this intermediate
    pub fn require(&self, stage: &'static str, allowed: &[IntermediateLevel]) -> Result<(), IntermediateError> {
        if allowed.contains(&self.level) {
            return Ok(());
        }
        let expected = allowed.iter().map(|l| l.to_string()).collect::<Vec<_>>().join(" or ");
        Err(IntermediateError::WrongLevel {
            id: self.id.clone(),
            stage,
            expected,
            actual: self.level,
        })
    }

    pub fn advance(&mut self, level: IntermediateLevel) -> Result<(), IntermediateError> {
        if level < self.level {
            return Err(IntermediateError::Regressed {
                id: self.id.clone(),
                from: self.level,
                to: level,
            });
        }
        self.level = level;
        Ok(())
    }

    pub fn symbol(&self, handle: SymbolHandle) -> Option<&Symbol> {
        self.sections.get(handle.section)?.symbols.get(handle.symbol)
    }

    pub fn symbol_mut(&mut self, handle: SymbolHandle) -> Option<&mut Symbol> {
        self.sections.get_mut(handle.section)?.symbols.get_mut(handle.symbol)
    }

    /// Every symbol with its handle, in declaration order
    pub fn symbols(&self) -> impl Iterator<Item = (SymbolHandle, &Symbol)> {
        self.sections.iter().enumerate().flat_map(|(si, section)| {
            section
                .symbols
                .iter()
                .enumerate()
                .map(move |(i, symbol)| (SymbolHandle { section: si, symbol: i }, symbol))
        })
    }

    pub fn entry_section(&self) -> Option<&Section> {
        self.sections.iter().find(|s| s.is_entry())
    }

    pub fn load(path: &Path) -> Result<Self, IntermediateError> {
        let text = std::fs::read_to_string(path).map_err(|e| IntermediateError::Io(path.to_path_buf(), e))?;
        serde_json::from_str(&text).map_err(|e| IntermediateError::Json(path.to_path_buf(), e))
    }

    pub fn save(&self, path: &Path) -> Result<(), IntermediateError> {
        let text = serde_json::to_string_pretty(self).map_err(|e| IntermediateError::Json(path.to_path_buf(), e))?;
        std::fs::write(path, text).map_err(|e| IntermediateError::Io(path.to_path_buf(), e))
    }
}
