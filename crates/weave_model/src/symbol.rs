//! Symbols: typed, identified records with ordered field values

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::message::SourceLineNumber;

/// Visibility of a symbol identifier.
///
/// Determines the scope within which the id must be unique and whether an
/// existing definition may legally be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccessModifier {
    Global,
    Library,
    File,
    Section,
    /// Global, and may be replaced by an `Override` definition
    Virtual,
    /// Replaces a definition of the same kind and id
    Override,
}

impl AccessModifier {
    /// How narrow the visibility is: 0 is program-wide, 3 is one section.
    pub fn specificity(self) -> u8 {
        match self {
            AccessModifier::Global | AccessModifier::Virtual | AccessModifier::Override => 0,
            AccessModifier::Library => 1,
            AccessModifier::File => 2,
            AccessModifier::Section => 3,
        }
    }
}

impl fmt::Display for AccessModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccessModifier::Global => "global",
            AccessModifier::Library => "library",
            AccessModifier::File => "file",
            AccessModifier::Section => "section",
            AccessModifier::Virtual => "virtual",
            AccessModifier::Override => "override",
        };
        write!(f, "{}", s)
    }
}

/// Scoped identifier of a symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    pub access: AccessModifier,
    pub id: String,
}

impl Identifier {
    pub fn new(access: AccessModifier, id: impl Into<String>) -> Self {
        Self { access, id: id.into() }
    }

    pub fn global(id: impl Into<String>) -> Self {
        Self::new(AccessModifier::Global, id)
    }
}

/// Storage type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Path,
}

/// Static description of one field of a symbol kind
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub ty: FieldType,
}

const fn s(name: &'static str) -> FieldDef {
    FieldDef { name, ty: FieldType::String }
}

const fn n(name: &'static str) -> FieldDef {
    FieldDef { name, ty: FieldType::Number }
}

const fn p(name: &'static str) -> FieldDef {
    FieldDef { name, ty: FieldType::Path }
}

macro_rules! symbol_kinds {
    ($($kind:ident => [$($field:expr),* $(,)?]),* $(,)?) => {
        /// Definition kind of a symbol
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum SymbolKind {
            $($kind,)*
        }

        impl SymbolKind {
            /// Field layout shared by every symbol of this kind
            pub fn fields(self) -> &'static [FieldDef] {
                match self {
                    $(SymbolKind::$kind => {
                        const FIELDS: &[FieldDef] = &[$($field),*];
                        FIELDS
                    })*
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(SymbolKind::$kind => stringify!($kind),)*
                }
            }
        }

        impl FromStr for SymbolKind {
            type Err = UnknownKind;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($kind) => Ok(SymbolKind::$kind),)*
                    _ => Err(UnknownKind(s.to_string())),
                }
            }
        }
    };
}

symbol_kinds! {
    Product => [s("Name"), s("Version"), s("Manufacturer"), n("Language"), n("Codepage")],
    Module => [n("Language"), s("Version")],
    Bundle => [s("Name"), s("Version")],
    Feature => [
        s("ParentFeature"), s("Title"), s("Description"), n("Display"), n("Level"),
        s("Directory"), s("InstallDefault"),
    ],
    Component => [s("Directory"), s("KeyPath"), s("Guid")],
    File => [s("Component"), s("Name"), p("Source"), s("Directory")],
    Directory => [s("Parent"), s("Name")],
    Binary => [p("Data")],
    Property => [s("Value")],
    WixVariable => [s("Value"), n("Overridable")],
    Dialog => [
        s("Title"), n("X"), n("Y"), n("Width"), n("Height"),
        n("RightAligned"), n("RightToLeft"), n("LeftScroll"),
    ],
    Control => [
        s("Dialog"), s("Text"), n("X"), n("Y"), n("Width"), n("Height"),
        n("RightAligned"), n("RightToLeft"), n("LeftScroll"),
    ],
    Container => [s("Name"), s("Type")],
    Payload => [s("Name"), p("Source"), n("Compressed"), s("DownloadUrl")],
    PayloadGroup => [],
    PackageGroup => [],
    ChainPackage => [s("Type"), s("Payload"), n("Vital")],
    RollbackBoundary => [n("Vital")],
    BootstrapperUx => [],
    SimpleReference => [s("Table"), s("PrimaryKeys")],
    ComplexReference => [
        s("Parent"), s("ParentType"), s("ParentLanguage"),
        s("Child"), s("ChildType"), n("IsPrimary"),
    ],
    HarvestFiles => [
        s("DirectoryRef"), s("Inclusions"), s("Exclusions"),
        s("ComplexReferenceParentType"), s("ParentId"), s("SourcePath"),
    ],
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown symbol kind '{0}'")]
pub struct UnknownKind(pub String);

/// A path field value; `embed` marks files packed into a library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathValue {
    pub path: String,
    #[serde(default)]
    pub embed: bool,
    /// Id of the library the embedded file travels with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_uri: Option<String>,
}

impl PathValue {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), embed: false, base_uri: None }
    }
}

/// Value stored in one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldValue {
    String(String),
    Number(i64),
    Path(PathValue),
}

impl FieldValue {
    /// Text the variable resolver operates on
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            FieldValue::Path(p) => Some(&p.path),
            FieldValue::Number(_) => None,
        }
    }
}

/// A typed, identified record belonging to exactly one section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub kind: SymbolKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceLineNumber>,
    #[serde(default)]
    fields: Vec<Option<FieldValue>>,
}

impl Symbol {
    pub fn new(kind: SymbolKind, id: Option<Identifier>, source: Option<SourceLineNumber>) -> Self {
        Self {
            kind,
            id,
            source,
            fields: vec![None; kind.fields().len()],
        }
    }

    pub fn id_str(&self) -> Option<&str> {
        self.id.as_ref().map(|i| i.id.as_str())
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.kind.fields().iter().position(|f| f.name == name)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, index: usize) -> Option<&FieldValue> {
        self.fields.get(index).and_then(|f| f.as_ref())
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.field_index(name).and_then(|i| self.field(i))
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_number(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get_number(name).map(|n| n != 0)
    }

    pub fn get_path(&self, name: &str) -> Option<&PathValue> {
        match self.get(name)? {
            FieldValue::Path(p) => Some(p),
            _ => None,
        }
    }

    /// Set a field by index; out of range indices are ignored
    pub fn set_field(&mut self, index: usize, value: Option<FieldValue>) {
        if index >= self.fields.len() {
            // Deserialized symbols may carry a short field vector
            self.fields.resize(self.kind.fields().len().max(index + 1), None);
        }
        self.fields[index] = value;
    }

    pub fn set(&mut self, name: &str, value: FieldValue) {
        if let Some(i) = self.field_index(name) {
            self.set_field(i, Some(value));
        }
    }

    pub fn with_str(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, FieldValue::String(value.into()));
        self
    }

    pub fn with_number(mut self, name: &str, value: i64) -> Self {
        self.set(name, FieldValue::Number(value));
        self
    }

    pub fn with_path(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, FieldValue::Path(PathValue::new(value)));
        self
    }

    pub fn fields_mut(&mut self) -> impl Iterator<Item = (usize, &mut FieldValue)> {
        self.fields
            .iter_mut()
            .enumerate()
            .filter_map(|(i, f)| f.as_mut().map(|v| (i, v)))
    }

    pub fn fields(&self) -> impl Iterator<Item = (usize, &FieldValue)> {
        self.fields
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.as_ref().map(|v| (i, v)))
    }
}

/// Position of a symbol inside an intermediate: (section index, symbol index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolHandle {
    pub section: usize,
    pub symbol: usize,
}

/// A simple `kind:id` reference that pulls the defining section into a link
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolReference {
    pub kind: SymbolKind,
    pub id: String,
}

impl SymbolReference {
    pub fn new(kind: SymbolKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    pub fn from_symbol(symbol: &Symbol) -> Option<Self> {
        if symbol.kind != SymbolKind::SimpleReference {
            return None;
        }
        let kind = symbol.get_str("Table")?.parse().ok()?;
        let id = symbol.get_str("PrimaryKeys")?;
        Some(Self::new(kind, id))
    }

    pub fn to_symbol(&self, source: Option<SourceLineNumber>) -> Symbol {
        Symbol::new(SymbolKind::SimpleReference, None, source)
            .with_str("Table", self.kind.name())
            .with_str("PrimaryKeys", &self.id)
    }
}

impl fmt::Display for SymbolReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Parent and child kinds that complex references connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReferenceType {
    Product,
    Module,
    Feature,
    Component,
    Container,
    Payload,
    PayloadGroup,
    PackageGroup,
    ChainPackage,
    RollbackBoundary,
    BootstrapperUx,
}

impl ReferenceType {
    /// Symbol kind an endpoint of this type must resolve to
    pub fn symbol_kind(self) -> SymbolKind {
        match self {
            ReferenceType::Product => SymbolKind::Product,
            ReferenceType::Module => SymbolKind::Module,
            ReferenceType::Feature => SymbolKind::Feature,
            ReferenceType::Component => SymbolKind::Component,
            ReferenceType::Container => SymbolKind::Container,
            ReferenceType::Payload => SymbolKind::Payload,
            ReferenceType::PayloadGroup => SymbolKind::PayloadGroup,
            ReferenceType::PackageGroup => SymbolKind::PackageGroup,
            ReferenceType::ChainPackage => SymbolKind::ChainPackage,
            ReferenceType::RollbackBoundary => SymbolKind::RollbackBoundary,
            ReferenceType::BootstrapperUx => SymbolKind::BootstrapperUx,
        }
    }
}

impl FromStr for ReferenceType {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = match s {
            "Product" => ReferenceType::Product,
            "Module" => ReferenceType::Module,
            "Feature" => ReferenceType::Feature,
            "Component" => ReferenceType::Component,
            "Container" => ReferenceType::Container,
            "Payload" => ReferenceType::Payload,
            "PayloadGroup" => ReferenceType::PayloadGroup,
            "PackageGroup" => ReferenceType::PackageGroup,
            "ChainPackage" => ReferenceType::ChainPackage,
            "RollbackBoundary" => ReferenceType::RollbackBoundary,
            "BootstrapperUx" => ReferenceType::BootstrapperUx,
            _ => return Err(UnknownKind(s.to_string())),
        };
        Ok(t)
    }
}

impl fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol_kind())
    }
}

/// Directed parent/child edge between structural symbols
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexReference {
    pub parent_type: ReferenceType,
    pub parent: String,
    pub parent_language: Option<String>,
    pub child_type: ReferenceType,
    pub child: String,
    /// Preferred parent when the child has several
    pub is_primary: bool,
}

impl ComplexReference {
    pub fn new(
        parent_type: ReferenceType,
        parent: impl Into<String>,
        child_type: ReferenceType,
        child: impl Into<String>,
    ) -> Self {
        Self {
            parent_type,
            parent: parent.into(),
            parent_language: None,
            child_type,
            child: child.into(),
            is_primary: false,
        }
    }

    pub fn primary(mut self, is_primary: bool) -> Self {
        self.is_primary = is_primary;
        self
    }

    pub fn from_symbol(symbol: &Symbol) -> Option<Self> {
        if symbol.kind != SymbolKind::ComplexReference {
            return None;
        }
        Some(Self {
            parent_type: symbol.get_str("ParentType")?.parse().ok()?,
            parent: symbol.get_str("Parent")?.to_string(),
            parent_language: symbol.get_str("ParentLanguage").map(str::to_string),
            child_type: symbol.get_str("ChildType")?.parse().ok()?,
            child: symbol.get_str("Child")?.to_string(),
            is_primary: symbol.get_bool("IsPrimary").unwrap_or(false),
        })
    }

    pub fn to_symbol(&self, source: Option<SourceLineNumber>) -> Symbol {
        let mut symbol = Symbol::new(SymbolKind::ComplexReference, None, source)
            .with_str("Parent", &self.parent)
            .with_str("ParentType", self.parent_type.to_string())
            .with_str("Child", &self.child)
            .with_str("ChildType", self.child_type.to_string())
            .with_number("IsPrimary", i64::from(self.is_primary));
        if let Some(language) = &self.parent_language {
            symbol.set("ParentLanguage", FieldValue::String(language.clone()));
        }
        symbol
    }
}
