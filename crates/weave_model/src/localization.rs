//! Localization data: per-culture variables and control overrides

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::message::SourceLineNumber;

/// Marker for an unset numeric coordinate in a localized control
pub const NOT_SET: i32 = i32::MIN;

/// A named value; overridable values may be replaced by later registrations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindVariable {
    pub id: String,
    pub value: String,
    #[serde(default)]
    pub overridable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceLineNumber>,
}

impl BindVariable {
    pub fn new(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
            overridable: false,
            source: None,
        }
    }

    pub fn overridable(mut self) -> Self {
        self.overridable = true;
        self
    }
}

fn not_set() -> i32 {
    NOT_SET
}

/// Localized geometry, text and flags for a dialog or one of its controls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedControl {
    pub dialog: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<String>,
    #[serde(default = "not_set")]
    pub x: i32,
    #[serde(default = "not_set")]
    pub y: i32,
    #[serde(default = "not_set")]
    pub width: i32,
    #[serde(default = "not_set")]
    pub height: i32,
    #[serde(default)]
    pub right_aligned: bool,
    #[serde(default)]
    pub right_to_left: bool,
    #[serde(default)]
    pub left_scroll: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl LocalizedControl {
    pub fn new(dialog: impl Into<String>, control: Option<String>) -> Self {
        Self {
            dialog: dialog.into(),
            control,
            x: NOT_SET,
            y: NOT_SET,
            width: NOT_SET,
            height: NOT_SET,
            right_aligned: false,
            right_to_left: false,
            left_scroll: false,
            text: None,
        }
    }

    /// Lookup key: `Dialog` or `Dialog/Control`
    pub fn key_for(dialog: &str, control: Option<&str>) -> String {
        match control {
            Some(control) => format!("{}/{}", dialog, control),
            None => dialog.to_string(),
        }
    }

    pub fn key(&self) -> String {
        Self::key_for(&self.dialog, self.control.as_deref())
    }
}

/// Localization data for one culture from one source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Localization {
    /// Empty for language-neutral data
    #[serde(default)]
    pub culture: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codepage: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_codepage: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLineNumber>,
    #[serde(default)]
    pub variables: IndexMap<String, BindVariable>,
    #[serde(default)]
    pub controls: IndexMap<String, LocalizedControl>,
}

impl Localization {
    pub fn new(culture: impl Into<String>) -> Self {
        Self {
            culture: culture.into(),
            ..Self::default()
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.culture.is_empty()
    }

    pub fn with_variable(mut self, variable: BindVariable) -> Self {
        self.variables.insert(variable.id.clone(), variable);
        self
    }

    pub fn with_control(mut self, control: LocalizedControl) -> Self {
        self.controls.insert(control.key(), control);
        self
    }
}

/// Localizations shipped inside extension data, with the culture to use
/// when the caller supplied no filter
#[derive(Debug, Clone, Default)]
pub struct ExtensionLocalizations {
    pub default_culture: Option<String>,
    pub localizations: Vec<Localization>,
}
