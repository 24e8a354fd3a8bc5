//! Variable registration and substitution

use indexmap::IndexMap;
use thiserror::Error;
use weave_lexer::{Namespace, Segment, segments};
use weave_model::{
    BindVariable, Diagnostic, Diagnostics, Localization, LocalizedControl, Severity, SourceLineNumber,
};

/// Diagnostics raised while registering or substituting variables
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VariableDiagnostic {
    #[error("undefined variable '!(wix.{0})'")]
    UnknownVariable(String),

    #[error("undefined localization variable '!(loc.{0})'")]
    UnknownLocalizationVariable(String),

    #[error("variable '{name}' is already defined as '{existing}' and cannot be redefined as '{value}'")]
    ConflictingVariable {
        name: String,
        existing: String,
        value: String,
    },

    #[error("localization variable '{name}' is already defined as '{existing}' and cannot be redefined as '{value}'")]
    ConflictingLocalizationVariable {
        name: String,
        existing: String,
        value: String,
    },

    #[error("localization variable '!(loc.{0})' cannot declare a default value")]
    LocalizationDefault(String),

    #[error("no bind-time value for '!(bind.{0})'")]
    UnknownBindValue(String),

    #[error("variable '!(wix.{0})' is not defined, using its default value")]
    DefaultValueUsed(String),
}

impl Diagnostic for VariableDiagnostic {
    fn id(&self) -> u32 {
        match self {
            VariableDiagnostic::UnknownVariable(_) => 101,
            VariableDiagnostic::UnknownLocalizationVariable(_) => 102,
            VariableDiagnostic::ConflictingVariable { .. } => 103,
            VariableDiagnostic::ConflictingLocalizationVariable { .. } => 104,
            VariableDiagnostic::LocalizationDefault(_) => 105,
            VariableDiagnostic::UnknownBindValue(_) => 106,
            VariableDiagnostic::DefaultValueUsed(_) => 150,
        }
    }

    fn severity(&self) -> Severity {
        match self {
            VariableDiagnostic::DefaultValueUsed(_) => Severity::Verbose,
            _ => Severity::Error,
        }
    }
}

/// Outcome of resolving one piece of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub value: String,
    /// The value differs from the input text
    pub updated: bool,
    /// At least one `wix` default value was used
    pub is_default: bool,
    /// The text still holds `bind.*` references for the binder
    pub delayed: bool,
}

impl Resolution {
    fn unchanged(text: &str) -> Self {
        Self {
            value: text.to_string(),
            updated: false,
            is_default: false,
            delayed: false,
        }
    }
}

/// Outcome of registering a variable into a table
enum Registration {
    Added,
    Kept,
    Conflict(String),
}

#[derive(Debug, Default)]
struct VariableTable {
    vars: IndexMap<String, BindVariable>,
}

impl VariableTable {
    /// First non-overridable registration wins; overridable entries are
    /// replaced by whatever comes next.
    fn register(&mut self, variable: BindVariable) -> Registration {
        match self.vars.get(&variable.id) {
            None => {
                self.vars.insert(variable.id.clone(), variable);
                Registration::Added
            }
            Some(existing) if existing.overridable => {
                self.vars.insert(variable.id.clone(), variable);
                Registration::Added
            }
            Some(existing) if variable.overridable || existing.value == variable.value => Registration::Kept,
            Some(existing) => Registration::Conflict(existing.value.clone()),
        }
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|v| v.value.as_str())
    }
}

/// Substitutes `loc` and `wix` references and flags `bind` references
#[derive(Debug, Default)]
pub struct VariableResolver {
    wix: VariableTable,
    loc: VariableTable,
    /// Localized controls in registration order, highest priority first
    controls: IndexMap<String, Vec<LocalizedControl>>,
}

impl VariableResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a `wix` variable
    pub fn add_variable(
        &mut self,
        source: Option<&SourceLineNumber>,
        name: &str,
        value: &str,
        overridable: bool,
        diags: &mut Diagnostics,
    ) {
        let mut variable = BindVariable::new(name, value);
        variable.overridable = overridable;
        variable.source = source.cloned();

        if let Registration::Conflict(existing) = self.wix.register(variable) {
            diags.report(
                source,
                VariableDiagnostic::ConflictingVariable {
                    name: name.to_string(),
                    existing,
                    value: value.to_string(),
                },
            );
        }
    }

    /// Register a localization's variables and control overrides
    pub fn add_localization(&mut self, localization: &Localization, diags: &mut Diagnostics) {
        for variable in localization.variables.values() {
            if let Registration::Conflict(existing) = self.loc.register(variable.clone()) {
                let source = variable.source.as_ref().or(localization.location.as_ref());
                diags.report(
                    source,
                    VariableDiagnostic::ConflictingLocalizationVariable {
                        name: variable.id.clone(),
                        existing,
                        value: variable.value.clone(),
                    },
                );
            }
        }

        for (key, control) in &localization.controls {
            self.controls.entry(key.clone()).or_default().push(control.clone());
        }
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.wix.get(name)
    }

    pub fn localization_variable(&self, name: &str) -> Option<&str> {
        self.loc.get(name)
    }

    /// Every override registered for a dialog (`Dialog`) or control (`Dialog/Control`)
    pub fn localized_controls(&self, key: &str) -> &[LocalizedControl] {
        self.controls.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Substitute every known reference in `text`.
    ///
    /// With `allow_unresolved`, an unknown reference leaves the whole text
    /// untouched instead of raising an error.
    pub fn resolve(
        &self,
        source: Option<&SourceLineNumber>,
        text: &str,
        allow_unresolved: bool,
        diags: &mut Diagnostics,
    ) -> Resolution {
        if !weave_lexer::has_variables(text) {
            return Resolution::unchanged(text);
        }

        let mut value = String::with_capacity(text.len());
        let mut is_default = false;
        let mut delayed = false;
        let mut unresolved = Vec::new();

        for segment in segments(text) {
            let (var, raw) = match segment {
                Segment::Literal(literal) => {
                    value.push_str(&literal);
                    continue;
                }
                Segment::Variable { var, raw } => (var, raw),
            };
            let name = var.full_name();

            match var.namespace {
                Namespace::Bind => {
                    delayed = true;
                    value.push_str(&raw);
                }
                // search roots are applied by file resolution
                Namespace::BindPath => value.push_str(&raw),
                Namespace::Loc => {
                    if var.default.is_some() {
                        diags.report(source, VariableDiagnostic::LocalizationDefault(name.clone()));
                    }
                    match self.loc.get(&name) {
                        Some(resolved) => value.push_str(resolved),
                        None => {
                            value.push_str(&raw);
                            unresolved.push(VariableDiagnostic::UnknownLocalizationVariable(name));
                        }
                    }
                }
                Namespace::Wix => match (self.wix.get(&name), &var.default) {
                    (Some(resolved), _) => value.push_str(resolved),
                    (None, Some(default)) => {
                        tracing::trace!(variable = %name, "using default value");
                        diags.report(source, VariableDiagnostic::DefaultValueUsed(name));
                        value.push_str(default);
                        is_default = true;
                    }
                    (None, None) => {
                        value.push_str(&raw);
                        unresolved.push(VariableDiagnostic::UnknownVariable(name));
                    }
                },
            }
        }

        if !unresolved.is_empty() {
            if allow_unresolved {
                return Resolution { delayed, ..Resolution::unchanged(text) };
            }
            for diagnostic in unresolved {
                diags.report(source, diagnostic);
            }
        }

        Resolution {
            updated: value != text,
            value,
            is_default,
            delayed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver_with(vars: &[(&str, &str, bool)]) -> (VariableResolver, Diagnostics) {
        let mut diags = Diagnostics::new();
        let mut resolver = VariableResolver::new();
        for (name, value, overridable) in vars {
            resolver.add_variable(None, name, value, *overridable, &mut diags);
        }
        (resolver, diags)
    }

    #[test]
    fn test_bind_variable_is_substituted() {
        let (resolver, mut diags) = resolver_with(&[("ProductVersion", "1.0", false)]);
        let r = resolver.resolve(None, "v!(wix.ProductVersion)", false, &mut diags);
        assert_eq!(r.value, "v1.0");
        assert!(r.updated);
        assert!(!diags.encountered_error());
    }

    #[test]
    fn test_unknown_variable_is_error() {
        let (resolver, mut diags) = resolver_with(&[]);
        let r = resolver.resolve(None, "!(wix.Missing)", false, &mut diags);
        assert_eq!(r.value, "!(wix.Missing)");
        assert!(!r.updated);
        assert_eq!(diags.with_id(101).count(), 1);
    }

    #[test]
    fn test_unknown_variable_allowed_keeps_original_text() {
        let (resolver, mut diags) = resolver_with(&[("Known", "k", false)]);
        let r = resolver.resolve(None, "!(wix.Known) !(wix.Missing)", true, &mut diags);
        assert_eq!(r.value, "!(wix.Known) !(wix.Missing)");
        assert!(!r.updated);
        assert!(!diags.encountered_error());
    }

    #[test]
    fn test_first_non_overridable_wins_and_conflict_is_error() {
        let (resolver, diags) = resolver_with(&[("A", "1", false), ("A", "1", false), ("A", "2", false)]);
        assert_eq!(resolver.variable("A"), Some("1"));
        assert_eq!(diags.with_id(103).count(), 1);
    }

    #[test]
    fn test_overridable_is_replaced_silently() {
        let (resolver, diags) = resolver_with(&[("A", "1", true), ("A", "2", false), ("A", "3", true)]);
        assert_eq!(resolver.variable("A"), Some("2"));
        assert!(!diags.encountered_error());
    }

    #[test]
    fn test_bind_reference_is_delayed() {
        let (resolver, mut diags) = resolver_with(&[("Name", "App", false)]);
        let r = resolver.resolve(None, "!(wix.Name) !(bind.fileVersion.Exe)", false, &mut diags);
        assert!(r.delayed);
        assert_eq!(r.value, "App !(bind.fileVersion.Exe)");
    }

    #[test]
    fn test_default_value() {
        let (resolver, mut diags) = resolver_with(&[]);
        let r = resolver.resolve(None, "!(wix.Flavor=retail)", false, &mut diags);
        assert_eq!(r.value, "retail");
        assert!(r.is_default);
        assert!(!diags.encountered_error());
    }

    #[test]
    fn test_localization_variable() {
        let mut diags = Diagnostics::new();
        let mut resolver = VariableResolver::new();
        let loc = Localization::new("en-US").with_variable(BindVariable::new("Welcome", "Hello"));
        resolver.add_localization(&loc, &mut diags);

        let r = resolver.resolve(None, "!(loc.Welcome)!", false, &mut diags);
        assert_eq!(r.value, "Hello!");

        resolver.resolve(None, "!(loc.Welcome=x)", false, &mut diags);
        assert_eq!(diags.with_id(105).count(), 1);
    }
}
