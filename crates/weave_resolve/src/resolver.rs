//! Field resolution over a linked intermediate

use indexmap::IndexMap;
use thiserror::Error;
use weave_lexer::{Namespace, Segment, segments};
use weave_model::{
    Cancelled, CancellationToken, DelayedField, Diagnostics, ExpectedEmbeddedFile, ExtensionLocalizations,
    FieldValue, Intermediate, IntermediateError, IntermediateLevel, Localization, LocalizedControl, NOT_SET,
    Symbol, SymbolKind,
};

use crate::cultures::{CultureSettings, filter_localizations};
use crate::variables::{VariableDiagnostic, VariableResolver};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Level(#[from] IntermediateError),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Inputs to the resolve stage besides the intermediate itself
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub cultures: Vec<String>,
    /// Localizations supplied outside the program
    pub localizations: Vec<Localization>,
    pub extensions: Vec<ExtensionLocalizations>,
    /// Registered before the program's own `WixVariable` symbols
    pub bind_variables: IndexMap<String, String>,
    pub allow_unresolved_variables: bool,
}

#[derive(Debug)]
pub struct ResolveResult {
    pub intermediate: Intermediate,
    pub delayed_fields: Vec<DelayedField>,
    pub expected_embedded_files: Vec<ExpectedEmbeddedFile>,
    pub settings: CultureSettings,
}

/// Resolve variables in every field of a linked intermediate
pub fn resolve(
    mut intermediate: Intermediate,
    options: &ResolveOptions,
    diags: &mut Diagnostics,
    cancel: &CancellationToken,
) -> Result<ResolveResult, ResolveError> {
    intermediate.require("resolve", &[IntermediateLevel::Linked])?;

    let localizations = filter_localizations(
        &options.cultures,
        &options.localizations,
        &intermediate.localizations,
        &options.extensions,
    );
    let settings = CultureSettings::from_primary(&localizations);

    let mut resolver = VariableResolver::new();
    for (name, value) in &options.bind_variables {
        resolver.add_variable(None, name, value, false, diags);
    }
    for localization in &localizations {
        resolver.add_localization(localization, diags);
    }
    for (_, symbol) in intermediate.symbols() {
        if symbol.kind != SymbolKind::WixVariable {
            continue;
        }
        if let (Some(name), Some(value)) = (symbol.id_str(), symbol.get_str("Value")) {
            let overridable = symbol.get_bool("Overridable").unwrap_or(false);
            resolver.add_variable(symbol.source.as_ref(), name, value, overridable, diags);
        }
    }

    localize_ui(&mut intermediate, &resolver, cancel)?;
    let delayed_fields = resolve_fields(&mut intermediate, &resolver, options.allow_unresolved_variables, diags, cancel)?;
    apply_culture_settings(&mut intermediate, &settings);
    let expected_embedded_files = expected_embedded_files(&intermediate);

    tracing::info!(
        delayed = delayed_fields.len(),
        embedded = expected_embedded_files.len(),
        culture = ?settings.culture,
        "resolved intermediate"
    );

    intermediate.localizations = localizations;
    intermediate.advance(IntermediateLevel::Resolved)?;
    Ok(ResolveResult {
        intermediate,
        delayed_fields,
        expected_embedded_files,
        settings,
    })
}

/// Substitute variables into every string and path field.
///
/// Fields still holding `bind.*` references are left untouched and returned
/// as delayed fields.
pub fn resolve_fields(
    intermediate: &mut Intermediate,
    resolver: &VariableResolver,
    allow_unresolved: bool,
    diags: &mut Diagnostics,
    cancel: &CancellationToken,
) -> Result<Vec<DelayedField>, Cancelled> {
    let mut delayed = Vec::new();

    for (si, section) in intermediate.sections.iter_mut().enumerate() {
        for (i, symbol) in section.symbols.iter_mut().enumerate() {
            cancel.check()?;
            let source = symbol.source.clone();
            let handle = weave_model::SymbolHandle { section: si, symbol: i };

            for (field, value) in symbol.fields_mut() {
                let Some(text) = value.as_text() else { continue };
                let resolution = resolver.resolve(source.as_ref(), text, allow_unresolved, diags);

                if resolution.delayed {
                    delayed.push(DelayedField { symbol: handle, field, raw: resolution.value });
                } else if resolution.updated {
                    set_text(value, resolution.value);
                }
            }
        }
    }

    Ok(delayed)
}

fn set_text(value: &mut FieldValue, text: String) {
    match value {
        FieldValue::String(s) => *s = text,
        FieldValue::Path(p) => p.path = text,
        FieldValue::Number(_) => {}
    }
}

/// Finish delayed fields once bind-time values (keyed `name.scope`) are known
pub fn resolve_delayed_fields(
    intermediate: &mut Intermediate,
    delayed: &[DelayedField],
    values: &IndexMap<String, String>,
    diags: &mut Diagnostics,
) {
    for field in delayed {
        let Some(symbol) = intermediate.symbol_mut(field.symbol) else { continue };
        let source = symbol.source.clone();

        let mut text = String::with_capacity(field.raw.len());
        for segment in segments(&field.raw) {
            match segment {
                Segment::Literal(literal) => text.push_str(&literal),
                Segment::Variable { var, raw } if var.namespace == Namespace::Bind => {
                    let name = var.full_name();
                    match (values.get(&name), &var.default) {
                        (Some(value), _) => text.push_str(value),
                        (None, Some(default)) => text.push_str(default),
                        (None, None) => {
                            diags.report(source.as_ref(), VariableDiagnostic::UnknownBindValue(name));
                            text.push_str(&raw);
                        }
                    }
                }
                Segment::Variable { raw, .. } => text.push_str(&raw),
            }
        }

        let mut value = symbol
            .field(field.field)
            .cloned()
            .unwrap_or(FieldValue::String(String::new()));
        set_text(&mut value, text);
        symbol.set_field(field.field, Some(value));
    }
}

/// Merge localized dialog and control overrides onto their symbols
fn localize_ui(intermediate: &mut Intermediate, resolver: &VariableResolver, cancel: &CancellationToken) -> Result<(), Cancelled> {
    for section in &mut intermediate.sections {
        for symbol in &mut section.symbols {
            cancel.check()?;
            let text_field = match symbol.kind {
                SymbolKind::Dialog => "Title",
                SymbolKind::Control => "Text",
                _ => continue,
            };
            let Some(key) = symbol.id_str().map(str::to_string) else { continue };

            // lowest priority first so earlier localizations win on set values
            for localized in resolver.localized_controls(&key).iter().rev() {
                apply_localized_control(symbol, localized, text_field);
            }
        }
    }
    Ok(())
}

fn apply_localized_control(symbol: &mut Symbol, localized: &LocalizedControl, text_field: &str) {
    for (name, value) in [
        ("X", localized.x),
        ("Y", localized.y),
        ("Width", localized.width),
        ("Height", localized.height),
    ] {
        if value != NOT_SET {
            symbol.set(name, FieldValue::Number(i64::from(value)));
        }
    }

    if let Some(text) = &localized.text {
        symbol.set(text_field, FieldValue::String(text.clone()));
    }

    for (name, flag) in [
        ("RightAligned", localized.right_aligned),
        ("RightToLeft", localized.right_to_left),
        ("LeftScroll", localized.left_scroll),
    ] {
        if flag {
            symbol.set(name, FieldValue::Number(1));
        }
    }
}

fn apply_culture_settings(intermediate: &mut Intermediate, settings: &CultureSettings) {
    for section in &mut intermediate.sections {
        for symbol in &mut section.symbols {
            if symbol.kind != SymbolKind::Product {
                continue;
            }
            if let (None, Some(codepage)) = (symbol.get("Codepage"), settings.codepage) {
                symbol.set("Codepage", FieldValue::Number(i64::from(codepage)));
            }
            if let (None, Some(lcid)) = (symbol.get("Language"), settings.lcid) {
                symbol.set("Language", FieldValue::Number(i64::from(lcid)));
            }
        }
    }
}

fn expected_embedded_files(intermediate: &Intermediate) -> Vec<ExpectedEmbeddedFile> {
    let mut files = Vec::new();
    for (_, symbol) in intermediate.symbols() {
        for (_, value) in symbol.fields() {
            if let FieldValue::Path(path) = value {
                if let (true, Some(library_id)) = (path.embed, &path.base_uri) {
                    files.push(ExpectedEmbeddedFile {
                        library_id: library_id.clone(),
                        path: path.path.clone(),
                        source: symbol.source.clone(),
                    });
                }
            }
        }
    }
    files
}
