//! Library combination
//!
//! Merges the sections of compiled intermediates into one library
//! intermediate, optionally resolving every path field to a file that will
//! be embedded in the library.

use indexmap::IndexMap;
use thiserror::Error;
use weave_link::generate_identifier;
use weave_model::{
    BindPath, BindStage, Cancelled, CancellationToken, Diagnostic, Diagnostics, FieldValue, Intermediate,
    IntermediateError, IntermediateLevel, Localization, Section, SourceLineNumber, SymbolKind, TrackedFile,
    TrackedFileType,
};
use weave_resolve::{VariableResolver, resolve_file};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LibraryDiagnostic {
    #[error("cannot embed '{path}' in the library: {reason}")]
    UnresolvedFile { path: String, reason: String },

    #[error("a library may contain at most one entry section; the first one is at {first}")]
    MultipleEntrySections { first: String },
}

impl Diagnostic for LibraryDiagnostic {
    fn id(&self) -> u32 {
        match self {
            LibraryDiagnostic::UnresolvedFile { .. } => 401,
            LibraryDiagnostic::MultipleEntrySections { .. } => 402,
        }
    }
}

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error(transparent)]
    Level(#[from] IntermediateError),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

#[derive(Debug, Clone, Default)]
pub struct LibraryOptions {
    /// Generated from the input ids when absent
    pub library_id: Option<String>,
    /// Resolve path fields and mark them for embedding
    pub bind_files: bool,
    pub bind_paths: Vec<BindPath>,
    pub bind_variables: IndexMap<String, String>,
    pub localizations: Vec<Localization>,
}

#[derive(Debug)]
pub struct LibraryResult {
    pub library: Intermediate,
    /// Files marked for embedding, as inputs
    pub tracked: Vec<TrackedFile>,
}

/// Combine compiled intermediates into a library
pub fn combine(
    intermediates: Vec<Intermediate>,
    options: &LibraryOptions,
    diags: &mut Diagnostics,
    cancel: &CancellationToken,
) -> Result<LibraryResult, LibraryError> {
    for intermediate in &intermediates {
        intermediate.require("library", &[IntermediateLevel::Compiled])?;
    }

    let library_id = options.library_id.clone().unwrap_or_else(|| {
        let ids: Vec<&str> = intermediates.iter().map(|i| i.id.as_str()).collect();
        generate_identifier("lib", &ids)
    });

    let mut sections = Vec::new();
    let mut localizations = Vec::new();
    for intermediate in intermediates {
        for mut section in intermediate.sections {
            section.compilation_id.get_or_insert_with(|| intermediate.id.clone());
            section.library_id = Some(library_id.clone());
            sections.push(section);
        }
        localizations.extend(intermediate.localizations);
    }
    localizations.extend(options.localizations.iter().cloned());

    let tracked = if options.bind_files {
        embed_files(&mut sections, &localizations, &library_id, options, diags, cancel)?
    } else {
        Vec::new()
    };

    validate(&sections, diags);

    tracing::info!(
        id = %library_id,
        sections = sections.len(),
        embedded = tracked.len(),
        "combined library"
    );

    let mut library = Intermediate::new(library_id, IntermediateLevel::Combined);
    library.sections = sections;
    library.localizations = localizations;
    Ok(LibraryResult { library, tracked })
}

/// Resolve every path field through variables and bind paths, marking the
/// ones found for embedding. Failures are reported per field.
fn embed_files(
    sections: &mut [Section],
    localizations: &[Localization],
    library_id: &str,
    options: &LibraryOptions,
    diags: &mut Diagnostics,
    cancel: &CancellationToken,
) -> Result<Vec<TrackedFile>, Cancelled> {
    let mut resolver = VariableResolver::new();
    for (name, value) in &options.bind_variables {
        resolver.add_variable(None, name, value, false, diags);
    }
    for localization in localizations {
        resolver.add_localization(localization, diags);
    }
    for symbol in sections.iter().flat_map(|s| s.symbols_of(SymbolKind::WixVariable)) {
        if let (Some(name), Some(value)) = (symbol.id_str(), symbol.get_str("Value")) {
            let overridable = symbol.get_bool("Overridable").unwrap_or(false);
            resolver.add_variable(symbol.source.as_ref(), name, value, overridable, diags);
        }
    }

    let mut tracked = Vec::new();
    for section in sections.iter_mut() {
        for symbol in section.symbols.iter_mut() {
            cancel.check()?;
            let source = symbol.source.clone();

            for (_, value) in symbol.fields_mut() {
                let FieldValue::Path(path) = value else { continue };
                let resolution = resolver.resolve(source.as_ref(), &path.path, true, diags);
                if resolution.delayed {
                    continue;
                }

                match resolve_file(&resolution.value, &options.bind_paths, BindStage::Normal) {
                    Ok(found) => {
                        path.path = found.to_string_lossy().into_owned();
                        path.embed = true;
                        path.base_uri = Some(library_id.to_string());
                        tracked.push(TrackedFile {
                            path: found,
                            ty: TrackedFileType::Input,
                            source: source.clone(),
                        });
                    }
                    Err(e) => diags.report(
                        source.as_ref(),
                        LibraryDiagnostic::UnresolvedFile { path: resolution.value, reason: e.to_string() },
                    ),
                }
            }
        }
    }

    Ok(tracked)
}

/// Check the entry section count.
///
/// Duplicate and reference checks wait for the final link so the same
/// conflict is not reported twice.
fn validate(sections: &[Section], diags: &mut Diagnostics) {
    let mut entries = sections.iter().filter(|s| s.is_entry());
    if let Some(first) = entries.next() {
        let location = |section: &Section| section.symbols.iter().find_map(|s| s.source.clone());
        for other in entries {
            diags.report(
                location(other).as_ref(),
                LibraryDiagnostic::MultipleEntrySections {
                    first: location(first).map_or_else(|| "an unknown location".to_string(), |s: SourceLineNumber| s.to_string()),
                },
            );
        }
    }
}
