//! Extension checkpoints around each pipeline stage

use std::fmt;
use thiserror::Error;
use weave_model::{Diagnostic, Diagnostics, ExtensionLocalizations, Intermediate, Symbol};

/// Fixed points in the pipeline where extensions run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Checkpoint {
    PreCombine,
    PostCombine,
    PreLink,
    PostLink,
    PreResolve,
    PostResolve,
    PreOptimize,
    PostOptimize,
    PreLayout,
    PostLayout,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Checkpoint::PreCombine => "pre-combine",
            Checkpoint::PostCombine => "post-combine",
            Checkpoint::PreLink => "pre-link",
            Checkpoint::PostLink => "post-link",
            Checkpoint::PreResolve => "pre-resolve",
            Checkpoint::PostResolve => "post-resolve",
            Checkpoint::PreOptimize => "pre-optimize",
            Checkpoint::PostOptimize => "post-optimize",
            Checkpoint::PreLayout => "pre-layout",
            Checkpoint::PostLayout => "post-layout",
        };
        write!(f, "{}", s)
    }
}

/// Pipeline-level diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineDiagnostic {
    #[error("extension '{extension}' added symbols at {checkpoint}, but there is no section to hold them")]
    NoSectionForEdits { extension: String, checkpoint: Checkpoint },

    #[error("extension '{extension}' cannot define '{id}': identifiers starting with 'Wix' are reserved")]
    ReservedIdentifier { extension: String, id: String },
}

impl Diagnostic for PipelineDiagnostic {
    fn id(&self) -> u32 {
        match self {
            PipelineDiagnostic::NoSectionForEdits { .. } => 1,
            PipelineDiagnostic::ReservedIdentifier { .. } => 2,
        }
    }
}

/// Symbols an extension adds at one checkpoint
#[derive(Debug, Default)]
pub struct SymbolEdits {
    added: Vec<Symbol>,
}

impl SymbolEdits {
    pub fn add(&mut self, symbol: Symbol) {
        self.added.push(symbol);
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len()
    }
}

/// A participant invoked at every checkpoint.
///
/// Extensions see the intermediates as they stand at the checkpoint and may
/// only add symbols through `edits`.
pub trait Extension {
    fn name(&self) -> &str;

    /// Localizations shipped with the extension, filtered like any other
    fn localizations(&self) -> Option<ExtensionLocalizations> {
        None
    }

    fn checkpoint(
        &mut self,
        checkpoint: Checkpoint,
        intermediates: &[Intermediate],
        edits: &mut SymbolEdits,
        diags: &mut Diagnostics,
    );
}

/// Run every extension at `checkpoint` and apply its edits to the entry
/// section of the first intermediate (or its first section)
pub(crate) fn run_checkpoint(
    extensions: &mut [Box<dyn Extension>],
    checkpoint: Checkpoint,
    intermediates: &mut [Intermediate],
    diags: &mut Diagnostics,
) {
    for extension in extensions.iter_mut() {
        let mut edits = SymbolEdits::default();
        extension.checkpoint(checkpoint, intermediates, &mut edits, diags);
        if edits.is_empty() {
            continue;
        }
        tracing::debug!(extension = extension.name(), %checkpoint, added = edits.len(), "applying extension edits");

        let target = intermediates.first_mut().and_then(|im| {
            let index = im.sections.iter().position(|s| s.is_entry()).unwrap_or(0);
            im.sections.get_mut(index)
        });
        let Some(section) = target else {
            diags.report(
                None,
                PipelineDiagnostic::NoSectionForEdits { extension: extension.name().to_string(), checkpoint },
            );
            continue;
        };

        for symbol in edits.added {
            if let Some(id) = symbol.id_str().filter(|id| id.starts_with("Wix")) {
                diags.report(
                    symbol.source.as_ref(),
                    PipelineDiagnostic::ReservedIdentifier { extension: extension.name().to_string(), id: id.to_string() },
                );
                continue;
            }
            section.symbols.push(symbol);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_model::{Identifier, IntermediateLevel, Section, SectionType, SymbolKind};

    struct AddProperty {
        id: &'static str,
    }

    impl Extension for AddProperty {
        fn name(&self) -> &str {
            "add-property"
        }

        fn checkpoint(&mut self, _: Checkpoint, _: &[Intermediate], edits: &mut SymbolEdits, _: &mut Diagnostics) {
            edits.add(Symbol::new(SymbolKind::Property, Some(Identifier::global(self.id)), None));
        }
    }

    fn intermediate() -> Intermediate {
        Intermediate::new("a", IntermediateLevel::Compiled)
            .with_section(Section::fragment("f"))
            .with_section(Section::new(Some("p".into()), SectionType::Product))
    }

    #[test]
    fn test_edits_land_in_entry_section() {
        let mut extensions: Vec<Box<dyn Extension>> = vec![Box::new(AddProperty { id: "Extra" })];
        let mut intermediates = vec![intermediate()];
        let mut diags = Diagnostics::new();

        run_checkpoint(&mut extensions, Checkpoint::PreLink, &mut intermediates, &mut diags);

        assert!(intermediates[0].sections[0].symbols.is_empty());
        assert_eq!(intermediates[0].sections[1].symbols[0].id_str(), Some("Extra"));
        assert!(!diags.encountered_error());
    }

    #[test]
    fn test_reserved_identifier_is_rejected() {
        let mut extensions: Vec<Box<dyn Extension>> = vec![Box::new(AddProperty { id: "WixMine" })];
        let mut intermediates = vec![intermediate()];
        let mut diags = Diagnostics::new();

        run_checkpoint(&mut extensions, Checkpoint::PostLink, &mut intermediates, &mut diags);

        assert_eq!(diags.with_id(2).count(), 1);
        assert!(intermediates[0].sections[1].symbols.is_empty());
    }

    #[test]
    fn test_edits_without_sections() {
        let mut extensions: Vec<Box<dyn Extension>> = vec![Box::new(AddProperty { id: "Extra" })];
        let mut diags = Diagnostics::new();

        run_checkpoint(&mut extensions, Checkpoint::PreLayout, &mut [], &mut diags);
        assert_eq!(diags.with_id(1).count(), 1);
    }
}
