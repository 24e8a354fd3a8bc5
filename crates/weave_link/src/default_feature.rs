//! Assignment of orphaned components to a synthetic default feature

use std::collections::HashSet;
use weave_model::{ComplexReference, Identifier, ReferenceType, Section, Symbol, SymbolKind};

/// Reserved id of the synthetic feature
pub const DEFAULT_FEATURE_ID: &str = "WixDefaultFeature";

/// Give every component whose id is not in `referenced` a primary membership
/// edge to the default feature, creating the feature in `sections[entry]` on
/// first use. Returns the orphaned component ids in declaration order.
pub fn assign_default_feature(sections: &mut [Section], entry: usize, referenced: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let orphans: Vec<String> = sections
        .iter()
        .flat_map(|section| section.symbols_of(SymbolKind::Component))
        .filter_map(|component| component.id_str())
        .filter(|id| !referenced.contains(*id))
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect();

    let Some(section) = sections.get_mut(entry) else {
        return Vec::new();
    };
    if orphans.is_empty() {
        return orphans;
    }

    tracing::debug!(count = orphans.len(), "assigning orphaned components to the default feature");
    section.symbols.push(
        Symbol::new(SymbolKind::Feature, Some(Identifier::global(DEFAULT_FEATURE_ID)), None)
            .with_number("Level", 1)
            .with_number("Display", 0)
            .with_str("InstallDefault", "local"),
    );
    for component in &orphans {
        let edge = ComplexReference::new(ReferenceType::Feature, DEFAULT_FEATURE_ID, ReferenceType::Component, component)
            .primary(true);
        section.symbols.push(edge.to_symbol(None));
    }

    orphans
}
