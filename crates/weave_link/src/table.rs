//! Access-scoped symbol table built fresh for every link

use std::collections::{BTreeMap, HashMap};
use weave_model::{AccessModifier, Section, SourceLineNumber, SymbolHandle, SymbolKind};

/// One definition competing for a (kind, id) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub handle: SymbolHandle,
    pub access: AccessModifier,
    /// Library or compilation that owns the defining section
    pub owner: Option<String>,
    pub source: Option<SourceLineNumber>,
}

impl Candidate {
    fn file(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.file.as_str())
    }

    /// Whether both definitions claim the same id in a shared scope
    pub fn overlaps(&self, other: &Candidate) -> bool {
        match self.access.specificity().min(other.access.specificity()) {
            0 => true,
            1 => self.owner == other.owner,
            2 => self.file().is_some() && self.file() == other.file(),
            _ => self.handle.section == other.handle.section,
        }
    }

    pub fn location(&self) -> String {
        match &self.source {
            Some(source) => source.to_string(),
            None => "an unknown location".to_string(),
        }
    }
}

/// Where a reference is made from
#[derive(Debug, Clone, Copy)]
pub struct ReferenceSite<'a> {
    pub section: usize,
    pub owner: Option<&'a str>,
    pub file: Option<&'a str>,
}

impl Candidate {
    pub fn accessible_from(&self, site: &ReferenceSite<'_>) -> bool {
        match self.access {
            AccessModifier::Global | AccessModifier::Virtual | AccessModifier::Override => true,
            AccessModifier::Library => self.owner.as_deref() == site.owner,
            AccessModifier::File => self.file().is_some() && self.file() == site.file,
            AccessModifier::Section => self.handle.section == site.section,
        }
    }
}

/// A conflict found while resolving one group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    Duplicate { duplicate: Candidate, original: Candidate },
    DuplicateVirtual { duplicate: Candidate, original: Candidate },
    OverrideWithoutVirtual(Candidate),
}

/// Outcome of resolving every definition sharing a (kind, id)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupResolution {
    pub effective: Vec<Candidate>,
    /// Virtual bases replaced by an override
    pub overridden: Vec<SymbolHandle>,
    pub conflicts: Vec<Conflict>,
}

/// Apply the duplicate/override rules to one group of candidates, given in
/// declaration order.
pub fn resolve_group(candidates: &[Candidate]) -> GroupResolution {
    let mut result = GroupResolution::default();
    let (overrides, bases): (Vec<&Candidate>, Vec<&Candidate>) =
        candidates.iter().partition(|c| c.access == AccessModifier::Override);

    let mut kept: Vec<&Candidate> = Vec::new();
    for candidate in &bases {
        match kept.iter().find(|k| k.overlaps(candidate)) {
            Some(original) => {
                let duplicate = (*candidate).clone();
                let original = (*original).clone();
                let conflict = if original.access == AccessModifier::Virtual || duplicate.access == AccessModifier::Virtual {
                    Conflict::DuplicateVirtual { duplicate, original }
                } else {
                    Conflict::Duplicate { duplicate, original }
                };
                result.conflicts.push(conflict);
            }
            None => kept.push(candidate),
        }
    }

    match overrides.split_first() {
        None => result.effective = kept.into_iter().cloned().collect(),
        Some((_, _)) if bases.is_empty() => {
            result.conflicts.extend(overrides.iter().map(|o| Conflict::OverrideWithoutVirtual((*o).clone())));
        }
        Some((first, rest)) => {
            for extra in rest {
                result.conflicts.push(Conflict::DuplicateVirtual {
                    duplicate: (*extra).clone(),
                    original: (*first).clone(),
                });
            }
            result.overridden = bases.iter().map(|b| b.handle).collect();
            result.effective.push((*first).clone());
        }
    }

    result
}

/// Result of looking up a reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<'a> {
    Found(&'a Candidate),
    NotAccessible(&'a Candidate),
    Missing,
}

/// Multi-map from (kind, id) to every candidate sharing it
#[derive(Debug, Default)]
pub struct SymbolTable {
    /// Ordered by kind, then id; candidates keep declaration order
    groups: BTreeMap<(SymbolKind, String), Vec<Candidate>>,
    effective: HashMap<(SymbolKind, String), Vec<Candidate>>,
}

impl SymbolTable {
    /// Scanning: register every identified symbol of every section
    pub fn scan(sections: &[Section]) -> Self {
        let mut table = SymbolTable::default();
        for (si, section) in sections.iter().enumerate() {
            let owner = section.owner().map(str::to_string);
            for (i, symbol) in section.symbols.iter().enumerate() {
                let Some(id) = &symbol.id else { continue };
                table.groups.entry((symbol.kind, id.id.clone())).or_default().push(Candidate {
                    handle: SymbolHandle { section: si, symbol: i },
                    access: id.access,
                    owner: owner.clone(),
                    source: symbol.source.clone(),
                });
            }
        }
        table
    }

    /// Groups in stable (kind, id) order
    pub fn groups(&self) -> impl Iterator<Item = (&(SymbolKind, String), &[Candidate])> {
        self.groups.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Resolving: apply the group rules and remember the effective symbols
    pub fn resolve(&mut self) -> Vec<((SymbolKind, String), GroupResolution)> {
        let mut results = Vec::new();
        for (key, candidates) in &self.groups {
            let resolution = resolve_group(candidates);
            self.effective.insert(key.clone(), resolution.effective.clone());
            results.push((key.clone(), resolution));
        }
        results
    }

    /// Find the effective definition visible from `site`
    pub fn lookup(&self, kind: SymbolKind, id: &str, site: &ReferenceSite<'_>) -> Lookup<'_> {
        let Some(effective) = self.effective.get(&(kind, id.to_string())) else {
            return Lookup::Missing;
        };
        match effective.iter().find(|c| c.accessible_from(site)) {
            Some(found) => Lookup::Found(found),
            None => effective.first().map_or(Lookup::Missing, Lookup::NotAccessible),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(section: usize, access: AccessModifier, file: &str) -> Candidate {
        Candidate {
            handle: SymbolHandle { section, symbol: 0 },
            access,
            owner: None,
            source: Some(SourceLineNumber::new(file, section as u32 + 1)),
        }
    }

    #[test]
    fn test_single_definition_is_effective() {
        let r = resolve_group(&[candidate(0, AccessModifier::Global, "a.wxs")]);
        assert_eq!(r.effective.len(), 1);
        assert!(r.conflicts.is_empty());
    }

    #[test]
    fn test_two_globals_are_duplicates() {
        let a = candidate(0, AccessModifier::Global, "a.wxs");
        let b = candidate(1, AccessModifier::Global, "b.wxs");
        let r = resolve_group(&[a.clone(), b.clone()]);
        assert_eq!(r.conflicts, vec![Conflict::Duplicate { duplicate: b, original: a.clone() }]);
        assert_eq!(r.effective, vec![a]);
    }

    #[test]
    fn test_section_scoped_in_different_sections_coexist() {
        let r = resolve_group(&[
            candidate(0, AccessModifier::Section, "a.wxs"),
            candidate(1, AccessModifier::Section, "a.wxs"),
        ]);
        assert!(r.conflicts.is_empty());
        assert_eq!(r.effective.len(), 2);
    }

    #[test]
    fn test_file_scope_overlaps_only_within_file() {
        let same = resolve_group(&[
            candidate(0, AccessModifier::File, "a.wxs"),
            candidate(1, AccessModifier::Section, "a.wxs"),
        ]);
        assert_eq!(same.conflicts.len(), 1);

        let other = resolve_group(&[
            candidate(0, AccessModifier::File, "a.wxs"),
            candidate(1, AccessModifier::File, "b.wxs"),
        ]);
        assert!(other.conflicts.is_empty());
    }

    #[test]
    fn test_override_replaces_base() {
        let base = candidate(0, AccessModifier::Virtual, "a.wxs");
        let over = candidate(1, AccessModifier::Override, "b.wxs");
        let r = resolve_group(&[base.clone(), over.clone()]);
        assert!(r.conflicts.is_empty());
        assert_eq!(r.effective, vec![over]);
        assert_eq!(r.overridden, vec![base.handle]);
    }

    #[test]
    fn test_override_without_virtual() {
        let over = candidate(0, AccessModifier::Override, "a.wxs");
        let r = resolve_group(&[over.clone()]);
        assert_eq!(r.conflicts, vec![Conflict::OverrideWithoutVirtual(over)]);
        assert!(r.effective.is_empty());
    }

    #[test]
    fn test_virtual_redefined_is_duplicate_virtual() {
        let r = resolve_group(&[
            candidate(0, AccessModifier::Virtual, "a.wxs"),
            candidate(1, AccessModifier::Global, "b.wxs"),
        ]);
        assert!(matches!(r.conflicts[..], [Conflict::DuplicateVirtual { .. }]));
    }

    #[test]
    fn test_two_overrides_are_duplicate_virtual() {
        let r = resolve_group(&[
            candidate(0, AccessModifier::Virtual, "a.wxs"),
            candidate(1, AccessModifier::Override, "b.wxs"),
            candidate(2, AccessModifier::Override, "c.wxs"),
        ]);
        assert!(matches!(r.conflicts[..], [Conflict::DuplicateVirtual { .. }]));
        assert_eq!(r.effective[0].handle.section, 1);
    }

    #[test]
    fn test_groups_resolve_by_kind_then_id() {
        let property = |id: &str, line| {
            weave_model::Symbol::new(
                SymbolKind::Property,
                Some(weave_model::Identifier::global(id)),
                Some(SourceLineNumber::new("a.wxs", line)),
            )
        };
        let section = Section::fragment("a")
            .with_symbol(property("B", 1))
            .with_symbol(weave_model::Symbol::new(
                SymbolKind::Product,
                Some(weave_model::Identifier::global("Z")),
                None,
            ))
            .with_symbol(property("A", 2))
            .with_symbol(property("B", 3));

        let mut table = SymbolTable::scan(&[section]);
        let keys: Vec<(SymbolKind, String)> = table.resolve().into_iter().map(|(key, _)| key).collect();
        assert_eq!(
            keys,
            vec![
                (SymbolKind::Product, "Z".to_string()),
                (SymbolKind::Property, "A".to_string()),
                (SymbolKind::Property, "B".to_string()),
            ]
        );

        let lines: Vec<Option<u32>> = table
            .groups()
            .find(|((_, id), _)| id == "B")
            .map(|(_, candidates)| candidates.iter().map(|c| c.source.as_ref().and_then(|s| s.line)).collect())
            .unwrap_or_default();
        assert_eq!(lines, vec![Some(1), Some(3)]);
    }

    #[test]
    fn test_lookup_respects_access() {
        let mut section = Section::fragment("a");
        section.symbols.push(weave_model::Symbol::new(
            SymbolKind::Property,
            Some(weave_model::Identifier::new(AccessModifier::Section, "P")),
            None,
        ));
        let mut table = SymbolTable::scan(&[section]);
        table.resolve();

        let inside = ReferenceSite { section: 0, owner: None, file: None };
        let outside = ReferenceSite { section: 1, owner: None, file: None };
        assert!(matches!(table.lookup(SymbolKind::Property, "P", &inside), Lookup::Found(_)));
        assert!(matches!(table.lookup(SymbolKind::Property, "P", &outside), Lookup::NotAccessible(_)));
        assert_eq!(table.lookup(SymbolKind::Property, "Q", &inside), Lookup::Missing);
    }
}
