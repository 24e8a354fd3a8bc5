//! Linking: merge sections, resolve symbols, load reachable sections and
//! validate the complex-reference graph

use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;
use weave_model::{
    BindPath, Cancelled, CancellationToken, ComplexReference, Diagnostics, Intermediate, IntermediateError,
    IntermediateLevel, ReferenceType, Section, SectionType, SourceLineNumber, Symbol, SymbolHandle, SymbolKind,
    SymbolReference,
};

use crate::default_feature::assign_default_feature;
use crate::diagnostics::{LinkDiagnostic, unreferenced};
use crate::graph::{NodeId, ReferenceGraph};
use crate::harvest::{FileHarvester, HarvestDirective, ModuleParent};
use crate::table::{Conflict, Lookup, ReferenceSite, SymbolTable};

#[derive(Debug, Error)]
pub enum LinkError {
    #[error(transparent)]
    Level(#[from] IntermediateError),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

#[derive(Debug, Clone, Default)]
pub struct LinkOptions {
    pub bind_paths: Vec<BindPath>,
    /// Component ids referenced from outside this link
    pub referenced_components: HashSet<String>,
    /// Id of the linked intermediate; defaults to the entry section's id
    pub output_id: Option<String>,
}

/// Link compiled or combined intermediates into one linked intermediate.
///
/// Structural problems are reported to `diags` and never stop the pass;
/// callers decide whether to continue by checking `encountered_error`.
pub fn link(
    intermediates: Vec<Intermediate>,
    options: &LinkOptions,
    diags: &mut Diagnostics,
    cancel: &CancellationToken,
) -> Result<Intermediate, LinkError> {
    for intermediate in &intermediates {
        intermediate.require("link", &[IntermediateLevel::Compiled, IntermediateLevel::Combined])?;
    }

    let mut sections = Vec::new();
    let mut localizations = Vec::new();
    for intermediate in intermediates {
        for mut section in intermediate.sections {
            if section.compilation_id.is_none() && section.library_id.is_none() {
                section.compilation_id = Some(intermediate.id.clone());
            }
            sections.push(section);
        }
        localizations.extend(intermediate.localizations);
    }

    let entry = find_entry(&sections, diags);
    harvest_files(&mut sections, &options.bind_paths, diags, cancel)?;

    let mut table = SymbolTable::scan(&sections);
    let overridden = report_conflicts(&mut table, diags);
    cancel.check()?;

    let loaded = load_sections(&sections, &table, entry, diags, cancel)?;
    let graph = build_graph(&sections, &loaded, &table, diags);
    check_primaries(&graph, &sections, diags);

    let entry_type = entry.map(|e| sections[e].ty);
    if entry_type == Some(SectionType::Bundle) {
        check_containers(&graph, &sections, diags);
        report_orphans(&graph, &sections, &loaded, &table, diags);
    }

    let mut referenced = options.referenced_components.clone();
    for edge in graph.edges() {
        let parent = graph.get(edge.parent);
        let child = graph.get(edge.child);
        if child.ty == ReferenceType::Component
            && matches!(parent.ty, ReferenceType::Feature | ReferenceType::Module | ReferenceType::Product)
        {
            referenced.insert(child.id.clone());
        }
    }

    let id = options
        .output_id
        .clone()
        .or_else(|| entry.and_then(|e| sections[e].id.clone()))
        .unwrap_or_else(|| "linked".to_string());

    let mut output = Vec::new();
    let mut output_entry = None;
    for (si, mut section) in sections.into_iter().enumerate() {
        if !loaded[si] {
            continue;
        }
        if Some(si) == entry {
            output_entry = Some(output.len());
        }
        let mut index = 0;
        section.symbols.retain(|_| {
            let keep = !overridden.contains(&SymbolHandle { section: si, symbol: index });
            index += 1;
            keep
        });
        output.push(section);
    }

    if let (Some(SectionType::Product), Some(entry)) = (entry_type, output_entry) {
        assign_default_feature(&mut output, entry, &referenced);
    }

    tracing::info!(
        id = %id,
        sections = output.len(),
        overridden = overridden.len(),
        errors = diags.error_count(),
        "linked intermediate"
    );

    let mut linked = Intermediate::new(id, IntermediateLevel::Linked);
    linked.sections = output;
    linked.localizations = localizations;
    Ok(linked)
}

fn find_entry(sections: &[Section], diags: &mut Diagnostics) -> Option<usize> {
    let mut entries = sections.iter().enumerate().filter(|(_, s)| s.is_entry()).map(|(i, _)| i);
    let Some(first) = entries.next() else {
        diags.report(None, LinkDiagnostic::MissingEntrySection);
        return None;
    };
    for other in entries {
        diags.report(
            section_source(&sections[other]),
            LinkDiagnostic::MultipleEntrySections {
                first: section_source(&sections[first]).map_or_else(|| "an unknown location".to_string(), |s| s.to_string()),
            },
        );
    }
    Some(first)
}

fn section_source(section: &Section) -> Option<&SourceLineNumber> {
    section.symbols.iter().find_map(|s| s.source.as_ref())
}

fn harvest_files(
    sections: &mut [Section],
    bind_paths: &[BindPath],
    diags: &mut Diagnostics,
    cancel: &CancellationToken,
) -> Result<(), Cancelled> {
    let mut harvester = FileHarvester::new(bind_paths);
    for (si, section) in sections.iter_mut().enumerate() {
        let directives: Vec<HarvestDirective> =
            section.symbols_of(SymbolKind::HarvestFiles).filter_map(HarvestDirective::from_symbol).collect();
        if directives.is_empty() {
            continue;
        }

        let module = if section.ty == SectionType::Module {
            section.symbols_of(SymbolKind::Module).next().and_then(|m| {
                Some(ModuleParent {
                    id: m.id_str()?.to_string(),
                    language: m.get_number("Language").map(|l| l.to_string()),
                })
            })
        } else {
            None
        };

        for directive in &directives {
            cancel.check()?;
            let symbols = harvester.harvest(si, directive, module.as_ref(), diags);
            section.symbols.extend(symbols);
        }
    }
    if harvester.harvested_count() > 0 {
        tracing::debug!(files = harvester.harvested_count(), "harvested files");
    }
    Ok(())
}

/// Report every duplicate and override problem, returning overridden bases
fn report_conflicts(table: &mut SymbolTable, diags: &mut Diagnostics) -> HashSet<SymbolHandle> {
    let mut overridden = HashSet::new();
    for ((kind, id), resolution) in table.resolve() {
        for conflict in resolution.conflicts {
            match conflict {
                Conflict::Duplicate { duplicate, original } => diags.report(
                    duplicate.source.as_ref(),
                    LinkDiagnostic::DuplicateSymbol { kind, id: id.clone(), original: original.location() },
                ),
                Conflict::DuplicateVirtual { duplicate, original } => diags.report(
                    duplicate.source.as_ref(),
                    LinkDiagnostic::DuplicateVirtualSymbol { kind, id: id.clone(), original: original.location() },
                ),
                Conflict::OverrideWithoutVirtual(candidate) => diags.report(
                    candidate.source.as_ref(),
                    LinkDiagnostic::OverrideWithoutVirtual { kind, id: id.clone() },
                ),
            }
        }
        overridden.extend(resolution.overridden);
    }
    overridden
}

fn site<'a>(sections: &'a [Section], section: usize, symbol: &'a Symbol) -> ReferenceSite<'a> {
    ReferenceSite {
        section,
        owner: sections[section].owner(),
        file: symbol.source.as_ref().map(|s| s.file.as_str()),
    }
}

/// Breadth-first load of every section reachable from the entry section;
/// without an entry every section is loaded
fn load_sections(
    sections: &[Section],
    table: &SymbolTable,
    entry: Option<usize>,
    diags: &mut Diagnostics,
    cancel: &CancellationToken,
) -> Result<Vec<bool>, Cancelled> {
    let mut loaded = vec![false; sections.len()];
    let mut queue: VecDeque<usize> = match entry {
        Some(entry) => VecDeque::from([entry]),
        None => (0..sections.len()).collect(),
    };
    for &si in &queue {
        loaded[si] = true;
    }

    while let Some(si) = queue.pop_front() {
        cancel.check()?;
        tracing::debug!(section = ?sections[si].id, "loading section");

        for symbol in &sections[si].symbols {
            let targets: Vec<(SymbolKind, &str, bool)> = match symbol.kind {
                SymbolKind::SimpleReference => match SymbolReference::from_symbol(symbol) {
                    Some(reference) => vec![(reference.kind, symbol.get_str("PrimaryKeys").unwrap_or(""), true)],
                    None => continue,
                },
                SymbolKind::ComplexReference => match ComplexReference::from_symbol(symbol) {
                    Some(edge) => vec![
                        (edge.parent_type.symbol_kind(), symbol.get_str("Parent").unwrap_or(""), false),
                        (edge.child_type.symbol_kind(), symbol.get_str("Child").unwrap_or(""), false),
                    ],
                    None => continue,
                },
                _ => continue,
            };

            let from = site(sections, si, symbol);
            for (kind, id, required) in targets {
                match table.lookup(kind, id, &from) {
                    Lookup::Found(found) => {
                        if !loaded[found.handle.section] {
                            loaded[found.handle.section] = true;
                            queue.push_back(found.handle.section);
                        }
                    }
                    Lookup::NotAccessible(found) if required => diags.report(
                        symbol.source.as_ref(),
                        LinkDiagnostic::SymbolNotAccessible { kind, id: id.to_string(), access: found.access },
                    ),
                    Lookup::Missing if required => diags.report(
                        symbol.source.as_ref(),
                        LinkDiagnostic::UnresolvedReference { kind, id: id.to_string() },
                    ),
                    // complex reference endpoints are reported while building the graph
                    _ => {}
                }
            }
        }
    }

    Ok(loaded)
}

/// Validate complex-reference endpoints and build the graph from the ones
/// that resolve
fn build_graph(sections: &[Section], loaded: &[bool], table: &SymbolTable, diags: &mut Diagnostics) -> ReferenceGraph {
    let mut graph = ReferenceGraph::new();

    for (si, section) in sections.iter().enumerate().filter(|(si, _)| loaded[*si]) {
        for symbol in section.symbols_of(SymbolKind::ComplexReference) {
            let Some(edge) = ComplexReference::from_symbol(symbol) else { continue };
            let from = site(sections, si, symbol);

            let mut endpoint = |ty: ReferenceType, id: &str, graph: &mut ReferenceGraph| -> Option<NodeId> {
                let kind = ty.symbol_kind();
                match table.lookup(kind, id, &from) {
                    Lookup::Found(found) => Some(graph.node(ty, id, found.handle)),
                    Lookup::NotAccessible(found) => {
                        diags.report(
                            symbol.source.as_ref(),
                            LinkDiagnostic::SymbolNotAccessible { kind, id: id.to_string(), access: found.access },
                        );
                        None
                    }
                    Lookup::Missing => {
                        let diagnostic = unreferenced(edge.child_type, &edge.child)
                            .unwrap_or_else(|| LinkDiagnostic::UnresolvedReference { kind, id: id.to_string() });
                        diags.report(symbol.source.as_ref(), diagnostic);
                        None
                    }
                }
            };

            let parent = endpoint(edge.parent_type, &edge.parent, &mut graph);
            let child = endpoint(edge.child_type, &edge.child, &mut graph);
            if let (Some(parent), Some(child)) = (parent, child) {
                graph.add_edge(parent, child, edge.is_primary, symbol.source.clone());
            }
        }
    }

    graph
}

fn symbol_at<'a>(sections: &'a [Section], handle: SymbolHandle) -> &'a Symbol {
    &sections[handle.section].symbols[handle.symbol]
}

fn check_primaries(graph: &ReferenceGraph, sections: &[Section], diags: &mut Diagnostics) {
    for (child, parent_type) in graph.conflicting_primaries() {
        let node = graph.get(child);
        diags.report(
            symbol_at(sections, node.symbol).source.as_ref(),
            LinkDiagnostic::MultiplePrimaryReferences { child_type: node.ty, child: node.id.clone(), parent_type },
        );
    }
}

fn check_containers(graph: &ReferenceGraph, sections: &[Section], diags: &mut Diagnostics) {
    let mut membership: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    let mut order = Vec::new();
    for edge in graph.edges() {
        let child = graph.get(edge.child);
        if graph.get(edge.parent).ty != ReferenceType::Container
            || !matches!(child.ty, ReferenceType::Payload | ReferenceType::ChainPackage)
        {
            continue;
        }
        let containers = membership.entry(edge.child).or_default();
        if containers.is_empty() {
            order.push(edge.child);
        }
        if !containers.contains(&edge.parent) {
            containers.push(edge.parent);
        }
    }

    for child in order {
        let node = graph.get(child);
        let symbol = symbol_at(sections, node.symbol);
        let containers = &membership[&child];

        if containers.len() > 1 {
            let names: Vec<&str> = containers.iter().map(|c| graph.get(*c).id.as_str()).collect();
            diags.report(
                symbol.source.as_ref(),
                LinkDiagnostic::MultipleContainers {
                    kind: symbol.kind,
                    id: node.id.clone(),
                    containers: names.join(", "),
                },
            );
        }
        if node.ty != ReferenceType::Payload {
            continue;
        }

        let is_ux = graph.parents(child).any(|e| graph.get(e.parent).ty == ReferenceType::BootstrapperUx);
        for container in containers {
            let container_node = graph.get(*container);
            let id = node.id.clone();
            let container_id = container_node.id.clone();
            if is_ux {
                diags.report(symbol.source.as_ref(), LinkDiagnostic::UxPayloadInContainer { id, container: container_id });
            } else if symbol.get_number("Compressed") == Some(0) {
                diags.report(
                    symbol.source.as_ref(),
                    LinkDiagnostic::UncompressedPayloadInContainer { id, container: container_id },
                );
            } else if is_remote(symbol) && embeds_contents(symbol_at(sections, container_node.symbol)) {
                diags.report(
                    symbol.source.as_ref(),
                    LinkDiagnostic::RemotePayloadInEmbeddedContainer { id, container: container_id },
                );
            }
        }
    }
}

/// A payload downloaded at install time with no local source
fn is_remote(payload: &Symbol) -> bool {
    payload.get_str("DownloadUrl").is_some_and(|u| !u.is_empty()) && payload.get_path("Source").is_none()
}

fn embeds_contents(container: &Symbol) -> bool {
    container.get_str("Type").is_some_and(|t| t.eq_ignore_ascii_case("attached"))
}

/// Effective payloads, packages and rollback boundaries that nothing schedules
fn report_orphans(
    graph: &ReferenceGraph,
    sections: &[Section],
    loaded: &[bool],
    table: &SymbolTable,
    diags: &mut Diagnostics,
) {
    for ((kind, id), candidates) in table.groups() {
        let ty = match kind {
            SymbolKind::Payload => ReferenceType::Payload,
            SymbolKind::ChainPackage => ReferenceType::ChainPackage,
            SymbolKind::RollbackBoundary => ReferenceType::RollbackBoundary,
            _ => continue,
        };
        let scheduled = graph.find(ty, id).is_some_and(|node| graph.has_parent(node));
        if scheduled {
            continue;
        }
        for candidate in candidates.iter().filter(|c| loaded[c.handle.section]) {
            if let Some(diagnostic) = unreferenced(ty, id) {
                diags.report(symbol_at(sections, candidate.handle).source.as_ref(), diagnostic);
            }
        }
    }
}
