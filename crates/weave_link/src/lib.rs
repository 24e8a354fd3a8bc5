//! Symbol linking
//!
//! Linking merges the sections of compiled intermediates, resolves every
//! (kind, id) group against the access-modifier rules, loads the sections
//! reachable from the entry section and validates the complex-reference
//! graph. Wildcard harvesting and default feature assignment run as part of
//! the same pass.

mod default_feature;
mod diagnostics;
mod graph;
mod harvest;
mod ids;
mod linker;
mod table;

pub use default_feature::{DEFAULT_FEATURE_ID, assign_default_feature};
pub use diagnostics::{HarvestDiagnostic, LinkDiagnostic};
pub use graph::{Edge, Node, NodeId, ReferenceGraph};
pub use harvest::{FileHarvester, HarvestDirective, ModuleParent};
pub use ids::generate_identifier;
pub use linker::{LinkError, LinkOptions, link};
pub use table::{Candidate, Conflict, GroupResolution, Lookup, ReferenceSite, SymbolTable, resolve_group};
