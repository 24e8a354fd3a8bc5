//! Variable resolution and localization
//!
//! This crate turns a linked intermediate into a resolved one by:
//! 1. Ordering localizations by culture filter
//! 2. Registering bind, localization and program variables
//! 3. Substituting variables into fields, deferring `bind.*` references
//! 4. Merging localized dialog and control overrides

mod bind_paths;
mod cultures;
mod resolver;
mod variables;

pub use bind_paths::{BindPathError, expand_bind_path, resolve_file, split_bind_path_prefix};
pub use cultures::{CultureInfo, CultureSettings, culture_info, filter_localizations};
pub use resolver::{ResolveError, ResolveOptions, ResolveResult, resolve, resolve_delayed_fields, resolve_fields};
pub use variables::{Resolution, VariableDiagnostic, VariableResolver};
