//! Wildcard file harvesting into File, Component and Directory symbols

use indexmap::IndexMap;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use weave_model::{
    BindPath, BindStage, ComplexReference, Diagnostics, FieldValue, Identifier, PathValue, ReferenceType,
    SourceLineNumber, Symbol, SymbolKind,
};
use weave_resolve::{BindPathError, expand_bind_path};

use crate::diagnostics::HarvestDiagnostic;
use crate::ids::generate_identifier;

/// A `HarvestFiles` symbol in typed form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestDirective {
    pub directory_ref: String,
    pub inclusions: String,
    pub exclusions: String,
    pub parent_type: Option<ReferenceType>,
    pub parent_id: Option<String>,
    pub source_path: Option<String>,
    pub source: Option<SourceLineNumber>,
}

impl HarvestDirective {
    pub fn from_symbol(symbol: &Symbol) -> Option<Self> {
        if symbol.kind != SymbolKind::HarvestFiles {
            return None;
        }
        Some(Self {
            directory_ref: symbol.get_str("DirectoryRef")?.to_string(),
            inclusions: symbol.get_str("Inclusions").unwrap_or_default().to_string(),
            exclusions: symbol.get_str("Exclusions").unwrap_or_default().to_string(),
            parent_type: symbol.get_str("ComplexReferenceParentType").and_then(|t| t.parse().ok()),
            parent_id: symbol.get_str("ParentId").map(str::to_string),
            source_path: symbol.get_str("SourcePath").filter(|p| !p.is_empty()).map(str::to_string),
            source: symbol.source.clone(),
        })
    }

    /// Explicit source path, else the folder of the declaring document
    fn base_directory(&self) -> PathBuf {
        if let Some(path) = &self.source_path {
            return PathBuf::from(path);
        }
        self.source
            .as_ref()
            .and_then(|s| Path::new(&s.file).parent())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Module that owns a directive, wired as `(Module, id, language)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleParent {
    pub id: String,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Match {
    path: PathBuf,
    /// Directory chain between the search root and the file
    recursive_dir: PathBuf,
}

/// Harvester for one link; its harvested set spans every directive
#[derive(Debug)]
pub struct FileHarvester<'a> {
    bind_paths: &'a [BindPath],
    harvested: HashSet<PathBuf>,
    directories: HashMap<(usize, String, PathBuf), String>,
}

impl<'a> FileHarvester<'a> {
    pub fn new(bind_paths: &'a [BindPath]) -> Self {
        Self {
            bind_paths,
            harvested: HashSet::new(),
            directories: HashMap::new(),
        }
    }

    pub fn harvested_count(&self) -> usize {
        self.harvested.len()
    }

    /// Harvest one directive declared in section `section`, returning the
    /// symbols to append to that section
    pub fn harvest(
        &mut self,
        section: usize,
        directive: &HarvestDirective,
        module: Option<&ModuleParent>,
        diags: &mut Diagnostics,
    ) -> Vec<Symbol> {
        let source = directive.source.as_ref();
        let base = directive.base_directory();

        let mut included = self.matches(&directive.inclusions, &base, source, diags);
        let excluded = self.matches(&directive.exclusions, &base, source, diags);
        included.retain(|path, _| !excluded.contains_key(path));

        if included.is_empty() {
            diags.report(source, HarvestDiagnostic::ZeroFilesHarvested(directive.inclusions.clone()));
            return Vec::new();
        }

        let mut symbols = Vec::new();
        for (path, found) in included {
            if !self.harvested.insert(path.clone()) {
                diags.report(source, HarvestDiagnostic::DuplicateHarvestedFile(path.display().to_string()));
                continue;
            }

            let directory = self.directory_chain(section, &directive.directory_ref, &found.recursive_dir, source, &mut symbols);
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let id = generate_identifier("fls", &[&directory, &name]);

            symbols.push(
                Symbol::new(SymbolKind::Component, Some(Identifier::global(&id)), source.cloned())
                    .with_str("Directory", &directory)
                    .with_str("KeyPath", &id),
            );
            let mut file = Symbol::new(SymbolKind::File, Some(Identifier::global(&id)), source.cloned())
                .with_str("Component", &id)
                .with_str("Name", &name)
                .with_str("Directory", &directory);
            file.set("Source", FieldValue::Path(PathValue::new(path.to_string_lossy())));
            symbols.push(file);

            if let Some(module) = module {
                let mut edge = ComplexReference::new(ReferenceType::Module, &module.id, ReferenceType::Component, &id);
                edge.parent_language = module.language.clone();
                symbols.push(edge.to_symbol(source.cloned()));
            } else if let (Some(parent_type), Some(parent_id)) = (directive.parent_type, &directive.parent_id) {
                let edge = ComplexReference::new(parent_type, parent_id, ReferenceType::Component, &id)
                    .primary(parent_type == ReferenceType::Feature);
                symbols.push(edge.to_symbol(source.cloned()));
            }
        }

        tracing::debug!(directory = %directive.directory_ref, symbols = symbols.len(), "harvested files");
        symbols
    }

    /// Every file matched by the `;`-separated patterns, keyed by absolute path
    fn matches(
        &self,
        patterns: &str,
        base: &Path,
        source: Option<&SourceLineNumber>,
        diags: &mut Diagnostics,
    ) -> IndexMap<PathBuf, Match> {
        let mut found = IndexMap::new();
        for pattern in patterns.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let expanded = match expand_bind_path(pattern, self.bind_paths, BindStage::Normal) {
                Ok(expanded) => expanded,
                Err(BindPathError::UnknownName(name)) | Err(BindPathError::FileNotFound(name)) => {
                    diags.report(source, HarvestDiagnostic::ExpectedDirectory(name));
                    continue;
                }
            };

            for path in expanded {
                let (directory, glob, recursive) = split_pattern(&path.to_string_lossy(), base);
                let Some(regex) = glob_regex(&glob) else {
                    diags.report(source, HarvestDiagnostic::InvalidPattern(pattern.to_string()));
                    continue;
                };
                if !directory.is_dir() {
                    diags.report(source, HarvestDiagnostic::DirectoryMissing(directory.display().to_string()));
                    continue;
                }

                let mut matches = Vec::new();
                walk(&directory, Path::new(""), recursive, &regex, &mut matches);
                for m in matches {
                    let absolute = std::path::absolute(&m.path).unwrap_or_else(|_| m.path.clone());
                    found.entry(absolute.clone()).or_insert(Match { path: absolute, ..m });
                }
            }
        }
        found
    }

    fn directory_chain(
        &mut self,
        section: usize,
        root: &str,
        recursive_dir: &Path,
        source: Option<&SourceLineNumber>,
        symbols: &mut Vec<Symbol>,
    ) -> String {
        let mut parent = root.to_string();
        let mut walked = PathBuf::new();
        for part in recursive_dir.components() {
            let name = part.as_os_str().to_string_lossy().into_owned();
            walked.push(&name);
            let key = (section, root.to_string(), walked.clone());
            parent = match self.directories.get(&key) {
                Some(id) => id.clone(),
                None => {
                    let id = generate_identifier("dir", &[&parent, &name]);
                    symbols.push(
                        Symbol::new(SymbolKind::Directory, Some(Identifier::global(&id)), source.cloned())
                            .with_str("Parent", &parent)
                            .with_str("Name", &name),
                    );
                    self.directories.insert(key, id.clone());
                    id
                }
            };
        }
        parent
    }
}

/// Split a pattern into (directory, file glob, recursive)
fn split_pattern(pattern: &str, base: &Path) -> (PathBuf, String, bool) {
    let normalized = pattern.replace('\\', "/");
    let (directory, glob) = match normalized.rsplit_once('/') {
        Some((directory, glob)) => (directory.to_string(), glob.to_string()),
        None => (String::new(), normalized.clone()),
    };

    let recursive = directory.contains("**");
    let directory = if recursive {
        directory.trim_end_matches("**").trim_end_matches('/').to_string()
    } else {
        directory
    };

    let directory = if directory.is_empty() && normalized.starts_with('/') {
        PathBuf::from("/")
    } else if directory.is_empty() {
        base.to_path_buf()
    } else {
        base.join(directory)
    };
    (directory, glob, recursive)
}

fn glob_regex(glob: &str) -> Option<Regex> {
    if glob.is_empty() {
        return None;
    }
    let mut pattern = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str("[^/]*"),
            '?' => pattern.push('.'),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).ok()
}

fn walk(directory: &Path, relative: &Path, recursive: bool, regex: &Regex, out: &mut Vec<Match>) {
    let entries = match std::fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(directory = %directory.display(), error = %e, "cannot read harvest directory");
            return;
        }
    };
    let mut entries: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
    entries.sort();

    for path in entries {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else { continue };
        if path.is_dir() {
            if recursive {
                walk(&path, &relative.join(&name), recursive, regex, out);
            }
        } else if regex.is_match(&name) {
            out.push(Match { path, recursive_dir: relative.to_path_buf() });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directive(dir: &Path, inclusions: &str, exclusions: &str) -> HarvestDirective {
        HarvestDirective {
            directory_ref: "INSTALLFOLDER".to_string(),
            inclusions: inclusions.to_string(),
            exclusions: exclusions.to_string(),
            parent_type: Some(ReferenceType::Feature),
            parent_id: Some("Main".to_string()),
            source_path: Some(dir.to_string_lossy().into_owned()),
            source: None,
        }
    }

    fn files(symbols: &[Symbol]) -> Vec<&str> {
        symbols
            .iter()
            .filter(|s| s.kind == SymbolKind::File)
            .filter_map(|s| s.get_str("Name"))
            .collect()
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("A.txt"), "a").unwrap();
        std::fs::write(dir.path().join("B.txt"), "b").unwrap();
        std::fs::write(dir.path().join("c.bin"), "c").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("D.txt"), "d").unwrap();
        dir
    }

    #[test]
    fn test_exclusions_are_subtracted() {
        let dir = fixture();
        let mut harvester = FileHarvester::new(&[]);
        let mut diags = Diagnostics::new();

        let symbols = harvester.harvest(0, &directive(dir.path(), "*.txt", "B.txt"), None, &mut diags);
        assert_eq!(files(&symbols), vec!["A.txt"]);
        assert!(diags.messages().is_empty());

        let edge = symbols.iter().find_map(ComplexReference::from_symbol).unwrap();
        assert_eq!(edge.parent, "Main");
        assert!(edge.is_primary);
    }

    #[test]
    fn test_already_harvested_file_is_skipped() {
        let dir = fixture();
        let mut harvester = FileHarvester::new(&[]);
        let mut diags = Diagnostics::new();

        harvester.harvest(0, &directive(dir.path(), "A.txt", ""), None, &mut diags);
        let symbols = harvester.harvest(0, &directive(dir.path(), "A.txt;B.txt", ""), None, &mut diags);

        assert_eq!(files(&symbols), vec!["B.txt"]);
        assert_eq!(diags.with_id(303).count(), 1);
        assert!(!diags.encountered_error());
    }

    #[test]
    fn test_recursive_search_builds_directory_chain() {
        let dir = fixture();
        let mut harvester = FileHarvester::new(&[]);
        let mut diags = Diagnostics::new();

        let symbols = harvester.harvest(0, &directive(dir.path(), "**/*.txt", ""), None, &mut diags);
        assert_eq!(files(&symbols), vec!["A.txt", "B.txt", "D.txt"]);

        let directories: Vec<&Symbol> = symbols.iter().filter(|s| s.kind == SymbolKind::Directory).collect();
        assert_eq!(directories.len(), 1);
        assert_eq!(directories[0].get_str("Parent"), Some("INSTALLFOLDER"));
        assert_eq!(directories[0].get_str("Name"), Some("sub"));

        let nested = symbols
            .iter()
            .find(|s| s.kind == SymbolKind::File && s.get_str("Name") == Some("D.txt"))
            .unwrap();
        assert_eq!(nested.get_str("Directory"), directories[0].id_str());
    }

    #[test]
    fn test_zero_files_is_a_warning() {
        let dir = fixture();
        let mut harvester = FileHarvester::new(&[]);
        let mut diags = Diagnostics::new();

        let symbols = harvester.harvest(0, &directive(dir.path(), "*.none", ""), None, &mut diags);
        assert!(symbols.is_empty());
        assert_eq!(diags.with_id(302).count(), 1);
        assert!(!diags.encountered_error());
    }

    #[test]
    fn test_missing_bind_path_name() {
        let dir = fixture();
        let mut harvester = FileHarvester::new(&[]);
        let mut diags = Diagnostics::new();

        harvester.harvest(0, &directive(dir.path(), "!(bindpath.media)\\*.txt", ""), None, &mut diags);
        assert_eq!(diags.with_id(301).count(), 1);
        assert!(diags.encountered_error());
    }

    #[test]
    fn test_named_bind_path_root() {
        let dir = fixture();
        let paths = vec![BindPath::named("media", dir.path())];
        let mut harvester = FileHarvester::new(&paths);
        let mut diags = Diagnostics::new();

        let symbols = harvester.harvest(0, &directive(Path::new("/nowhere"), "!(bindpath.media)\\*.bin", ""), None, &mut diags);
        assert_eq!(files(&symbols), vec!["c.bin"]);
    }

    #[test]
    fn test_module_parent_edge() {
        let dir = fixture();
        let mut harvester = FileHarvester::new(&[]);
        let mut diags = Diagnostics::new();
        let module = ModuleParent { id: "Mod".to_string(), language: Some("1033".to_string()) };

        let symbols = harvester.harvest(0, &directive(dir.path(), "A.txt", ""), Some(&module), &mut diags);
        let edge = symbols.iter().find_map(ComplexReference::from_symbol).unwrap();
        assert_eq!(edge.parent_type, ReferenceType::Module);
        assert_eq!(edge.parent_language.as_deref(), Some("1033"));
        assert!(!edge.is_primary);
    }

    #[test]
    fn test_split_pattern() {
        let base = Path::new("/base");
        assert_eq!(split_pattern("*.txt", base), (PathBuf::from("/base"), "*.txt".to_string(), false));
        assert_eq!(split_pattern("a\\**\\*.txt", base), (PathBuf::from("/base/a"), "*.txt".to_string(), true));
        assert_eq!(split_pattern("/abs/x?.dll", base), (PathBuf::from("/abs"), "x?.dll".to_string(), false));
    }
}
