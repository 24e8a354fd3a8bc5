//! Stage orchestration: combine, link, resolve, optimize and layout

use std::path::{Path, PathBuf};
use thiserror::Error;
use weave_layout::{FileTransfer, LayoutOptions, LayoutSummary, layout};
use weave_library::{LibraryError, LibraryOptions, combine};
use weave_link::{LinkError, LinkOptions, link};
use weave_model::{
    Cancelled, CancellationToken, DelayedField, Diagnostics, ExpectedEmbeddedFile, Intermediate, IntermediateError,
    TrackedFile, TrackedFileType,
};
use weave_resolve::{CultureSettings, ResolveError, ResolveOptions, resolve, resolve_delayed_fields};

use crate::config::{Config, ConfigError};
use crate::extension::{Checkpoint, Extension, run_checkpoint};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Intermediate(#[from] IntermediateError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error("{stage} failed with {errors} error(s)")]
    StageFailed { stage: &'static str, errors: usize },
}

/// What a build produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// A resolved program
    Program,
    /// A combined library
    Library,
}

impl OutputKind {
    fn default_output(self) -> &'static str {
        match self {
            OutputKind::Program => "linked.json",
            OutputKind::Library => "library.json",
        }
    }
}

/// Resolved program plus the work left for the binder
#[derive(Debug)]
pub struct LinkOutput {
    pub intermediate: Intermediate,
    pub delayed_fields: Vec<DelayedField>,
    pub expected_embedded_files: Vec<ExpectedEmbeddedFile>,
    pub settings: CultureSettings,
}

#[derive(Debug)]
pub struct BuildOutput {
    pub output: PathBuf,
    pub intermediate: Intermediate,
    pub delayed_fields: Vec<DelayedField>,
    pub expected_embedded_files: Vec<ExpectedEmbeddedFile>,
    pub layout: LayoutSummary,
}

#[derive(Default)]
pub struct Pipeline {
    extensions: Vec<Box<dyn Extension>>,
    cancel: CancellationToken,
}

fn stop_on_errors(stage: &'static str, diags: &Diagnostics) -> Result<(), PipelineError> {
    if diags.encountered_error() {
        return Err(PipelineError::StageFailed { stage, errors: diags.error_count() });
    }
    Ok(())
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extension(mut self, extension: impl Extension + 'static) -> Self {
        self.extensions.push(Box::new(extension));
        self
    }

    /// Token that cancels every stage run by this pipeline
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn checkpoint(&mut self, checkpoint: Checkpoint, intermediates: &mut [Intermediate], diags: &mut Diagnostics) {
        run_checkpoint(&mut self.extensions, checkpoint, intermediates, diags);
    }

    /// Link, resolve and optimize compiled or combined intermediates
    pub fn link(
        &mut self,
        mut inputs: Vec<Intermediate>,
        config: &Config,
        diags: &mut Diagnostics,
    ) -> Result<LinkOutput, PipelineError> {
        self.checkpoint(Checkpoint::PreLink, &mut inputs, diags);
        let options = LinkOptions {
            bind_paths: config.bind_paths.clone(),
            referenced_components: config.referenced_components.iter().cloned().collect(),
            output_id: None,
        };
        let mut linked = link(inputs, &options, diags, &self.cancel)?;
        self.checkpoint(Checkpoint::PostLink, std::slice::from_mut(&mut linked), diags);
        stop_on_errors("link", diags)?;

        self.checkpoint(Checkpoint::PreResolve, std::slice::from_mut(&mut linked), diags);
        let options = ResolveOptions {
            cultures: config.cultures.clone(),
            localizations: config.load_localizations()?,
            extensions: self.extensions.iter().filter_map(|e| e.localizations()).collect(),
            bind_variables: config.bind_variables.clone(),
            allow_unresolved_variables: config.allow_unresolved_variables,
        };
        let resolved = resolve(linked, &options, diags, &self.cancel)?;
        let mut intermediate = resolved.intermediate;
        let mut delayed_fields = resolved.delayed_fields;
        self.checkpoint(Checkpoint::PostResolve, std::slice::from_mut(&mut intermediate), diags);
        stop_on_errors("resolve", diags)?;

        self.checkpoint(Checkpoint::PreOptimize, std::slice::from_mut(&mut intermediate), diags);
        if !config.delayed_values.is_empty() && !delayed_fields.is_empty() {
            tracing::debug!(fields = delayed_fields.len(), "finishing delayed fields");
            resolve_delayed_fields(&mut intermediate, &delayed_fields, &config.delayed_values, diags);
            delayed_fields.clear();
        }
        self.checkpoint(Checkpoint::PostOptimize, std::slice::from_mut(&mut intermediate), diags);
        stop_on_errors("optimize", diags)?;

        Ok(LinkOutput {
            intermediate,
            delayed_fields,
            expected_embedded_files: resolved.expected_embedded_files,
            settings: resolved.settings,
        })
    }

    /// Combine compiled intermediates into a library
    pub fn library(
        &mut self,
        mut inputs: Vec<Intermediate>,
        config: &Config,
        diags: &mut Diagnostics,
    ) -> Result<(Intermediate, Vec<TrackedFile>), PipelineError> {
        self.checkpoint(Checkpoint::PreCombine, &mut inputs, diags);
        let options = LibraryOptions {
            library_id: config.library_id.clone(),
            bind_files: config.bind_files,
            bind_paths: config.bind_paths.clone(),
            bind_variables: config.bind_variables.clone(),
            localizations: config.load_localizations()?,
        };
        let mut result = combine(inputs, &options, diags, &self.cancel)?;
        self.checkpoint(Checkpoint::PostCombine, std::slice::from_mut(&mut result.library), diags);
        stop_on_errors("library", diags)?;
        Ok((result.library, result.tracked))
    }

    /// Run a full build from serialized intermediates to the output file.
    ///
    /// The result is staged in the intermediate folder and moved into place
    /// by the layout stage, which also writes the tracking file.
    pub async fn build(
        &mut self,
        kind: OutputKind,
        inputs: &[PathBuf],
        config: &Config,
        diags: &mut Diagnostics,
    ) -> Result<BuildOutput, PipelineError> {
        let mut tracked: Vec<TrackedFile> =
            inputs.iter().map(|path| TrackedFile::new(path, TrackedFileType::Input)).collect();
        let intermediates = inputs.iter().map(|path| Intermediate::load(path)).collect::<Result<Vec<_>, _>>()?;
        tracing::info!(inputs = intermediates.len(), ?kind, "starting build");

        let (mut intermediate, delayed_fields, expected_embedded_files) = match kind {
            OutputKind::Program => {
                let output = self.link(intermediates, config, diags)?;
                (output.intermediate, output.delayed_fields, output.expected_embedded_files)
            }
            OutputKind::Library => {
                let (library, embedded) = self.library(intermediates, config, diags)?;
                tracked.extend(embedded);
                (library, Vec::new(), Vec::new())
            }
        };

        let output = config.output.clone().unwrap_or_else(|| PathBuf::from(kind.default_output()));
        let staging_folder = config.intermediate_folder.clone().unwrap_or_else(|| staging_folder_for(&output));
        let file_name = output.file_name().map(PathBuf::from).unwrap_or_else(|| PathBuf::from(kind.default_output()));
        let staged = staging_folder.join(file_name);

        self.checkpoint(Checkpoint::PreLayout, std::slice::from_mut(&mut intermediate), diags);
        stop_on_errors("pre-layout", diags)?;

        tokio::fs::create_dir_all(&staging_folder)
            .await
            .map_err(|e| IntermediateError::Io(staging_folder.clone(), e))?;
        intermediate.save(&staged)?;
        tracked.push(TrackedFile::new(&staged, TrackedFileType::Temporary));
        tracked.push(TrackedFile::new(&output, TrackedFileType::Final));

        let transfers = vec![FileTransfer::move_file(&staged, &output)];
        let options = LayoutOptions {
            intermediate_folder: Some(staging_folder),
            tracking_file: config.tracking_file.clone(),
            max_parallel: config.max_parallel_transfers,
        };
        let summary = layout(&transfers, &tracked, &options, diags, &self.cancel).await?;
        self.checkpoint(Checkpoint::PostLayout, std::slice::from_mut(&mut intermediate), diags);
        stop_on_errors("layout", diags)?;

        Ok(BuildOutput {
            output,
            intermediate,
            delayed_fields,
            expected_embedded_files,
            layout: summary,
        })
    }
}

fn staging_folder_for(output: &Path) -> PathBuf {
    output.parent().unwrap_or(Path::new(".")).join("obj")
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_model::{
        BindVariable, Identifier, IntermediateLevel, Localization, Section, SectionType, SourceLineNumber, Symbol,
        SymbolKind, SymbolReference,
    };

    use crate::extension::SymbolEdits;

    fn compiled() -> Intermediate {
        let at = |line| Some(SourceLineNumber::new("product.wxs", line));
        let product = Section::new(Some("product".into()), SectionType::Product)
            .with_symbol(
                Symbol::new(SymbolKind::Product, Some(Identifier::global("Prod")), at(1))
                    .with_str("Name", "!(loc.ProductName)")
                    .with_str("Version", "!(wix.ProductVersion)"),
            )
            .with_symbol(SymbolReference::new(SymbolKind::Property, "Stamp").to_symbol(at(2)));
        let fragment = Section::fragment("props").with_symbol(
            Symbol::new(SymbolKind::Property, Some(Identifier::global("Stamp")), at(3))
                .with_str("Value", "!(bind.FileVersion.Main)"),
        );

        let mut im = Intermediate::new("product", IntermediateLevel::Compiled);
        im.sections = vec![product, fragment];
        im.localizations = vec![
            Localization::new("en-US").with_variable(BindVariable::new("ProductName", "Sample")),
        ];
        im
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.bind_variables.insert("ProductVersion".to_string(), "1.0".to_string());
        config
    }

    struct Stamp {
        at: Checkpoint,
    }

    impl Extension for Stamp {
        fn name(&self) -> &str {
            "stamp"
        }

        fn checkpoint(&mut self, checkpoint: Checkpoint, _: &[Intermediate], edits: &mut SymbolEdits, _: &mut Diagnostics) {
            if checkpoint == self.at {
                edits.add(
                    Symbol::new(SymbolKind::Property, Some(Identifier::global("Stamped")), None)
                        .with_str("Value", "!(wix.ProductVersion)"),
                );
            }
        }
    }

    fn value_of<'a>(im: &'a Intermediate, kind: SymbolKind, id: &str, field: &str) -> Option<&'a str> {
        im.symbols()
            .find(|(_, s)| s.kind == kind && s.id_str() == Some(id))
            .and_then(|(_, s)| s.get_str(field))
    }

    #[test]
    fn test_link_resolves_and_defers_bind_values() {
        let mut diags = Diagnostics::new();
        let output = Pipeline::new().with_extension(Stamp { at: Checkpoint::PreLink }).link(vec![compiled()], &config(), &mut diags).unwrap();

        let im = &output.intermediate;
        assert_eq!(im.level, IntermediateLevel::Resolved);
        assert_eq!(value_of(im, SymbolKind::Product, "Prod", "Name"), Some("Sample"));
        assert_eq!(value_of(im, SymbolKind::Product, "Prod", "Version"), Some("1.0"));
        assert_eq!(value_of(im, SymbolKind::Property, "Stamped", "Value"), Some("1.0"));
        assert_eq!(value_of(im, SymbolKind::Property, "Stamp", "Value"), Some("!(bind.FileVersion.Main)"));
        assert_eq!(output.delayed_fields.len(), 1);
        assert_eq!(output.settings.culture.as_deref(), Some("en-US"));
    }

    #[test]
    fn test_optimize_finishes_delayed_fields() {
        let mut config = config();
        config.delayed_values.insert("FileVersion.Main".to_string(), "2.3.4".to_string());
        let mut diags = Diagnostics::new();

        let output = Pipeline::new().link(vec![compiled()], &config, &mut diags).unwrap();

        assert!(output.delayed_fields.is_empty());
        assert_eq!(value_of(&output.intermediate, SymbolKind::Property, "Stamp", "Value"), Some("2.3.4"));
    }

    #[test]
    fn test_link_errors_stop_the_pipeline() {
        let mut diags = Diagnostics::new();
        let result = Pipeline::new().link(vec![compiled()], &Config::default(), &mut diags);

        assert!(matches!(result, Err(PipelineError::StageFailed { stage: "resolve", .. })));
        assert_eq!(diags.with_id(101).count(), 1);
    }

    #[tokio::test]
    async fn test_build_writes_output_and_tracking_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("product.json");
        compiled().save(&input).unwrap();

        let mut config = config();
        config.output = Some(dir.path().join("bin").join("product.json"));
        config.tracking_file = Some(dir.path().join("files.txt"));

        let mut diags = Diagnostics::new();
        let built = Pipeline::new()
            .build(OutputKind::Program, &[input.clone()], &config, &mut diags)
            .await
            .unwrap();

        let written = Intermediate::load(&built.output).unwrap();
        assert_eq!(written.level, IntermediateLevel::Resolved);
        assert!(!dir.path().join("bin").join("obj").join("product.json").exists());

        let manifest = std::fs::read_to_string(dir.path().join("files.txt")).unwrap();
        let lines: Vec<&str> = manifest.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().any(|l| l.starts_with("Final\t")));
        assert!(lines.iter().any(|l| l.starts_with("Input\t")));
    }

    #[tokio::test]
    async fn test_pre_layout_edits_reach_the_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("product.json");
        compiled().save(&input).unwrap();

        let mut config = config();
        config.output = Some(dir.path().join("product.out.json"));

        let mut diags = Diagnostics::new();
        let built = Pipeline::new()
            .with_extension(Stamp { at: Checkpoint::PreLayout })
            .build(OutputKind::Program, &[input], &config, &mut diags)
            .await
            .unwrap();

        let written = Intermediate::load(&built.output).unwrap();
        assert_eq!(value_of(&written, SymbolKind::Property, "Stamped", "Value"), Some("!(wix.ProductVersion)"));
        assert!(!diags.encountered_error());
    }

    #[tokio::test]
    async fn test_build_library() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("frag.json");
        Intermediate::new("frag", IntermediateLevel::Compiled)
            .with_section(Section::fragment("f"))
            .save(&input)
            .unwrap();

        let mut config = Config::default();
        config.output = Some(dir.path().join("frag.lib.json"));
        config.library_id = Some("frag-lib".to_string());

        let mut diags = Diagnostics::new();
        let built = Pipeline::new()
            .build(OutputKind::Library, &[input], &config, &mut diags)
            .await
            .unwrap();

        assert_eq!(built.intermediate.id, "frag-lib");
        assert_eq!(Intermediate::load(&built.output).unwrap().level, IntermediateLevel::Combined);
    }
}
