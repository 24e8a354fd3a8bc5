//! Build driver: configuration, extension checkpoints and stage orchestration

pub mod config;
pub mod extension;
pub mod pipeline;
pub mod report;

pub use config::{Config, ConfigError};
pub use extension::{Checkpoint, Extension, PipelineDiagnostic, SymbolEdits};
pub use pipeline::{BuildOutput, LinkOutput, OutputKind, Pipeline, PipelineError};
pub use report::{render, render_from_disk};
