//! Layout: file transfers, temporary-file cleanup and the tracking manifest

mod cleanup;
mod manifest;
mod transfer;

pub use cleanup::{CleanupError, CleanupReport, delete_temporary_files};
pub use manifest::{manifest_lines, write_manifest};
pub use transfer::{FileTransfer, TransferOutcome, run_transfers};

use std::path::PathBuf;
use thiserror::Error;
use weave_model::{Cancelled, CancellationToken, Diagnostic, Diagnostics, Severity, TrackedFile};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutDiagnostic {
    #[error("unable to copy '{source_path}' to '{destination}': {detail}")]
    CopyFailed {
        source_path: String,
        destination: String,
        detail: String,
    },

    #[error("unable to move '{source_path}' to '{destination}': {detail}")]
    MoveFailed {
        source_path: String,
        destination: String,
        detail: String,
    },

    #[error("unable to write tracking file '{path}': {detail}")]
    ManifestFailed { path: String, detail: String },

    #[error("{0}")]
    CleanupFailed(String),
}

impl Diagnostic for LayoutDiagnostic {
    fn id(&self) -> u32 {
        match self {
            LayoutDiagnostic::CopyFailed { .. } => 501,
            LayoutDiagnostic::MoveFailed { .. } => 502,
            LayoutDiagnostic::ManifestFailed { .. } => 503,
            LayoutDiagnostic::CleanupFailed(_) => 510,
        }
    }

    fn severity(&self) -> Severity {
        match self {
            LayoutDiagnostic::CleanupFailed(_) => Severity::Verbose,
            _ => Severity::Error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LayoutOptions {
    /// Root under which emptied folders are removed
    pub intermediate_folder: Option<PathBuf>,
    pub tracking_file: Option<PathBuf>,
    pub max_parallel: usize,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            intermediate_folder: None,
            tracking_file: None,
            max_parallel: 4,
        }
    }
}

#[derive(Debug, Default)]
pub struct LayoutSummary {
    pub outcomes: Vec<Option<TransferOutcome>>,
    pub cleanup: CleanupReport,
    pub manifest_written: bool,
}

/// Transfer files, delete temporary files, then write the manifest.
///
/// Transfer failures are reported and do not stop the batch. Cleanup runs
/// even when transfers were cancelled; the manifest is only written once
/// cleanup completes without observing cancellation.
pub async fn layout(
    transfers: &[FileTransfer],
    tracked: &[TrackedFile],
    options: &LayoutOptions,
    diags: &mut Diagnostics,
    cancel: &CancellationToken,
) -> Result<LayoutSummary, Cancelled> {
    let mut summary = LayoutSummary::default();

    let transferred = run_transfers(transfers, options.max_parallel, cancel).await;
    if let Ok(results) = &transferred {
        for (transfer, result) in transfers.iter().zip(results) {
            match result {
                Ok(outcome) => summary.outcomes.push(Some(*outcome)),
                Err(e) => {
                    summary.outcomes.push(None);
                    report_transfer_failure(transfer, e, diags);
                }
            }
        }
    }

    let cleanup = delete_temporary_files(tracked, options.intermediate_folder.as_deref(), cancel).await;
    summary.cleanup = match cleanup {
        Ok(report) => report,
        Err(cancelled) => {
            tracing::warn!("layout cancelled during cleanup; tracking file not written");
            return Err(cancelled);
        }
    };
    for error in &summary.cleanup.errors {
        diags.report(None, LayoutDiagnostic::CleanupFailed(error.to_string()));
    }

    if let Some(path) = &options.tracking_file {
        match write_manifest(path, tracked).await {
            Ok(()) => summary.manifest_written = true,
            Err(e) => diags.report(
                None,
                LayoutDiagnostic::ManifestFailed { path: path.display().to_string(), detail: e.to_string() },
            ),
        }
    }

    tracing::info!(
        transfers = transfers.len(),
        deleted = summary.cleanup.deleted_files.len(),
        manifest = summary.manifest_written,
        "layout complete"
    );

    transferred?;
    Ok(summary)
}

fn report_transfer_failure(transfer: &FileTransfer, error: &std::io::Error, diags: &mut Diagnostics) {
    let source_path = transfer.source.display().to_string();
    let destination = transfer.destination.display().to_string();
    let detail = error.to_string();
    let diagnostic = if transfer.is_move {
        LayoutDiagnostic::MoveFailed { source_path, destination, detail }
    } else {
        LayoutDiagnostic::CopyFailed { source_path, destination, detail }
    };
    diags.report(transfer.source_line.as_ref(), diagnostic);
}
