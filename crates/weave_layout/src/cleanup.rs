//! Best-effort removal of temporary files and the folders they leave empty

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use weave_model::{Cancelled, CancellationToken, TrackedFile, TrackedFileType};

/// A cleanup step that failed; recorded, never escalated
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("could not delete temporary file {}: {source}", path.display())]
    DeleteFile { path: PathBuf, source: io::Error },

    #[error("could not remove empty directory {}: {source}", path.display())]
    RemoveDirectory { path: PathBuf, source: io::Error },
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub deleted_files: Vec<PathBuf>,
    pub removed_directories: Vec<PathBuf>,
    pub errors: Vec<CleanupError>,
}

/// Delete every temporary file, then remove ancestors left empty up to (not
/// including) `root`
pub async fn delete_temporary_files(
    tracked: &[TrackedFile],
    root: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<CleanupReport, Cancelled> {
    let mut report = CleanupReport::default();

    for file in tracked.iter().filter(|f| f.ty == TrackedFileType::Temporary) {
        cancel.check()?;
        match tokio::fs::remove_file(&file.path).await {
            Ok(()) => report.deleted_files.push(file.path.clone()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(source) => {
                report.errors.push(CleanupError::DeleteFile { path: file.path.clone(), source });
                continue;
            }
        }

        if let Some(root) = root {
            remove_empty_ancestors(&file.path, root, &mut report).await;
        }
    }

    Ok(report)
}

async fn remove_empty_ancestors(file: &Path, root: &Path, report: &mut CleanupReport) {
    let mut current = file.parent();
    while let Some(directory) = current {
        if directory == root || !directory.starts_with(root) {
            break;
        }
        if !is_empty_dir(directory).await {
            break;
        }
        match tokio::fs::remove_dir(directory).await {
            Ok(()) => report.removed_directories.push(directory.to_path_buf()),
            Err(source) => {
                report.errors.push(CleanupError::RemoveDirectory { path: directory.to_path_buf(), source });
                break;
            }
        }
        current = directory.parent();
    }
}

async fn is_empty_dir(directory: &Path) -> bool {
    match tokio::fs::read_dir(directory).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(_) => false,
    }
}
