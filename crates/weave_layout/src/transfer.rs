//! File transfers with bounded parallelism

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use weave_model::{Cancelled, CancellationToken, SourceLineNumber};

/// One file to place in the layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTransfer {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub is_move: bool,
    /// Drop permissions inherited from the source
    pub reset_acl: bool,
    pub source_line: Option<SourceLineNumber>,
}

impl FileTransfer {
    pub fn copy(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            is_move: false,
            reset_acl: false,
            source_line: None,
        }
    }

    pub fn move_file(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self { is_move: true, ..Self::copy(source, destination) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Copied,
    Moved,
    /// Rename failed, the file was copied and the source deleted
    MovedByCopy,
    /// Source and destination are the same file
    Skipped,
}

/// Run every transfer with at most `max_parallel` in flight.
///
/// Results come back in input order. Returns `Err` if cancellation was
/// observed before every transfer ran.
pub async fn run_transfers(
    transfers: &[FileTransfer],
    max_parallel: usize,
    cancel: &CancellationToken,
) -> Result<Vec<io::Result<TransferOutcome>>, Cancelled> {
    let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
    let mut set = JoinSet::new();

    for (index, transfer) in transfers.iter().cloned().enumerate() {
        cancel.check()?;
        let Ok(permit) = semaphore.clone().acquire_owned().await else { break };
        let cancel = cancel.clone();
        set.spawn(async move {
            let _permit = permit;
            if cancel.is_cancelled() {
                return (index, None);
            }
            (index, Some(transfer_one(&transfer).await))
        });
    }

    let mut results = Vec::with_capacity(transfers.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, Some(result))) => results.push((index, result)),
            Ok((_, None)) => {}
            Err(e) => tracing::error!(error = %e, "transfer task failed"),
        }
    }
    cancel.check()?;

    results.sort_by_key(|(index, _)| *index);
    Ok(results.into_iter().map(|(_, result)| result).collect())
}

async fn same_file(source: &Path, destination: &Path) -> bool {
    if source == destination {
        return true;
    }
    match (tokio::fs::canonicalize(source).await, tokio::fs::canonicalize(destination).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

async fn transfer_one(transfer: &FileTransfer) -> io::Result<TransferOutcome> {
    if same_file(&transfer.source, &transfer.destination).await {
        tracing::debug!(path = %transfer.source.display(), "source and destination match, skipping");
        return Ok(TransferOutcome::Skipped);
    }
    if let Some(parent) = transfer.destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let outcome = if transfer.is_move {
        match tokio::fs::rename(&transfer.source, &transfer.destination).await {
            Ok(()) => TransferOutcome::Moved,
            Err(e) => {
                tracing::debug!(error = %e, "rename failed, copying instead");
                tokio::fs::copy(&transfer.source, &transfer.destination).await?;
                tokio::fs::remove_file(&transfer.source).await?;
                TransferOutcome::MovedByCopy
            }
        }
    } else {
        tokio::fs::copy(&transfer.source, &transfer.destination).await?;
        TransferOutcome::Copied
    };

    if transfer.reset_acl {
        reset_permissions(&transfer.destination).await?;
    }
    Ok(outcome)
}

#[cfg(unix)]
async fn reset_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)).await
}

#[cfg(not(unix))]
async fn reset_permissions(path: &Path) -> io::Result<()> {
    let mut permissions = tokio::fs::metadata(path).await?.permissions();
    permissions.set_readonly(false);
    tokio::fs::set_permissions(path, permissions).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_copy_and_move() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, "a").unwrap();
        std::fs::write(&b, "b").unwrap();

        let transfers = vec![
            FileTransfer::copy(&a, dir.path().join("out").join("a.txt")),
            FileTransfer::move_file(&b, dir.path().join("out").join("b.txt")),
        ];
        let results = run_transfers(&transfers, 2, &CancellationToken::new()).await.unwrap();

        assert_eq!(results[0].as_ref().unwrap(), &TransferOutcome::Copied);
        assert_eq!(results[1].as_ref().unwrap(), &TransferOutcome::Moved);
        assert!(a.exists());
        assert!(!b.exists());
        assert_eq!(std::fs::read_to_string(dir.path().join("out").join("b.txt")).unwrap(), "b");
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_batch() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        std::fs::write(&a, "a").unwrap();

        let transfers = vec![
            FileTransfer::copy(dir.path().join("missing.txt"), dir.path().join("x.txt")),
            FileTransfer::copy(&a, &a),
            FileTransfer::copy(&a, dir.path().join("c.txt")),
        ];
        let results = run_transfers(&transfers, 1, &CancellationToken::new()).await.unwrap();

        assert!(results[0].is_err());
        assert_eq!(results[1].as_ref().unwrap(), &TransferOutcome::Skipped);
        assert_eq!(results[2].as_ref().unwrap(), &TransferOutcome::Copied);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let transfers = vec![FileTransfer::copy("a", "b")];
        assert!(run_transfers(&transfers, 4, &cancel).await.is_err());
    }
}
