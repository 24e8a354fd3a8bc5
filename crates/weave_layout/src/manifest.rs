//! Tracked-file manifest

use std::io;
use std::path::{Path, PathBuf};
use weave_model::{TrackedFile, TrackedFileType};

/// `Type<TAB>Path` for every non-temporary file, deduplicated and sorted
/// case-insensitively with an ordinal tiebreak
pub fn manifest_lines(tracked: &[TrackedFile]) -> Vec<String> {
    let mut lines: Vec<String> = tracked
        .iter()
        .filter(|f| f.ty != TrackedFileType::Temporary)
        .map(|f| format!("{}\t{}", f.ty, f.path.display()))
        .collect();
    lines.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));
    lines.dedup();
    lines
}

/// Write the manifest through a sibling temporary file and a rename
pub async fn write_manifest(path: &Path, tracked: &[TrackedFile]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut contents = manifest_lines(tracked).join("\n");
    if !contents.is_empty() {
        contents.push('\n');
    }

    let temp = temp_path(path);
    tokio::fs::write(&temp, contents).await?;
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e);
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<TrackedFile> {
        vec![
            TrackedFile::new("/tmp/x", TrackedFileType::Temporary),
            TrackedFile::new("/src/a", TrackedFileType::Input),
            TrackedFile::new("/src/A", TrackedFileType::Input),
        ]
    }

    #[test]
    fn test_lines_ignore_input_order() {
        let expected = vec!["Input\t/src/A".to_string(), "Input\t/src/a".to_string()];
        let mut tracked = sample();
        assert_eq!(manifest_lines(&tracked), expected);
        tracked.reverse();
        assert_eq!(manifest_lines(&tracked), expected);
    }

    #[test]
    fn test_duplicates_collapse() {
        let tracked = vec![
            TrackedFile::new("/out/a.msi", TrackedFileType::Final),
            TrackedFile::new("/out/a.msi", TrackedFileType::Final),
            TrackedFile::new("/obj/a.wixobj", TrackedFileType::Intermediate),
        ];
        assert_eq!(
            manifest_lines(&tracked),
            vec!["Final\t/out/a.msi".to_string(), "Intermediate\t/obj/a.wixobj".to_string()]
        );
    }

    #[tokio::test]
    async fn test_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track").join("files.txt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "stale").unwrap();

        write_manifest(&path, &sample()).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Input\t/src/A\nInput\t/src/a\n");
        assert!(!temp_path(&path).exists());
    }
}
