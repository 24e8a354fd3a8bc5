//! Search-root expansion for `!(bindpath.NAME)` prefixes and relative paths

use std::path::{Path, PathBuf};
use thiserror::Error;
use weave_lexer::{Namespace, Segment, segments};
use weave_model::{BindPath, BindStage};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindPathError {
    #[error("expected a directory for bind path '{0}', but no bind path with that name is defined")]
    UnknownName(String),

    #[error("cannot find the file '{0}'")]
    FileNotFound(String),
}

/// Split a leading `!(bindpath.NAME)` off `text`, returning NAME and the rest
pub fn split_bind_path_prefix(text: &str) -> Option<(String, &str)> {
    match segments(text).into_iter().next()? {
        Segment::Variable { var, raw } if var.namespace == Namespace::BindPath && text.starts_with(&raw) => {
            Some((var.name, &text[raw.len()..]))
        }
        _ => None,
    }
}

fn join(root: &Path, rest: &str) -> PathBuf {
    let rest = rest.trim_start_matches(['/', '\\']);
    if rest.is_empty() { root.to_path_buf() } else { root.join(rest) }
}

/// Expand a `!(bindpath.NAME)` prefix into one path per matching root.
///
/// Text without the prefix comes back unchanged. An empty NAME selects the
/// unnamed roots, or the remaining text itself if there are none.
pub fn expand_bind_path(text: &str, bind_paths: &[BindPath], stage: BindStage) -> Result<Vec<PathBuf>, BindPathError> {
    let Some((name, rest)) = split_bind_path_prefix(text) else {
        return Ok(vec![PathBuf::from(text)]);
    };

    let in_stage = bind_paths.iter().filter(|bp| bp.stage == stage);
    if name.is_empty() {
        let roots: Vec<PathBuf> = in_stage.filter(|bp| bp.name.is_none()).map(|bp| join(&bp.path, rest)).collect();
        if roots.is_empty() {
            return Ok(vec![PathBuf::from(rest.trim_start_matches(['/', '\\']))]);
        }
        return Ok(roots);
    }

    let roots: Vec<PathBuf> = in_stage
        .filter(|bp| bp.name.as_deref() == Some(name.as_str()))
        .map(|bp| join(&bp.path, rest))
        .collect();
    if roots.is_empty() {
        return Err(BindPathError::UnknownName(name));
    }
    Ok(roots)
}

/// Locate a source file through the bind paths of `stage`.
///
/// Order: bind-path prefix roots, the path itself if absolute, each unnamed
/// root, then the path relative to the working directory.
pub fn resolve_file(source: &str, bind_paths: &[BindPath], stage: BindStage) -> Result<PathBuf, BindPathError> {
    if split_bind_path_prefix(source).is_some() {
        return expand_bind_path(source, bind_paths, stage)?
            .into_iter()
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| BindPathError::FileNotFound(source.to_string()));
    }

    let path = Path::new(source);
    if path.is_absolute() {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(BindPathError::FileNotFound(source.to_string()))
        };
    }

    bind_paths
        .iter()
        .filter(|bp| bp.stage == stage && bp.name.is_none())
        .map(|bp| bp.path.join(path))
        .chain(std::iter::once(path.to_path_buf()))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| BindPathError::FileNotFound(source.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_named_to_every_match() {
        let paths = vec![BindPath::named("media", "/a"), BindPath::unnamed("/u"), BindPath::named("media", "/b")];
        let expanded = expand_bind_path("!(bindpath.media)\\sub\\*.txt", &paths, BindStage::Normal).unwrap();
        assert_eq!(expanded, vec![PathBuf::from("/a/sub\\*.txt"), PathBuf::from("/b/sub\\*.txt")]);
    }

    #[test]
    fn test_expand_unknown_name() {
        let err = expand_bind_path("!(bindpath.nope)/x", &[], BindStage::Normal).unwrap_err();
        assert_eq!(err, BindPathError::UnknownName("nope".to_string()));
    }

    #[test]
    fn test_expand_empty_name() {
        let unnamed = vec![BindPath::unnamed("/u")];
        assert_eq!(
            expand_bind_path("!(bindpath.)/x", &unnamed, BindStage::Normal).unwrap(),
            vec![PathBuf::from("/u/x")]
        );
        assert_eq!(expand_bind_path("!(bindpath)/x", &[], BindStage::Normal).unwrap(), vec![PathBuf::from("x")]);
    }

    #[test]
    fn test_resolve_file_through_unnamed_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let paths = vec![BindPath::unnamed(dir.path())];

        assert_eq!(resolve_file("a.txt", &paths, BindStage::Normal).unwrap(), dir.path().join("a.txt"));
        assert!(matches!(
            resolve_file("missing.txt", &paths, BindStage::Normal),
            Err(BindPathError::FileNotFound(_))
        ));
    }
}
