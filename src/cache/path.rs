//! Workspace and target directory walkers
//!
//! Globs use doublestar semantics: `*` and `?` stay within one path
//! component, `**` crosses components, `[...]` classes are supported.
//! All returned paths are workspace-relative with `/` separators; no
//! walk guarantees an ordering.

use crate::error::{OmniError, OmniResult};
use glob::{MatchOptions, Pattern};
use std::collections::HashSet;
use std::path::Path;
use walkdir::WalkDir;

fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

fn compile(patterns: &[String]) -> OmniResult<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p)
                .map_err(|e| OmniError::ConfigInvalid(format!("invalid glob pattern {p:?}: {e}")))
        })
        .collect()
}

fn matches_any(patterns: &[Pattern], path: &str) -> bool {
    patterns
        .iter()
        .any(|p| p.matches_with(path, match_options()))
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Walk the workspace root for files matching any include pattern,
/// never descending into a configured target directory
pub fn workspace_paths(
    root: &Path,
    includes: &[String],
    targets: &[String],
) -> OmniResult<Vec<String>> {
    if includes.is_empty() {
        return Ok(Vec::new());
    }

    let includes = compile(includes)?;
    let targets: HashSet<&str> = targets.iter().map(String::as_str).collect();
    let mut paths = Vec::new();

    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| !targets.contains(relative(root, entry.path()).as_str()));

    for entry in walker {
        let entry = entry.map_err(|e| OmniError::Walk {
            path: root.to_path_buf(),
            source: e,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = relative(root, entry.path());
        if matches_any(&includes, &rel) {
            paths.push(rel);
        }
    }

    Ok(paths)
}

/// Walk a target directory for files matching the includes and not the
/// excludes. Patterns match against paths relative to the target
/// directory; returned paths keep the `<dir>/` prefix.
pub fn target_paths(
    root: &Path,
    dir: &str,
    includes: &[String],
    excludes: &[String],
) -> OmniResult<Vec<String>> {
    let includes = compile(includes)?;
    let excludes = compile(excludes)?;
    walk_target(root, dir, |normalized| {
        !matches_any(&excludes, normalized) && matches_any(&includes, normalized)
    })
}

/// Walk a target directory for files matching the output patterns
pub fn output_paths(root: &Path, dir: &str, patterns: &[String]) -> OmniResult<Vec<String>> {
    let patterns = compile(patterns)?;
    walk_target(root, dir, |normalized| matches_any(&patterns, normalized))
}

fn walk_target(
    root: &Path,
    dir: &str,
    accept: impl Fn(&str) -> bool,
) -> OmniResult<Vec<String>> {
    let base = root.join(dir);
    let mut paths = Vec::new();

    for entry in WalkDir::new(&base) {
        let entry = entry.map_err(|e| OmniError::Walk {
            path: base.clone(),
            source: e,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let normalized = relative(&base, entry.path());
        if accept(&normalized) {
            paths.push(format!("{dir}/{normalized}"));
        }
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel).unwrap();
    }

    #[test]
    fn workspace_walk_skips_target_dirs() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "workspace.txt");
        touch(tmp.path(), "foo/workspace.txt");
        touch(tmp.path(), "bar/nested/workspace.txt");

        let paths = workspace_paths(
            tmp.path(),
            &["**/workspace.txt".to_string()],
            &["foo".to_string(), "bar".to_string()],
        )
        .unwrap();

        assert_eq!(paths, vec!["workspace.txt"]);
    }

    #[test]
    fn workspace_walk_empty_patterns() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "workspace.txt");

        let paths = workspace_paths(tmp.path(), &[], &[]).unwrap();
        assert!(paths.is_empty());
    }

    #[test]
    fn target_walk_normalizes_before_matching() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "foo/a.txt");
        touch(tmp.path(), "foo/sub/b.txt");
        touch(tmp.path(), "foo/c.log");

        let mut paths = target_paths(
            tmp.path(),
            "foo",
            &["**/*.txt".to_string()],
            &[],
        )
        .unwrap();
        paths.sort();

        assert_eq!(paths, vec!["foo/a.txt", "foo/sub/b.txt"]);
    }

    #[test]
    fn target_walk_excludes_win() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "foo/a.txt");
        touch(tmp.path(), "foo/exclude.txt");

        let paths = target_paths(
            tmp.path(),
            "foo",
            &["*.txt".to_string()],
            &["exclude.txt".to_string()],
        )
        .unwrap();

        assert_eq!(paths, vec!["foo/a.txt"]);
    }

    #[test]
    fn single_star_does_not_cross_separators() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "foo/a.txt");
        touch(tmp.path(), "foo/sub/b.txt");

        let paths = target_paths(tmp.path(), "foo", &["*.txt".to_string()], &[]).unwrap();
        assert_eq!(paths, vec!["foo/a.txt"]);
    }

    #[test]
    fn output_walk_matches_patterns() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "foo/dist/app.js");
        touch(tmp.path(), "foo/src/app.ts");

        let paths = output_paths(tmp.path(), "foo", &["dist/**".to_string()]).unwrap();
        assert_eq!(paths, vec!["foo/dist/app.js"]);
    }
}
