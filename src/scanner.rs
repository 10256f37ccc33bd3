//! Directory discovery.
//!
//! Walks the source roots and partitions every directory it reaches into
//! `included` (one compression task each) and `excluded` (missing,
//! unreadable or matched by the exception list). Only reads the filesystem.

use crate::error::{ConfigError, ScanError};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// How exception patterns are compared against a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Pattern occurs anywhere in the full path
    #[default]
    Substring,
    /// Pattern equals the last path component
    ExactName,
    /// Shell glob against the full path or the last component
    Glob,
}

/// The exception list, compiled for one run.
#[derive(Debug, Clone, Default)]
pub struct ExceptionPolicy {
    patterns: Vec<String>,
    globs: Vec<Pattern>,
    mode: MatchMode,
    apply_to_files: bool,
}

impl ExceptionPolicy {
    /// A policy that matches nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(
        patterns: &[String],
        mode: MatchMode,
        apply_to_files: bool,
    ) -> Result<Self, ConfigError> {
        let patterns: Vec<String> = patterns
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();

        let globs = if mode == MatchMode::Glob {
            patterns
                .iter()
                .map(|p| {
                    Pattern::new(p).map_err(|source| ConfigError::InvalidPattern {
                        pattern: p.clone(),
                        source,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
        } else {
            Vec::new()
        };

        Ok(Self {
            patterns,
            globs,
            mode,
            apply_to_files,
        })
    }

    pub fn is_active(&self) -> bool {
        !self.patterns.is_empty()
    }

    /// Returns the first pattern matching `path`, if any.
    pub fn matches(&self, path: &Path) -> Option<&str> {
        let name = path.file_name().map(|n| n.to_string_lossy());

        match self.mode {
            MatchMode::Substring => {
                let full = path.to_string_lossy();
                self.patterns
                    .iter()
                    .find(|p| full.contains(p.as_str()))
                    .map(String::as_str)
            }
            MatchMode::ExactName => {
                let name = name?;
                self.patterns
                    .iter()
                    .find(|p| p.as_str() == name)
                    .map(String::as_str)
            }
            MatchMode::Glob => self
                .globs
                .iter()
                .find(|g| {
                    g.matches_path(path) || name.as_deref().is_some_and(|n| g.matches(n))
                })
                .map(Pattern::as_str),
        }
    }

    /// Whether a file inside a task should be left alone.
    pub fn excludes_file(&self, path: &Path) -> bool {
        self.apply_to_files && self.matches(path).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ExclusionReason {
    Missing,
    NotADirectory,
    Unreadable(String),
    ExceptionList(String),
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::Missing => write!(f, "does not exist"),
            ExclusionReason::NotADirectory => write!(f, "not a directory"),
            ExclusionReason::Unreadable(e) => write!(f, "unreadable: {}", e),
            ExclusionReason::ExceptionList(p) => write!(f, "matches exception '{}'", p),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExcludedPath {
    pub path: PathBuf,
    pub reason: ExclusionReason,
}

/// Outcome of a scan. `included` and `excluded` never share a path.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanResult {
    pub included: Vec<PathBuf>,
    pub excluded: Vec<ExcludedPath>,
    #[serde(skip)]
    roots: usize,
}

impl ScanResult {
    fn new(roots: usize) -> Self {
        Self {
            roots,
            ..Self::default()
        }
    }

    /// A result for a run that never got to scan.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.included.is_empty()
    }

    pub fn excluded_paths(&self) -> impl Iterator<Item = &Path> {
        self.excluded.iter().map(|e| e.path.as_path())
    }

    pub fn ensure_eligible(&self) -> Result<(), ScanError> {
        if self.included.is_empty() {
            return Err(ScanError::NothingEligible(self.roots));
        }
        Ok(())
    }

    fn include(&mut self, seen: &mut HashSet<PathBuf>, path: PathBuf) {
        if seen.insert(path.clone()) {
            self.included.push(path);
        }
    }

    fn exclude(&mut self, seen: &mut HashSet<PathBuf>, path: PathBuf, reason: ExclusionReason) {
        if !seen.insert(path.clone()) {
            // Listed by its parent but unreadable itself: move it over
            match self.included.iter().position(|p| *p == path) {
                Some(index) => {
                    self.included.remove(index);
                }
                None => return,
            }
        }
        trace!(path = %path.display(), reason = %reason, "Directory excluded");
        self.excluded.push(ExcludedPath { path, reason });
    }
}

pub struct DirectoryScanner<'a> {
    policy: &'a ExceptionPolicy,
}

impl<'a> DirectoryScanner<'a> {
    pub fn new(policy: &'a ExceptionPolicy) -> Self {
        Self { policy }
    }

    pub fn scan(&self, roots: &[PathBuf]) -> ScanResult {
        let mut result = ScanResult::new(roots.len());
        let mut seen = HashSet::new();

        for root in roots {
            let canonical = match root.canonicalize() {
                Ok(path) => path,
                Err(e) => {
                    let reason = if e.kind() == ErrorKind::NotFound {
                        ExclusionReason::Missing
                    } else {
                        ExclusionReason::Unreadable(e.to_string())
                    };
                    result.exclude(&mut seen, absolutize(root), reason);
                    continue;
                }
            };

            if !canonical.is_dir() {
                result.exclude(&mut seen, canonical, ExclusionReason::NotADirectory);
                continue;
            }

            self.walk(&canonical, &mut seen, &mut result);
        }

        debug!(
            roots = roots.len(),
            included = result.included.len(),
            excluded = result.excluded.len(),
            "Scan finished"
        );
        result
    }

    fn walk(&self, root: &Path, seen: &mut HashSet<PathBuf>, result: &mut ScanResult) {
        let mut walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        loop {
            let entry = match walker.next() {
                None => break,
                Some(Ok(entry)) => entry,
                Some(Err(err)) => {
                    if let Some(path) = err.path() {
                        let reason = ExclusionReason::Unreadable(err.to_string());
                        result.exclude(seen, path.to_path_buf(), reason);
                    }
                    continue;
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();
            if seen.contains(path) {
                // Reached again through an overlapping root
                walker.skip_current_dir();
                continue;
            }

            if let Some(pattern) = self.policy.matches(path) {
                let reason = ExclusionReason::ExceptionList(pattern.to_string());
                result.exclude(seen, path.to_path_buf(), reason);
                walker.skip_current_dir();
                continue;
            }

            result.include(seen, path.to_path_buf());
        }
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("albums/2023")).unwrap();
        fs::create_dir_all(root.join("albums/thumbs")).unwrap();
        fs::create_dir_all(root.join("albums/thumbs/small")).unwrap();
        File::create(root.join("albums/cover.jpg")).unwrap();
        temp_dir
    }

    fn policy(patterns: &[&str], mode: MatchMode) -> ExceptionPolicy {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        ExceptionPolicy::new(&patterns, mode, false).unwrap()
    }

    #[test]
    fn test_scan_includes_every_directory() {
        let temp_dir = tree();
        let root = temp_dir.path().canonicalize().unwrap();
        let disabled = ExceptionPolicy::disabled();

        let result = DirectoryScanner::new(&disabled).scan(&[root.clone()]);

        assert_eq!(
            result.included,
            vec![
                root.clone(),
                root.join("albums"),
                root.join("albums/2023"),
                root.join("albums/thumbs"),
                root.join("albums/thumbs/small"),
            ]
        );
        assert!(result.excluded.is_empty());
        assert!(result.ensure_eligible().is_ok());
    }

    #[test]
    fn test_scan_invalid_roots_are_excluded() {
        let temp_dir = tree();
        let root = temp_dir.path().canonicalize().unwrap();
        let missing = root.join("nope");
        let file = root.join("albums/cover.jpg");
        let disabled = ExceptionPolicy::disabled();

        let result =
            DirectoryScanner::new(&disabled).scan(&[missing.clone(), file.clone(), root.clone()]);

        assert_eq!(result.excluded.len(), 2);
        assert_eq!(result.excluded[0].path, missing);
        assert_eq!(result.excluded[0].reason, ExclusionReason::Missing);
        assert_eq!(result.excluded[1].path, file);
        assert_eq!(result.excluded[1].reason, ExclusionReason::NotADirectory);
        assert_eq!(result.included.len(), 5);
    }

    #[test]
    fn test_scan_all_roots_invalid() {
        let disabled = ExceptionPolicy::disabled();
        let roots = vec![
            PathBuf::from("/definitely/not/here"),
            PathBuf::from("relative/missing"),
        ];

        let result = DirectoryScanner::new(&disabled).scan(&roots);

        assert!(result.is_empty());
        assert_eq!(result.excluded.len(), 2);
        assert!(result.excluded_paths().all(Path::is_absolute));
        assert!(matches!(
            result.ensure_eligible(),
            Err(ScanError::NothingEligible(2))
        ));
    }

    #[test]
    fn test_exception_substring_prunes_subtree() {
        let temp_dir = tree();
        let root = temp_dir.path().canonicalize().unwrap();
        let exceptions = policy(&["thumbs"], MatchMode::Substring);

        let result = DirectoryScanner::new(&exceptions).scan(&[root.clone()]);

        assert_eq!(
            result.included,
            vec![root.clone(), root.join("albums"), root.join("albums/2023")]
        );
        assert_eq!(result.excluded.len(), 1);
        assert_eq!(result.excluded[0].path, root.join("albums/thumbs"));
        assert_eq!(
            result.excluded[0].reason,
            ExclusionReason::ExceptionList("thumbs".to_string())
        );
    }

    #[test]
    fn test_exception_exact_name() {
        let temp_dir = tree();
        let root = temp_dir.path().canonicalize().unwrap();
        let exceptions = policy(&["small", "thumb"], MatchMode::ExactName);

        let result = DirectoryScanner::new(&exceptions).scan(&[root.clone()]);

        // "thumb" is not the exact name of "thumbs"
        assert!(result.included.contains(&root.join("albums/thumbs")));
        assert_eq!(
            result.excluded_paths().collect::<Vec<_>>(),
            vec![root.join("albums/thumbs/small").as_path()]
        );
    }

    #[test]
    fn test_exception_glob() {
        let temp_dir = tree();
        let root = temp_dir.path().canonicalize().unwrap();
        let exceptions = policy(&["20[0-9][0-9]"], MatchMode::Glob);

        let result = DirectoryScanner::new(&exceptions).scan(&[root.clone()]);

        assert!(!result.included.contains(&root.join("albums/2023")));
        assert_eq!(result.excluded.len(), 1);
    }

    #[test]
    fn test_overlapping_roots_are_scanned_once() {
        let temp_dir = tree();
        let root = temp_dir.path().canonicalize().unwrap();
        let disabled = ExceptionPolicy::disabled();

        let result = DirectoryScanner::new(&disabled).scan(&[
            root.join("albums/thumbs"),
            root.clone(),
            root.join("albums"),
        ]);

        let unique: HashSet<_> = result.included.iter().collect();
        assert_eq!(unique.len(), result.included.len());
        assert_eq!(result.included.len(), 5);
    }

    #[test]
    fn test_policy_file_filter() {
        let patterns = vec!["_orig".to_string()];
        let for_dirs = ExceptionPolicy::new(&patterns, MatchMode::Substring, false).unwrap();
        let for_files = ExceptionPolicy::new(&patterns, MatchMode::Substring, true).unwrap();
        let file = Path::new("/p/cat_orig.jpg");

        assert!(!for_dirs.excludes_file(file));
        assert!(for_files.excludes_file(file));
        assert!(!for_files.excludes_file(Path::new("/p/cat.jpg")));
    }

    #[test]
    fn test_blank_patterns_are_ignored() {
        let patterns = vec!["  ".to_string(), String::new()];
        let exceptions = ExceptionPolicy::new(&patterns, MatchMode::Substring, false).unwrap();
        assert!(!exceptions.is_active());
        assert_eq!(exceptions.matches(Path::new("/anything")), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_excluded_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        let open = root.join("open");
        let locked = root.join("locked");
        fs::create_dir(&open).unwrap();
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // Permission bits are not enforced for root
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let disabled = ExceptionPolicy::disabled();
        let result = DirectoryScanner::new(&disabled).scan(&[root.clone()]);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(result.included, vec![root.clone(), open]);
        assert_eq!(result.excluded.len(), 1);
        assert_eq!(result.excluded[0].path, locked);
        assert!(matches!(
            result.excluded[0].reason,
            ExclusionReason::Unreadable(_)
        ));
    }
}
