//! Recursive discovery of spreadsheet inputs below a set of root directories.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::model::{DiscoveryWarning, SourceFile, SourceFormat};

/// Outcome of scanning the configured roots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Discovery {
    /// Matching files in root order, then sorted traversal order.
    pub files: Vec<SourceFile>,
    /// Roots that were missing or could only be scanned partially.
    pub warnings: Vec<DiscoveryWarning>,
}

/// Scans every root recursively for files with a recognised extension.
///
/// Roots are visited in the order given. Inside a root, entries are visited
/// depth-first with siblings sorted by file name, so the result is stable for
/// an unchanged file system. Missing roots and unreadable sub-directories are
/// recorded as warnings; nothing here is fatal.
#[instrument(level = "info", skip_all, fields(roots = roots.len()))]
pub fn discover<P: AsRef<Path>>(roots: &[P]) -> Discovery {
    let mut discovery = Discovery::default();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for root in roots {
        let root = root.as_ref();
        if !root.is_dir() {
            warn!(root = %root.display(), "root folder does not exist, skipping");
            discovery.warnings.push(DiscoveryWarning {
                root: root.to_path_buf(),
                message: "folder does not exist".to_string(),
            });
            continue;
        }

        let before = discovery.files.len();
        for entry in WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!(root = %root.display(), %error, "skipping unreadable entry");
                    discovery.warnings.push(DiscoveryWarning {
                        root: root.to_path_buf(),
                        message: error.to_string(),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            let Some(format) = SourceFormat::from_path(entry.path()) else {
                continue;
            };

            let path = absolute(entry.path());
            if !seen.insert(path.clone()) {
                debug!(path = %path.display(), "already discovered under an earlier root");
                continue;
            }

            let index = discovery.files.len();
            discovery.files.push(SourceFile {
                path,
                root: root.to_path_buf(),
                format,
                index,
            });
        }

        info!(
            root = %root.display(),
            file_count = discovery.files.len() - before,
            "scanned root folder"
        );
    }

    discovery
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
        fs::write(path, b"a,b\n1,2\n").expect("write file");
    }

    #[test]
    fn finds_matching_extensions_recursively_and_case_insensitively() {
        let dir = tempdir().expect("temporary directory");
        touch(&dir.path().join("b.csv"));
        touch(&dir.path().join("nested/deeper/A.XLSX"));
        touch(&dir.path().join("nested/legacy.Xls"));
        touch(&dir.path().join("notes.txt"));

        let discovery = discover(&[dir.path()]);
        let names: Vec<String> = discovery.files.iter().map(SourceFile::file_name).collect();

        assert_eq!(names, vec!["b.csv", "A.XLSX", "legacy.Xls"]);
        assert!(discovery.warnings.is_empty());
        assert!(discovery.files.iter().all(|file| file.path.is_absolute()));
        assert_eq!(
            discovery.files.iter().map(|f| f.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn missing_root_is_a_warning_not_an_error() {
        let dir = tempdir().expect("temporary directory");
        touch(&dir.path().join("data.csv"));
        let missing = dir.path().join("does-not-exist");

        let discovery = discover(&[missing.as_path(), dir.path()]);

        assert_eq!(discovery.files.len(), 1);
        assert_eq!(discovery.warnings.len(), 1);
        assert_eq!(discovery.warnings[0].root, missing);
    }

    #[test]
    fn overlapping_roots_keep_first_occurrence() {
        let dir = tempdir().expect("temporary directory");
        touch(&dir.path().join("sub/data.csv"));

        let discovery = discover(&[dir.path().to_path_buf(), dir.path().join("sub")]);

        assert_eq!(discovery.files.len(), 1);
        assert_eq!(discovery.files[0].root, dir.path());
    }

    #[test]
    fn empty_tree_yields_no_files() {
        let dir = tempdir().expect("temporary directory");
        let discovery = discover(&[dir.path()]);
        assert!(discovery.files.is_empty());
        assert!(discovery.warnings.is_empty());
    }
}
