//! Discovery of iteration event logs.
//!
//! Candidate files are found recursively below the iterations directory and
//! ordered by the iteration number written right before the suffix
//! (`ITERS/it.3/3.events.xml` → 3). Files without a number sort last.

use std::path::{Path, PathBuf};

/// Event log found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationFile {
    pub path: PathBuf,
    pub iteration: Option<u64>,
}

impl IterationFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Walk `dir` and return every file whose name ends with one of `suffixes`,
/// in comparison order. Unreadable subdirectories are skipped with a warning.
pub fn discover_event_files(dir: &Path, suffixes: &[String]) -> std::io::Result<Vec<IterationFile>> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    let mut is_root = true;

    while let Some(current) = pending.pop() {
        let entries = match std::fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(e) if is_root => return Err(e),
            Err(e) => {
                log::warn!("Skipping unreadable directory {}: {}", current.display(), e);
                continue;
            }
        };
        is_root = false;

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(suffix) = matching_suffix(&name, suffixes) {
                let iteration = extract_iteration_number(&name, suffix);
                found.push(IterationFile { path, iteration });
            }
        }
    }

    sort_iteration_files(&mut found);
    log::debug!("Discovered {} event logs under {}", found.len(), dir.display());
    Ok(found)
}

/// Longest suffix of `suffixes` that `name` ends with.
fn matching_suffix<'a>(name: &str, suffixes: &'a [String]) -> Option<&'a str> {
    suffixes
        .iter()
        .filter(|suffix| name.ends_with(suffix.as_str()))
        .max_by_key(|suffix| suffix.len())
        .map(String::as_str)
}

/// Trailing digits of `name` once `suffix` is removed.
pub fn extract_iteration_number(name: &str, suffix: &str) -> Option<u64> {
    let stem = name.strip_suffix(suffix)?;
    let digits_start = stem
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    stem[digits_start..].parse().ok()
}

/// Numbered files first in ascending order, then the rest by name.
pub fn sort_iteration_files(files: &mut [IterationFile]) {
    files.sort_by(|a, b| match (a.iteration, b.iteration) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.path.cmp(&b.path)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.path.cmp(&b.path),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn suffixes() -> Vec<String> {
        crate::config::InputConfig::default().event_suffixes
    }

    #[test]
    fn test_extract_iteration_number() {
        assert_eq!(extract_iteration_number("12.events.xml", ".events.xml"), Some(12));
        assert_eq!(extract_iteration_number("run.7.events.xml.zst", ".events.xml.zst"), Some(7));
        assert_eq!(extract_iteration_number("3.events.xml.gz", ".events.xml.gz"), Some(3));
        assert_eq!(extract_iteration_number("final.events.xml", ".events.xml"), None);
        assert_eq!(extract_iteration_number("12.events.xml", ".plans.xml"), None);
    }

    #[test]
    fn test_discovery_is_recursive_and_ordered() {
        let dir = TempDir::new().unwrap();
        for (sub, name) in [
            ("it.10", "10.events.xml"),
            ("it.2", "2.events.xml.zst"),
            ("it.0", "0.events.xml"),
            ("it.1", "1.events.xml.gz"),
            ("", "best.events.xml"),
            ("it.2", "2.plans.xml"),
        ] {
            let sub_dir = dir.path().join(sub);
            fs::create_dir_all(&sub_dir).unwrap();
            fs::write(sub_dir.join(name), "").unwrap();
        }

        let files = discover_event_files(dir.path(), &suffixes()).unwrap();
        let names: Vec<String> = files.iter().map(IterationFile::file_name).collect();
        assert_eq!(
            names,
            vec![
                "0.events.xml",
                "1.events.xml.gz",
                "2.events.xml.zst",
                "10.events.xml",
                "best.events.xml"
            ]
        );
        assert_eq!(files[1].iteration, Some(1));
        assert_eq!(files[3].iteration, Some(10));
        assert_eq!(files[4].iteration, None);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(discover_event_files(&dir.path().join("nope"), &suffixes()).is_err());
    }

    #[test]
    fn test_empty_directory_yields_nothing() {
        let dir = TempDir::new().unwrap();
        assert!(discover_event_files(dir.path(), &suffixes()).unwrap().is_empty());
    }
}
