use std::cmp::Ordering;
use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, SecondsFormat, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::{ChildKind, DirectoryBackend, NativeBackend};
use crate::categorize::categorize_entries;
use crate::error::Result;
use crate::model::{CategorizationSource, FileEntry, ScanReport, REPORT_VERSION};

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Glob or plain substring patterns matched against file names; matching
    /// files are left out of the scan and never moved.
    pub excludes: Vec<String>,
    pub scan_id: Option<String>,
}

pub fn run_scan(root: &Path, options: &ScanOptions) -> Result<ScanReport> {
    run_scan_with_backend(&NativeBackend, root, options)
}

pub fn run_scan_with_backend(
    backend: &dyn DirectoryBackend,
    root: &Path,
    options: &ScanOptions,
) -> Result<ScanReport> {
    let started = Instant::now();
    let scan_id = options
        .scan_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut warnings = Vec::new();
    let excludes = ExcludeMatcher::new(&options.excludes, &mut warnings);

    // Any enumeration error aborts the scan; a partial listing is never returned.
    let children = backend.list_children(root)?;

    let mut files = Vec::new();
    let mut existing_subfolders = Vec::new();
    let mut excluded_files = 0_u64;
    for child in children {
        match child.kind {
            ChildKind::Directory => existing_subfolders.push(child.name),
            ChildKind::Other => debug!("skipping non-regular entry {}", child.path.display()),
            ChildKind::File => {
                if excludes.is_excluded(&child.name) {
                    excluded_files += 1;
                    continue;
                }
                let media_type = mime_guess::from_path(&child.path)
                    .first_raw()
                    .map(str::to_string);
                files.push(FileEntry {
                    modified: child.modified.map(|time| {
                        DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true)
                    }),
                    name: child.name,
                    path: child.path,
                    size_bytes: child.size_bytes,
                    media_type,
                });
            }
        }
    }

    files.sort_by(|a, b| compare_names(&a.name, &b.name));
    existing_subfolders.sort_by(|a, b| compare_names(a, b));
    let categories = categorize_entries(&files);

    info!(
        "scan of {} complete: {} file(s), {} folder(s), {} excluded in {} ms",
        root.display(),
        files.len(),
        existing_subfolders.len(),
        excluded_files,
        started.elapsed().as_millis()
    );

    Ok(ScanReport {
        report_version: REPORT_VERSION.to_string(),
        scan_id,
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        root: root.to_path_buf(),
        files,
        existing_subfolders,
        categories,
        categorization: CategorizationSource::Extension,
        excluded_files,
        warnings,
    })
}

/// Case-insensitive ordering with a byte-wise tie-break, close to what a
/// file manager shows.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// File-name excludes: patterns with glob syntax go through `globset`, plain
/// text is a case-insensitive fragment match.
struct ExcludeMatcher {
    globs: GlobSet,
    fragments: Vec<String>,
}

impl ExcludeMatcher {
    fn new(patterns: &[String], warnings: &mut Vec<String>) -> Self {
        let mut builder = GlobSetBuilder::new();
        let mut fragments = Vec::new();
        for pattern in patterns.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
            let glob = if has_glob_syntax(pattern) {
                Glob::new(pattern).map_err(|err| {
                    warnings.push(format!(
                        "exclude '{pattern}' is not a valid glob ({err}); matching it as text."
                    ))
                })
            } else {
                Err(())
            };
            match glob {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(()) => fragments.push(pattern.to_lowercase()),
            }
        }

        let globs = builder.build().unwrap_or_else(|err| {
            warnings.push(format!("exclude globs disabled: {err}"));
            GlobSet::empty()
        });
        Self { globs, fragments }
    }

    fn is_excluded(&self, name: &str) -> bool {
        if self.globs.is_match(name) {
            return true;
        }
        let lowered = name.to_lowercase();
        self.fragments
            .iter()
            .any(|fragment| lowered.contains(fragment.as_str()))
    }
}

fn has_glob_syntax(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', ']', '{', '}'])
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;
    use std::fs;

    use super::{compare_names, run_scan, ExcludeMatcher, ScanOptions};
    use crate::error::FaxinaError;
    use crate::model::CATCH_ALL_CATEGORY;

    #[test]
    fn exclude_matcher_matches_glob_and_substring() {
        let mut warnings = Vec::new();
        let matcher = ExcludeMatcher::new(
            &[
                "*.tmp".to_string(),
                "[".to_string(),
                "desktop.ini".to_string(),
            ],
            &mut warnings,
        );

        assert!(matcher.is_excluded("download.tmp"));
        assert!(matcher.is_excluded("Desktop.ini"));
        assert!(!matcher.is_excluded("notes.md"));
        assert!(!warnings.is_empty());
    }

    #[test]
    fn blank_excludes_match_nothing() {
        let mut warnings = Vec::new();
        let matcher = ExcludeMatcher::new(&["  ".to_string()], &mut warnings);
        assert!(!matcher.is_excluded("anything.txt"));
        assert!(warnings.is_empty());
    }

    #[test]
    fn names_sort_case_insensitively() {
        assert_eq!(compare_names("apple.txt", "Banana.txt"), Ordering::Less);
        assert_eq!(compare_names("B.txt", "a.txt"), Ordering::Greater);
        assert_eq!(compare_names("a.txt", "a.txt"), Ordering::Equal);
    }

    #[test]
    fn scan_partitions_files_and_folders() {
        let temp = tempfile::tempdir().expect("tempdir");
        for name in ["zeta.PNG", "alpha.pdf", "Beta.mp4", "notes", "photo.jpg"] {
            fs::write(temp.path().join(name), name.as_bytes()).expect("write");
        }
        fs::create_dir(temp.path().join("Imagens")).expect("mkdir");
        fs::write(temp.path().join("Imagens").join("old.png"), b"x").expect("write");

        let report = run_scan(temp.path(), &ScanOptions::default()).expect("scan");

        let names = report.file_names();
        assert_eq!(
            names,
            vec!["alpha.pdf", "Beta.mp4", "notes", "photo.jpg", "zeta.PNG"]
        );
        assert_eq!(report.existing_subfolders, vec!["Imagens".to_string()]);

        let bucketed = report.categories.values().map(Vec::len).sum::<usize>();
        assert_eq!(bucketed, report.total_files());

        let images = report
            .categories
            .get("Imagens")
            .expect("images bucket")
            .iter()
            .map(|file| file.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(images, vec!["photo.jpg", "zeta.PNG"]);
        assert_eq!(report.categories[CATCH_ALL_CATEGORY][0].name, "notes");

        let photo = report
            .files
            .iter()
            .find(|file| file.name == "photo.jpg")
            .expect("photo entry");
        assert_eq!(photo.media_type.as_deref(), Some("image/jpeg"));
        assert!(photo.modified.is_some());
    }

    #[test]
    fn empty_directory_yields_empty_mapping() {
        let temp = tempfile::tempdir().expect("tempdir");
        let report = run_scan(temp.path(), &ScanOptions::default()).expect("scan");
        assert!(report.is_empty());
        assert!(report.categories.is_empty());
    }

    #[test]
    fn excluded_files_are_counted_not_listed() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("keep.txt"), b"1").expect("write");
        fs::write(temp.path().join("skip.part"), b"2").expect("write");

        let options = ScanOptions {
            excludes: vec!["*.part".to_string()],
            ..ScanOptions::default()
        };
        let report = run_scan(temp.path(), &options).expect("scan");
        assert_eq!(report.file_names(), vec!["keep.txt"]);
        assert_eq!(report.excluded_files, 1);
    }

    #[test]
    fn missing_root_is_a_scan_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = run_scan(&temp.path().join("nope"), &ScanOptions::default())
            .expect_err("scan must fail");
        assert!(matches!(err, FaxinaError::ScanFailed { .. }));
    }
}
