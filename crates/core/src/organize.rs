use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{DirectoryBackend, NativeBackend};
use crate::error::Result;
use crate::model::{
    CategorizedFiles, FileEntry, MoveFailure, MoveStage, MovedFile, OrganizeEvent, OrganizePhase,
    OrganizeReport, REPORT_VERSION,
};
use crate::scan::{run_scan_with_backend, ScanOptions};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizeOptions {
    /// Report what would happen without touching the filesystem.
    #[serde(default)]
    pub dry_run: bool,
    /// Re-read every destination and compare digests before the original
    /// is removed.
    #[serde(default = "default_verify_writes")]
    pub verify_writes: bool,
    #[serde(default = "default_rescan")]
    pub rescan: bool,
    /// Exclude patterns applied to the post-run rescan.
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub run_id: Option<String>,
}

fn default_verify_writes() -> bool {
    true
}

fn default_rescan() -> bool {
    true
}

impl Default for OrganizeOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            verify_writes: default_verify_writes(),
            rescan: default_rescan(),
            excludes: Vec::new(),
            run_id: None,
        }
    }
}

struct ProgressTracker {
    run_id: String,
    seq: u64,
    processed: u64,
    total: u64,
}

impl ProgressTracker {
    fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.processed as f64 / self.total as f64) * 100.0
        }
    }

    fn emit<F>(
        &mut self,
        on_event: &mut F,
        phase: OrganizePhase,
        category: Option<&str>,
        file_name: Option<&str>,
        message: String,
    ) where
        F: FnMut(OrganizeEvent),
    {
        self.seq = self.seq.saturating_add(1);
        on_event(OrganizeEvent {
            seq: self.seq,
            run_id: self.run_id.clone(),
            phase,
            category: category.map(str::to_string),
            file_name: file_name.map(str::to_string),
            processed: self.processed,
            total: self.total,
            percent: self.percent(),
            message,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        });
    }
}

pub fn run_organize(
    root: &Path,
    categories: &CategorizedFiles,
    options: &OrganizeOptions,
) -> Result<OrganizeReport> {
    run_organize_with_callback(root, categories, options, |_| {})
}

pub fn run_organize_with_callback<F>(
    root: &Path,
    categories: &CategorizedFiles,
    options: &OrganizeOptions,
    on_event: F,
) -> Result<OrganizeReport>
where
    F: FnMut(OrganizeEvent),
{
    run_organize_with_backend(&NativeBackend, root, categories, options, on_event)
}

/// Moves every categorized file into `root/<category>/`, one file at a time.
/// Per-file failures are recorded and skipped; only a root that cannot be
/// organized at all is returned as an error.
pub fn run_organize_with_backend<F>(
    backend: &dyn DirectoryBackend,
    root: &Path,
    categories: &CategorizedFiles,
    options: &OrganizeOptions,
    mut on_event: F,
) -> Result<OrganizeReport>
where
    F: FnMut(OrganizeEvent),
{
    backend.check_root(root)?;

    let started = Instant::now();
    let run_id = options
        .run_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let total = categories
        .values()
        .map(|files| files.len() as u64)
        .sum::<u64>();
    let mut tracker = ProgressTracker {
        run_id: run_id.clone(),
        seq: 0,
        processed: 0,
        total,
    };
    let mut report = OrganizeReport {
        report_version: REPORT_VERSION.to_string(),
        run_id,
        started_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        root: root.to_path_buf(),
        dry_run: options.dry_run,
        total_files: total,
        processed_files: 0,
        moved: Vec::new(),
        failures: Vec::new(),
        created_folders: Vec::new(),
        elapsed_ms: 0,
        completed: false,
        rescan: None,
        warnings: Vec::new(),
    };

    info!(
        "organizing {} file(s) under {} into {} categor(ies){}",
        total,
        root.display(),
        categories.values().filter(|files| !files.is_empty()).count(),
        if options.dry_run { " (dry run)" } else { "" }
    );

    for (category, files) in categories {
        if files.is_empty() {
            continue;
        }

        let folder = root.join(category);
        tracker.emit(
            &mut on_event,
            OrganizePhase::CreatingFolder,
            Some(category.as_str()),
            None,
            format!("creating folder {category}"),
        );

        let folder_ready = if options.dry_run {
            if !folder.is_dir() {
                report.created_folders.push(category.clone());
            }
            Ok(())
        } else {
            match backend.ensure_dir(&folder) {
                Ok(true) => {
                    report.created_folders.push(category.clone());
                    Ok(())
                }
                Ok(false) => Ok(()),
                Err(err) => Err(err),
            }
        };

        if let Err(err) = folder_ready {
            warn!("failed to prepare folder {}: {}", folder.display(), err);
            for file in files {
                tracker.processed += 1;
                report.failures.push(MoveFailure {
                    category: category.clone(),
                    file_name: file.name.clone(),
                    stage: MoveStage::CreateFolder,
                    message: err.to_string(),
                });
                tracker.emit(
                    &mut on_event,
                    OrganizePhase::Skipped,
                    Some(category.as_str()),
                    Some(file.name.as_str()),
                    format!("skipped {}: folder {category} unavailable", file.name),
                );
            }
            continue;
        }

        for file in files {
            tracker.emit(
                &mut on_event,
                OrganizePhase::Moving,
                Some(category.as_str()),
                Some(file.name.as_str()),
                format!("moving {}", file.name),
            );

            let outcome = if options.dry_run {
                Ok(destination_for(file, &folder))
            } else {
                move_file(backend, file, &folder, options.verify_writes)
            };
            tracker.processed += 1;

            match outcome {
                Ok(destination) => {
                    debug!("moved {} -> {}", file.path.display(), destination.display());
                    report.moved.push(MovedFile {
                        category: category.clone(),
                        file_name: file.name.clone(),
                        destination,
                        size_bytes: file.size_bytes,
                    });
                    tracker.emit(
                        &mut on_event,
                        OrganizePhase::Moved,
                        Some(category.as_str()),
                        Some(file.name.as_str()),
                        format!("moved {} to {category}", file.name),
                    );
                }
                Err((stage, err)) => {
                    warn!(
                        "failed to move {} at {:?} stage: {}",
                        file.path.display(),
                        stage,
                        err
                    );
                    report.failures.push(MoveFailure {
                        category: category.clone(),
                        file_name: file.name.clone(),
                        stage,
                        message: err.to_string(),
                    });
                    tracker.emit(
                        &mut on_event,
                        OrganizePhase::Skipped,
                        Some(category.as_str()),
                        Some(file.name.as_str()),
                        format!("failed to move {}: {err}", file.name),
                    );
                }
            }
        }
    }

    report.processed_files = tracker.processed;
    report.completed = true;

    if options.rescan && !options.dry_run {
        let scan_options = ScanOptions {
            excludes: options.excludes.clone(),
            scan_id: None,
        };
        match run_scan_with_backend(backend, root, &scan_options) {
            Ok(rescan) => report.rescan = Some(rescan),
            Err(err) => {
                warn!("rescan of {} failed: {}", root.display(), err);
                report
                    .warnings
                    .push(format!("rescan after organizing failed: {err}"));
            }
        }
    }

    report.elapsed_ms = started
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX);

    tracker.emit(
        &mut on_event,
        OrganizePhase::Done,
        None,
        None,
        format!(
            "done: {} moved, {} failed",
            report.moved.len(),
            report.failures.len()
        ),
    );

    info!(
        "organize run {} finished: {} moved, {} failed, {} folder(s) created in {} ms",
        report.run_id,
        report.moved.len(),
        report.failures.len(),
        report.created_folders.len(),
        report.elapsed_ms
    );

    Ok(report)
}

fn destination_for(file: &FileEntry, folder: &Path) -> PathBuf {
    let file_name = file
        .path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| OsString::from(&file.name));
    folder.join(file_name)
}

/// Read, write, confirm, remove. Any destination already written is left in
/// place when a later step fails.
fn move_file(
    backend: &dyn DirectoryBackend,
    file: &FileEntry,
    folder: &Path,
    verify: bool,
) -> std::result::Result<PathBuf, (MoveStage, io::Error)> {
    let destination = destination_for(file, folder);

    let content = backend
        .read_file(&file.path)
        .map_err(|err| (MoveStage::Read, err))?;
    backend
        .write_file(&destination, &content)
        .map_err(|err| (MoveStage::Write, err))?;

    if verify {
        let written = backend
            .read_file(&destination)
            .map_err(|err| (MoveStage::Verify, err))?;
        if blake3::hash(&written) != blake3::hash(&content) {
            return Err((
                MoveStage::Verify,
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    "destination content differs from source",
                ),
            ));
        }
    }

    backend
        .remove_file(&file.path)
        .map_err(|err| (MoveStage::Remove, err))?;
    Ok(destination)
}
