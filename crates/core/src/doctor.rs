use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sysinfo::Disks;

use crate::backend::{ChildKind, DirectoryBackend, NativeBackend};
use crate::classifier::ClassifierConfig;
use crate::error::FaxinaError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorInfo {
    pub os: String,
    pub arch: String,
    pub current_dir: Option<String>,
    pub classifier_configured: bool,
    pub classifier_model: Option<String>,
    pub root: Option<RootDiagnostics>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RootDiagnostics {
    pub path: String,
    pub exists: bool,
    pub is_directory: bool,
    pub writable: bool,
    pub organizable: bool,
    pub problem: Option<String>,
    pub file_count: u64,
    pub subfolder_count: u64,
    pub largest_file_bytes: u64,
    pub mount_point: Option<String>,
    pub free_space_bytes: Option<u64>,
}

pub fn collect_doctor_info(root: Option<&Path>) -> DoctorInfo {
    build_doctor_info(root, ClassifierConfig::from_env(), &disk_space_table())
}

fn build_doctor_info(
    root: Option<&Path>,
    classifier: Option<ClassifierConfig>,
    disks: &[(String, u64)],
) -> DoctorInfo {
    let current_dir = env::current_dir()
        .ok()
        .map(|path| path.to_string_lossy().to_string());

    let mut notes = vec![
        "Only the immediate files of the selected folder are moved; subfolders are left alone."
            .to_string(),
        "Each file is copied, verified and then deleted; an interrupted run can be resumed by running again."
            .to_string(),
    ];
    if classifier.is_none() {
        notes.push(
            "No GEMINI_API_KEY/API_KEY set; categorization uses extension rules only.".to_string(),
        );
    }

    let root = root.map(|path| diagnose_root(path, disks, &mut notes));

    DoctorInfo {
        os: env::consts::OS.to_string(),
        arch: env::consts::ARCH.to_string(),
        current_dir,
        classifier_configured: classifier.is_some(),
        classifier_model: classifier.map(|config| config.model),
        root,
        notes,
    }
}

fn diagnose_root(path: &Path, disks: &[(String, u64)], notes: &mut Vec<String>) -> RootDiagnostics {
    let mut diagnostics = RootDiagnostics {
        path: path.to_string_lossy().to_string(),
        exists: path.exists(),
        is_directory: path.is_dir(),
        writable: false,
        organizable: false,
        problem: None,
        file_count: 0,
        subfolder_count: 0,
        largest_file_bytes: 0,
        mount_point: None,
        free_space_bytes: None,
    };

    let backend = NativeBackend;
    if let Err(err) = backend.check_root(path) {
        if matches!(err, FaxinaError::AccessDenied { .. }) {
            notes.push(format!(
                "{} is not writable; grant write access before organizing.",
                path.display()
            ));
        }
        diagnostics.problem = Some(err.to_string());
        return diagnostics;
    }
    diagnostics.writable = true;

    match backend.list_children(path) {
        Ok(children) => {
            for child in children {
                match child.kind {
                    ChildKind::File => {
                        diagnostics.file_count += 1;
                        diagnostics.largest_file_bytes =
                            diagnostics.largest_file_bytes.max(child.size_bytes);
                    }
                    ChildKind::Directory => diagnostics.subfolder_count += 1,
                    ChildKind::Other => {}
                }
            }
            diagnostics.organizable = true;
        }
        Err(err) => {
            diagnostics.problem = Some(err.to_string());
            return diagnostics;
        }
    }

    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if let Some((mount, free)) = match_disk(&canonical, disks) {
        diagnostics.mount_point = Some(mount.to_string());
        diagnostics.free_space_bytes = Some(free);
        if diagnostics.largest_file_bytes > free {
            notes.push(format!(
                "Largest file ({} bytes) exceeds free space on {} ({} bytes); its move will fail.",
                diagnostics.largest_file_bytes, mount, free
            ));
        }
    }

    diagnostics
}

fn disk_space_table() -> Vec<(String, u64)> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .map(|disk| {
            (
                disk.mount_point().to_string_lossy().to_string(),
                disk.available_space(),
            )
        })
        .collect()
}

/// Longest mount point that contains `path`.
fn match_disk<'a>(path: &Path, disks: &'a [(String, u64)]) -> Option<(&'a str, u64)> {
    disks
        .iter()
        .filter(|(mount, _)| path.starts_with(Path::new(mount)))
        .max_by_key(|(mount, _)| mount.len())
        .map(|(mount, free)| (mount.as_str(), *free))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::{build_doctor_info, match_disk};

    #[test]
    fn matches_longest_mount_point() {
        let disks = vec![("/".to_string(), 10), ("/home".to_string(), 20)];
        assert_eq!(
            match_disk(Path::new("/home/user/Downloads"), &disks),
            Some(("/home", 20))
        );
        assert_eq!(match_disk(Path::new("/var/tmp"), &disks), Some(("/", 10)));
        assert_eq!(match_disk(Path::new("relative"), &disks), None);
    }

    #[test]
    fn reports_root_contents_and_space() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("big.iso"), vec![0_u8; 64]).expect("write");
        fs::write(temp.path().join("small.txt"), b"x").expect("write");
        fs::create_dir(temp.path().join("Imagens")).expect("mkdir");

        let disks = vec![("/".to_string(), 16)];
        let info = build_doctor_info(Some(temp.path()), None, &disks);

        assert!(!info.classifier_configured);
        let root = info.root.expect("root diagnostics");
        assert!(root.exists && root.is_directory && root.writable);
        assert!(root.organizable);
        assert_eq!(root.file_count, 2);
        assert_eq!(root.subfolder_count, 1);
        assert_eq!(root.largest_file_bytes, 64);
        assert_eq!(root.free_space_bytes, Some(16));
        assert!(info.notes.iter().any(|note| note.contains("exceeds free space")));
    }

    #[test]
    fn flags_missing_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let info = build_doctor_info(Some(&temp.path().join("missing")), None, &[]);
        let root = info.root.expect("root diagnostics");
        assert!(!root.exists);
        assert!(!root.organizable);
        assert!(root.problem.is_some());
    }
}
