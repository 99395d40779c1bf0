use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{FaxinaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    File,
    Directory,
    Other,
}

#[derive(Debug, Clone)]
pub struct ChildEntry {
    pub name: String,
    pub path: PathBuf,
    pub kind: ChildKind,
    pub size_bytes: u64,
    pub modified: Option<SystemTime>,
}

/// Filesystem operations the scanner and mover rely on. Everything works on
/// the immediate children of one root; nothing here recurses.
pub trait DirectoryBackend {
    /// Fails with `Unsupported` when `root` is not a directory and with
    /// `AccessDenied` when it cannot be written to.
    fn check_root(&self, root: &Path) -> Result<()>;

    fn list_children(&self, root: &Path) -> Result<Vec<ChildEntry>>;

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Returns `true` when the directory had to be created.
    fn ensure_dir(&self, path: &Path) -> io::Result<bool>;

    /// Creates or truncates `path`, writes `content` and syncs it to disk
    /// before returning.
    fn write_file(&self, path: &Path, content: &[u8]) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBackend;

impl DirectoryBackend for NativeBackend {
    fn check_root(&self, root: &Path) -> Result<()> {
        directory_metadata(root)?;
        // Mode bits ignore ownership; writability is whatever create allows.
        let marker = root.join(format!(".faxina-write-check-{}", Uuid::new_v4()));
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&marker)
            .map_err(|err| FaxinaError::from_scan_io(root, &err))?;
        fs::remove_file(&marker).map_err(|err| FaxinaError::from_scan_io(root, &err))
    }

    fn list_children(&self, root: &Path) -> Result<Vec<ChildEntry>> {
        directory_metadata(root)?;

        let mut children = Vec::new();
        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false);
        for item in walker {
            let entry = item.map_err(|err| match err.io_error() {
                Some(io_err) => FaxinaError::from_scan_io(root, io_err),
                None => FaxinaError::ScanFailed {
                    path: root.to_path_buf(),
                    message: err.to_string(),
                },
            })?;

            let file_type = entry.file_type();
            let kind = if file_type.is_file() {
                ChildKind::File
            } else if file_type.is_dir() {
                ChildKind::Directory
            } else {
                ChildKind::Other
            };

            let (size_bytes, modified) = if kind == ChildKind::File {
                let metadata = entry
                    .metadata()
                    .map_err(|err| FaxinaError::ScanFailed {
                        path: entry.path().to_path_buf(),
                        message: err.to_string(),
                    })?;
                (metadata.len(), metadata.modified().ok())
            } else {
                (0, None)
            };

            children.push(ChildEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                path: entry.path().to_path_buf(),
                kind,
                size_bytes,
                modified,
            });
        }
        Ok(children)
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn ensure_dir(&self, path: &Path) -> io::Result<bool> {
        match fs::create_dir(path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                if fs::metadata(path)?.is_dir() {
                    Ok(false)
                } else {
                    Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{} exists and is not a directory", path.display()),
                    ))
                }
            }
            Err(err) => Err(err),
        }
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(content)?;
        file.flush()?;
        file.sync_all()
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

fn directory_metadata(root: &Path) -> Result<fs::Metadata> {
    let metadata = fs::metadata(root).map_err(|err| FaxinaError::from_scan_io(root, &err))?;
    if !metadata.is_dir() {
        return Err(FaxinaError::Unsupported(format!(
            "{} is not a directory",
            root.display()
        )));
    }
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{ChildKind, DirectoryBackend, NativeBackend};
    use crate::error::FaxinaError;

    #[test]
    fn ensure_dir_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let target = temp.path().join("Imagens");
        let backend = NativeBackend;

        assert!(backend.ensure_dir(&target).expect("first ensure"));
        assert!(!backend.ensure_dir(&target).expect("second ensure"));

        let dirs = fs::read_dir(temp.path())
            .expect("read_dir")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .count();
        assert_eq!(dirs, 1);
    }

    #[test]
    fn ensure_dir_rejects_existing_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let target = temp.path().join("Outros");
        fs::write(&target, b"not a folder").expect("write");
        assert!(NativeBackend.ensure_dir(&target).is_err());
    }

    #[test]
    fn lists_only_immediate_children() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a.txt"), b"abc").expect("write");
        fs::create_dir(temp.path().join("nested")).expect("mkdir");
        fs::write(temp.path().join("nested").join("deep.txt"), b"x").expect("write");

        let children = NativeBackend
            .list_children(temp.path())
            .expect("list children");
        assert_eq!(children.len(), 2);
        let file = children
            .iter()
            .find(|child| child.kind == ChildKind::File)
            .expect("file child");
        assert_eq!(file.name, "a.txt");
        assert_eq!(file.size_bytes, 3);
        assert!(children
            .iter()
            .any(|child| child.kind == ChildKind::Directory && child.name == "nested"));
    }

    #[test]
    fn check_root_accepts_writable_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        NativeBackend.check_root(temp.path()).expect("writable root");

        let file = temp.path().join("plain.txt");
        fs::write(&file, b"x").expect("write");
        assert!(matches!(
            NativeBackend.check_root(&file),
            Err(FaxinaError::Unsupported(_))
        ));
    }

    #[test]
    fn check_root_leaves_nothing_behind() {
        let temp = tempfile::tempdir().expect("tempdir");
        NativeBackend.check_root(temp.path()).expect("writable root");
        assert_eq!(fs::read_dir(temp.path()).expect("read_dir").count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn check_root_rejects_directory_without_write_access() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir");
        let locked = temp.path().join("locked");
        fs::create_dir(&locked).expect("mkdir");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).expect("chmod");

        // Privileged users write through any mode bits.
        let privileged = fs::write(locked.join("try"), b"x").is_ok();
        let result = NativeBackend.check_root(&locked);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("chmod back");

        if privileged {
            assert!(result.is_ok());
        } else {
            assert!(matches!(result, Err(FaxinaError::AccessDenied { .. })));
        }
    }

    #[test]
    fn listing_a_file_is_unsupported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("plain.txt");
        fs::write(&file, b"x").expect("write");

        let err = NativeBackend
            .list_children(&file)
            .expect_err("file root must fail");
        assert!(matches!(err, FaxinaError::Unsupported(_)));

        let err = NativeBackend
            .list_children(&temp.path().join("missing"))
            .expect_err("missing root must fail");
        assert!(matches!(err, FaxinaError::ScanFailed { .. }));
    }
}
