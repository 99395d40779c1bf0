use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const REPORT_VERSION: &str = "1.0.0";

/// Label used for files that match no known extension.
pub const CATCH_ALL_CATEGORY: &str = "Outros";

/// Category labels are an open set: the extension table only knows four of
/// them, a classifier may return anything.
pub type Category = String;

pub type CategorizedFiles = BTreeMap<Category, Vec<FileEntry>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
}

impl FileEntry {
    /// Reads the current content of the file from disk.
    pub fn read_bytes(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CategorizationSource {
    #[default]
    Extension,
    Classifier,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanReport {
    pub report_version: String,
    pub scan_id: String,
    pub generated_at: String,
    pub root: PathBuf,
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub existing_subfolders: Vec<String>,
    pub categories: CategorizedFiles,
    #[serde(default)]
    pub categorization: CategorizationSource,
    #[serde(default)]
    pub excluded_files: u64,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ScanReport {
    pub fn total_files(&self) -> usize {
        self.files.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files
            .iter()
            .fold(0_u64, |acc, file| acc.saturating_add(file.size_bytes))
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files.iter().map(|file| file.name.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MoveStage {
    CreateFolder,
    Read,
    Write,
    Verify,
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovedFile {
    pub category: Category,
    pub file_name: String,
    pub destination: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoveFailure {
    pub category: Category,
    pub file_name: String,
    pub stage: MoveStage,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrganizeReport {
    pub report_version: String,
    pub run_id: String,
    pub started_at: String,
    pub root: PathBuf,
    pub dry_run: bool,
    pub total_files: u64,
    pub processed_files: u64,
    pub moved: Vec<MovedFile>,
    pub failures: Vec<MoveFailure>,
    pub created_folders: Vec<String>,
    pub elapsed_ms: u64,
    pub completed: bool,
    #[serde(default)]
    pub rescan: Option<ScanReport>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrganizePhase {
    CreatingFolder,
    Moving,
    Moved,
    Skipped,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrganizeEvent {
    pub seq: u64,
    pub run_id: String,
    pub phase: OrganizePhase,
    pub category: Option<Category>,
    pub file_name: Option<String>,
    pub processed: u64,
    pub total: u64,
    pub percent: f64,
    pub message: String,
    pub timestamp: String,
}
