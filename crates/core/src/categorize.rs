use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::classifier::ClassifiedGroup;
use crate::model::{CategorizedFiles, Category, FileEntry, CATCH_ALL_CATEGORY};

pub const IMAGES_CATEGORY: &str = "Imagens";
pub const DOCUMENTS_CATEGORY: &str = "Documentos";
pub const VIDEOS_CATEGORY: &str = "Vídeos";

/// Checked in order; the extension sets are disjoint so the first hit is the
/// only hit.
const EXTENSION_TABLE: &[(&str, &[&str])] = &[
    (
        IMAGES_CATEGORY,
        &["jpg", "jpeg", "png", "gif", "webp", "svg", "bmp", "ico"],
    ),
    (
        DOCUMENTS_CATEGORY,
        &[
            "pdf", "doc", "docx", "txt", "xlsx", "xls", "ppt", "pptx", "csv", "md",
        ],
    ),
    (
        VIDEOS_CATEGORY,
        &["mp4", "mov", "mkv", "avi", "webm", "m4v"],
    ),
];

/// Lowercased text after the last period. Names without a period, and names
/// whose only period is the leading one (`.bashrc`), have no extension.
pub fn file_extension(name: &str) -> String {
    match name.rfind('.') {
        None | Some(0) => String::new(),
        Some(index) => name[index + 1..].to_lowercase(),
    }
}

pub fn categorize_file(name: &str) -> &'static str {
    let extension = file_extension(name);
    EXTENSION_TABLE
        .iter()
        .find(|(_, extensions)| extensions.contains(&extension.as_str()))
        .map(|(category, _)| *category)
        .unwrap_or(CATCH_ALL_CATEGORY)
}

/// Every category the extension rule can produce, catch-all last.
pub fn known_categories() -> Vec<&'static str> {
    let mut categories = EXTENSION_TABLE
        .iter()
        .map(|(category, _)| *category)
        .collect::<Vec<_>>();
    categories.push(CATCH_ALL_CATEGORY);
    categories
}

pub fn categorize_entries(files: &[FileEntry]) -> CategorizedFiles {
    let mut grouped = CategorizedFiles::new();
    for file in files {
        grouped
            .entry(categorize_file(&file.name).to_string())
            .or_default()
            .push(file.clone());
    }
    grouped
}

/// Builds the category mapping from a classifier answer, making sure every
/// scanned file lands in exactly one bucket. Bucket order follows `files`.
pub fn apply_classification(
    files: &[FileEntry],
    groups: &[ClassifiedGroup],
    warnings: &mut Vec<String>,
) -> CategorizedFiles {
    let known = files
        .iter()
        .map(|file| file.name.as_str())
        .collect::<HashSet<_>>();
    let mut assigned: HashMap<&str, Category> = HashMap::new();
    let mut unknown_names = 0_usize;
    let mut repeated_names = 0_usize;

    for group in groups {
        let category = sanitize_category_name(&group.category_name);
        for name in &group.files {
            let name = name.as_str();
            if !known.contains(name) {
                unknown_names += 1;
                continue;
            }
            if assigned.contains_key(name) {
                repeated_names += 1;
                continue;
            }
            assigned.insert(name, category.clone());
        }
    }

    let mut grouped = CategorizedFiles::new();
    let mut omitted = 0_usize;
    for file in files {
        let category = match assigned.get(file.name.as_str()) {
            Some(category) => category.clone(),
            None => {
                omitted += 1;
                CATCH_ALL_CATEGORY.to_string()
            }
        };
        grouped.entry(category).or_default().push(file.clone());
    }

    if unknown_names > 0 {
        warnings.push(format!(
            "classifier returned {unknown_names} name(s) not present in the directory; ignored."
        ));
    }
    if repeated_names > 0 {
        warnings.push(format!(
            "classifier listed {repeated_names} file(s) under more than one category; first assignment kept."
        ));
    }
    if omitted > 0 {
        warn!(omitted, "classifier left files unassigned");
        warnings.push(format!(
            "classifier omitted {omitted} file(s); assigned to {CATCH_ALL_CATEGORY}."
        ));
    }

    grouped
}

/// Category names become folder names, so anything that is not a single
/// plain path component collapses to the catch-all.
pub fn sanitize_category_name(raw: &str) -> Category {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed
            .chars()
            .any(|ch| matches!(ch, '/' | '\\' | '\0') || ch.is_control())
    {
        return CATCH_ALL_CATEGORY.to_string();
    }
    trimmed.to_string()
}
