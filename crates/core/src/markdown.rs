use crate::model::{CategorizationSource, MoveStage, OrganizeReport, ScanReport};

pub fn render_markdown_summary(scan: &ScanReport, report: Option<&OrganizeReport>) -> String {
    let mut out = String::new();
    out.push_str("# Faxina Summary\n\n");
    out.push_str(&format!(
        "- Report version: `{}`\n- Generated at: `{}`\n- Folder: `{}`\n- Files: {} ({})\n- Categorized by: `{}`\n",
        scan.report_version,
        scan.generated_at,
        scan.root.display(),
        scan.total_files(),
        human_bytes(scan.total_bytes()),
        source_label(scan.categorization)
    ));
    if scan.excluded_files > 0 {
        out.push_str(&format!("- Excluded: {} file(s)\n", scan.excluded_files));
    }
    out.push('\n');

    out.push_str("## Categories\n\n");
    if scan.categories.is_empty() {
        out.push_str("Nothing to organize.\n\n");
    } else {
        for (category, files) in &scan.categories {
            let bytes = files
                .iter()
                .fold(0_u64, |acc, file| acc.saturating_add(file.size_bytes));
            out.push_str(&format!(
                "### {} ({} file(s), {})\n\n",
                category,
                files.len(),
                human_bytes(bytes)
            ));
            for file in files {
                out.push_str(&format!("- `{}`\n", file.name));
            }
            out.push('\n');
        }
    }

    if !scan.existing_subfolders.is_empty() {
        out.push_str("## Existing Subfolders\n\n");
        for folder in &scan.existing_subfolders {
            out.push_str(&format!("- `{folder}`\n"));
        }
        out.push('\n');
    }

    if let Some(report) = report {
        out.push_str("## Organize Run\n\n");
        out.push_str(&format!(
            "- Run id: `{}`\n- Dry run: `{}`\n- Processed: {}/{}\n- Moved: {}\n- Failed: {}\n- Elapsed: `{} ms`\n",
            report.run_id,
            report.dry_run,
            report.processed_files,
            report.total_files,
            report.moved.len(),
            report.failures.len(),
            report.elapsed_ms
        ));
        if !report.created_folders.is_empty() {
            out.push_str(&format!(
                "- Created folders: `{}`\n",
                report.created_folders.join("`, `")
            ));
        }
        out.push('\n');

        if !report.failures.is_empty() {
            out.push_str("### Files Left In Place\n\n");
            for failure in &report.failures {
                out.push_str(&format!(
                    "- `{}` -> {} ({}): {}\n",
                    failure.file_name,
                    failure.category,
                    stage_label(failure.stage),
                    failure.message
                ));
            }
            out.push('\n');
        }

        if let Some(rescan) = &report.rescan {
            out.push_str(&format!(
                "Files still at the top level after the run: {}\n\n",
                rescan.total_files()
            ));
        }
    }

    let warnings = scan
        .warnings
        .iter()
        .chain(report.into_iter().flat_map(|report| report.warnings.iter()))
        .collect::<Vec<_>>();
    if !warnings.is_empty() {
        out.push_str("## Warnings\n\n");
        for warning in warnings {
            out.push_str(&format!("- {warning}\n"));
        }
        out.push('\n');
    }

    out
}

fn source_label(source: CategorizationSource) -> &'static str {
    match source {
        CategorizationSource::Extension => "extension",
        CategorizationSource::Classifier => "classifier",
    }
}

fn stage_label(stage: MoveStage) -> &'static str {
    match stage {
        MoveStage::CreateFolder => "create folder",
        MoveStage::Read => "read",
        MoveStage::Write => "write",
        MoveStage::Verify => "verify",
        MoveStage::Remove => "remove original",
    }
}

fn human_bytes(value: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if value == 0 {
        return "0 B".to_string();
    }
    let mut size = value as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use super::{human_bytes, render_markdown_summary};
    use crate::model::{
        CategorizationSource, FileEntry, MoveFailure, MoveStage, OrganizeReport, ScanReport,
        REPORT_VERSION,
    };

    fn entry(name: &str, size_bytes: u64) -> FileEntry {
        FileEntry {
            name: name.to_string(),
            path: PathBuf::from("/data").join(name),
            size_bytes,
            modified: None,
            media_type: None,
        }
    }

    fn scan() -> ScanReport {
        let files = vec![entry("a.png", 2048), entry("b.pdf", 10)];
        let mut categories = BTreeMap::new();
        categories.insert("Imagens".to_string(), vec![files[0].clone()]);
        categories.insert("Documentos".to_string(), vec![files[1].clone()]);
        ScanReport {
            report_version: REPORT_VERSION.to_string(),
            scan_id: "scan-1".to_string(),
            generated_at: "2026-01-01T00:00:00Z".to_string(),
            root: PathBuf::from("/data"),
            files,
            existing_subfolders: vec!["Imagens".to_string()],
            categories,
            categorization: CategorizationSource::Extension,
            excluded_files: 0,
            warnings: vec!["classifier skipped".to_string()],
        }
    }

    #[test]
    fn formats_sizes() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(512), "512.0 B");
        assert_eq!(human_bytes(2048), "2.0 KB");
    }

    #[test]
    fn lists_categories_and_warnings() {
        let text = render_markdown_summary(&scan(), None);
        assert!(text.starts_with("# Faxina Summary"));
        assert!(text.contains("### Documentos (1 file(s), 10.0 B)"));
        assert!(text.contains("### Imagens (1 file(s), 2.0 KB)"));
        assert!(text.contains("- `b.pdf`"));
        assert!(text.contains("## Existing Subfolders"));
        assert!(text.contains("- classifier skipped"));
        assert!(!text.contains("## Organize Run"));
    }

    #[test]
    fn includes_run_failures() {
        let report = OrganizeReport {
            report_version: REPORT_VERSION.to_string(),
            run_id: "run-1".to_string(),
            started_at: "2026-01-01T00:00:00Z".to_string(),
            root: PathBuf::from("/data"),
            dry_run: false,
            total_files: 2,
            processed_files: 2,
            moved: Vec::new(),
            failures: vec![MoveFailure {
                category: "Imagens".to_string(),
                file_name: "a.png".to_string(),
                stage: MoveStage::Remove,
                message: "file is locked".to_string(),
            }],
            created_folders: vec!["Documentos".to_string()],
            elapsed_ms: 5,
            completed: true,
            rescan: None,
            warnings: Vec::new(),
        };
        let text = render_markdown_summary(&scan(), Some(&report));
        assert!(text.contains("- Processed: 2/2"));
        assert!(text.contains("- Created folders: `Documentos`"));
        assert!(text.contains("- `a.png` -> Imagens (remove original): file is locked"));
    }
}
