use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::ArgAction;
use clap::{Args, Parser, Subcommand};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input};
use faxina_core::{
    collect_doctor_info, render_markdown_summary, resolve_with_config, run_organize_with_callback,
    run_scan, CategorizationSource, ClassifierConfig, FaxinaError, OrganizeOptions,
    OrganizeReport, ScanOptions, ScanReport,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "faxina",
    version,
    about = "Sort the loose files of a folder into Imagens, Documentos, Vídeos and Outros subfolders."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Preview how the files of a folder would be grouped.
    Scan(ScanArgs),
    /// Move the files of a folder into per-category subfolders.
    Organize(OrganizeArgs),
    /// Show environment, classifier and target folder diagnostics.
    Doctor(DoctorArgs),
}

#[derive(Debug, Args)]
struct SelectionArgs {
    /// Folder to organize. Prompted for when omitted.
    path: Option<PathBuf>,

    /// Exclude glob patterns or name fragments (repeatable).
    #[arg(long = "exclude", value_name = "GLOB", num_args = 1.., action = ArgAction::Append)]
    exclude: Vec<String>,

    /// Ask the Gemini classifier for categories (needs GEMINI_API_KEY).
    #[arg(long)]
    ai: bool,
}

#[derive(Debug, Args)]
struct ScanArgs {
    #[command(flatten)]
    selection: SelectionArgs,

    /// Optional JSON output file for the scan report.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Optional markdown summary output file.
    #[arg(long, value_name = "FILE")]
    md: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct OrganizeArgs {
    #[command(flatten)]
    selection: SelectionArgs,

    /// Report what would be moved without touching anything.
    #[arg(long)]
    dry_run: bool,

    /// Skip the confirmation prompt.
    #[arg(long, short = 'y')]
    yes: bool,

    /// Do not re-read destinations before removing originals.
    #[arg(long)]
    no_verify: bool,

    /// Optional JSON output file for the run report.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Optional markdown summary output file.
    #[arg(long, value_name = "FILE")]
    md: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct DoctorArgs {
    /// Folder to check for organizability and free space.
    path: Option<PathBuf>,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scan(args) => run_scan_command(args),
        Commands::Organize(args) => run_organize_command(args),
        Commands::Doctor(args) => {
            run_doctor_command(args);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            exit_code_for(&err)
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    let faxina = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<FaxinaError>());
    match faxina {
        Some(FaxinaError::AccessDenied { path }) => {
            eprintln!(
                "Hint: grant read and write access to {} and try again.",
                path.display()
            );
            ExitCode::from(3)
        }
        Some(FaxinaError::Unsupported(_)) => {
            eprintln!("Hint: select a folder, not a file.");
            ExitCode::from(4)
        }
        _ => ExitCode::FAILURE,
    }
}

fn run_scan_command(args: ScanArgs) -> Result<()> {
    let Some(root) = select_root(args.selection.path.as_deref())? else {
        println!("No folder selected.");
        return Ok(());
    };

    let scan = scan_root(&root, &args.selection)?;
    print_preview(&scan);

    if let Some(output) = &args.output {
        write_json(&scan, output)?;
        println!("Scan report written to {}", output.display());
    }
    if let Some(md_path) = &args.md {
        write_markdown(&scan, None, md_path)?;
    }
    Ok(())
}

fn run_organize_command(args: OrganizeArgs) -> Result<()> {
    let Some(root) = select_root(args.selection.path.as_deref())? else {
        println!("No folder selected.");
        return Ok(());
    };

    let scan = scan_root(&root, &args.selection)?;
    print_preview(&scan);
    if scan.is_empty() {
        println!("Nothing to organize.");
        return Ok(());
    }

    if !args.yes && !args.dry_run {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                "Move {} file(s) into {} folder(s)?",
                scan.total_files(),
                scan.categories.len()
            ))
            .default(false)
            .interact_opt()
            .context("failed to read confirmation")?;
        if confirmed != Some(true) {
            println!("Cancelled; nothing was moved.");
            return Ok(());
        }
    }

    let options = OrganizeOptions {
        dry_run: args.dry_run,
        verify_writes: !args.no_verify,
        excludes: args.selection.exclude.clone(),
        ..OrganizeOptions::default()
    };

    let progress = create_progress_bar(scan.total_files() as u64);
    let report = run_organize_with_callback(&root, &scan.categories, &options, |event| {
        progress.set_length(event.total);
        progress.set_position(event.processed);
        progress.set_message(event.message);
    });
    progress.finish_and_clear();
    let report = report?;

    print_run_summary(&report);

    if let Some(output) = &args.output {
        write_json(&report, output)?;
        println!("Run report written to {}", output.display());
    }
    if let Some(md_path) = &args.md {
        write_markdown(&scan, Some(&report), md_path)?;
    }
    Ok(())
}

fn run_doctor_command(args: DoctorArgs) {
    let info = collect_doctor_info(args.path.as_deref());
    println!("OS: {} ({})", info.os, info.arch);
    if let Some(current_dir) = info.current_dir {
        println!("Current directory: {}", current_dir);
    }
    match (info.classifier_configured, info.classifier_model) {
        (true, Some(model)) => println!("Classifier: configured ({model})"),
        _ => println!("Classifier: not configured"),
    }
    if let Some(root) = info.root {
        println!(
            "Folder {}: exists={} directory={} writable={} organizable={}",
            root.path, root.exists, root.is_directory, root.writable, root.organizable
        );
        if let Some(problem) = root.problem {
            println!("  problem: {}", problem);
        }
        if root.organizable {
            println!(
                "  files={} subfolders={} largest={}",
                root.file_count,
                root.subfolder_count,
                human_bytes(root.largest_file_bytes)
            );
        }
        if let (Some(mount), Some(free)) = (root.mount_point, root.free_space_bytes) {
            println!("  disk {} free={}", mount, human_bytes(free));
        }
    }
    for note in info.notes {
        println!("Note: {}", note);
    }
}

/// `None` means the user backed out of the prompt.
fn select_root(path: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = path {
        return Ok(Some(path.to_path_buf()));
    }

    let answer = Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt("Folder to organize")
        .allow_empty(true)
        .interact_text();
    match answer {
        Ok(text) if text.trim().is_empty() => Ok(None),
        Ok(text) => Ok(Some(PathBuf::from(text.trim()))),
        Err(dialoguer::Error::IO(err))
            if matches!(
                err.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::UnexpectedEof
            ) =>
        {
            Ok(None)
        }
        Err(err) => Err(err).context("failed to read folder selection"),
    }
}

fn scan_root(root: &Path, selection: &SelectionArgs) -> Result<ScanReport> {
    let options = ScanOptions {
        excludes: selection.exclude.clone(),
        ..ScanOptions::default()
    };
    let mut scan = run_scan(root, &options)?;

    if selection.ai && !scan.is_empty() {
        let spinner = create_spinner("Asking the classifier for categories...");
        resolve_with_config(&mut scan, ClassifierConfig::from_env());
        spinner.finish_and_clear();
    }
    Ok(scan)
}

fn print_preview(scan: &ScanReport) {
    println!(
        "{}: {} file(s), {} ({} categorization)",
        scan.root.display(),
        scan.total_files(),
        human_bytes(scan.total_bytes()),
        match scan.categorization {
            CategorizationSource::Extension => "extension",
            CategorizationSource::Classifier => "classifier",
        }
    );
    for (category, files) in &scan.categories {
        println!("- {} ({})", category, files.len());
        for file in files {
            println!("    {}", file.name);
        }
    }
    if scan.excluded_files > 0 {
        println!("Excluded: {} file(s)", scan.excluded_files);
    }
    for warning in &scan.warnings {
        println!("Warning: {}", warning);
    }
}

fn print_run_summary(report: &OrganizeReport) {
    println!(
        "{}Moved {}/{} file(s) in {} ms, {} failure(s).",
        if report.dry_run { "[dry run] " } else { "" },
        report.moved.len(),
        report.total_files,
        report.elapsed_ms,
        report.failures.len()
    );
    if !report.created_folders.is_empty() {
        println!("Created folders: {}", report.created_folders.join(", "));
    }
    for failure in &report.failures {
        println!(
            "- {} -> {} failed at {:?}: {}",
            failure.file_name, failure.category, failure.stage, failure.message
        );
    }
    for warning in &report.warnings {
        println!("Warning: {}", warning);
    }
}

fn write_json<T: Serialize>(value: &T, output: &Path) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("failed to serialize report")?;
    fs::write(output, payload)
        .with_context(|| format!("failed to write report to {}", output.display()))
}

fn write_markdown(scan: &ScanReport, report: Option<&OrganizeReport>, md_path: &Path) -> Result<()> {
    let markdown = render_markdown_summary(scan, report);
    fs::write(md_path, markdown)
        .with_context(|| format!("failed to write markdown summary to {}", md_path.display()))?;
    println!("Markdown summary written to {}", md_path.display());
    Ok(())
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{msg}\n[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}

fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    spinner
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
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
    use clap::Parser;

    use super::{Cli, Commands};

    #[test]
    fn parses_organize_flags() {
        let cli = Cli::parse_from([
            "faxina",
            "organize",
            "/tmp/downloads",
            "--dry-run",
            "--yes",
            "--exclude",
            "*.part",
            "--ai",
        ]);
        match cli.command {
            Commands::Organize(args) => {
                assert!(args.dry_run);
                assert!(args.yes);
                assert!(args.selection.ai);
                assert_eq!(args.selection.exclude, vec!["*.part".to_string()]);
                assert_eq!(
                    args.selection.path.as_deref(),
                    Some(std::path::Path::new("/tmp/downloads"))
                );
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn path_is_optional() {
        let cli = Cli::parse_from(["faxina", "scan"]);
        match cli.command {
            Commands::Scan(args) => assert!(args.selection.path.is_none()),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
