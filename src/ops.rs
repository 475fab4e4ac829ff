use anyhow::{Context, Result, anyhow};
use colored::*;
use comfy_table::{Attribute, Cell, ContentArrangement, Table, presets::UTF8_FULL};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::archive::{ArchiveDriver, BatchReport, pair_up};
use crate::cli::{BackupArgs, MarkPolicy};
use crate::config::{BackupKind, Settings};
use crate::drivers::{ArchiveBackend, Backend};
use crate::error::ZipdirError;
use crate::marker::{ExcludePattern, Marker};
use crate::storage::{folder_name, latest_base_artifact};
use crate::utils::io::{read_pair_list, read_path_list};

pub fn do_mark(
    settings: &Settings,
    root: &Path,
    policy: MarkPolicy,
    max_entries: Option<usize>,
    exclude: Option<String>,
) -> Result<()> {
    let root = std::path::absolute(root)?;
    let exclude = ExcludePattern::new(exclude.as_deref().unwrap_or(&settings.exclude_pattern))?;
    let marker = Marker::new(settings.sentinel_name.clone());

    let marked = match policy {
        MarkPolicy::TopLevel => marker.mark_top_level_children(&root, &exclude)?,
        MarkPolicy::Leaves => marker.mark_leaf_directories(&root, &exclude)?,
        MarkPolicy::Threshold => {
            let n = max_entries.ok_or_else(|| anyhow!("--max-entries is required for the threshold policy"))?;
            marker.mark_directories_over_threshold(&root, n, &exclude)?
        }
    };

    for dir in &marked {
        println!("  {}", dir.display());
    }
    println!(
        "{} {}",
        "✔".green().bold(),
        format!("Marked {} directories under {}", marked.len(), root.display()).green()
    );
    Ok(())
}

pub fn do_mark_paths(settings: &Settings, paths: &[PathBuf]) -> Result<()> {
    let marker = Marker::new(settings.sentinel_name.clone());
    let created = marker.mark(paths)?;
    let already = paths.len() - created;
    println!(
        "{} {}",
        "✔".green().bold(),
        format!("Marked {} directories", created).green()
    );
    if already > 0 {
        println!("{} {}", "i".yellow().bold(), format!("{} already marked", already).yellow());
    }
    Ok(())
}

pub fn do_unmark(settings: &Settings, root: &Path) -> Result<()> {
    let marker = Marker::new(settings.sentinel_name.clone());
    let removed = marker.clear_marks(root)?;
    if removed == 0 {
        println!("{} {}", "i".yellow().bold(), "No marks found".yellow());
    } else {
        println!(
            "{} {}",
            "✔".green().bold(),
            format!("Removed {} marks under {}", removed, root.display()).green()
        );
    }
    Ok(())
}

pub fn do_list(settings: &Settings, root: &Path) -> Result<()> {
    let marker = Marker::new(settings.sentinel_name.clone());
    let marked = marker.list_marked(root)?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Directory").add_attribute(Attribute::Bold),
            Cell::new("Entries").add_attribute(Attribute::Bold),
        ]);

    let mut count = 0;
    for dir in &marked {
        let entries = std::fs::read_dir(&dir)
            .map(|rd| rd.filter(|e| e.as_ref().map(|e| e.file_name() != settings.sentinel_name.as_str()).unwrap_or(true)).count())
            .map(|n| n.to_string())
            .unwrap_or_else(|_| "?".into());
        table.add_row(vec![Cell::new(dir.display()), Cell::new(entries)]);
        count += 1;
    }

    if count == 0 {
        println!("{} {}", "i".yellow().bold(), "No marked directories found".yellow());
        return Ok(());
    }
    println!("{}", table);
    Ok(())
}

pub fn do_full(settings: Settings, args: BackupArgs) -> Result<()> {
    let settings = apply_overrides(settings, &args)?;
    let driver = build_driver(&settings)?;
    let marker = Marker::new(settings.sentinel_name.clone());

    let dirs = match (&args.source.from, &args.source.marked) {
        (Some(file), _) => read_path_list(file).with_context(|| format!("reading {}", file.display()))?,
        (None, Some(root)) => marker.list_marked(root)?.iter().collect(),
        (None, None) => return Err(anyhow!("either --from or --marked is required")),
    };

    run_batch(&settings, &driver, BackupKind::Full, dirs.len(), |log_dir, bar| {
        driver.batch_full(&dirs, log_dir, bar)
    })
}

pub fn do_diff(settings: Settings, args: BackupArgs, bases: Option<PathBuf>) -> Result<()> {
    let settings = apply_overrides(settings, &args)?;
    let driver = build_driver(&settings)?;
    let marker = Marker::new(settings.sentinel_name.clone());
    let entries = diff_entries(&marker, &args, bases.as_deref())?;

    let mut pairs = Vec::with_capacity(entries.len());
    for (dir, base) in entries {
        let base = match base {
            Some(b) => b,
            None => resolve_base(&driver, &dir)?,
        };
        pairs.push((dir, base));
    }

    run_batch(&settings, &driver, BackupKind::Differential, pairs.len(), |log_dir, bar| {
        driver.batch_differential(&pairs, log_dir, bar)
    })
}

/// Directories with their base archive, if one was given.
fn diff_entries(marker: &Marker, args: &BackupArgs, bases: Option<&Path>) -> Result<Vec<(PathBuf, Option<PathBuf>)>> {
    match (&args.source.from, &args.source.marked, bases) {
        (Some(file), _, Some(bases)) => {
            let dirs = read_path_list(file).with_context(|| format!("reading {}", file.display()))?;
            let bases = read_path_list(bases).with_context(|| format!("reading {}", bases.display()))?;
            Ok(pair_up(dirs, bases)?.into_iter().map(|(d, b)| (d, Some(b))).collect())
        }
        (Some(file), _, None) => Ok(read_pair_list(file).with_context(|| format!("reading {}", file.display()))?),
        (None, Some(root), _) => Ok(marker.list_marked(root)?.iter().map(|d| (d, None)).collect()),
        (None, None, _) => Err(anyhow!("either --from or --marked is required")),
    }
}

fn resolve_base(driver: &ArchiveDriver, dir: &Path) -> Result<PathBuf> {
    let folder = folder_name(&std::fs::canonicalize(dir).with_context(|| format!("resolving {}", dir.display()))?)?;
    let ext = driver.backend().extension();
    match latest_base_artifact(driver.save_path(), &folder, ext)? {
        Some(base) => {
            info!(dir = %dir.display(), base = %base.display(), "resolved base archive");
            Ok(base)
        }
        None => Err(ZipdirError::MissingArtifact(driver.save_path().join(format!("{}.*.base.{}", folder, ext))).into()),
    }
}

fn run_batch<F>(settings: &Settings, driver: &ArchiveDriver, kind: BackupKind, total: usize, run: F) -> Result<()>
where
    F: FnOnce(&Path, &ProgressBar) -> crate::error::Result<BatchReport>,
{
    if total == 0 {
        println!("{} {}", "i".yellow().bold(), "No directories to back up".yellow());
        return Ok(());
    }
    let log_dir = settings.log_dir.clone().unwrap_or_else(|| driver.save_path().to_path_buf());
    let label = match kind {
        BackupKind::Full => "Full backup",
        BackupKind::Differential => "Differential backup",
    };

    let bar = create_progress_bar(label);
    bar.set_length(total as u64);
    match run(&log_dir, &bar) {
        Ok(report) => {
            bar.finish_with_message(format!("{} complete", label));
            println!(
                "{} {}",
                "✔".green().bold(),
                format!("{} of {} directories with {} into {}", label, report.processed, driver.backend().name(), driver.save_path().display()).green()
            );
            println!("{} {}", "i".yellow().bold(), format!("Log: {}", report.log_path.display()).yellow());
            Ok(())
        }
        Err(err) => {
            bar.abandon_with_message(format!("{} aborted", label));
            eprintln!(
                "{} {}",
                "!".yellow().bold(),
                format!("Batch aborted; directories after the failing one were not processed. See the log in {}", log_dir.display()).yellow()
            );
            Err(err.into())
        }
    }
}

fn apply_overrides(mut settings: Settings, args: &BackupArgs) -> Result<Settings> {
    if let Some(backend) = args.backend {
        settings.backend = backend;
    }
    if let Some(path) = &args.save_path {
        settings.save_path = Some(path.clone());
    }
    if let Some(fmt) = &args.timestamp_format {
        settings.timestamp_format = fmt.clone();
    }
    if let Some(level) = args.compression_level {
        settings.compression_level = level;
    }
    if let Some(secs) = args.timeout_secs {
        settings.tool_timeout_secs = Some(secs);
    }
    settings.validate()?;
    Ok(settings)
}

fn build_driver(settings: &Settings) -> Result<ArchiveDriver> {
    let save_path = settings
        .save_path
        .clone()
        .ok_or_else(|| anyhow!("no save path; pass --save-path or set save_path in the config file"))?;
    let backend = Backend::select(settings.backend, settings);
    Ok(ArchiveDriver::from_settings(settings, backend, &save_path)?)
}

fn create_progress_bar(prefix: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}")
            .unwrap()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "),
    );
    bar.set_message(prefix.to_string());
    bar.enable_steady_tick(std::time::Duration::from_millis(80));
    bar
}

pub fn do_version() {
    println!("{} {}", "zipdir".bold(), env!("CARGO_PKG_VERSION").cyan());
}
