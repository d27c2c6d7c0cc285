//! # Compaction
//!
//! Thins stored partitions down to a fixed grid of time keys. Everything off the grid is dropped for
//! good; running the pass again changes nothing.
//!
//! The containers are handled as raw JSON so that fields this crate does not model survive the rewrite,
//! and so that a file with the wrong shape can be reported and skipped instead of failing the batch.

use eyre::{
    Context as _,
    Result,
};
use park_waits_config::CompactionSettings;
use serde_json::Value;
use std::{
    borrow::Cow,
    collections::BTreeSet,
    path::{
        Path,
        PathBuf,
    },
};

/// Time keys kept by compaction, e.g. `09:00, 09:15, ..., 21:00` for a 15 minute grid from 9 to 21.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeGrid {
    keys: BTreeSet<String>,
}

impl TimeGrid {
    /// Every `step_minutes` from `start_hour:00` up to and including `end_hour:00`.
    pub fn new(start_hour: u32, end_hour: u32, step_minutes: u32) -> Self {
        let step = step_minutes.max(1) as usize;
        let keys = (start_hour * 60..=end_hour * 60)
            .step_by(step)
            .map(|minute| format!("{:02}:{:02}", minute / 60, minute % 60))
            .collect();
        Self { keys }
    }

    pub fn contains(&self, time_key: &str) -> bool {
        self.keys.contains(normalize_time_key(time_key).as_ref())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl From<CompactionSettings> for TimeGrid {
    fn from(settings: CompactionSettings) -> Self {
        Self::new(settings.start_hour, settings.end_hour, settings.step_minutes)
    }
}

/// Left-pads a single digit hour: `9:15` becomes `09:15`. Anything else is returned unchanged.
pub fn normalize_time_key(time_key: &str) -> Cow<'_, str> {
    let bytes = time_key.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_digit() && bytes[1] == b':' {
        Cow::Owned(format!("0{time_key}"))
    } else {
        Cow::Borrowed(time_key)
    }
}

/// Filters `records` in place. Entries without a string `time` are off the grid by definition.
/// Returns the counts before and after.
pub fn compact_records(records: &mut Vec<Value>, grid: &TimeGrid) -> (usize, usize) {
    let before = records.len();
    records.retain(|record| record.get("time").and_then(Value::as_str).is_some_and(|t| grid.contains(t)));
    (before, records.len())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub before: usize,
    pub after: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionReport {
    pub files: Vec<FileReport>,
    pub skipped: Vec<SkippedFile>,
}

impl CompactionReport {
    pub fn total_before(&self) -> usize {
        self.files.iter().map(|f| f.before).sum()
    }

    pub fn total_after(&self) -> usize {
        self.files.iter().map(|f| f.after).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.skipped.is_empty()
    }
}

enum FileOutcome {
    Compacted(FileReport),
    Skipped(String),
}

pub struct Compactor {
    root: PathBuf,
    grid: TimeGrid,
}

impl Compactor {
    pub fn new(root: impl Into<PathBuf>, grid: TimeGrid) -> Self {
        Self {
            root: root.into(),
            grid,
        }
    }

    /// Compacts every `*.json` below the root. Only a root that cannot be listed aborts the pass; a file
    /// that cannot be read, understood or written is skipped with a warning.
    pub fn run(&self) -> Result<CompactionReport> {
        let (paths, unlisted) = find_json_files(&self.root)?;
        let mut report = CompactionReport {
            skipped: unlisted,
            ..Default::default()
        };
        for file in &report.skipped {
            warn!(path = %file.path.display(), "Skipping: {}", file.reason);
        }

        for path in paths {
            match self.compact_file(&path) {
                FileOutcome::Compacted(file) => {
                    info!(
                        path = %relative(&self.root, &file.path).display(),
                        before = file.before,
                        after = file.after,
                        "Compacted"
                    );
                    report.files.push(file);
                }
                FileOutcome::Skipped(reason) => {
                    warn!(path = %path.display(), "Skipping: {reason}");
                    report.skipped.push(SkippedFile { path, reason });
                }
            }
        }
        Ok(report)
    }

    fn compact_file(&self, path: &Path) -> FileOutcome {
        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(e) => return FileOutcome::Skipped(format!("unreadable: {e}")),
        };
        let mut container: Value = match serde_json::from_slice(&content) {
            Ok(value) => value,
            Err(e) => return FileOutcome::Skipped(format!("not valid JSON: {e}")),
        };
        let Some(records) = container.get_mut("records").and_then(Value::as_array_mut) else {
            return FileOutcome::Skipped("no records array".to_string());
        };

        let (before, after) = compact_records(records, &self.grid);
        if after != before {
            let written = serde_json::to_vec_pretty(&container)
                .map_err(|e| e.to_string())
                .and_then(|content| std::fs::write(path, content).map_err(|e| e.to_string()));
            if let Err(e) = written {
                return FileOutcome::Skipped(format!("not writable: {e}"));
            }
        }

        FileOutcome::Compacted(FileReport {
            path: path.to_path_buf(),
            before,
            after,
        })
    }
}

/// Every `*.json` below `root`, sorted so that reports come out in a stable order. Failing to list the
/// root itself is an error; a subdirectory or entry that cannot be inspected is returned as skipped.
pub(crate) fn find_json_files(root: &Path) -> Result<(Vec<PathBuf>, Vec<SkippedFile>)> {
    let mut files = Vec::new();
    let mut skipped = Vec::new();
    if !root.exists() {
        return Ok((files, skipped));
    }

    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if dir.as_path() == root => return Err(e).wrap_err_with(|| format!("Failed to list {dir:?}")),
            Err(e) => {
                skipped.push(SkippedFile {
                    path: dir,
                    reason: format!("directory not listable: {e}"),
                });
                continue;
            }
        };
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    skipped.push(SkippedFile {
                        path: dir.clone(),
                        reason: format!("directory entry not readable: {e}"),
                    });
                    continue;
                }
            };
            let path = entry.path();
            match entry.file_type() {
                Ok(kind) if kind.is_dir() => pending.push(path),
                Ok(_) if path.extension().is_some_and(|ext| ext == "json") => files.push(path),
                Ok(_) => {}
                Err(e) => skipped.push(SkippedFile {
                    path,
                    reason: format!("file type unknown: {e}"),
                }),
            }
        }
    }
    files.sort();
    skipped.sort_by(|a, b| a.path.cmp(&b.path));
    Ok((files, skipped))
}

fn relative<'a>(root: &Path, path: &'a Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}
