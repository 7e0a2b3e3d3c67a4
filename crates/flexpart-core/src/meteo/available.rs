//! `AVAILABLE` index construction.
//!
//! The work is split into independently testable steps:
//!
//! 1. [`scan_products`] lists prefix-matching regular files (unordered).
//! 2. [`classify_products`] fixes the order by sorting names and parses each
//!    name into an [`InputFile`].
//! 3. [`select_entries`] keeps the products inside the window, falling back to
//!    every parsed product when the window selects nothing.
//! 4. [`AvailabilityManifest::render`] produces the bit-exact file body.
//!
//! [`create_available_file`] runs all four and atomically replaces the file.

use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::NaiveDateTime;

use super::error::{MeteoError, MeteoResult};
use super::observer::MeteoObserver;
use super::timestamp::parse_product_timestamp;
use crate::config::TimeWindow;

pub const AVAILABLE_FILE_NAME: &str = "AVAILABLE";

/// Name prefix of flex_extract GRIB products.
pub const DEFAULT_PRODUCT_PREFIX: &str = "EC";

/// Header lines FLEXPART skips before reading entries.
pub const MANIFEST_HEADER: [&str; 3] = [
    "XXXXXX EMPTY LINES XXXXXXXXX",
    "XXXXXX EMPTY LINES XXXXXXXX",
    "YYYYMMDD HHMMSS   name of the file(up to 80 characters)",
];

const NAME_COLUMN_WIDTH: usize = 30;

/// One prefix-matching product found in the scanned directory.
///
/// Only regular files present at scan time become an `InputFile`, so every
/// instance is on disk; no separate existence flag is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub name: String,

    /// `None` when no suffix layout matched.
    pub timestamp: Option<NaiveDateTime>,
}

/// One line of the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityEntry {
    pub timestamp: NaiveDateTime,
    pub file_name: String,
}

impl AvailabilityEntry {
    /// `YYYYMMDD HHMMSS      <name padded to 30>      ON DISK`
    pub fn render(&self) -> String {
        format!(
            "{} {}      {:<width$}      ON DISK",
            self.timestamp.format("%Y%m%d"),
            self.timestamp.format("%H%M%S"),
            self.file_name,
            width = NAME_COLUMN_WIDTH
        )
    }
}

/// Ordered, non-empty list of entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityManifest {
    entries: Vec<AvailabilityEntry>,
    used_fallback: bool,
}

impl AvailabilityManifest {
    pub fn entries(&self) -> &[AvailabilityEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`; selection fails instead of producing an empty manifest.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the window selected nothing and all parsed products were listed.
    pub fn used_fallback(&self) -> bool {
        self.used_fallback
    }

    /// Header plus one line per entry, every line newline-terminated.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in MANIFEST_HEADER {
            out.push_str(line);
            out.push('\n');
        }
        for entry in &self.entries {
            out.push_str(&entry.render());
            out.push('\n');
        }
        out
    }
}

/// List regular files in `directory` whose names start with `prefix`.
///
/// The returned order is whatever the filesystem yields; callers must not rely
/// on it. Fails with [`MeteoError::NoMatchingFiles`] when nothing matches.
pub fn scan_products(directory: &Path, prefix: &str) -> MeteoResult<Vec<String>> {
    let scan_err = |source| MeteoError::Scan {
        directory: directory.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(directory).map_err(scan_err)? {
        let entry = entry.map_err(scan_err)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(prefix) && entry.path().is_file() {
            names.push(name);
        }
    }

    if names.is_empty() {
        return Err(MeteoError::NoMatchingFiles {
            directory: directory.to_path_buf(),
            prefix: prefix.to_string(),
        });
    }
    Ok(names)
}

/// Sort names lexicographically and parse each into an [`InputFile`].
pub fn classify_products(mut names: Vec<String>, prefix: &str) -> Vec<InputFile> {
    names.sort();
    names
        .into_iter()
        .map(|name| InputFile {
            timestamp: parse_product_timestamp(&name, prefix),
            name,
        })
        .collect()
}

/// Choose the manifest entries for `window`.
///
/// Products inside the window (inclusive) are preferred. When none qualify,
/// every parsed product is used regardless of the window. Entries are sorted
/// by ascending timestamp; ties keep the order of `files`.
pub fn select_entries(
    files: &[InputFile],
    window: &TimeWindow,
    observer: &dyn MeteoObserver,
) -> MeteoResult<AvailabilityManifest> {
    let mut parsed = Vec::with_capacity(files.len());
    let mut unparseable = Vec::new();
    for file in files {
        match file.timestamp {
            Some(timestamp) => parsed.push(AvailabilityEntry {
                timestamp,
                file_name: file.name.clone(),
            }),
            None => {
                observer.unparseable_name(&file.name);
                unparseable.push(file.name.clone());
            }
        }
    }

    let in_window: Vec<AvailabilityEntry> = parsed
        .iter()
        .filter(|entry| window.contains(&entry.timestamp))
        .cloned()
        .collect();

    let (mut entries, used_fallback) = if !in_window.is_empty() {
        (in_window, false)
    } else if !parsed.is_empty() {
        observer.window_fallback(window, parsed.len());
        (parsed, true)
    } else {
        return Err(MeteoError::UnparseableNames { names: unparseable });
    };

    entries.sort_by_key(|entry| entry.timestamp);
    Ok(AvailabilityManifest {
        entries,
        used_fallback,
    })
}

/// Scan, classify and select without touching the filesystem beyond the listing.
pub fn build_manifest(
    directory: &Path,
    prefix: &str,
    window: &TimeWindow,
    observer: &dyn MeteoObserver,
) -> MeteoResult<AvailabilityManifest> {
    let names = scan_products(directory, prefix)?;
    let files = classify_products(names, prefix);
    select_entries(&files, window, observer)
}

/// Build the manifest and (over)write `<directory>/AVAILABLE`.
///
/// Returns the number of entries written.
pub fn create_available_file(
    directory: &Path,
    prefix: &str,
    window: &TimeWindow,
    observer: &dyn MeteoObserver,
) -> MeteoResult<usize> {
    let manifest = build_manifest(directory, prefix, window, observer)?;
    let path = directory.join(AVAILABLE_FILE_NAME);
    write_atomically(directory, &path, manifest.render().as_bytes())?;
    observer.manifest_written(&path, manifest.len());
    Ok(manifest.len())
}

/// Write through a sibling temp file renamed over `path`, so readers never
/// see a partial manifest.
fn write_atomically(directory: &Path, path: &Path, content: &[u8]) -> MeteoResult<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".AVAILABLE.")
        .tempfile_in(directory)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meteo::NoopObserver;
    use chrono::NaiveDate;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingObserver {
        notes: RefCell<Vec<String>>,
    }

    impl MeteoObserver for RecordingObserver {
        fn unparseable_name(&self, name: &str) {
            self.notes.borrow_mut().push(format!("unparseable:{name}"));
        }

        fn window_fallback(&self, _window: &TimeWindow, parsed: usize) {
            self.notes.borrow_mut().push(format!("fallback:{parsed}"));
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn window(start: NaiveDateTime, end: NaiveDateTime) -> TimeWindow {
        TimeWindow::new(start, end).unwrap()
    }

    fn files(names: &[&str]) -> Vec<InputFile> {
        classify_products(names.iter().map(|n| n.to_string()).collect(), "EC")
    }

    #[test]
    fn test_entry_layout() {
        let entry = AvailabilityEntry {
            timestamp: at(2024, 1, 1, 6),
            file_name: "EC2024010106".to_string(),
        };
        assert_eq!(
            entry.render(),
            "20240101 060000      EC2024010106                        ON DISK"
        );
    }

    #[test]
    fn test_long_names_are_not_truncated() {
        let name = "EC".to_string() + &"9".repeat(40);
        let entry = AvailabilityEntry {
            timestamp: at(2024, 1, 1, 0),
            file_name: name.clone(),
        };
        assert!(entry.render().contains(&format!("      {name}      ON DISK")));
    }

    #[test]
    fn test_classify_sorts_names() {
        let classified = files(&["EC2024010106", "EC2024010100", "EC_README"]);
        let names: Vec<_> = classified.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["EC2024010100", "EC2024010106", "EC_README"]);
        assert!(classified[2].timestamp.is_none());
    }

    #[test]
    fn test_window_selection_excludes_outside() {
        let observer = RecordingObserver::default();
        let manifest = select_entries(
            &files(&["EC2024010100", "EC2024010106", "EC2024010212"]),
            &window(at(2024, 1, 1, 0), at(2024, 1, 1, 12)),
            &observer,
        )
        .unwrap();

        assert!(!manifest.used_fallback());
        let names: Vec<_> = manifest.entries().iter().map(|e| &e.file_name).collect();
        assert_eq!(names, vec!["EC2024010100", "EC2024010106"]);
        assert!(observer.notes.borrow().is_empty());
    }

    #[test]
    fn test_fallback_when_window_selects_nothing() {
        let observer = RecordingObserver::default();
        let manifest = select_entries(
            &files(&["EC2024010106", "EC2024010100"]),
            &window(at(2030, 1, 1, 0), at(2030, 1, 2, 0)),
            &observer,
        )
        .unwrap();

        assert!(manifest.used_fallback());
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.entries()[0].timestamp, at(2024, 1, 1, 0));
        assert_eq!(manifest.entries()[1].timestamp, at(2024, 1, 1, 6));
        assert_eq!(*observer.notes.borrow(), vec!["fallback:2".to_string()]);
    }

    #[test]
    fn test_entries_sorted_by_timestamp_not_name() {
        // "EC24011312" (2024-01-13 12:00, two-digit year) sorts last by name
        // but sits between the other two in time.
        let manifest = select_entries(
            &files(&["EC2024011500", "EC24011312", "EC2024011300"]),
            &window(at(2024, 1, 13, 0), at(2024, 1, 16, 0)),
            &NoopObserver,
        )
        .unwrap();
        let names: Vec<_> = manifest.entries().iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, vec!["EC2024011300", "EC24011312", "EC2024011500"]);
    }

    #[test]
    fn test_equal_timestamps_keep_name_order() {
        // Both encode 2024-01-01 00:00.
        let manifest = select_entries(
            &files(&["EC2024010100", "EC20240101"]),
            &window(at(2024, 1, 1, 0), at(2024, 1, 1, 12)),
            &NoopObserver,
        )
        .unwrap();
        let names: Vec<_> = manifest.entries().iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, vec!["EC20240101", "EC2024010100"]);
    }

    #[test]
    fn test_partial_parse_failure_is_tolerated() {
        let observer = RecordingObserver::default();
        let manifest = select_entries(
            &files(&["EC2024010100", "EC.txt"]),
            &window(at(2024, 1, 1, 0), at(2024, 1, 1, 12)),
            &observer,
        )
        .unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(*observer.notes.borrow(), vec!["unparseable:EC.txt".to_string()]);
    }

    #[test]
    fn test_all_unparseable_lists_names() {
        let err = select_entries(
            &files(&["EC_README", "EC.txt"]),
            &window(at(2024, 1, 1, 0), at(2024, 1, 1, 12)),
            &NoopObserver,
        )
        .unwrap_err();
        match err {
            MeteoError::UnparseableNames { names } => {
                assert_eq!(names, vec!["EC.txt".to_string(), "EC_README".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_render_header_and_trailing_newline() {
        let manifest = select_entries(
            &files(&["EC2024010100"]),
            &window(at(2024, 1, 1, 0), at(2024, 1, 1, 12)),
            &NoopObserver,
        )
        .unwrap();
        let rendered = manifest.render();
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(&lines[..3], &MANIFEST_HEADER[..]);
        assert_eq!(lines.len(), 4);
        assert!(rendered.ends_with("ON DISK\n"));
    }

    #[test]
    fn test_scan_ignores_directories_and_other_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("EC2024010100"), b"grib").unwrap();
        fs::write(dir.path().join("EN2024010100"), b"grib").unwrap();
        fs::create_dir(dir.path().join("EC_subdir")).unwrap();

        let names = scan_products(dir.path(), "EC").unwrap();
        assert_eq!(names, vec!["EC2024010100".to_string()]);
    }

    #[test]
    fn test_scan_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_products(&dir.path().join("absent"), "EC").unwrap_err();
        assert!(matches!(err, MeteoError::Scan { .. }));
    }
}
