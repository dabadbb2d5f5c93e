//! Reduce raw measurement files into the tables and figures the paper includes.

pub mod compress;
pub mod coprocess;
pub mod dma;
pub mod heatmap;
pub mod table;
pub mod units;

use globset::Glob;

use std::path::{Path, PathBuf};

/// Files directly in `dir` whose names match `pattern`, sorted by name.
pub fn find_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, failure::Error> {
    let matcher = Glob::new(pattern)
        .map_err(|err| failure::format_err!("invalid pattern {}: {}", pattern, err))?
        .compile_matcher();

    let entries = std::fs::read_dir(dir)
        .map_err(|err| failure::format_err!("{}: {}", dir.display(), err))?;

    let mut found = vec![];
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.file_name().map_or(false, |name| matcher.is_match(name)) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// The last match by name. Timestamped names sort oldest first.
pub fn newest_file(dir: &Path, pattern: &str) -> Result<PathBuf, failure::Error> {
    match find_files(dir, pattern)?.pop() {
        Some(path) => Ok(path),
        None => failure::bail!("no file matching {} in {}", pattern, dir.display()),
    }
}
