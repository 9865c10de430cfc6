//! Resolution of the `--save` argument into a concrete CSV path
//!
//! Rules, first match wins:
//! - file name containing `%` tokens: expanded as a strftime pattern
//! - trailing separator or existing directory: `log_YYYYmmdd-HHMMSS.csv` inside it
//! - file name with an extension: `_YYYYmmdd-HHMMSS` inserted before the extension
//! - bare stem: `_YYYYmmdd-HHMMSS.csv` appended
//!
//! Parent directories are created, and `_1`, `_2`, ... is appended to the
//! stem while the result already exists.

use crate::error::{Result, StreamError};
use chrono::{Local, NaiveDateTime};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Resolve `raw` using the current local time
pub fn resolve_save_path(raw: &str) -> Result<PathBuf> {
    resolve_save_path_at(raw, Local::now().naive_local())
}

/// Resolve `raw` as if the current time were `now`
pub fn resolve_save_path_at(raw: &str, now: NaiveDateTime) -> Result<PathBuf> {
    if raw.trim().is_empty() {
        return Err(StreamError::Config("save path is empty".to_string()));
    }

    let path = expand_home(raw);
    let stamp = now.format(STAMP_FORMAT).to_string();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let resolved = if name.contains('%') {
        path.with_file_name(expand_pattern(&name, now)?)
    } else if raw.ends_with('/') || raw.ends_with('\\') || path.is_dir() {
        path.join(format!("log_{}.csv", stamp))
    } else {
        match (file_stem(&path), path.extension()) {
            (stem, Some(ext)) => {
                path.with_file_name(format!("{}_{}.{}", stem, stamp, ext.to_string_lossy()))
            }
            (stem, None) => path.with_file_name(format!("{}_{}.csv", stem, stamp)),
        }
    };

    if let Some(parent) = resolved.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            StreamError::Config(format!("Failed to create directory {:?}: {}", parent, e))
        })?;
    }

    Ok(make_unique(resolved))
}

fn expand_home(raw: &str) -> PathBuf {
    let rest = if raw == "~" {
        Some("")
    } else {
        raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\"))
    };

    match (rest, dirs_next::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(raw),
    }
}

fn expand_pattern(pattern: &str, now: NaiveDateTime) -> Result<String> {
    let mut out = String::new();
    write!(out, "{}", now.format(pattern)).map_err(|_| {
        StreamError::Config(format!("Invalid date pattern in save path: {:?}", pattern))
    })?;
    Ok(out)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn make_unique(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }

    let stem = file_stem(&path);
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1u32..)
        .map(|i| path.with_file_name(format!("{}_{}{}", stem, i, ext)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(path)
}
