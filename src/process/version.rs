// src/process/version.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::{fmt, path::PathBuf};

/// `ESS1e06_6.dta` → edition 6, revision 6
static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)e(\d+)_(\d+)").expect("valid version regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Version {
    pub edition: u32,
    pub revision: u32,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.edition, self.revision)
    }
}

/// Edition and revision carried by a file name; the last match wins.
pub fn version_from_filename(name: &str) -> Option<Version> {
    let caps = VERSION_RE.captures_iter(name).last()?;
    Some(Version {
        edition: caps[1].parse().ok()?,
        revision: caps[2].parse().ok()?,
    })
}

/// Pick the most recent file. Any versioned file outranks an unversioned one;
/// ties go to the greatest file name.
pub fn select_latest(paths: Vec<PathBuf>) -> Option<(PathBuf, Option<Version>)> {
    paths
        .into_iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            (version_from_filename(&name), name, path)
        })
        .max_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)))
        .map(|(version, _, path)| (path, version))
}
