//! Module archive extraction
//!
//! A module archive is a zip whose entries all live under
//! `{module}@{version}/`. Extraction groups source files by directory into
//! candidate packages; interpreting them is the analyzer's job.

pub mod manifest;

pub use manifest::Manifest;

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};

use crate::analyzer::{SOURCE_SUFFIX, SourceFile};
use crate::error::{Error, Result};
use crate::registry::STDLIB_MODULE;

/// Source files larger than this are skipped.
pub const MAX_FILE_SIZE: u64 = 30 * 1024 * 1024;

const MANIFEST_FILE: &str = "go.mod";

/// A directory of source files that may form a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPackage {
    pub import_path: String,
    /// Directory relative to the module root; empty for the root itself.
    pub dir: String,
    /// Files sorted by name.
    pub files: Vec<SourceFile>,
}

/// Whether a directory name excludes its whole subtree.
fn is_excluded_dir(name: &str) -> bool {
    (name.starts_with('.') && name != ".") || name == "testdata" || name == "vendor"
}

fn is_candidate_file(name: &str) -> bool {
    name.ends_with(SOURCE_SUFFIX) && !name.starts_with('.') && !name.starts_with('_')
}

fn import_path_for(module: &str, dir: &str) -> String {
    match (module, dir) {
        (STDLIB_MODULE, _) => dir.to_string(),
        (_, "") => module.to_string(),
        _ => format!("{module}/{dir}"),
    }
}

fn is_within(dir: &str, root: &str) -> bool {
    dir == root || dir.strip_prefix(root).is_some_and(|rest| rest.starts_with('/'))
}

/// Split an archive into candidate packages, ordered by import path.
pub fn extract_packages(bytes: &[u8], module: &str, version: &str) -> Result<Vec<ExtractedPackage>> {
    let prefix = format!("{module}@{version}/");
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

    let mut dirs: BTreeMap<String, Vec<SourceFile>> = BTreeMap::new();
    let mut nested_modules: BTreeSet<String> = BTreeSet::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        let Some(relative) = name.strip_prefix(&prefix) else {
            return Err(Error::MalformedArchive(format!(
                "entry {name:?} is outside {prefix:?}"
            )));
        };
        if entry.is_dir() || relative.is_empty() {
            continue;
        }

        let (dir, file_name) = relative.rsplit_once('/').unwrap_or(("", relative));
        if dir.split('/').any(is_excluded_dir) {
            continue;
        }
        if file_name == MANIFEST_FILE {
            if !dir.is_empty() {
                nested_modules.insert(dir.to_string());
            }
            continue;
        }
        if !is_candidate_file(file_name) {
            continue;
        }
        if entry.size() > MAX_FILE_SIZE {
            tracing::warn!(
                "Skipping {} in {}@{}: {} bytes exceeds the per-file limit",
                relative,
                module,
                version,
                entry.size()
            );
            continue;
        }

        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut contents)?;
        dirs.entry(dir.to_string()).or_default().push(SourceFile {
            name: file_name.to_string(),
            contents,
        });
    }

    let mut packages: Vec<ExtractedPackage> = dirs
        .into_iter()
        .filter(|(dir, _)| !nested_modules.iter().any(|root| is_within(dir, root)))
        .filter(|(dir, _)| module != STDLIB_MODULE || !dir.is_empty())
        .map(|(dir, mut files)| {
            files.sort_by(|a, b| a.name.cmp(&b.name));
            ExtractedPackage {
                import_path: import_path_for(module, &dir),
                dir,
                files,
            }
        })
        .collect();
    packages.sort_by(|a, b| a.import_path.cmp(&b.import_path));

    tracing::debug!("Extracted {} candidate packages from {}@{}", packages.len(), module, version);
    Ok(packages)
}
