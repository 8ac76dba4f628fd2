//! Source analysis boundary
//!
//! The crawler never looks inside documentation objects. It hands a
//! package's files to a [`SourceAnalyzer`] and works with the result only
//! through the [`Documentation`] capability trait. The crate ships
//! [`ScanAnalyzer`], a declaration scanner producing [`PackageDoc`], but any
//! analyzer can be plugged in.

pub mod doc;
pub mod scan;

pub use doc::{Declaration, PackageDoc};
pub use scan::ScanAnalyzer;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Result;

/// Serialized documentation larger than this is truncated before storage.
pub const MAX_DOC_SIZE: usize = 1_200_000;

/// Source file suffix of the ecosystem.
pub const SOURCE_SUFFIX: &str = ".go";

const KNOWN_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux",
    "nacl", "netbsd", "openbsd", "plan9", "solaris", "wasip1", "windows", "zos",
];

const KNOWN_ARCH: &[&str] = &[
    "386", "amd64", "arm", "arm64", "loong64", "mips", "mips64", "mips64le", "mipsle", "ppc64",
    "ppc64le", "riscv64", "s390x", "sparc64", "wasm",
];

/// A file handed to the analyzer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub contents: Vec<u8>,
}

/// Target platform a package is analyzed for, written `os/arch`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: &str, arch: &str) -> Self {
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
        }
    }

    /// Whether a file belongs to this platform according to its
    /// `_GOOS`, `_GOARCH` or `_GOOS_GOARCH` name suffix.
    pub fn matches_file_name(&self, name: &str) -> bool {
        let stem = name.strip_suffix(SOURCE_SUFFIX).unwrap_or(name);
        let mut parts: Vec<&str> = stem.split('_').collect();
        if parts.last() == Some(&"test") {
            parts.pop();
        }
        // The first part is the base name, never a constraint.
        let tags = parts.get(1..).unwrap_or_default();
        match tags {
            [.., os, arch] if KNOWN_OS.contains(os) && KNOWN_ARCH.contains(arch) => {
                *os == self.os && *arch == self.arch
            }
            [.., last] if KNOWN_OS.contains(last) => *last == self.os,
            [.., last] if KNOWN_ARCH.contains(last) => *last == self.arch,
            _ => true,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((os, arch)) if !os.is_empty() && !arch.is_empty() && !arch.contains('/') => {
                Ok(Platform::new(os, arch))
            }
            _ => Err(format!("expected os/arch, got {s:?}")),
        }
    }
}

/// What the index needs to know about a documentation object.
pub trait Documentation: Send + Sync + Sized + 'static {
    /// Declared package name; empty when the analyzer could not find one.
    fn name(&self) -> &str;
    /// Direct imports, sorted and de-duplicated.
    fn imports(&self) -> &[String];
    fn synopsis(&self) -> &str;
    /// Top-level package doc comment.
    fn doc_text(&self) -> &str;
    /// Whether the package builds an executable.
    fn is_command(&self) -> bool;
    /// Whether the package exports any constant, variable, function, type or example.
    fn exports_anything(&self) -> bool;
    fn encode(&self) -> Result<Vec<u8>>;
    fn decode(bytes: &[u8]) -> Result<Self>;
    /// Clear the bulk fields, keeping name and synopsis, and set the truncation flag.
    fn truncate(&mut self);
    fn is_truncated(&self) -> bool;
}

/// Turns a package's source files into documentation for one platform.
pub trait SourceAnalyzer: Send + Sync + 'static {
    type Doc: Documentation;

    fn analyze(
        &self,
        import_path: &str,
        files: &[SourceFile],
        platform: &Platform,
    ) -> anyhow::Result<Self::Doc>;
}

/// Serialize `doc`, truncating it first if the encoding exceeds `limit` bytes.
pub fn encode_bounded<D: Documentation>(doc: &mut D, limit: usize) -> Result<Vec<u8>> {
    let encoded = doc.encode()?;
    if encoded.len() <= limit {
        return Ok(encoded);
    }
    tracing::warn!(
        "Documentation for {} is {} bytes (limit {}), truncating",
        doc.name(),
        encoded.len(),
        limit
    );
    doc.truncate();
    doc.encode()
}
