//! Module manifest (`.mod`) parsing
//!
//! Only two things are read from a manifest: the declared module path and a
//! deprecation notice. A notice is a paragraph starting with `Deprecated:` in
//! the comment block directly above the `module` directive or in the
//! directive's trailing comment.

use crate::error::{Error, Result};

const DEPRECATED_PREFIX: &str = "Deprecated:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub module_path: String,
    pub deprecated: Option<String>,
}

impl Manifest {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(bytes);
        let mut comments: Vec<String> = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if let Some(comment) = line.strip_prefix("//") {
                comments.push(comment.trim().to_string());
                continue;
            }
            let Some(rest) = line.strip_prefix("module") else {
                comments.clear();
                continue;
            };
            if !rest.starts_with(char::is_whitespace) {
                comments.clear();
                continue;
            }

            let (directive, trailing) = match rest.split_once("//") {
                Some((directive, trailing)) => (directive, Some(trailing.trim().to_string())),
                None => (rest, None),
            };
            let module_path = directive.trim().trim_matches('"').to_string();
            if module_path.is_empty() {
                return Err(Error::MalformedArchive("empty module directive".to_string()));
            }
            comments.extend(trailing);
            return Ok(Self {
                module_path,
                deprecated: deprecation(&comments),
            });
        }
        Err(Error::MalformedArchive("manifest has no module directive".to_string()))
    }
}

fn deprecation(comments: &[String]) -> Option<String> {
    comments
        .split(|line| line.is_empty())
        .find(|paragraph| paragraph.first().is_some_and(|l| l.starts_with(DEPRECATED_PREFIX)))
        .map(|paragraph| {
            let joined = paragraph.join(" ");
            joined[DEPRECATED_PREFIX.len()..].trim().to_string()
        })
}
