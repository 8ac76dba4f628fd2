//! Default documentation model

use serde::{Deserialize, Serialize};

use super::Documentation;
use crate::error::Result;

/// One top-level declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    /// Doc comment directly above the declaration.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub doc: String,
    /// First source line of the declaration.
    pub signature: String,
}

/// Documentation of one package on one platform, stored as JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDoc {
    pub name: String,
    pub import_path: String,
    pub synopsis: String,
    pub doc: String,
    pub imports: Vec<String>,
    pub is_command: bool,
    #[serde(default)]
    pub consts: Vec<Declaration>,
    #[serde(default)]
    pub vars: Vec<Declaration>,
    #[serde(default)]
    pub funcs: Vec<Declaration>,
    #[serde(default)]
    pub types: Vec<Declaration>,
    #[serde(default)]
    pub examples: Vec<Declaration>,
    #[serde(default)]
    pub truncated: bool,
}

impl Documentation for PackageDoc {
    fn name(&self) -> &str {
        &self.name
    }

    fn imports(&self) -> &[String] {
        &self.imports
    }

    fn synopsis(&self) -> &str {
        &self.synopsis
    }

    fn doc_text(&self) -> &str {
        &self.doc
    }

    fn is_command(&self) -> bool {
        self.is_command
    }

    fn exports_anything(&self) -> bool {
        !(self.consts.is_empty()
            && self.vars.is_empty()
            && self.funcs.is_empty()
            && self.types.is_empty()
            && self.examples.is_empty())
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn truncate(&mut self) {
        self.consts.clear();
        self.vars.clear();
        self.funcs.clear();
        self.types.clear();
        self.examples.clear();
        self.truncated = true;
    }

    fn is_truncated(&self) -> bool {
        self.truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::encode_bounded;

    fn big_doc() -> PackageDoc {
        PackageDoc {
            name: "big".to_string(),
            import_path: "example.com/big".to_string(),
            synopsis: "Package big is big.".to_string(),
            doc: "Package big is big.".to_string(),
            funcs: (0..200)
                .map(|i| Declaration {
                    name: format!("Func{i}"),
                    doc: "Does a thing.".to_string(),
                    signature: format!("func Func{i}() error"),
                })
                .collect(),
            ..PackageDoc::default()
        }
    }

    #[test]
    fn test_small_doc_is_not_truncated() {
        let mut doc = big_doc();
        let bytes = encode_bounded(&mut doc, usize::MAX).unwrap();
        let decoded = PackageDoc::decode(&bytes).unwrap();
        assert!(!decoded.is_truncated());
        assert_eq!(decoded.funcs.len(), 200);
    }

    #[test]
    fn test_oversized_doc_keeps_name_and_synopsis() {
        let mut doc = big_doc();
        let bytes = encode_bounded(&mut doc, 1024).unwrap();
        let decoded = PackageDoc::decode(&bytes).unwrap();
        assert!(decoded.is_truncated());
        assert!(decoded.funcs.is_empty());
        assert!(!decoded.exports_anything());
        assert_eq!(decoded.name, "big");
        assert_eq!(decoded.synopsis, "Package big is big.");
    }
}
