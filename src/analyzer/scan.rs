//! Declaration-scanning source analyzer
//!
//! Reads gofmt-formatted source line by line and picks out the package
//! clause, the package doc comment, imports and exported top-level
//! declarations. It does not type-check, and it only looks at lines that
//! start at column zero (or one tab deep inside grouped declarations), which
//! is where gofmt puts every top-level declaration.

use anyhow::{Context, bail};
use std::collections::BTreeSet;

use super::doc::{Declaration, PackageDoc};
use super::{Platform, SourceAnalyzer, SourceFile};

/// Analyzer producing [`PackageDoc`] from a declaration scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanAnalyzer;

impl SourceAnalyzer for ScanAnalyzer {
    type Doc = PackageDoc;

    fn analyze(
        &self,
        import_path: &str,
        files: &[SourceFile],
        platform: &Platform,
    ) -> anyhow::Result<PackageDoc> {
        let mut doc = PackageDoc {
            import_path: import_path.to_string(),
            ..PackageDoc::default()
        };
        let mut name: Option<String> = None;
        let mut imports = BTreeSet::new();

        for file in files.iter().filter(|f| platform.matches_file_name(&f.name)) {
            let text = std::str::from_utf8(&file.contents)
                .with_context(|| format!("{}: not valid UTF-8", file.name))?;
            let parsed = scan_file(text);
            if parsed.ignored {
                continue;
            }
            let Some(package) = parsed.package else {
                bail!("{}: missing package clause", file.name);
            };

            if file.name.ends_with("_test.go") {
                doc.examples.extend(
                    parsed
                        .funcs
                        .into_iter()
                        .filter(|d| d.name.starts_with("Example")),
                );
                continue;
            }

            match &name {
                None => name = Some(package),
                Some(existing) if *existing != package => {
                    bail!("found packages {} and {} in {}", existing, package, import_path)
                }
                Some(_) => {}
            }
            if !parsed.package_doc.is_empty() && (doc.doc.is_empty() || file.name == "doc.go") {
                doc.doc = parsed.package_doc;
            }
            imports.extend(parsed.imports);
            doc.consts.extend(parsed.consts.into_iter().filter(is_exported));
            doc.vars.extend(parsed.vars.into_iter().filter(is_exported));
            doc.funcs.extend(parsed.funcs.into_iter().filter(is_exported));
            doc.types.extend(parsed.types.into_iter().filter(is_exported));
        }

        let Some(name) = name else {
            bail!("no buildable source files in {} for {}", import_path, platform);
        };
        doc.is_command = name == "main";
        doc.name = name;
        doc.synopsis = synopsis(&doc.doc);
        doc.imports = imports.into_iter().collect();
        Ok(doc)
    }
}

fn is_exported(decl: &Declaration) -> bool {
    decl.name.chars().next().is_some_and(|c| c.is_uppercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    Import,
    Const,
    Var,
    Type,
}

#[derive(Debug, Default)]
struct ScannedFile {
    package: Option<String>,
    package_doc: String,
    imports: Vec<String>,
    consts: Vec<Declaration>,
    vars: Vec<Declaration>,
    funcs: Vec<Declaration>,
    types: Vec<Declaration>,
    /// Excluded by a `//go:build ignore` constraint.
    ignored: bool,
}

impl ScannedFile {
    fn push(&mut self, group: Group, decl: Declaration) {
        match group {
            Group::Const => self.consts.push(decl),
            Group::Var => self.vars.push(decl),
            Group::Type => self.types.push(decl),
            Group::Import => {}
        }
    }
}

fn scan_file(text: &str) -> ScannedFile {
    let mut out = ScannedFile::default();
    let mut comment: Vec<String> = Vec::new();
    let mut group: Option<Group> = None;
    let mut in_block_comment = false;

    for line in text.lines() {
        let line = line.trim_end();

        if in_block_comment {
            match line.split_once("*/") {
                Some((body, _)) => {
                    comment.push(body.trim().to_string());
                    in_block_comment = false;
                }
                None => comment.push(line.trim().trim_start_matches('*').trim().to_string()),
            }
            continue;
        }

        if let Some(current) = group {
            if line == ")" {
                group = None;
                comment.clear();
                continue;
            }
            let Some(member) = line.strip_prefix('\t') else {
                if line.is_empty() {
                    comment.clear();
                }
                continue;
            };
            if member.is_empty() || member.starts_with(char::is_whitespace) || member == "}" {
                if member.is_empty() {
                    comment.clear();
                }
                continue;
            }
            if let Some(text) = member.strip_prefix("//") {
                comment.push(comment_text(text));
                continue;
            }
            match current {
                Group::Import => out.imports.extend(quoted(member)),
                Group::Const | Group::Var => {
                    let doc = take_doc(&mut comment);
                    for name in value_names(member) {
                        out.push(
                            current,
                            Declaration {
                                name,
                                doc: doc.clone(),
                                signature: signature(member),
                            },
                        );
                    }
                }
                Group::Type => {
                    if let Some(name) = first_word(member) {
                        let doc = take_doc(&mut comment);
                        out.push(
                            current,
                            Declaration {
                                name,
                                doc,
                                signature: format!("type {}", signature(member)),
                            },
                        );
                    }
                }
            }
            continue;
        }

        if line.is_empty() {
            comment.clear();
            continue;
        }
        if line.starts_with(char::is_whitespace) || line == "}" {
            continue;
        }
        if let Some(text) = line.strip_prefix("//") {
            if let Some(expr) = text.strip_prefix("go:build") {
                out.ignored |= expr.trim() == "ignore";
            } else if !text.starts_with("go:") && !text.trim_start().starts_with("+build") {
                comment.push(comment_text(text));
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("/*") {
            match rest.split_once("*/") {
                Some((body, _)) => comment.push(body.trim().to_string()),
                None => {
                    comment.push(rest.trim().to_string());
                    in_block_comment = true;
                }
            }
            continue;
        }

        let (keyword, rest) = line.split_once(' ').unwrap_or((line, ""));
        match keyword {
            "package" => {
                out.package = first_word(rest);
                out.package_doc = take_doc(&mut comment);
            }
            "import" if rest.starts_with('(') => group = Some(Group::Import),
            "import" => out.imports.extend(quoted(rest)),
            "const" | "var" | "type" if rest.starts_with('(') => {
                group = Some(match keyword {
                    "const" => Group::Const,
                    "var" => Group::Var,
                    _ => Group::Type,
                });
                comment.clear();
            }
            "const" | "var" => {
                let current = if keyword == "const" { Group::Const } else { Group::Var };
                let doc = take_doc(&mut comment);
                for name in value_names(rest) {
                    out.push(
                        current,
                        Declaration {
                            name,
                            doc: doc.clone(),
                            signature: signature(line),
                        },
                    );
                }
            }
            "type" => {
                if let Some(name) = first_word(rest) {
                    let doc = take_doc(&mut comment);
                    out.types.push(Declaration {
                        name,
                        doc,
                        signature: signature(line),
                    });
                }
            }
            // Methods have a receiver and are listed under their type.
            "func" if !rest.starts_with('(') => {
                let name: String = rest
                    .chars()
                    .take_while(|c| c.is_alphanumeric() || *c == '_')
                    .collect();
                let doc = take_doc(&mut comment);
                if !name.is_empty() {
                    out.funcs.push(Declaration {
                        name,
                        doc,
                        signature: signature(line),
                    });
                }
            }
            _ => comment.clear(),
        }
    }
    out
}

fn comment_text(text: &str) -> String {
    text.strip_prefix(' ').unwrap_or(text).to_string()
}

fn take_doc(comment: &mut Vec<String>) -> String {
    let doc = comment.join("\n").trim().to_string();
    comment.clear();
    doc
}

fn first_word(s: &str) -> Option<String> {
    let word: String = s
        .trim_start()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    (!word.is_empty()).then_some(word)
}

/// Names declared by one `const` or `var` line such as `A, B int = 1, 2`.
fn value_names(decl: &str) -> Vec<String> {
    let lhs = decl.split('=').next().unwrap_or_default();
    lhs.split(',').filter_map(first_word).collect()
}

fn quoted(s: &str) -> Option<String> {
    let start = s.find('"')?;
    let rest = &s[start + 1..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

fn signature(line: &str) -> String {
    line.trim().trim_end_matches('{').trim_end().to_string()
}

/// First sentence of the first paragraph, on one line.
pub fn synopsis(doc: &str) -> String {
    let paragraph = doc.split("\n\n").next().unwrap_or_default();
    let flat = paragraph.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.find(". ") {
        Some(end) => flat[..=end].to_string(),
        None => flat,
    }
}
