//! Package scoring and full-text search
//!
//! Scores are computed once when a package is written. A score of zero keeps
//! the package out of search while leaving it retrievable by path.

use super::{Database, not_blocked};
use super::models::SearchHit;
use crate::analyzer::Documentation;
use crate::error::Result;

/// Maximum number of hits returned by [`Database::search`].
pub const SEARCH_LIMIT: i64 = 20;

/// Penalty applied to packages without a package doc comment.
const UNDOCUMENTED_PENALTY: f64 = 0.95;

/// Whether any slash-delimited segment of `path` is `internal`.
pub fn is_internal_path(path: &str) -> bool {
    path.split('/').any(|segment| segment == "internal")
}

/// Search rank of a package, used as the tie-breaker after text relevance.
pub fn package_score<D: Documentation>(import_path: &str, doc: &D) -> f64 {
    if doc.name().is_empty() || is_internal_path(import_path) {
        return 0.0;
    }
    let documented = !doc.doc_text().trim().is_empty();
    if doc.is_command() {
        if !documented {
            return 0.0;
        }
    } else if !doc.exports_anything() {
        return 0.0;
    }
    if documented { 1.0 } else { UNDOCUMENTED_PENALTY }
}

/// Turn free text into an FTS5 query: every alphanumeric run becomes a
/// quoted term, and all terms must match.
fn match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|term| !term.is_empty())
        .map(|term| format!("\"{}\"", term.to_lowercase()))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" "))
}

impl Database {
    /// Ranked search over import paths, names and synopses. Results are
    /// ordered by text relevance, then score, capped at [`SEARCH_LIMIT`].
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let Some(expression) = match_expression(query) else {
            return Ok(Vec::new());
        };
        tracing::debug!("Searching for {}", expression);
        let sql = format!(
            r#"
            SELECT import_path, module_path, version, name, synopsis,
                   CAST(score AS REAL) AS score
            FROM search_documents
            WHERE search_documents MATCH ? AND {}
            ORDER BY bm25(search_documents) ASC, CAST(score AS REAL) DESC, import_path ASC
            LIMIT ?
            "#,
            not_blocked("search_documents.import_path")
        );
        Ok(sqlx::query_as(&sql)
            .bind(expression)
            .bind(SEARCH_LIMIT)
            .fetch_all(self.pool())
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{Declaration, PackageDoc};
    use crate::storage::fixtures::{module, package, seed};

    fn doc(name: &str, doc: &str, funcs: usize) -> PackageDoc {
        PackageDoc {
            name: name.to_string(),
            doc: doc.to_string(),
            funcs: (0..funcs)
                .map(|i| Declaration {
                    name: format!("F{i}"),
                    doc: String::new(),
                    signature: format!("func F{i}()"),
                })
                .collect(),
            ..PackageDoc::default()
        }
    }

    #[test]
    fn test_score_policy() {
        assert_eq!(package_score("example.com/foo", &doc("foo", "Package foo.", 2)), 1.0);
        assert_eq!(package_score("example.com/foo", &doc("foo", "", 2)), 0.95);
        assert_eq!(package_score("example.com/foo", &doc("", "Package foo.", 2)), 0.0);
        assert_eq!(package_score("example.com/foo", &doc("foo", "", 0)), 0.0);
        assert_eq!(package_score("mod/internal/util", &doc("util", "Package util.", 2)), 0.0);
        assert_eq!(package_score("mod/internal", &doc("internal", "Package internal.", 2)), 0.0);
        assert_eq!(package_score("example.com/internalx", &doc("x", "Package x.", 1)), 1.0);

        let mut command = doc("main", "", 0);
        command.is_command = true;
        assert_eq!(package_score("example.com/cmd/tool", &command), 0.0);
        command.doc = "Tool does things.".to_string();
        assert_eq!(package_score("example.com/cmd/tool", &command), 1.0);
    }

    #[test]
    fn test_match_expression() {
        assert_eq!(match_expression("HTTP router").as_deref(), Some("\"http\" \"router\""));
        assert_eq!(match_expression("a\"b OR c*").as_deref(), Some("\"a\" \"b\" \"or\" \"c\""));
        assert_eq!(match_expression("  ./-  "), None);
    }

    #[tokio::test]
    async fn test_search_ranking_and_exclusion() {
        let db = Database::connect_in_memory().await.unwrap();
        let m = module("example.com/widgets", &["v1.0.0"]);
        db.upsert_module(&m).await.unwrap();

        let mut strong = package("example.com/widgets", &m, &[]);
        strong.platforms[0].synopsis = "Package widgets renders widgets.".to_string();
        db.upsert_package(&strong).await.unwrap();

        let mut weak = package("example.com/widgets/extra", &m, &[]);
        weak.platforms[0].synopsis = "Package extra adds widgets.".to_string();
        weak.platforms[0].score = 0.95;
        db.upsert_package(&weak).await.unwrap();

        let mut hidden = package("example.com/widgets/internal/util", &m, &[]);
        hidden.platforms[0].synopsis = "Package util helps widgets.".to_string();
        hidden.platforms[0].score = 0.0;
        db.upsert_package(&hidden).await.unwrap();

        let hits = db.search("widgets").await.unwrap();
        let paths: Vec<_> = hits.iter().map(|h| h.import_path.as_str()).collect();
        assert!(paths.contains(&"example.com/widgets"));
        assert!(paths.contains(&"example.com/widgets/extra"));
        assert!(!paths.contains(&"example.com/widgets/internal/util"));

        assert!(db.search("nonexistentterm").await.unwrap().is_empty());
        assert!(db.search("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_capped() {
        let db = Database::connect_in_memory().await.unwrap();
        let m = module("example.com/many", &["v1.0.0"]);
        let paths: Vec<String> = (0..30).map(|i| format!("example.com/many/p{i}")).collect();
        let entries: Vec<(&str, &[&str])> = paths.iter().map(|p| (p.as_str(), &[][..])).collect();
        seed(&db, &m, &entries).await;

        assert_eq!(db.search("many").await.unwrap().len(), SEARCH_LIMIT as usize);
    }

    #[tokio::test]
    async fn test_new_module_version_replaces_search_entries() {
        let db = Database::connect_in_memory().await.unwrap();
        let v1 = module("example.com/shift", &["v1.0.0"]);
        seed(&db, &v1, &[("example.com/shift/old", &[])]).await;
        assert_eq!(db.search("old").await.unwrap().len(), 1);

        let v2 = module("example.com/shift", &["v2.0.0", "v1.0.0"]);
        seed(&db, &v2, &[("example.com/shift/new", &[])]).await;
        assert!(db.search("old").await.unwrap().is_empty());
        assert_eq!(db.search("shift").await.unwrap()[0].version, "v2.0.0");
    }
}
