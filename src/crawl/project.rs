//! "View source" link discovery for modules
//!
//! Well-known code hosts get their link templates from the repository root
//! alone. Other hosts publish a `go-source` meta tag on their `?go-get=1`
//! page, which is fetched when discovery is enabled.

use scraper::{Html, Selector};
use std::time::Duration;

use crate::error::Result;
use crate::registry::STDLIB_MODULE;
use crate::storage::ProjectMeta;

/// Link templates before they are tied to a module and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLinks {
    pub name: String,
    pub url: String,
    pub dir_template: String,
    pub file_template: String,
    pub line_template: String,
}

impl SourceLinks {
    fn into_meta(self, module_path: &str) -> ProjectMeta {
        ProjectMeta {
            module_path: module_path.to_string(),
            name: self.name,
            url: self.url,
            dir_template: self.dir_template,
            file_template: self.file_template,
            line_template: self.line_template,
            updated_at: chrono::Utc::now(),
        }
    }
}

/// Templates for modules on known hosts, or `None` for unknown hosts.
pub fn known_host_links(module_path: &str) -> Option<SourceLinks> {
    if module_path == STDLIB_MODULE {
        let base = "https://cs.opensource.google/go/go/+/{commit}:src";
        return Some(SourceLinks {
            name: "go".to_string(),
            url: "https://cs.opensource.google/go/go".to_string(),
            dir_template: format!("{base}/{{dir}}"),
            file_template: format!("{base}/{{file}}"),
            line_template: format!("{base}/{{file}};l={{line}}"),
        });
    }

    let mut parts = module_path.splitn(4, '/');
    let (host, owner, repo) = (parts.next()?, parts.next()?, parts.next()?);
    // Modules in a repository subdirectory prefix every path.
    let subdir = parts.next().map(|s| format!("{s}/")).unwrap_or_default();
    let url = format!("https://{host}/{owner}/{repo}");

    let (tree, blob, line_anchor) = match host {
        "github.com" => ("tree", "blob", "#L{line}"),
        "gitlab.com" => ("-/tree", "-/blob", "#L{line}"),
        "bitbucket.org" => ("src", "src", "#lines-{line}"),
        _ => return None,
    };
    Some(SourceLinks {
        name: repo.to_string(),
        dir_template: format!("{url}/{tree}/{{commit}}/{subdir}{{dir}}"),
        file_template: format!("{url}/{blob}/{{commit}}/{subdir}{{file}}"),
        line_template: format!("{url}/{blob}/{{commit}}/{subdir}{{file}}{line_anchor}"),
        url,
    })
}

/// Value of the `content` attribute of the first `<meta name="{name}">` tag.
fn meta_content(html: &str, name: &str) -> Option<String> {
    let selector = Selector::parse("meta[name][content]").ok()?;
    Html::parse_document(html)
        .select(&selector)
        .map(|element| element.value())
        .find(|meta| meta.attr("name").is_some_and(|n| n.eq_ignore_ascii_case(name)))
        .and_then(|meta| meta.attr("content"))
        .map(str::to_string)
}

/// Parse the `go-source` meta tag: `prefix home directory-template file-template`.
pub fn parse_go_source(html: &str, module_path: &str) -> Option<SourceLinks> {
    let content = meta_content(html, "go-source")?;
    let fields: Vec<&str> = content.split_whitespace().collect();
    let [prefix, home, dir, file] = fields[..] else {
        return None;
    };
    if !(module_path == prefix || module_path.starts_with(&format!("{prefix}/"))) {
        return None;
    }
    let normalize = |template: &str| template.replace("{/dir}", "/{dir}");
    let file = normalize(file);
    let (file_template, line_template) = match file.split_once('#') {
        Some((bare, _)) => (bare.to_string(), file.clone()),
        None => (file.clone(), format!("{file}#L{{line}}")),
    };
    Some(SourceLinks {
        name: prefix.rsplit('/').next().unwrap_or(prefix).to_string(),
        url: home.to_string(),
        dir_template: normalize(dir),
        file_template,
        line_template,
    })
}

/// Resolves project metadata for crawled modules
#[derive(Debug, Clone)]
pub struct ProjectDiscovery {
    client: reqwest::Client,
    enabled: bool,
}

impl ProjectDiscovery {
    /// `enabled` controls fetching meta pages for hosts that are not known
    /// code hosts; known hosts never need the network.
    pub fn new(timeout: Duration, enabled: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client, enabled })
    }

    pub async fn discover(&self, module_path: &str) -> Result<Option<ProjectMeta>> {
        if let Some(links) = known_host_links(module_path) {
            return Ok(Some(links.into_meta(module_path)));
        }
        if !self.enabled {
            return Ok(None);
        }
        let url = format!("https://{module_path}?go-get=1");
        tracing::debug!("Fetching {}", url);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let html = response.text().await?;
        Ok(parse_go_source(&html, module_path).map(|links| links.into_meta(module_path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_github_links() {
        let links = known_host_links("github.com/owner/repo/v2").unwrap();
        assert_eq!(links.name, "repo");
        assert_eq!(links.url, "https://github.com/owner/repo");
        assert_eq!(
            links.line_template,
            "https://github.com/owner/repo/blob/{commit}/v2/{file}#L{line}"
        );
        let root = known_host_links("github.com/owner/repo").unwrap();
        assert_eq!(root.dir_template, "https://github.com/owner/repo/tree/{commit}/{dir}");
    }

    #[test]
    fn test_other_known_hosts() {
        let gitlab = known_host_links("gitlab.com/a/b").unwrap();
        assert_eq!(gitlab.file_template, "https://gitlab.com/a/b/-/blob/{commit}/{file}");
        let bitbucket = known_host_links("bitbucket.org/a/b").unwrap();
        assert!(bitbucket.line_template.ends_with("#lines-{line}"));
        assert!(known_host_links("example.com/a/b").is_none());
        assert!(known_host_links("github.com/short").is_none());
        assert_eq!(known_host_links(STDLIB_MODULE).unwrap().name, "go");
    }

    #[test]
    fn test_go_source_meta() {
        let html = r#"<html><head>
            <meta name="go-import" content="example.com/x git https://git.example.com/x">
            <meta name="go-source" content="example.com/x https://git.example.com/x https://git.example.com/x/tree/master{/dir} https://git.example.com/x/blob/master{/dir}/{file}#L{line}">
            </head></html>"#;
        let links = parse_go_source(html, "example.com/x/sub").unwrap();
        assert_eq!(links.name, "x");
        assert_eq!(links.url, "https://git.example.com/x");
        assert_eq!(links.dir_template, "https://git.example.com/x/tree/master/{dir}");
        assert_eq!(links.file_template, "https://git.example.com/x/blob/master/{dir}/{file}");
        assert_eq!(
            links.line_template,
            "https://git.example.com/x/blob/master/{dir}/{file}#L{line}"
        );
        assert!(parse_go_source(html, "other.com/y").is_none());
        assert!(parse_go_source("<html></html>", "example.com/x").is_none());
    }

    #[test]
    fn test_go_source_meta_markup_variants() {
        let single = "<meta name='go-source' content='example.com/x https://git.example.com/x \
                      https://git.example.com/x/tree{/dir} https://git.example.com/x/blob{/dir}/{file}'>";
        let links = parse_go_source(single, "example.com/x").unwrap();
        assert_eq!(links.dir_template, "https://git.example.com/x/tree/{dir}");
        assert_eq!(links.line_template, "https://git.example.com/x/blob/{dir}/{file}#L{line}");

        let upper = r#"<HTML><HEAD><META NAME="go-source" CONTENT="example.com/x https://git.example.com/x https://git.example.com/x/tree{/dir} https://git.example.com/x/blob{/dir}/{file}#L{line}"></HEAD></HTML>"#;
        let links = parse_go_source(upper, "example.com/x").unwrap();
        assert_eq!(links.url, "https://git.example.com/x");
        assert_eq!(links.file_template, "https://git.example.com/x/blob/{dir}/{file}");

        let unquoted = "<meta content=\"example.com/x h d f\" name=go-source>";
        assert_eq!(parse_go_source(unquoted, "example.com/x").unwrap().url, "h");
        assert!(parse_go_source("<meta name=\"go-source\">", "example.com/x").is_none());
    }

    #[tokio::test]
    async fn test_disabled_discovery_skips_unknown_hosts() {
        let discovery = ProjectDiscovery::new(Duration::from_secs(1), false).unwrap();
        assert!(discovery.discover("example.com/x").await.unwrap().is_none());
        let meta = discovery.discover("github.com/a/b").await.unwrap().unwrap();
        assert_eq!(meta.module_path, "github.com/a/b");
    }
}
