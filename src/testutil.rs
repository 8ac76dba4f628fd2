//! Fake registry helpers shared by unit tests

use std::io::{Cursor, Write};
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;

use crate::config::Config;

/// Zip `files` (paths relative to the module root) the way a registry serves them.
pub(crate) fn module_zip(module: &str, version: &str, files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, body) in files {
        writer.start_file(format!("{module}@{version}/{name}"), options).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn info_body(version: &str) -> String {
    format!(r#"{{"Version":"{version}","Time":"2024-01-02T03:04:05Z"}}"#)
}

/// Serve `module` at `version` with the given files. `module` must not need escaping.
pub(crate) async fn mount_module(
    server: &MockServer,
    module: &str,
    version: &str,
    versions: &[&str],
    files: &[(&str, &str)],
) {
    mount_module_delayed(server, module, version, versions, files, Duration::ZERO).await;
}

/// Like [`mount_module`], with the archive response delayed.
pub(crate) async fn mount_module_delayed(
    server: &MockServer,
    module: &str,
    version: &str,
    versions: &[&str],
    files: &[(&str, &str)],
    delay: Duration,
) {
    Mock::given(method("GET"))
        .and(path(format!("/{module}/@latest")))
        .respond_with(ResponseTemplate::new(200).set_body_string(info_body(version)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/{module}/@v/{version}.info")))
        .respond_with(ResponseTemplate::new(200).set_body_string(info_body(version)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/{module}/@v/list")))
        .respond_with(ResponseTemplate::new(200).set_body_string(versions.join("\n")))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/{module}/@v/{version}.mod")))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("module {module}\n")))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/{module}/@v/{version}.zip")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(module_zip(module, version, files))
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// Configuration pointing every registry at the mock server, single platform,
/// no network discovery.
pub(crate) fn test_config(server: &MockServer) -> Config {
    Config {
        registry_url: server.uri(),
        platforms: vec!["linux/amd64".to_string()],
        discover_project_sources: false,
        request_timeout_secs: 5,
        ..Config::default()
    }
}
