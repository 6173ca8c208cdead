//! Full add → check → restarted → remove flow against a mock GitHub API

use super::common::TestContext;
use base64::Engine;
use flate2::write::GzEncoder;
use flate2::Compression;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SHA: &str = "1111111111111111111111111111111111111111";

fn tarball() -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let files = [
        ("owner-repo-1111111/README.md", "# demo\n"),
        (
            "owner-repo-1111111/custom_components/demo/manifest.json",
            r#"{"domain": "demo", "name": "Demo"}"#,
        ),
        ("owner-repo-1111111/custom_components/demo/__init__.py", "DOMAIN = \"demo\"\n"),
    ];
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, content.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn commit_json() -> serde_json::Value {
    json!({
        "sha": SHA,
        "html_url": format!("https://github.com/owner/repo/commit/{}", SHA),
        "commit": {
            "message": "Add demo integration\n\nLonger description",
            "author": {"name": "Dev", "date": "2024-05-01T10:00:00Z"},
            "committer": {"name": "Dev", "date": "2024-05-01T10:00:00Z"}
        }
    })
}

async fn mock_github() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/owner/repo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "full_name": "owner/repo",
            "default_branch": "main",
            "fork": false
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/owner/repo/branches/main"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"name": "main", "commit": commit_json()})),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/owner/repo/contents/custom_components"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"name": "demo", "type": "dir"}])),
        )
        .mount(&server)
        .await;

    let manifest = base64::engine::general_purpose::STANDARD
        .encode(r#"{"domain": "demo", "name": "Demo"}"#);
    Mock::given(method("GET"))
        .and(path("/repos/owner/repo/contents/custom_components/demo/manifest.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": manifest,
            "encoding": "base64"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/repos/owner/repo/tarball/{}", SHA)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tarball()))
        .mount(&server)
        .await;

    server
}

#[tokio::test(flavor = "multi_thread")]
async fn test_track_branch_end_to_end() {
    let server = mock_github().await;
    let ctx = TestContext::new();
    ctx.write_config(&server.uri());
    let installed = ctx.install_dir().join("demo");

    ctx.tester()
        .args(["add", "https://github.com/owner/repo/tree/main", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Installed demo from owner/repo@main at 1111111"));

    assert!(installed.join("manifest.json").is_file());
    assert!(installed.join("__init__.py").is_file());
    assert!(installed.join(".integration_tester").is_file());
    assert!(!ctx.install_dir().join(".demo.staging").exists());

    ctx.tester()
        .args(["list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"integration_domain\": \"demo\""))
        .stdout(predicate::str::contains("\"pending_restart\": true"));

    ctx.tester()
        .arg("problems")
        .assert()
        .success()
        .stdout(predicate::str::contains("restart_required"));

    ctx.tester()
        .args(["check", "demo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ demo: up to date at 1111111"));

    ctx.tester()
        .arg("restarted")
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ demo"));

    // Adding the same domain again is refused
    ctx.tester()
        .args(["add", "https://github.com/owner/repo", "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already tracked"));

    ctx.tester()
        .args(["remove", "--owner-repo", "owner/repo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Stopped tracking demo"));
    assert!(!installed.exists());

    ctx.tester()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No integrations are tracked"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_add_refuses_unmanaged_directory() {
    let server = mock_github().await;
    let ctx = TestContext::new();
    ctx.write_config(&server.uri());
    let existing = ctx.install_dir().join("demo");
    std::fs::create_dir_all(&existing).unwrap();
    std::fs::write(existing.join("mine.py"), "# hand-made\n").unwrap();

    ctx.tester()
        .args(["add", "https://github.com/owner/repo", "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--overwrite"));
    assert!(existing.join("mine.py").is_file());

    ctx.tester()
        .args(["add", "https://github.com/owner/repo", "--yes", "--overwrite"])
        .assert()
        .success();
    assert!(!existing.join("mine.py").exists());
    assert!(existing.join("manifest.json").is_file());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_add_missing_branch() {
    let server = mock_github().await;
    let ctx = TestContext::new();
    ctx.write_config(&server.uri());

    ctx.tester()
        .args(["add", "https://github.com/owner/repo/tree/nope", "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
    assert!(!ctx.install_dir().exists());
}
