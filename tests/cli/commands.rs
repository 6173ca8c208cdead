use super::common::TestContext;
use predicates::prelude::*;

#[test]
fn test_help_lists_commands() {
    let ctx = TestContext::new();
    ctx.tester()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("add"))
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("restarted"));
}

#[test]
fn test_add_rejects_unsupported_url() {
    let ctx = TestContext::new();
    ctx.write_config("http://127.0.0.1:9");
    ctx.tester()
        .args(["add", "https://gitlab.com/owner/repo", "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid GitHub URL"))
        .stderr(predicate::str::contains("help:"));
}

#[test]
fn test_list_empty() {
    let ctx = TestContext::new();
    ctx.write_config("http://127.0.0.1:9");
    ctx.tester()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No integrations are tracked"));
}

#[test]
fn test_list_json_empty() {
    let ctx = TestContext::new();
    ctx.write_config("http://127.0.0.1:9");
    ctx.tester()
        .args(["list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[]"));
}

#[test]
fn test_problems_empty() {
    let ctx = TestContext::new();
    ctx.write_config("http://127.0.0.1:9");
    ctx.tester()
        .arg("problems")
        .assert()
        .success()
        .stdout(predicate::str::contains("No open problems"));
}

#[test]
fn test_remove_requires_a_selector() {
    let ctx = TestContext::new();
    ctx.tester().arg("remove").assert().failure();
    ctx.tester()
        .args(["remove", "--domain", "demo", "--owner-repo", "owner/repo"])
        .assert()
        .failure();
}

#[test]
fn test_remove_unknown_domain() {
    let ctx = TestContext::new();
    ctx.write_config("http://127.0.0.1:9");
    ctx.tester()
        .args(["remove", "--domain", "demo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("'demo' is not tracked"));
}

#[test]
fn test_restarted_with_nothing_pending() {
    let ctx = TestContext::new();
    ctx.write_config("http://127.0.0.1:9");
    ctx.tester()
        .arg("restarted")
        .assert()
        .success()
        .stdout(predicate::str::contains("No restart was pending"));
}

#[test]
fn test_invalid_config_is_reported() {
    let ctx = TestContext::new();
    ctx.write_config("http://127.0.0.1:9");
    let config = ctx.temp.path().join("config/integration-tester/config.yaml");
    if config.exists() {
        std::fs::write(&config, "poll_interval_secs: 0\n").unwrap();
        ctx.tester()
            .arg("list")
            .assert()
            .failure()
            .stderr(predicate::str::contains("poll_interval_secs"));
    }
}
