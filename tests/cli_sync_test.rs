//! Integration tests for `cmirror sync` against a local stub server.

mod common;

use common::{StubServer, TestEnv};
use predicates::prelude::*;

const ISSUES_PULL: &str = r#"{"queryTimestamp":1700000000000}
{"key":"AX-1","closed":false,"ruleKey":"java:S1481","mainLocation":{"filePath":"sq/src/Main.java","message":"Remove this unused variable","textRange":{"startLine":3,"startLineOffset":8,"endLine":3,"endLineOffset":12}},"creationDate":1690000000000,"resolved":false,"severity":"MINOR","type":"CODE_SMELL"}
"#;

const EMPTY_PULL: &str = "{\"queryTimestamp\":1700000000000}\n";

fn modern_server() -> StubServer {
    StubServer::start(&[
        ("/api/system/status", 200, r#"{"id":"x","version":"10.4.0.87286","status":"UP"}"#),
        ("/api/features/list", 200, "[]"),
        ("/api/settings/values.protobuf", 200, r#"{"settings":[]}"#),
        (
            "/api/plugins/installed",
            200,
            r#"{"plugins":[{"key":"java","hash":"abc","filename":"sonar-java-plugin-7.30.0.jar","sonarLintSupported":true}]}"#,
        ),
        ("/api/plugins/download", 200, "jar-bytes"),
        ("/api/qualityprofiles/search", 200, r#"{"profiles":[]}"#),
        (
            "/api/project_branches/list",
            200,
            r#"{"branches":[{"name":"master","isMain":true},{"name":"feature","isMain":false}]}"#,
        ),
        ("/api/issues/pull?", 200, ISSUES_PULL),
        ("/api/issues/pull_taint", 200, EMPTY_PULL),
        ("/api/hotspots/pull", 200, EMPTY_PULL),
    ])
}

fn sync_args() -> [&'static str; 9] {
    [
        "sync",
        "--connection",
        "local",
        "--project",
        "proj",
        "--branch",
        "master",
        "-l",
        "java",
    ]
}

#[test]
fn test_sync_mirrors_plugins_and_findings() {
    let server = modern_server();
    let env = TestEnv::new().with_connection("local", &server.url);

    env.cmirror()
        .args(sync_args())
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""skipped":false"#))
        .stdout(predicate::str::contains(r#""server_version":"10.4.0.87286""#))
        .stdout(predicate::str::contains(r#""any_plugin_updated":true"#))
        .stdout(predicate::str::contains(r#""main_branch":"master""#))
        .stdout(predicate::str::contains(r#""protocol":"pull""#));

    assert_eq!(server.request_count("/api/plugins/download"), 1);
    assert_eq!(server.request_count("/api/issues/pull?"), 1);
    assert_eq!(server.request_count("/batch/issues"), 0);
}

#[test]
fn test_second_sync_is_incremental_and_keeps_plugins() {
    let server = modern_server();
    let env = TestEnv::new().with_connection("local", &server.url);

    env.cmirror().args(sync_args()).assert().success();
    env.cmirror()
        .args(sync_args())
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""any_plugin_updated":false"#))
        .stdout(predicate::str::contains(r#""full":false"#));

    assert_eq!(server.request_count("/api/plugins/download"), 1);
    assert!(
        server
            .requests()
            .iter()
            .any(|r| r.starts_with("/api/issues/pull?") && r.contains("changedSince=1700000000000"))
    );
}

#[test]
fn test_status_and_findings_after_sync() {
    let server = modern_server();
    let env = TestEnv::new().with_connection("local", &server.url);
    env.cmirror().args(sync_args()).assert().success();

    env.cmirror()
        .args(["status", "--connection", "local"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""mirrored":true"#))
        .stdout(predicate::str::contains(r#""project_key":"proj""#))
        .stdout(predicate::str::contains("java"));

    env.cmirror()
        .args([
            "findings",
            "--connection",
            "local",
            "--project",
            "proj",
            "--branch",
            "master",
            "--server-prefix",
            "sq",
            "--ide-prefix",
            "ide",
            "--ide-path",
            "ide/src/Main.java",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""server_path":"sq/src/Main.java""#))
        .stdout(predicate::str::contains("AX-1"))
        .stdout(predicate::str::contains("Remove this unused variable"));
}

#[test]
fn test_refresh_file_is_skipped_on_pull_servers() {
    let server = modern_server();
    let env = TestEnv::new().with_connection("local", &server.url);

    env.cmirror()
        .args([
            "refresh-file",
            "--connection",
            "local",
            "--project",
            "proj",
            "--branch",
            "master",
            "--ide-path",
            "src/Main.java",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("pull_active"));

    assert_eq!(server.request_count("/batch/issues"), 0);
}

#[test]
fn test_server_not_up_fails_the_sync() {
    let server = StubServer::start(&[(
        "/api/system/status",
        200,
        r#"{"id":"x","version":"10.4","status":"STARTING"}"#,
    )]);
    let env = TestEnv::new().with_connection("local", &server.url);

    env.cmirror()
        .args(sync_args())
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
    assert_eq!(server.request_count("/api/plugins/installed"), 0);
}

#[test]
fn test_unreachable_server_fails_the_sync() {
    let env = TestEnv::new().with_connection("local", "http://127.0.0.1:1");

    env.cmirror()
        .args(["-H"])
        .args(sync_args())
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Error:"));
}
