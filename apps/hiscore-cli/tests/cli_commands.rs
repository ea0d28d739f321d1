use httpmock::prelude::*;
use predicates::prelude::*;
use serde_json::json;
use tempfile::tempdir;

const DEV_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

fn bin(dir: &std::path::Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("hiscore-cli").expect("binary");
    cmd.current_dir(dir)
        .env_remove("HISCORE_CONFIG")
        .env_remove("HISCORE_CONNECTION_STRING")
        .env_remove("HISCORE_ACCOUNT_NAME")
        .env_remove("HISCORE_ACCOUNT_KEY")
        .env_remove("HISCORE_ENVIRONMENT")
        .env_remove("HISCORE_LOG_ROLL")
        .env("RUST_LOG", "warn");
    cmd
}

fn connection_string(server: &MockServer) -> String {
    format!(
        "AccountName=devstoreaccount1;AccountKey={DEV_KEY};TableEndpoint={}",
        server.base_url()
    )
}

#[test]
fn config_schema_lists_sections() {
    let tmp = tempdir().expect("tmpdir");
    bin(tmp.path())
        .args(["config", "schema"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"storage\""))
        .stdout(predicate::str::contains("\"leaderboard\""));
}

#[test]
fn config_show_defaults_to_development_storage() {
    let tmp = tempdir().expect("tmpdir");
    bin(tmp.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("devstoreaccount1"))
        .stdout(predicate::str::contains("http://127.0.0.1:10002"))
        .stdout(predicate::str::contains(DEV_KEY).not());
}

#[test]
fn invalid_config_file_is_reported() {
    let tmp = tempdir().expect("tmpdir");
    let path = tmp.path().join("bad.toml");
    std::fs::write(&path, "[storage]\nunknown = 1\n").expect("write config");
    bin(tmp.path())
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("load configuration"));
}

#[test]
fn tables_init_treats_conflict_as_success() {
    let server = MockServer::start();
    let conflict = server.mock(|when, then| {
        when.method(POST).path("/Tables");
        then.status(409).body("TableAlreadyExists");
    });
    let tmp = tempdir().expect("tmpdir");
    bin(tmp.path())
        .env("HISCORE_CONNECTION_STRING", connection_string(&server))
        .args(["tables", "init", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already_exists"));
    conflict.assert_hits(2);
}

#[test]
fn top_prints_ranked_scores() {
    let server = MockServer::start();
    let query = server.mock(|when, then| {
        when.method(GET)
            .path("/highscores()")
            .query_param("$filter", "PartitionKey eq 'Scores'")
            .query_param("$top", "2");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "value": [
                    {"PartitionKey": "Scores", "RowKey": "a", "PlayerName": "LOW", "Score": 5},
                    {"PartitionKey": "Scores", "RowKey": "b", "PlayerName": "HIGH", "Score": 50}
                ]
            }));
    });
    let tmp = tempdir().expect("tmpdir");
    bin(tmp.path())
        .env("HISCORE_CONNECTION_STRING", connection_string(&server))
        .args(["top", "--limit", "2"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"(?s)1\. HIGH.*2\. LOW").unwrap());
    query.assert();
}

#[test]
fn diag_reports_rejected_signature() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/highscores()");
        then.status(403).body("AuthenticationFailed");
    });
    let tmp = tempdir().expect("tmpdir");
    bin(tmp.path())
        .env("HISCORE_CONNECTION_STRING", connection_string(&server))
        .args(["diag", "--timeout-ms", "3000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("signature rejected (403)"));
}

#[test]
fn submit_creates_configured_tables_first() {
    let server = MockServer::start();
    let tables = server.mock(|when, then| {
        when.method(POST).path("/Tables");
        then.status(409).body("TableAlreadyExists");
    });
    let insert = server.mock(|when, then| {
        when.method(POST)
            .path("/highscores")
            .body_contains("\"PlayerName\":\"ZED\"");
        then.status(204);
    });
    let tmp = tempdir().expect("tmpdir");
    bin(tmp.path())
        .env("HISCORE_CONNECTION_STRING", connection_string(&server))
        .args(["submit", "--player", "ZED", "--score", "42"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Submitted ZED (42)"));
    tables.assert_hits(2);
    insert.assert();
}

#[test]
fn submit_rejects_scores_wider_than_the_row_key() {
    let tmp = tempdir().expect("tmpdir");
    let path = tmp.path().join("hiscore.toml");
    std::fs::write(&path, "[storage]\nbootstrap = false\n").expect("write config");
    bin(tmp.path())
        .arg("--config")
        .arg(&path)
        .args(["submit", "--player", "ZED", "--score", "10000000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must not exceed"));
}
