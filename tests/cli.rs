mod common;

use std::fs;

use assert_cmd::Command;
use common::{start_stack, stop_stack};
use predicates::str::contains;
use tempfile::TempDir;

fn client(addr: &str, args: &[&str]) -> Command {
    let mut cmd = Command::cargo_bin("jhelp-client").unwrap();
    cmd.args(args).args(["--addr", addr]);
    cmd
}

#[test]
fn client_adds_finds_edits_and_removes() {
    let (db, relay) = start_stack();
    let addr = relay.addr.to_string();

    client(&addr, &["add", "foo", "bar"])
        .assert()
        .success()
        .stdout(contains("foo [1]"))
        .stdout(contains("1. bar"));
    client(&addr, &["add", "foo", "baz"])
        .assert()
        .success()
        .stdout(contains("2. baz"));
    client(&addr, &["edit", "foo", "2", "--definition", "qux"])
        .assert()
        .success()
        .stdout(contains("2. qux"));
    client(&addr, &["delete", "foo", "1"])
        .assert()
        .success()
        .stdout(contains("1. qux"));
    client(&addr, &["rm", "foo", "1"])
        .assert()
        .success()
        .stdout(contains("Unknown term"));
    client(&addr, &["find", "foo"])
        .assert()
        .success()
        .stdout(contains("Definitions not found"));

    stop_stack(db, relay);
}

#[test]
fn client_reads_address_from_config() {
    let (db, relay) = start_stack();
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("client.json");
    fs::write(
        &config,
        format!(
            r#"{{"host": "127.0.0.1", "port": {}, "dbName": "ignored"}}"#,
            relay.addr.port()
        ),
    )
    .unwrap();

    Command::cargo_bin("jhelp-client")
        .unwrap()
        .args(["find", "nothing", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(contains("Unknown term"));

    stop_stack(db, relay);
}

#[test]
fn client_reports_connection_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    client(&addr, &["find", "foo"])
        .assert()
        .failure()
        .stderr(contains("ConnectionError"));
}

#[test]
fn db_rejects_missing_config() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("jhelp-db")
        .unwrap()
        .arg("--config")
        .arg(dir.path().join("missing.json"))
        .assert()
        .failure()
        .stderr(contains("config error"));
}

#[test]
fn server_fails_without_persistence_tier() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let db_port = listener.local_addr().unwrap().port().to_string();
    drop(listener);

    Command::cargo_bin("jhelp-server")
        .unwrap()
        .args(["--port", "0", "--db-port", &db_port])
        .assert()
        .failure()
        .stderr(contains("cannot connect"));
}
