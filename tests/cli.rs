use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

const SCENARIO: &str = "CREATE 1 value_A
READ 1
UPDATE 1 value_B
READ 1
DELETE 1
READ 1
";

const SCENARIO_OUTPUT: &str = "SUCCESS: CREATE for 1
READ: 1 => value_A
SUCCESS: UPDATE for 1
READ: 1 => value_B
SUCCESS: DELETE 1
ERROR: Key 1 not found
";

// `kvs-shell` with no args should read from stdin and exit cleanly on EOF
#[test]
fn shell_empty_input() {
    let temp_dir = TempDir::new().expect("unable to create temporary working directory");
    Command::cargo_bin("kvs-shell")
        .unwrap()
        .current_dir(&temp_dir)
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn shell_scenario_over_mailbox() {
    let temp_dir = TempDir::new().unwrap();
    Command::cargo_bin("kvs-shell")
        .unwrap()
        .args(&["--db", "db.txt", "--transport", "mailbox"])
        .current_dir(&temp_dir)
        .write_stdin(SCENARIO)
        .assert()
        .success()
        .stdout(SCENARIO_OUTPUT);
}

#[test]
fn shell_scenario_over_dispatcher() {
    let temp_dir = TempDir::new().unwrap();
    for pool in ["naive", "shared", "rayon"].iter() {
        Command::cargo_bin("kvs-shell")
            .unwrap()
            .args(&["--db", "db.txt", "--transport", "dispatch", "--pool", *pool])
            .current_dir(&temp_dir)
            .write_stdin(SCENARIO)
            .assert()
            .success()
            .stdout(SCENARIO_OUTPUT);
    }
}

#[test]
fn shell_persists_between_runs() {
    let temp_dir = TempDir::new().unwrap();
    Command::cargo_bin("kvs-shell")
        .unwrap()
        .current_dir(&temp_dir)
        .write_stdin("CREATE key1 value1\nCREATE key2 value2\nDELETE key2\n")
        .assert()
        .success();

    let snapshot = fs::read_to_string(temp_dir.path().join("database.txt")).unwrap();
    assert_eq!(snapshot, "key1\nvalue1\n");

    Command::cargo_bin("kvs-shell")
        .unwrap()
        .current_dir(&temp_dir)
        .write_stdin("READ key1\nREAD key2\n")
        .assert()
        .success()
        .stdout("READ: key1 => value1\nERROR: Key key2 not found\n");
}

#[test]
fn shell_reports_errors_and_continues() {
    let temp_dir = TempDir::new().unwrap();
    let long = format!("CREATE k {}\n", "x".repeat(600));
    Command::cargo_bin("kvs-shell")
        .unwrap()
        .current_dir(&temp_dir)
        .write_stdin(format!("GET 1\n{}READ k\n", long))
        .assert()
        .success()
        .stdout(
            contains("ERROR: Unknown command")
                .and(contains("ERROR: message of 609 bytes exceeds the 512 byte limit"))
                .and(contains("ERROR: Key k not found")),
        );
}

#[test]
fn shell_reads_config_file() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("kvs.json"),
        r#"{ "snapshot_path": "from-config.txt", "read_tickets": 2 }"#,
    )
    .unwrap();

    Command::cargo_bin("kvs-shell")
        .unwrap()
        .args(&["--config", "kvs.json"])
        .current_dir(&temp_dir)
        .write_stdin("CREATE a b\n")
        .assert()
        .success();
    assert!(temp_dir.path().join("from-config.txt").exists());
}

#[test]
fn shell_rejects_invalid_options() {
    let temp_dir = TempDir::new().unwrap();
    Command::cargo_bin("kvs-shell")
        .unwrap()
        .args(&["--read-tickets", "0"])
        .current_dir(&temp_dir)
        .write_stdin("")
        .assert()
        .failure();

    Command::cargo_bin("kvs-shell")
        .unwrap()
        .args(&["--transport", "pipe"])
        .current_dir(&temp_dir)
        .assert()
        .failure();
}

#[test]
fn bench_runs_all_clients() {
    let temp_dir = TempDir::new().unwrap();
    for transport in ["mailbox", "dispatch"].iter() {
        Command::cargo_bin("kvs-bench")
            .unwrap()
            .args(&["--clients", "8", "--ops", "5", "--seed", "7", "--transport", *transport])
            .current_dir(&temp_dir)
            .assert()
            .success()
            .stdout(
                contains("Client 8 completed all operations")
                    .and(contains("8 clients completed 40 operations"))
                    .and(contains("answered another client's request").not()),
            );
    }
}

#[test]
fn cli_version() {
    Command::cargo_bin("kvs-shell")
        .unwrap()
        .args(&["-V"])
        .assert()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}
