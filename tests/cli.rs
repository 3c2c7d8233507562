//! Integration tests for the `patchwork` binary.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// Helper to create a patchwork Command isolated from the caller's
/// environment and working directory.
fn patchwork(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("patchwork");
    cmd.current_dir(dir.path())
        .env_remove("PATCHWORK_DB_PATH")
        .env_remove("PATCHWORK_BASE_URL")
        .env_remove("PATCHWORK_HOST")
        .env_remove("PATCHWORK_PORT")
        .env_remove("PATCHWORK_LOG_FORMAT")
        .env("RUST_LOG", "warn");
    cmd
}

fn init(dir: &TempDir) {
    patchwork(dir).arg("init").assert().success();
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        let dir = TempDir::new().unwrap();
        patchwork(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("serve"))
            .stdout(predicate::str::contains("maintainer"));
    }

    #[test]
    fn test_version() {
        let dir = TempDir::new().unwrap();
        patchwork(&dir)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("patchwork"));
    }

    #[test]
    fn test_init_creates_database() {
        let dir = TempDir::new().unwrap();
        patchwork(&dir)
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Database initialized"));
        assert!(dir.path().join("patchwork.db").exists());
    }

    #[test]
    fn test_init_idempotent() {
        let dir = TempDir::new().unwrap();
        init(&dir);
        init(&dir);
        patchwork(&dir)
            .args(["state", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("under-review"))
            .stdout(predicate::str::contains("Changes Requested"));
    }

    #[test]
    fn test_db_path_flag() {
        let dir = TempDir::new().unwrap();
        patchwork(&dir)
            .args(["--db-path", "data/pw.db", "init", "--no-default-states"])
            .assert()
            .success();
        assert!(dir.path().join("data/pw.db").exists());
        patchwork(&dir)
            .args(["--db-path", "data/pw.db", "state", "list"])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
    }
}

// =============================================================================
// Configuration
// =============================================================================

mod configuration {
    use super::*;

    #[test]
    fn test_config_file_database_path() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("patchwork.toml"),
            "[database]\npath = \"from-config.db\"\n",
        )
        .unwrap();
        init(&dir);
        assert!(dir.path().join("from-config.db").exists());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("custom.toml"),
            "[site]\nbase_url = \"not-a-url\"\n",
        )
        .unwrap();
        patchwork(&dir)
            .args(["--config", "custom.toml", "init"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("base_url"));
    }

    #[test]
    fn test_missing_explicit_config() {
        let dir = TempDir::new().unwrap();
        patchwork(&dir)
            .args(["--config", "absent.toml", "init"])
            .assert()
            .failure();
    }
}

// =============================================================================
// Administration
// =============================================================================

mod admin {
    use super::*;

    #[test]
    fn test_user_add_prints_token() {
        let dir = TempDir::new().unwrap();
        init(&dir);
        patchwork(&dir)
            .args(["user", "add", "alice", "alice@example.com", "--superuser"])
            .assert()
            .success()
            .stdout(predicate::str::is_match("^[0-9a-f]{32}\n$").unwrap());
    }

    #[test]
    fn test_user_token_rotates() {
        let dir = TempDir::new().unwrap();
        init(&dir);
        let first = patchwork(&dir)
            .args(["user", "add", "bob", "bob@example.com"])
            .output()
            .unwrap();
        let second = patchwork(&dir)
            .args(["user", "token", "bob"])
            .output()
            .unwrap();
        assert!(second.status.success());
        assert_ne!(first.stdout, second.stdout);
    }

    #[test]
    fn test_user_token_unknown_user() {
        let dir = TempDir::new().unwrap();
        init(&dir);
        patchwork(&dir)
            .args(["user", "token", "ghost"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("ghost"));
    }

    #[test]
    fn test_project_and_maintainer() {
        let dir = TempDir::new().unwrap();
        init(&dir);
        patchwork(&dir)
            .args([
                "project",
                "add",
                "linux",
                "Linux Kernel",
                "--listemail",
                "lkml@example.com",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("linux"));
        patchwork(&dir)
            .args(["user", "add", "carol", "carol@example.com"])
            .assert()
            .success();
        patchwork(&dir)
            .args(["maintainer", "add", "carol", "linux"])
            .assert()
            .success()
            .stdout(predicate::str::contains("carol now maintains 'linux'"));
        patchwork(&dir)
            .args(["maintainer", "add", "carol", "nope"])
            .assert()
            .failure();
    }

    #[test]
    fn test_state_and_person_add() {
        let dir = TempDir::new().unwrap();
        init(&dir);
        patchwork(&dir)
            .args(["state", "add", "Needs Testing", "--ordering", "42", "--action-required"])
            .assert()
            .success()
            .stdout(predicate::str::contains("needs-testing"));
        patchwork(&dir)
            .args(["person", "add", "dave@example.com", "--name", "Dave"])
            .assert()
            .success()
            .stdout(predicate::str::contains("dave@example.com"));
    }
}
