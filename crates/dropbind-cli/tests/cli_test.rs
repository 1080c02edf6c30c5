//! Integration tests for the dropbind binary

use assert_cmd::Command;
use dropbind_testing::fixtures::{numbered_lines, patterned_bytes};
use dropbind_testing::TestStore;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// A store plus a scratch directory holding a config file
struct Env {
    store: TestStore,
    scratch: TempDir,
}

impl Env {
    fn new() -> Self {
        let scratch = TempDir::new().unwrap();
        fs::write(
            scratch.path().join("config.toml"),
            "[upload]\nbuffer_size = \"4KiB\"\n",
        )
        .unwrap();
        Self {
            store: TestStore::new().unwrap(),
            scratch,
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("dropbind").unwrap();
        cmd.env_remove("DROPBIND_CONNECTION")
            .arg("--connection")
            .arg(self.store.connection())
            .arg("--config")
            .arg(self.scratch.path().join("config.toml"));
        cmd
    }
}

#[test]
fn test_put_then_get() {
    let env = Env::new();
    let local = env.scratch.path().join("data.bin");
    let data = patterned_bytes(20_000);
    fs::write(&local, &data).unwrap();

    env.cmd()
        .arg("put")
        .arg(&local)
        .arg("/uploads/data.bin")
        .assert()
        .success()
        .code(0);
    assert_eq!(env.store.read("/uploads/data.bin").unwrap(), data);

    let output = env.scratch.path().join("copy.bin");
    env.cmd()
        .arg("get")
        .arg("/uploads/data.bin")
        .arg("-o")
        .arg(&output)
        .assert()
        .success();
    assert_eq!(fs::read(&output).unwrap(), data);
}

#[test]
fn test_put_unbuffered() {
    let env = Env::new();
    let local = env.scratch.path().join("lines.txt");
    fs::write(&local, numbered_lines(100)).unwrap();

    env.cmd()
        .arg("put")
        .arg(&local)
        .arg("/lines.txt")
        .arg("--unbuffered")
        .assert()
        .success();
    assert_eq!(
        env.store.read("/lines.txt").unwrap(),
        numbered_lines(100).into_bytes()
    );
}

#[test]
fn test_put_empty_file() {
    let env = Env::new();
    let local = env.scratch.path().join("empty");
    fs::write(&local, b"").unwrap();

    env.cmd().arg("put").arg(&local).arg("/empty").assert().success();
    assert!(env.store.read("/empty").unwrap().is_empty());
}

#[test]
fn test_get_missing_exits_2() {
    let env = Env::new();

    env.cmd()
        .arg("get")
        .arg("/does/not/exist.txt")
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_write_then_read_with_params() {
    let env = Env::new();

    env.cmd()
        .args(["-P", "name=greeting", "write", "/notes/{name}.txt", "hello there"])
        .assert()
        .success();
    assert_eq!(env.store.read("/notes/greeting.txt").unwrap(), b"hello there");

    env.cmd()
        .args(["read", "/notes/greeting.txt"])
        .assert()
        .success()
        .stdout(predicate::eq("hello there"));
}

#[test]
fn test_read_missing_exits_2() {
    let env = Env::new();

    env.cmd()
        .args(["read", "/missing.txt"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_unknown_template_param_fails() {
    let env = Env::new();

    env.cmd()
        .args(["write", "/notes/{name}.txt", "text"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn test_copy_between_remote_files() {
    let env = Env::new();

    env.cmd()
        .args(["write", "/src.txt", "copy me"])
        .assert()
        .success();
    env.cmd()
        .args(["copy", "/src.txt", "/dest/copied.txt"])
        .assert()
        .success();
    assert_eq!(env.store.read("/dest/copied.txt").unwrap(), b"copy me");

    env.cmd()
        .args(["copy", "/nope.txt", "/dest/never.txt"])
        .assert()
        .failure()
        .code(2);
    assert!(env.store.read("/dest/never.txt").is_err());
}

#[test]
fn test_invalid_remote_path_fails() {
    let env = Env::new();

    env.cmd()
        .args(["write", "relative.txt", "text"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn test_config_show_and_path() {
    let env = Env::new();

    env.cmd()
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("buffer_size = 4096"))
        .stdout(predicate::str::contains("conflict_policy = \"overwrite\""));

    env.cmd()
        .args(["config", "--path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_requires_a_flag() {
    let env = Env::new();

    env.cmd()
        .arg("config")
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_missing_connection_fails() {
    let scratch = TempDir::new().unwrap();
    let config = scratch.path().join("config.toml");
    fs::write(&config, "").unwrap();

    Command::cargo_bin("dropbind")
        .unwrap()
        .env_remove("DROPBIND_CONNECTION")
        .arg("--config")
        .arg(&config)
        .args(["read", "/x.txt"])
        .assert()
        .failure()
        .code(1);
}
