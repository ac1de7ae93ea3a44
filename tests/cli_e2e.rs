//! End-to-end CLI tests for the songcache binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A command isolated from the user's real config and data directories.
fn songcache(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("songcache").unwrap();
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("XDG_DATA_HOME", home.path().join("data"))
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_binary_help_displays_usage() {
    let home = TempDir::new().unwrap();
    songcache(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Fetch song files into a local cache"));
}

#[test]
fn test_binary_version_displays_version() {
    let home = TempDir::new().unwrap();
    songcache(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("songcache"));
}

#[test]
fn test_binary_invalid_flag_returns_error() {
    let home = TempDir::new().unwrap();
    songcache(&home)
        .arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_binary_empty_input_succeeds() {
    let home = TempDir::new().unwrap();
    songcache(&home).write_stdin("").assert().success();
}

#[test]
fn test_binary_quiet_flag_accepted() {
    let home = TempDir::new().unwrap();
    songcache(&home).arg("-q").write_stdin("").assert().success();
}

#[test]
fn test_binary_unresolvable_links_still_exit_zero() {
    let home = TempDir::new().unwrap();
    let out = home.path().join("music");
    songcache(&home)
        .arg("--output-dir")
        .arg(&out)
        .write_stdin("not a url, also-not-a-url\n")
        .assert()
        .success();
    assert!(!home.path().join("downloadedFiles.txt").exists());
}

#[test]
fn test_binary_rejects_invalid_config() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("bad.toml");
    std::fs::write(&config, "use_default_songs = true\n").unwrap();

    songcache(&home)
        .arg("--config")
        .arg(&config)
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown configuration key"));
}

#[test]
fn test_binary_rejects_missing_explicit_config() {
    let home = TempDir::new().unwrap();
    songcache(&home)
        .arg("--config")
        .arg(home.path().join("absent.toml"))
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn test_binary_lists_tracks_as_json() {
    let home = TempDir::new().unwrap();
    let music = home.path().join("Boombox Music");
    std::fs::create_dir_all(&music).unwrap();
    std::fs::write(music.join("b.ogg"), b"x").unwrap();
    std::fs::write(music.join("a.mp3"), b"x").unwrap();
    std::fs::write(music.join("readme.txt"), b"x").unwrap();

    let output = songcache(&home)
        .arg("--output-dir")
        .arg(&music)
        .args(["--list", "--json", "-q"])
        .write_stdin("")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let stdout = String::from_utf8(output).unwrap();
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["name"], "a.mp3");
    assert_eq!(lines[0]["kind"], "mpeg");
    assert_eq!(lines[1]["name"], "b.ogg");
}

#[test]
fn test_binary_reads_links_from_config() {
    let home = TempDir::new().unwrap();
    let config_dir = home.path().join("config").join("songcache");
    std::fs::create_dir_all(&config_dir).unwrap();
    let music = home.path().join("tracks");
    std::fs::write(
        config_dir.join("config.toml"),
        format!(
            "download_urls = \"::one::, ::two::\"\noutput_dir = \"{}\"\nverbosity = \"quiet\"\n",
            music.display()
        ),
    )
    .unwrap();

    songcache(&home).assert().success();
    // Unresolvable links never create the ledger.
    assert!(!home.path().join("downloadedFiles.txt").exists());
}
