//! CLI integration tests for Overture.
//!
//! Every test runs against its own `OVERTURE_HOME` and only exercises
//! commands that work without network access.

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::process::Command;
use tempfile::TempDir;

/// The overture binary with an isolated home.
fn overture(home: &TempDir) -> Command {
    let mut cmd = Command::new(cargo_bin!("overture"));
    cmd.env("OVERTURE_HOME", home.path().join("home"))
        .env_remove("OVERTURE_SHELL_LINK")
        .env_remove("OVERTURE_THREADS")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

// ========== Help and Version ==========

#[test]
fn help_lists_commands() {
    let home = TempDir::new().unwrap();
    overture(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("PHP version manager"))
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("mirror"))
        .stdout(predicate::str::contains("doctor"));
}

#[test]
fn version_output() {
    let home = TempDir::new().unwrap();
    overture(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("overture"));
}

// ========== Installed versions ==========

#[test]
fn list_on_empty_home() {
    let home = TempDir::new().unwrap();
    overture(&home)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No PHP versions installed"));
}

#[test]
fn use_unknown_version_fails() {
    let home = TempDir::new().unwrap();
    overture(&home)
        .args(["use", "8.3.4"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("E0402"));
}

#[test]
fn pin_unknown_version_fails() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    overture(&home)
        .args(["pin", "8.2"])
        .arg("--dir")
        .arg(project.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("E0402"));
    assert!(!project.path().join(".php-version").exists());
}

#[test]
fn unpin_without_pin_fails() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    overture(&home)
        .arg("unpin")
        .arg("--dir")
        .arg(project.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no .php-version pin"));
}

#[test]
fn current_without_selection_fails() {
    let home = TempDir::new().unwrap();
    overture(&home).arg("current").assert().failure().code(1);
}

#[test]
fn uninstall_unknown_version_fails() {
    let home = TempDir::new().unwrap();
    overture(&home)
        .args(["uninstall", "9.9.9"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("9.9.9"));
}

// ========== Install argument validation ==========

#[rstest]
#[case::malformed_version(&["install", "eight-point-three"], "E0404")]
#[case::too_many_components(&["install", "8.3.1.2"], "E0404")]
#[case::unknown_option(&["install", "8.3", "-o", "turbo=1"], "E0702")]
#[case::option_without_value(&["install", "8.3", "-o", "keep_source"], "E0702")]
#[case::configure_flag_with_prebuilt(&["install", "8.3", "--prebuilt", "--configure-flag=--with-gd"], "E0702")]
#[case::bad_switch_scope(&["install", "8.3", "-o", "use=everywhere"], "E0702")]
fn install_rejects_invalid_requests(#[case] args: &[&str], #[case] code: &str) {
    let home = TempDir::new().unwrap();
    overture(&home)
        .args(args)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains(code));
}

#[test]
fn install_rejects_zero_threads() {
    let home = TempDir::new().unwrap();
    overture(&home)
        .args(["install", "8.3", "--threads", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("thread_count"));
}

#[test]
fn install_requires_a_version() {
    let home = TempDir::new().unwrap();
    overture(&home).arg("install").assert().failure();
}

// ========== Mirrors ==========

#[test]
fn mirror_list_shows_official_upstreams() {
    let home = TempDir::new().unwrap();
    overture(&home)
        .args(["mirror", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://www.php.net/distributions"))
        .stdout(predicate::str::contains("https://getcomposer.org/download"));
}

#[test]
fn mirror_set_add_remove_round_trip() {
    let home = TempDir::new().unwrap();
    overture(&home)
        .args(["mirror", "set", "php", "https://mirror.example.com/php"])
        .assert()
        .success();
    overture(&home)
        .args(["mirror", "add", "php", "https://backup.example.org/php"])
        .assert()
        .success();
    overture(&home)
        .args(["mirror", "list", "php"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://mirror.example.com/php"))
        .stdout(predicate::str::contains("backup.example.org"));
    overture(&home)
        .args(["mirror", "remove", "php", "https://backup.example.org/php"])
        .assert()
        .success();
    overture(&home)
        .args(["mirror", "list", "php"])
        .assert()
        .success()
        .stdout(predicate::str::contains("backup.example.org").not());
    assert!(home.path().join("home/mirrors.json").is_file());
}

#[test]
fn mirror_set_rejects_bad_url() {
    let home = TempDir::new().unwrap();
    overture(&home)
        .args(["mirror", "set", "php", "ftp://mirror.example.com"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("E0101"));
}

#[test]
fn mirror_remove_unknown_fails() {
    let home = TempDir::new().unwrap();
    overture(&home)
        .args(["mirror", "remove", "pecl", "https://nowhere.example.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E0102"));
}

#[test]
fn mirror_rejects_unknown_class() {
    let home = TempDir::new().unwrap();
    overture(&home)
        .args(["mirror", "set", "ruby", "https://mirror.example.com"])
        .assert()
        .failure();
}

#[test]
fn mirror_toggles_show_in_status() {
    let home = TempDir::new().unwrap();
    overture(&home).args(["mirror", "disable"]).assert().success();
    overture(&home).args(["mirror", "timeout", "12"]).assert().success();
    overture(&home)
        .args(["mirror", "auto-fallback", "off"])
        .assert()
        .success();
    overture(&home)
        .args(["mirror", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("12s"))
        .stdout(predicate::str::contains("Speed-test cache"));
}

#[test]
fn mirror_timeout_zero_fails() {
    let home = TempDir::new().unwrap();
    overture(&home)
        .args(["mirror", "timeout", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E0702"));
}

#[test]
fn mirror_clear_cache_without_cache_succeeds() {
    let home = TempDir::new().unwrap();
    overture(&home)
        .args(["mirror", "clear-cache"])
        .assert()
        .success();
}

// ========== Cache ==========

#[test]
fn cache_stats_on_empty_cache() {
    let home = TempDir::new().unwrap();
    overture(&home)
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("total"));
}

#[test]
fn cache_clear_reports_nothing_removed() {
    let home = TempDir::new().unwrap();
    overture(&home)
        .args(["cache", "clear", "versions"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 0 artifacts"));
}

// ========== Tools ==========

#[test]
fn composer_install_needs_a_php() {
    let home = TempDir::new().unwrap();
    overture(&home)
        .args(["composer", "install"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no PHP version selected"));
}

#[test]
fn ext_install_against_missing_php_fails() {
    let home = TempDir::new().unwrap();
    overture(&home)
        .args(["ext", "install", "redis", "--php", "8.1.2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E0402"));
}
