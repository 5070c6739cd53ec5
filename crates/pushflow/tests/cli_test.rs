#![allow(deprecated)] // cargo_bin は assert_cmd 2.1 で非推奨

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};

fn pushflow() -> Command {
    let mut cmd = Command::cargo_bin("pushflow").unwrap();
    cmd.env_remove("PUSHFLOW_PROJECT").env_remove("RUST_LOG");
    cmd
}

fn demo_project() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/homelab/pushflow.kdl")
}

/// 一時ディレクトリにプロジェクトファイルを書く
fn write_project(content: &str) -> tempfile::TempDir {
    let temp_dir = tempfile::tempdir().unwrap();
    std::fs::write(temp_dir.path().join("pushflow.kdl"), content).unwrap();
    temp_dir
}

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    pushflow()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("変わった分だけ届ける"))
        .stdout(predicate::str::contains("render"))
        .stdout(predicate::str::contains("diff"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("certs"));
}

/// バージョン表示はプロジェクトファイルなしで動く
#[test]
fn test_cli_version() {
    pushflow()
        .current_dir(std::env::temp_dir())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pushflow"));
}

/// deployコマンドのヘルプにフラグが表示される
#[test]
fn test_deploy_help() {
    pushflow()
        .args(["deploy", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[INSTANCE]"))
        .stdout(predicate::str::contains("--all"))
        .stdout(predicate::str::contains("--no-restart"))
        .stdout(predicate::str::contains("--force"))
        .stdout(predicate::str::contains("再起動を保留"));
}

/// インスタンス名と --all は同時に指定できない
#[test]
fn test_instance_conflicts_with_all() {
    pushflow()
        .args(["deploy", "traefik", "edge-1", "--all"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("cannot be used with"));
}

/// certsのサブコマンドが表示される
#[test]
fn test_certs_help() {
    pushflow()
        .args(["certs", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("issue"))
        .stdout(predicate::str::contains("distribute"))
        .stdout(predicate::str::contains("renew"));
}

/// 不正なコマンドでエラーになることを確認
#[test]
fn test_invalid_command() {
    pushflow().arg("invalid-command").assert().failure();
}

/// 同梱プロジェクトのサービス一覧
#[test]
fn test_services_lists_demo_project() {
    pushflow()
        .arg("--project")
        .arg(demo_project())
        .arg("services")
        .assert()
        .success()
        .stdout(predicate::str::contains("homelab"))
        .stdout(predicate::str::contains("synapse"))
        .stdout(predicate::str::contains("traefik"))
        .stdout(predicate::str::contains("edge-1"));
}

/// PUSHFLOW_PROJECT でディレクトリを指定できる
#[test]
fn test_project_from_env_directory() {
    let project = write_project(
        r#"
project "lab"

service "coturn" {
    file "turnserver.conf.tera" remote="/etc/turnserver/turnserver.conf"
}
"#,
    );

    pushflow()
        .env("PUSHFLOW_PROJECT", project.path())
        .current_dir(std::env::temp_dir())
        .arg("services")
        .assert()
        .success()
        .stdout(predicate::str::contains("coturn"));
}

/// 存在しないサービスは設定エラー（終了コード 2）で候補を表示する
#[test]
fn test_unknown_service() {
    pushflow()
        .arg("-p")
        .arg(demo_project())
        .args(["deploy", "mastodon"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("mastodon"))
        .stderr(predicate::str::contains("coturn"));
}

/// マルチインスタンスのサービスはインスタンス名か --all が必要
#[test]
fn test_multi_instance_requires_selection() {
    pushflow()
        .arg("-p")
        .arg(demo_project())
        .args(["diff", "traefik"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--all"));
}

/// 単一ターゲットのサービスにインスタンス名は指定できない
#[test]
fn test_single_target_rejects_instance() {
    pushflow()
        .arg("-p")
        .arg(demo_project())
        .args(["render", "synapse", "matrix"])
        .assert()
        .failure()
        .code(2);
}

/// テンプレートディレクトリがなければレンダリングエラー（終了コード 4）
#[test]
fn test_missing_templates_dir() {
    let project = write_project(
        r#"
project "lab"

service "coturn" {
    file "turnserver.conf.tera" remote="/etc/turnserver/turnserver.conf"
}
"#,
    );

    pushflow()
        .arg("-p")
        .arg(project.path())
        .args(["render", "coturn"])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("テンプレート"));
}

/// list はテンプレートを読まず、secrets の段階で止まる（終了コード 3）
#[test]
fn test_list_does_not_need_templates() {
    let project = write_project(
        r#"
project "lab"

service "coturn" {
    file "turnserver.conf.tera" remote="/etc/turnserver/turnserver.conf"
}
"#,
    );

    pushflow()
        .arg("-p")
        .arg(project.path())
        .args(["list", "coturn"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("secrets"));
}

/// プロジェクトファイルが見つからなければ設定エラー
#[test]
fn test_project_not_found() {
    let empty = tempfile::tempdir().unwrap();
    pushflow()
        .current_dir(empty.path())
        .env("HOME", empty.path())
        .env("XDG_CONFIG_HOME", empty.path())
        .arg("services")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("pushflow.kdl"));
}

/// 不正な KDL は設定エラー
#[test]
fn test_invalid_project_file() {
    let project = write_project("project \"lab\"\nservice \"coturn\" {\n");
    pushflow()
        .arg("-p")
        .arg(project.path())
        .arg("services")
        .assert()
        .failure()
        .code(2);
}

/// certs ブロックがなければ certs コマンドは設定エラー
#[test]
fn test_certs_not_configured() {
    let project = write_project(
        r#"
project "lab"

service "coturn" {
    file "turnserver.conf.tera" remote="/etc/turnserver/turnserver.conf"
}
"#,
    );

    pushflow()
        .arg("-p")
        .arg(project.path())
        .args(["certs", "status"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("certs"));
}
