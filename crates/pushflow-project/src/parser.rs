//! pushflow.kdl パーサー
//!
//! プロジェクトファイルの KDL 構文をパースして Project 構造体を生成する。

use crate::error::{ProjectError, Result};
use crate::model::{
    CertsDef, ContextKind, FileDef, HostDef, Project, SecretFileDef, ServiceDef, SshSettings,
};
use kdl::{KdlDocument, KdlNode, KdlValue};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// KDLファイルを Project にパース
///
/// ファイルのあるディレクトリがプロジェクトルートになる。
#[tracing::instrument]
pub fn parse_project_file(path: &Path) -> Result<Project> {
    let content = std::fs::read_to_string(path)?;
    let mut project = parse_project(&content)?;
    project.root = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    debug!(
        project = %project.name,
        root = %project.root.display(),
        services = project.services.len(),
        "Parsed project file"
    );
    Ok(project)
}

/// KDL文字列を Project にパース
pub fn parse_project(content: &str) -> Result<Project> {
    let doc: KdlDocument = content.parse()?;

    let mut project = Project::default();

    for node in doc.nodes() {
        match node.name().value() {
            "project" => {
                if let Some(name) = first_string(node) {
                    project.name = name;
                }
            }
            "ssh" => {
                project.ssh = parse_ssh(node)?;
            }
            "service" => {
                let service = parse_service(node)?;
                project.services.push(service);
            }
            "host" => {
                let host = parse_host(node)?;
                project.hosts.push(host);
            }
            "certs" => {
                project.certs = Some(parse_certs(node)?);
            }
            _ => {
                // 不明なノードはスキップ
            }
        }
    }

    if project.name.is_empty() {
        return Err(ProjectError::InvalidConfig(
            "project ノードが必要です".to_string(),
        ));
    }

    // バリデーション: 名前の重複
    let mut seen = HashSet::new();
    for service in &project.services {
        if !seen.insert(service.name.as_str()) {
            return Err(ProjectError::InvalidConfig(format!(
                "サービス '{}' が重複しています",
                service.name
            )));
        }
    }
    let mut seen = HashSet::new();
    for host in &project.hosts {
        if !seen.insert(host.name.as_str()) {
            return Err(ProjectError::InvalidConfig(format!(
                "host '{}' が重複しています",
                host.name
            )));
        }
    }

    Ok(project)
}

/// ssh ノードをパース
fn parse_ssh(node: &KdlNode) -> Result<SshSettings> {
    let mut settings = SshSettings::default();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() == "connect-timeout" {
                settings.connect_timeout = first_integer(child)
                    .and_then(|v| u64::try_from(v).ok())
                    .ok_or_else(|| {
                        ProjectError::InvalidConfig(
                            "connect-timeout には正の整数が必要です".to_string(),
                        )
                    })?;
            }
        }
    }
    Ok(settings)
}

/// service ノードをパース
fn parse_service(node: &KdlNode) -> Result<ServiceDef> {
    let name = first_string(node)
        .ok_or_else(|| ProjectError::InvalidConfig("service には名前が必要です".to_string()))?;

    let mut service = ServiceDef {
        templates: PathBuf::from(&name).join("templates"),
        secrets: PathBuf::from(&name).join("secrets").join("secrets.enc.yaml"),
        name,
        ..Default::default()
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "templates" => {
                    if let Some(path) = first_string(child) {
                        service.templates = PathBuf::from(path);
                    }
                }
                "secrets" => {
                    if let Some(path) = first_string(child) {
                        service.secrets = PathBuf::from(path);
                    }
                }
                "multi-instance" => {
                    service.multi_instance = child
                        .entries()
                        .first()
                        .and_then(|e| e.value().as_bool())
                        .unwrap_or(true);
                }
                "context" => {
                    let value = first_string(child).ok_or_else(|| {
                        ProjectError::InvalidConfig(format!(
                            "サービス '{}' の context に値が必要です",
                            service.name
                        ))
                    })?;
                    service.context = Some(ContextKind::parse(&value)?);
                }
                "setup-dir" => {
                    service.setup_dirs.extend(all_strings(child));
                }
                "file" => {
                    let template = first_string(child).ok_or_else(|| {
                        ProjectError::InvalidConfig(format!(
                            "サービス '{}' の file にテンプレート名が必要です",
                            service.name
                        ))
                    })?;
                    let remote = prop_string(child, "remote").ok_or_else(|| {
                        ProjectError::InvalidConfig(format!(
                            "サービス '{}' の file \"{}\" に remote が必要です",
                            service.name, template
                        ))
                    })?;
                    service.files.push(FileDef { template, remote });
                }
                "restart" => {
                    service.restart = first_string(child);
                }
                "secret-file" => {
                    let key = first_string(child).ok_or_else(|| {
                        ProjectError::InvalidConfig(format!(
                            "サービス '{}' の secret-file にキーが必要です",
                            service.name
                        ))
                    })?;
                    let remote = prop_string(child, "remote").ok_or_else(|| {
                        ProjectError::InvalidConfig(format!(
                            "サービス '{}' の secret-file \"{}\" に remote が必要です",
                            service.name, key
                        ))
                    })?;
                    let optional = prop(child, "optional")
                        .and_then(KdlValue::as_bool)
                        .unwrap_or(false);
                    service.secret_files.push(SecretFileDef {
                        key,
                        remote,
                        optional,
                    });
                }
                _ => {}
            }
        }
    }

    if service.files.is_empty() {
        return Err(ProjectError::InvalidConfig(format!(
            "サービス '{}' に file が定義されていません",
            service.name
        )));
    }
    if service.context == Some(ContextKind::Instance) && !service.multi_instance {
        return Err(ProjectError::InvalidConfig(format!(
            "サービス '{}': context \"instance\" は multi-instance のサービスでのみ使えます",
            service.name
        )));
    }

    Ok(service)
}

/// host ノードをパース
fn parse_host(node: &KdlNode) -> Result<HostDef> {
    let name = first_string(node)
        .ok_or_else(|| ProjectError::InvalidConfig("host には名前が必要です".to_string()))?;

    let address = prop_string(node, "address").unwrap_or_else(|| name.clone());
    let port = match prop(node, "port").and_then(KdlValue::as_integer) {
        Some(value) => u16::try_from(value).map_err(|_| {
            ProjectError::InvalidConfig(format!("host '{}' のポート番号が不正です: {}", name, value))
        })?,
        None => 22,
    };
    let user = prop_string(node, "user").unwrap_or_else(|| "root".to_string());

    Ok(HostDef {
        name,
        address,
        port,
        user,
    })
}

/// certs ノードをパース
fn parse_certs(node: &KdlNode) -> Result<CertsDef> {
    let mut certs = CertsDef::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "secrets" => {
                    if let Some(path) = first_string(child) {
                        certs.secrets = PathBuf::from(path);
                    }
                }
                "store" => {
                    if let Some(path) = first_string(child) {
                        certs.store = PathBuf::from(path);
                    }
                }
                "renew-days" => {
                    certs.renew_days = first_integer(child)
                        .and_then(|v| i64::try_from(v).ok())
                        .filter(|v| *v > 0)
                        .ok_or_else(|| {
                            ProjectError::InvalidConfig(
                                "renew-days には正の整数が必要です".to_string(),
                            )
                        })?;
                }
                "doh-port" => {
                    certs.doh_port = first_integer(child)
                        .and_then(|v| u16::try_from(v).ok())
                        .ok_or_else(|| {
                            ProjectError::InvalidConfig("doh-port が不正です".to_string())
                        })?;
                }
                _ => {}
            }
        }
    }

    Ok(certs)
}

fn first_string(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn first_integer(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

fn all_strings(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string().map(|s| s.to_string()))
        .collect()
}

fn prop<'a>(node: &'a KdlNode, key: &str) -> Option<&'a KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_some_and(|n| n.value() == key))
        .map(|e| e.value())
}

fn prop_string(node: &KdlNode, key: &str) -> Option<String> {
    prop(node, key)
        .and_then(KdlValue::as_string)
        .map(|s| s.to_string())
}
