//! インスタンス解決
//!
//! サービス定義と secrets から、操作対象の（コンテキスト, デプロイ先）の組を作ります。
//!
//! - 単一ターゲット: secrets の `ssh` ブロックから 1 つだけ
//! - マルチインスタンス: `instances` の各キーごとに 1 つ（記述順）

use crate::context::instance_names;
use crate::error::{PushError, Result};
use crate::model::{RenderContext, Secrets, ServiceSpec, Target, lookup, scalar_to_string};
use serde_json::Value;
use tracing::debug;

const DEFAULT_SSH_PORT: u16 = 22;
const DEFAULT_SSH_USER: &str = "root";

/// 操作対象の選び方
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// すべてのインスタンス（単一ターゲットではその 1 つ）
    All,
    /// 名前で 1 つだけ
    Named(String),
}

/// 解決済みのインスタンス
#[derive(Debug, Clone)]
pub struct ResolvedInstance {
    pub name: String,
    pub context: RenderContext,
    pub target: Target,
    /// `ServiceSpec::files` と同じ順序で解決したリモートパス
    pub remote_paths: Vec<String>,
}

pub struct InstanceResolver<'a> {
    spec: &'a ServiceSpec,
    secrets: &'a Secrets,
}

impl<'a> InstanceResolver<'a> {
    pub fn new(spec: &'a ServiceSpec, secrets: &'a Secrets) -> Self {
        Self { spec, secrets }
    }

    /// インスタンス名の一覧
    ///
    /// 単一ターゲットのサービスはサービス名を唯一のインスタンス名とする。
    pub fn names(&self) -> Vec<String> {
        if self.spec.multi_instance {
            instance_names(self.secrets)
        } else {
            vec![self.spec.name.clone()]
        }
    }

    /// 選択に該当するインスタンス名（順序つき）
    pub fn select(&self, selection: &Selection) -> Result<Vec<String>> {
        let names = self.names();
        match selection {
            Selection::All => {
                if names.is_empty() {
                    return Err(PushError::InvalidConfig(format!(
                        "サービス '{}' の secrets に instances がありません",
                        self.spec.name
                    )));
                }
                Ok(names)
            }
            Selection::Named(name) => {
                if !self.spec.multi_instance {
                    return Err(PushError::InvalidConfig(format!(
                        "サービス '{}' はマルチインスタンスではありません",
                        self.spec.name
                    )));
                }
                if names.iter().any(|n| n == name) {
                    Ok(vec![name.clone()])
                } else {
                    Err(PushError::InstanceNotFound {
                        name: name.clone(),
                        available: names,
                    })
                }
            }
        }
    }

    /// 1 つのインスタンスを解決する
    ///
    /// 計算されたリモートパスと secrets フックの必須キーもここで確かめる。
    pub fn resolve(&self, name: &str) -> Result<ResolvedInstance> {
        let instance = self.spec.multi_instance.then_some(name);
        let context = self.spec.context_builder().build(self.secrets, instance)?;
        let target = match instance {
            Some(name) => self.instance_target(name)?,
            None => self.single_target()?,
        };
        let remote_paths = self
            .spec
            .files
            .iter()
            .map(|file| file.remote.resolve(&context))
            .collect::<Result<Vec<_>>>()?;
        for hook in &self.spec.secrets_hooks {
            hook.check(&context)?;
        }

        debug!(service = %self.spec.name, instance = %name, target = %target, "Resolved instance");

        Ok(ResolvedInstance {
            name: name.to_string(),
            context,
            target,
            remote_paths,
        })
    }

    /// 選択されたインスタンスをすべて解決する
    ///
    /// どれか 1 つでも解決できなければ、何も実行する前にエラーを返す。
    pub fn resolve_selection(&self, selection: &Selection) -> Result<Vec<ResolvedInstance>> {
        self.select(selection)?
            .iter()
            .map(|name| self.resolve(name))
            .collect()
    }

    fn single_target(&self) -> Result<Target> {
        let host = string_at(self.secrets, "ssh.host").ok_or_else(|| {
            PushError::InvalidConfig(format!(
                "サービス '{}' の secrets に ssh.host がありません",
                self.spec.name
            ))
        })?;
        let port = port_at(self.secrets, "ssh.port")?.unwrap_or(DEFAULT_SSH_PORT);
        let user = string_at(self.secrets, "ssh.user").unwrap_or_else(|| DEFAULT_SSH_USER.to_string());
        Ok(Target::new(host, port, user))
    }

    fn instance_target(&self, name: &str) -> Result<Target> {
        let data = self
            .secrets
            .get("instances")
            .and_then(|instances| instances.get(name))
            .ok_or_else(|| PushError::InstanceNotFound {
                name: name.to_string(),
                available: instance_names(self.secrets),
            })?;
        let common = self.secrets.get("common").unwrap_or(&Value::Null);

        let host = ["ssh_host", "host", "domain"]
            .iter()
            .find_map(|key| string_at(data, key))
            .ok_or_else(|| {
                PushError::InvalidConfig(format!(
                    "インスタンス '{}' に接続先がありません（ssh_host / host / domain のいずれかが必要です）",
                    name
                ))
            })?;
        let user = string_at(data, "ssh_user")
            .or_else(|| string_at(common, "ssh_user"))
            .unwrap_or_else(|| DEFAULT_SSH_USER.to_string());
        let port = match port_at(data, "ssh_port")? {
            Some(port) => port,
            None => port_at(common, "ssh_port")?.unwrap_or(DEFAULT_SSH_PORT),
        };

        Ok(Target::new(host, port, user))
    }
}

fn string_at(value: &Value, dotted: &str) -> Option<String> {
    lookup(value, dotted)
        .and_then(scalar_to_string)
        .filter(|s| !s.trim().is_empty())
}

fn port_at(value: &Value, dotted: &str) -> Result<Option<u16>> {
    let Some(raw) = string_at(value, dotted) else {
        return Ok(None);
    };
    raw.parse::<u16>()
        .map(Some)
        .map_err(|_| PushError::InvalidConfig(format!("{} のポート番号が不正です: {}", dotted, raw)))
}
