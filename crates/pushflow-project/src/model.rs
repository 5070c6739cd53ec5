//! プロジェクトのデータモデル

use crate::error::{ProjectError, Result};
use pushflow_core::Target;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONNECT_TIMEOUT: u64 = 10;
pub const DEFAULT_RENEW_DAYS: i64 = 30;
pub const DEFAULT_DOH_PORT: u16 = 5053;

/// pushflow.kdl 全体
#[derive(Debug, Clone, Default)]
pub struct Project {
    /// プロジェクト名
    pub name: String,

    /// 相対パスの基準（プロジェクトファイルのあるディレクトリ）
    pub root: PathBuf,

    pub ssh: SshSettings,

    /// サービス定義（記述順）
    pub services: Vec<ServiceDef>,

    /// ホスト一覧（証明書の配布先などで参照）
    pub hosts: Vec<HostDef>,

    pub certs: Option<CertsDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshSettings {
    /// 接続タイムアウト（秒）
    pub connect_timeout: u64,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// レンダリングコンテキストの作り方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// secrets をそのまま渡す
    Secrets,
    /// `common` と対象インスタンスだけを渡す
    Instance,
}

impl ContextKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "secrets" => Ok(ContextKind::Secrets),
            "instance" => Ok(ContextKind::Instance),
            other => Err(ProjectError::InvalidConfig(format!(
                "不明な context: '{}'（secrets / instance のいずれか）",
                other
            ))),
        }
    }
}

/// service ノード
#[derive(Debug, Clone, Default)]
pub struct ServiceDef {
    pub name: String,
    /// テンプレートディレクトリ（プロジェクトルートからの相対パス）
    pub templates: PathBuf,
    pub secrets: PathBuf,
    pub multi_instance: bool,
    pub context: Option<ContextKind>,
    pub setup_dirs: Vec<String>,
    pub files: Vec<FileDef>,
    pub restart: Option<String>,
    pub secret_files: Vec<SecretFileDef>,
}

impl ServiceDef {
    /// 実際に使われるコンテキスト種別
    pub fn context_kind(&self) -> ContextKind {
        self.context.unwrap_or(if self.multi_instance {
            ContextKind::Instance
        } else {
            ContextKind::Secrets
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDef {
    pub template: String,
    pub remote: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretFileDef {
    pub key: String,
    pub remote: String,
    pub optional: bool,
}

/// host ノード
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDef {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub user: String,
}

impl HostDef {
    pub fn target(&self) -> Target {
        Target::new(self.address.clone(), self.port, self.user.clone())
    }
}

/// certs ノード
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertsDef {
    pub secrets: PathBuf,
    pub store: PathBuf,
    pub renew_days: i64,
    pub doh_port: u16,
}

impl Default for CertsDef {
    fn default() -> Self {
        Self {
            secrets: PathBuf::from("certs/secrets/secrets.enc.yaml"),
            store: PathBuf::from("certs/.certstore"),
            renew_days: DEFAULT_RENEW_DAYS,
            doh_port: DEFAULT_DOH_PORT,
        }
    }
}

impl Project {
    /// 名前でサービスを取得
    pub fn service(&self, name: &str) -> Result<&ServiceDef> {
        self.services
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ProjectError::ServiceNotFound {
                name: name.to_string(),
                available: self.service_names(),
            })
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }

    pub fn host(&self, name: &str) -> Option<&HostDef> {
        self.hosts.iter().find(|h| h.name == name)
    }

    /// ホスト名から接続先を決める
    ///
    /// host 一覧にない場合は `root@<name>:22` とみなす。
    pub fn host_target(&self, name: &str) -> Target {
        self.host(name)
            .map(HostDef::target)
            .unwrap_or_else(|| Target::new(name, 22, "root"))
    }

    /// プロジェクトルートからの相対パスを絶対パスにする
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn certs(&self) -> Result<&CertsDef> {
        self.certs.as_ref().ok_or(ProjectError::CertsNotConfigured)
    }
}
