//! プロジェクトファイルのエラー型

use pushflow_core::ErrorKind;

/// プロジェクトファイルのエラー
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("KDL パースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("不正なプロジェクト定義: {0}")]
    InvalidConfig(String),

    #[error(
        "サービス '{name}' が見つかりません\n利用可能なサービス: {}",
        .available.join(", ")
    )]
    ServiceNotFound {
        name: String,
        available: Vec<String>,
    },

    #[error("certs ブロックが定義されていません")]
    CertsNotConfigured,

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

impl ProjectError {
    /// 終了コードの分類
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProjectError::Io(_) => ErrorKind::Io,
            _ => ErrorKind::Configuration,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProjectError>;
