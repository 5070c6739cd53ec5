//! 証明書管理のエラー型

use pushflow_core::{ErrorKind, PushError};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CertError {
    #[error("{tool} が PATH に見つかりません\nヒント: {hint}")]
    ToolNotFound { tool: String, hint: String },

    #[error("証明書がストアにありません: {domain}\nヒント: 先に 'certs issue' を実行してください")]
    NotIssued { domain: String },

    #[error("有効期限を読み取れません: {path}\n理由: {message}")]
    ExpiryUnreadable { path: PathBuf, message: String },

    #[error("証明書の発行に失敗しました: {0}")]
    IssueFailed(String),

    #[error(
        "'{host}' は配布先に含まれていません\n利用可能な配布先: {}",
        .available.join(", ")
    )]
    UnknownHost { host: String, available: Vec<String> },

    #[error("certs の secrets が不正です: {0}")]
    InvalidSecrets(String),

    #[error(transparent)]
    Push(#[from] PushError),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

impl CertError {
    /// 終了コードの分類
    pub fn kind(&self) -> ErrorKind {
        match self {
            CertError::UnknownHost { .. } | CertError::InvalidSecrets(_) => {
                ErrorKind::Configuration
            }
            CertError::ToolNotFound { .. }
            | CertError::NotIssued { .. }
            | CertError::ExpiryUnreadable { .. }
            | CertError::IssueFailed(_) => ErrorKind::Secret,
            CertError::Push(e) => e.kind(),
            CertError::Io(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, CertError>;
