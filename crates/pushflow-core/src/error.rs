use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PushError {
    #[error(
        "インスタンスが見つかりません: {name}\n利用可能なインスタンス: {}",
        .available.join(", ")
    )]
    InstanceNotFound {
        name: String,
        available: Vec<String>,
    },

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("リモートパスを解決できません: {pattern}\n理由: フィールド `{field}` が secrets にありません")]
    UnresolvedPath { pattern: String, field: String },

    #[error("テンプレートエラー: {template}\n理由: {message}")]
    TemplateError { template: String, message: String },

    #[error("転送エラー: {target}\n理由: {message}")]
    Transport { target: String, message: String },

    #[error("{failed}/{total} 件のターゲットで失敗しました")]
    PartialFailure { failed: usize, total: usize },

    #[error("シークレットエラー: {0}")]
    Secret(String),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),
}

/// エラーの分類
///
/// CLI の終了コードはこの分類から決まる。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Transport,
    Secret,
    Render,
    Io,
}

impl ErrorKind {
    /// プロセス終了コード（0 は「成功または変更なし」）
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Io => 1,
            ErrorKind::Configuration => 2,
            ErrorKind::Secret => 3,
            ErrorKind::Render => 4,
            ErrorKind::Transport => 5,
        }
    }
}

impl PushError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PushError::InstanceNotFound { .. }
            | PushError::InvalidConfig(_)
            | PushError::UnresolvedPath { .. } => ErrorKind::Configuration,
            PushError::TemplateError { .. } => ErrorKind::Render,
            PushError::Transport { .. } | PushError::PartialFailure { .. } => ErrorKind::Transport,
            PushError::Secret(_) => ErrorKind::Secret,
            PushError::IoError { .. } | PushError::Io(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, PushError>;
