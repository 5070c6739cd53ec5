use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error(
        "プロジェクトファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリとその親: pushflow.kdl\n\
        - ~/.config/pushflow/pushflow.kdl\n\
        または PUSHFLOW_PROJECT 環境変数 / --project で直接指定できます"
    )]
    ProjectFileNotFound,

    #[error("指定されたプロジェクトファイルが存在しません: {0}")]
    ExplicitPathNotFound(PathBuf),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
