pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};
use tracing::debug;

/// プロジェクトファイル名
pub const PROJECT_FILE: &str = "pushflow.kdl";

/// プロジェクトファイルを直接指定する環境変数
pub const PROJECT_ENV: &str = "PUSHFLOW_PROJECT";

/// PushFlowの設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("pushflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// 明示的に指定されたパスを解決する（ディレクトリなら pushflow.kdl を補う）
pub fn resolve_explicit(path: &Path) -> Result<PathBuf> {
    let path = if path.is_dir() {
        path.join(PROJECT_FILE)
    } else {
        path.to_path_buf()
    };
    if path.is_file() {
        Ok(path)
    } else {
        Err(ConfigError::ExplicitPathNotFound(path))
    }
}

/// プロジェクトの pushflow.kdl を探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 PUSHFLOW_PROJECT (ファイルまたはディレクトリ)
/// 2. カレントディレクトリから親方向へ pushflow.kdl
/// 3. ~/.config/pushflow/pushflow.kdl (グローバル設定)
#[tracing::instrument]
pub fn find_project_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(project_path) = std::env::var(PROJECT_ENV)
        && !project_path.is_empty()
    {
        debug!(path = %project_path, "Using project file from environment");
        return resolve_explicit(Path::new(&project_path));
    }

    // 2. カレントディレクトリとその親
    let current_dir = std::env::current_dir()?;
    if let Some(path) = find_in_ancestors(&current_dir) {
        debug!(path = %path.display(), "Found project file");
        return Ok(path);
    }

    // 3. グローバル設定
    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("pushflow").join(PROJECT_FILE);
        if global.exists() {
            return Ok(global);
        }
    }

    Err(ConfigError::ProjectFileNotFound)
}

fn find_in_ancestors(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_FILE))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_get_config_dir() {
        let config_dir = get_config_dir().unwrap();
        assert!(config_dir.ends_with("pushflow"));
        assert!(config_dir.exists());
    }

    #[test]
    #[serial]
    fn test_find_project_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join(PROJECT_FILE), "project \"test\"").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_var_unset(PROJECT_ENV, find_project_file);
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with(PROJECT_FILE));
    }

    #[test]
    #[serial]
    fn test_find_project_file_in_ancestor() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join(PROJECT_FILE), "project \"test\"").unwrap();
        let nested = temp_dir.path().join("traefik").join("templates");
        fs::create_dir_all(&nested).unwrap();

        std::env::set_current_dir(&nested).unwrap();
        let result = temp_env::with_var_unset(PROJECT_ENV, find_project_file);
        std::env::set_current_dir(original_dir).unwrap();

        let found = result.unwrap();
        assert_eq!(
            found.canonicalize().unwrap(),
            temp_dir.path().join(PROJECT_FILE).canonicalize().unwrap()
        );
    }

    #[test]
    #[serial]
    fn test_find_project_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let project = temp_dir.path().join("custom.kdl");
        fs::write(&project, "project \"custom\"").unwrap();

        let result = temp_env::with_var(PROJECT_ENV, Some(project.as_os_str()), find_project_file);
        assert_eq!(result.unwrap(), project);
    }

    #[test]
    #[serial]
    fn test_find_project_file_env_var_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join(PROJECT_FILE), "project \"dir\"").unwrap();

        let result = temp_env::with_var(PROJECT_ENV, Some(temp_dir.path().as_os_str()), find_project_file);
        assert_eq!(result.unwrap(), temp_dir.path().join(PROJECT_FILE));
    }

    #[test]
    #[serial]
    fn test_find_project_file_env_var_missing() {
        let result = temp_env::with_var(PROJECT_ENV, Some("/nonexistent/pushflow.kdl"), find_project_file);
        assert!(matches!(result, Err(ConfigError::ExplicitPathNotFound(_))));
    }

    #[test]
    #[serial]
    fn test_find_project_file_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_vars(
            [(PROJECT_ENV, None::<&str>), ("XDG_CONFIG_HOME", Some(temp_dir.path().to_str().unwrap()))],
            find_project_file,
        );
        std::env::set_current_dir(original_dir).unwrap();

        assert!(matches!(result, Err(ConfigError::ProjectFileNotFound)));
    }
}
