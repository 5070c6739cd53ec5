//! secrets の復号
//!
//! サービスごとの `secrets.enc.yaml` を sops CLI で復号し、
//! 構造化された値として返します。
//!
//! ## 必要な環境
//!
//! - sops がインストールされていること
//! - 復号鍵（age / PGP など）が sops から参照できること
//!
//! ## セキュリティ
//!
//! - 復号した値はログに出力しません
//! - エラーメッセージにも平文は含めません

use crate::error::{PushError, Result};
use crate::model::Secrets;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

/// 暗号化された設定ソースを復号する
pub trait SecretsProvider {
    fn decrypt(&self, source: &Path) -> Result<Secrets>;
}

/// sops CLI による復号
#[derive(Debug, Clone, Default)]
pub struct SopsProvider {
    binary: Option<String>,
}

impl SopsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// sops の実行ファイルを差し替える（PATH にない場合など）
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: Some(binary.into()),
        }
    }

    fn binary(&self) -> &str {
        self.binary.as_deref().unwrap_or("sops")
    }

    /// sops が利用可能かチェック
    pub fn is_available(&self) -> bool {
        Command::new(self.binary())
            .arg("--version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }
}

impl SecretsProvider for SopsProvider {
    fn decrypt(&self, source: &Path) -> Result<Secrets> {
        debug!(source = %source.display(), "Decrypting secrets with sops");

        if !source.exists() {
            return Err(PushError::Secret(format!(
                "secrets ファイルが見つかりません: {}",
                source.display()
            )));
        }

        let output = Command::new(self.binary())
            .arg("-d")
            .arg(source)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PushError::Secret(format!("{} が PATH に見つかりません", self.binary()))
                } else {
                    PushError::Secret(format!("sops 実行エラー: {}", e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);

            let hint = if stderr.contains("no key could decrypt") || stderr.contains("Failed to get the data key") {
                "\nヒント: 復号鍵（SOPS_AGE_KEY_FILE など）が設定されているか確認してください"
            } else if stderr.contains("sops metadata not found") {
                "\nヒント: ファイルが sops で暗号化されていません"
            } else {
                ""
            };

            return Err(PushError::Secret(format!(
                "{} の復号に失敗: {}{}",
                source.display(),
                stderr.trim(),
                hint
            )));
        }

        let plaintext = String::from_utf8_lossy(&output.stdout);
        let secrets = parse_secrets(&plaintext)?;
        info!(source = %source.display(), "Decrypted secrets");
        Ok(secrets)
    }
}

/// 復号済み YAML を secrets として読み込む
///
/// トップレベルはマッピングでなければならない。
pub fn parse_secrets(yaml: &str) -> Result<Secrets> {
    let value: serde_json::Value = serde_yaml::from_str(yaml)
        .map_err(|e| PushError::Secret(format!("secrets の YAML が不正です: {}", e)))?;

    match value {
        serde_json::Value::Object(_) => Ok(value),
        serde_json::Value::Null => Ok(serde_json::Value::Object(serde_json::Map::new())),
        _ => Err(PushError::Secret(
            "secrets のトップレベルはマッピングである必要があります".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_secrets_nested() {
        let secrets = parse_secrets(
            r#"
common:
  ssh_user: deploy
  ssh_port: 2222
instances:
  edge-1:
    domain: edge1.example.org
  edge-2:
    domain: edge2.example.org
"#,
        )
        .unwrap();

        assert_eq!(secrets["common"]["ssh_user"], "deploy");
        assert_eq!(secrets["common"]["ssh_port"], 2222);
        let names: Vec<_> = secrets["instances"]
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(names, vec!["edge-1", "edge-2"]);
    }

    #[test]
    fn test_parse_secrets_rejects_scalar() {
        assert!(matches!(parse_secrets("just a string"), Err(PushError::Secret(_))));
    }

    #[test]
    fn test_missing_binary_is_secret_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = temp_dir.path().join("secrets.enc.yaml");
        std::fs::write(&source, "a: 1").unwrap();

        let provider = SopsProvider::with_binary("pushflow-no-such-sops");
        assert!(!provider.is_available());
        let err = provider.decrypt(&source).unwrap_err();
        assert!(matches!(err, PushError::Secret(_)));
        assert!(err.to_string().contains("PATH"));
    }

    #[test]
    fn test_missing_source_is_secret_error() {
        let err = SopsProvider::new()
            .decrypt(Path::new("/nonexistent/secrets.enc.yaml"))
            .unwrap_err();
        assert!(matches!(err, PushError::Secret(_)));
    }
}
