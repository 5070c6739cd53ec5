//! certs の secrets

use crate::error::{CertError, Result};
use pushflow_core::Secrets;
use serde::Deserialize;

/// 復号済みの certs secrets
#[derive(Debug, Clone, Deserialize)]
pub struct CertSecrets {
    /// ワイルドカードの対象ドメイン（`*.domain` と `domain`）
    pub domain: String,
    pub acme_email: String,
    pub acme_eab_kid: String,
    pub acme_eab_hmac: String,
    pub cf_api_token: String,
    #[serde(default)]
    pub targets: Vec<CertTarget>,
}

/// 配布先
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CertTarget {
    /// host 一覧の名前、またはホスト名そのもの
    pub host: String,
    /// 変更があったときに実行するコマンド
    #[serde(default)]
    pub post_deploy: Option<String>,
}

impl CertSecrets {
    pub fn from_value(secrets: Secrets) -> Result<Self> {
        serde_json::from_value(secrets).map_err(|e| CertError::InvalidSecrets(e.to_string()))
    }

    pub fn target_hosts(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.host.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value() {
        let secrets = CertSecrets::from_value(json!({
            "domain": "example.org",
            "acme_email": "ops@example.org",
            "acme_eab_kid": "kid",
            "acme_eab_hmac": "hmac",
            "cf_api_token": "token",
            "targets": [
                {"host": "edge-1", "post_deploy": "systemctl reload nginx"},
                {"host": "matrix"}
            ]
        }))
        .unwrap();

        assert_eq!(secrets.domain, "example.org");
        assert_eq!(secrets.target_hosts(), vec!["edge-1", "matrix"]);
        assert_eq!(
            secrets.targets[0].post_deploy.as_deref(),
            Some("systemctl reload nginx")
        );
        assert!(secrets.targets[1].post_deploy.is_none());
    }

    #[test]
    fn test_missing_field_is_invalid() {
        let err = CertSecrets::from_value(json!({"domain": "example.org"})).unwrap_err();
        assert!(matches!(err, CertError::InvalidSecrets(_)));
        assert!(err.to_string().contains("acme_email"));
    }
}
