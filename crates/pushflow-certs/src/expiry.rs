//! 証明書の有効期限の読み取り

use crate::error::{CertError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// 証明書ファイルから有効期限を読む
pub trait CertInspector {
    fn expiry(&self, crt: &Path) -> Result<DateTime<Utc>>;
}

/// `openssl x509 -enddate` による実装
#[derive(Debug, Clone, Default)]
pub struct OpensslInspector;

impl CertInspector for OpensslInspector {
    fn expiry(&self, crt: &Path) -> Result<DateTime<Utc>> {
        debug!(crt = %crt.display(), "Reading certificate expiry");

        let output = Command::new("openssl")
            .args(["x509", "-enddate", "-noout", "-in"])
            .arg(crt)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CertError::ToolNotFound {
                        tool: "openssl".to_string(),
                        hint: "OpenSSL をインストールしてください".to_string(),
                    }
                } else {
                    CertError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(CertError::ExpiryUnreadable {
                path: crt.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_enddate(&String::from_utf8_lossy(&output.stdout)).map_err(|message| {
            CertError::ExpiryUnreadable {
                path: crt.to_path_buf(),
                message,
            }
        })
    }
}

/// `notAfter=Jan  5 12:00:00 2027 GMT` を UTC の日時にする
pub fn parse_enddate(output: &str) -> std::result::Result<DateTime<Utc>, String> {
    let value = output
        .trim()
        .split_once('=')
        .map(|(_, v)| v)
        .ok_or_else(|| format!("想定外の出力: {}", output.trim()))?;

    // openssl は 1 桁の日をスペースで埋める
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&normalized, "%b %d %H:%M:%S %Y GMT")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("日時を解析できません '{}': {}", normalized, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_enddate() {
        let expiry = parse_enddate("notAfter=Mar 14 08:30:00 2027 GMT\n").unwrap();
        assert_eq!(expiry, Utc.with_ymd_and_hms(2027, 3, 14, 8, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_enddate_padded_day() {
        let expiry = parse_enddate("notAfter=Jan  5 12:00:00 2027 GMT").unwrap();
        assert_eq!(expiry, Utc.with_ymd_and_hms(2027, 1, 5, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_enddate_garbage() {
        assert!(parse_enddate("unable to load certificate").is_err());
        assert!(parse_enddate("notAfter=someday").is_err());
    }

    #[test]
    fn test_openssl_unreadable_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let crt = temp_dir.path().join("broken.crt");
        std::fs::write(&crt, "not a certificate").unwrap();

        let err = OpensslInspector.expiry(&crt).unwrap_err();
        assert!(matches!(
            err,
            CertError::ExpiryUnreadable { .. } | CertError::ToolNotFound { .. }
        ));
    }
}
