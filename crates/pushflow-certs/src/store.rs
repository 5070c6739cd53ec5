//! ローカルの証明書ストア
//!
//! lego の出力先をそのまま使う:
//!
//! ```text
//! <store>/lego/certificates/_.<domain>.crt
//! <store>/lego/certificates/_.<domain>.key
//! ```

use crate::error::Result;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CertStore {
    root: PathBuf,
}

/// ワイルドカード証明書と秘密鍵のパス
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertPaths {
    pub crt: PathBuf,
    pub key: PathBuf,
}

impl CertPaths {
    pub fn exists(&self) -> bool {
        self.crt.is_file() && self.key.is_file()
    }
}

impl CertStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// lego の `--path` に渡すディレクトリ
    pub fn lego_dir(&self) -> PathBuf {
        self.root.join("lego")
    }

    pub fn cert_paths(&self, domain: &str) -> CertPaths {
        let certs_dir = self.lego_dir().join("certificates");
        CertPaths {
            crt: certs_dir.join(format!("_.{}.crt", domain)),
            key: certs_dir.join(format!("_.{}.key", domain)),
        }
    }

    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }
}

/// 配布先での証明書のパス
pub fn remote_cert_paths(domain: &str) -> (String, String) {
    (
        format!("/etc/ssl/certs/{}.crt", domain),
        format!("/etc/ssl/private/{}.key", domain),
    )
}
