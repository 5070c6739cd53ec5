//! lego による証明書の発行
//!
//! Google の ACME ディレクトリに EAB で登録し、Cloudflare の DNS-01 チャレンジで
//! ワイルドカード証明書を取得します。DNS の伝播確認は、ローカルで起動した
//! dnsproxy（DoH アップストリーム）経由で行います。

use crate::error::{CertError, Result};
use crate::secrets::CertSecrets;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

const ACME_DIRECTORY: &str = "https://dv.acme-v02.api.pki.goog/directory";
const DOH_UPSTREAM: &str = "https://1.1.1.1/dns-query";

/// lego のサブコマンド
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegoAction {
    Run,
    Renew { days: i64 },
}

/// 証明書を発行する
pub trait CertIssuer {
    fn issue(&self, secrets: &CertSecrets, action: LegoAction) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct LegoIssuer {
    lego_dir: PathBuf,
    doh_port: u16,
}

impl LegoIssuer {
    pub fn new(lego_dir: impl Into<PathBuf>, doh_port: u16) -> Self {
        Self {
            lego_dir: lego_dir.into(),
            doh_port,
        }
    }

    /// lego に渡す引数
    pub fn args(&self, secrets: &CertSecrets, action: LegoAction) -> Vec<String> {
        let mut args: Vec<String> = [
            "--email",
            secrets.acme_email.as_str(),
            "--server",
            ACME_DIRECTORY,
            "--eab",
            "--kid",
            secrets.acme_eab_kid.as_str(),
            "--hmac",
            secrets.acme_eab_hmac.as_str(),
            "--dns",
            "cloudflare",
            "--dns.propagation-disable-ans",
            "--dns.resolvers",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        args.push(format!("127.0.0.1:{}", self.doh_port));
        args.push("--domains".to_string());
        args.push(format!("*.{}", secrets.domain));
        args.push("--domains".to_string());
        args.push(secrets.domain.clone());
        args.push("--path".to_string());
        args.push(self.lego_dir.display().to_string());
        args.push("--accept-tos".to_string());

        match action {
            LegoAction::Run => args.push("run".to_string()),
            LegoAction::Renew { days } => {
                args.push("renew".to_string());
                args.push("--days".to_string());
                args.push(days.to_string());
            }
        }
        args
    }
}

impl CertIssuer for LegoIssuer {
    fn issue(&self, secrets: &CertSecrets, action: LegoAction) -> Result<()> {
        ensure_tool("lego", "https://github.com/go-acme/lego#installation")?;

        let _proxy = DohProxy::start(self.doh_port)?;

        info!(domain = %secrets.domain, action = ?action, "Requesting certificate with lego");
        let status = Command::new("lego")
            .args(self.args(secrets, action))
            .env("CLOUDFLARE_DNS_API_TOKEN", &secrets.cf_api_token)
            .env("CLOUDFLARE_PROPAGATION_TIMEOUT", "15")
            .env("CLOUDFLARE_POLLING_INTERVAL", "5")
            .status()?;

        if !status.success() {
            return Err(CertError::IssueFailed(format!(
                "lego が失敗しました ({})",
                status
            )));
        }
        Ok(())
    }
}

/// lego の実行中だけ動かすローカル DNS プロキシ
///
/// Drop で停止する。
struct DohProxy {
    child: Child,
}

impl DohProxy {
    fn start(port: u16) -> Result<Self> {
        debug!(port, "Starting dnsproxy");
        let child = Command::new("dnsproxy")
            .args(["-l", "127.0.0.1", "-p"])
            .arg(port.to_string())
            .args(["-u", DOH_UPSTREAM])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CertError::ToolNotFound {
                        tool: "dnsproxy".to_string(),
                        hint: "https://github.com/AdguardTeam/dnsproxy".to_string(),
                    }
                } else {
                    CertError::Io(e)
                }
            })?;

        // 待ち受け開始を待つ
        std::thread::sleep(Duration::from_secs(1));
        Ok(Self { child })
    }
}

impl Drop for DohProxy {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            warn!(error = %e, "Failed to stop dnsproxy");
        }
        let _ = self.child.wait();
    }
}

fn ensure_tool(tool: &str, hint: &str) -> Result<()> {
    match Command::new(tool)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CertError::ToolNotFound {
            tool: tool.to_string(),
            hint: hint.to_string(),
        }),
        Err(e) => Err(CertError::Io(e)),
    }
}
