//! 証明書のライフサイクル: status / issue / distribute / renew

use crate::error::{CertError, Result};
use crate::expiry::CertInspector;
use crate::lego::{CertIssuer, LegoAction};
use crate::policy::{CertState, Decision, RenewalPolicy, days_left};
use crate::secrets::CertSecrets;
use crate::store::{CertStore, remote_cert_paths};
use chrono::{DateTime, Utc};
use pushflow_core::remote::shell_quote;
use pushflow_core::{FileStatus, PushError, RemoteTransport, RestartOutcome, Target};
use std::fmt;
use tracing::{info, warn};

const REMOTE_SSL_DIRS: &str = "mkdir -p /etc/ssl/certs /etc/ssl/private";

/// status の結果
#[derive(Debug, Clone)]
pub struct CertStatus {
    pub domains: Vec<String>,
    pub state: CertState,
    pub days_left: Option<i64>,
    /// 残り日数がしきい値を下回っている
    pub expiring: bool,
    pub targets: Vec<String>,
}

/// issue の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueOutcome {
    Skipped { days_left: i64 },
    Issued { action: LegoAction },
}

impl fmt::Display for IssueOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueOutcome::Skipped { days_left } => write!(
                f,
                "valid for {} days, skipping (--force to override)",
                days_left
            ),
            IssueOutcome::Issued { .. } => write!(f, "certificate ready"),
        }
    }
}

/// 1 配布先の結果
#[derive(Debug, Clone)]
pub struct TargetDistribution {
    pub host: String,
    pub target: Target,
    pub unreachable: Option<String>,
    pub files: Vec<(String, FileStatus)>,
    pub permissions_error: Option<String>,
    pub post_deploy: RestartOutcome,
}

impl TargetDistribution {
    pub fn changed(&self) -> bool {
        self.files.iter().any(|(_, s)| *s == FileStatus::Updated)
    }

    pub fn failed(&self) -> bool {
        self.unreachable.is_some()
            || self.permissions_error.is_some()
            || self
                .files
                .iter()
                .any(|(_, s)| matches!(s, FileStatus::Failed { .. }))
            || matches!(self.post_deploy, RestartOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct DistributionReport {
    pub targets: Vec<TargetDistribution>,
}

impl DistributionReport {
    pub fn failed_count(&self) -> usize {
        self.targets.iter().filter(|t| t.failed()).count()
    }

    pub fn into_result(self) -> Result<DistributionReport> {
        let failed = self.failed_count();
        if failed == 0 {
            Ok(self)
        } else {
            Err(CertError::Push(PushError::PartialFailure {
                failed,
                total: self.targets.len(),
            }))
        }
    }
}

pub struct CertManager<'a> {
    store: CertStore,
    policy: RenewalPolicy,
    inspector: &'a dyn CertInspector,
    issuer: &'a dyn CertIssuer,
    transport: &'a dyn RemoteTransport,
}

impl<'a> CertManager<'a> {
    pub fn new(
        store: CertStore,
        policy: RenewalPolicy,
        inspector: &'a dyn CertInspector,
        issuer: &'a dyn CertIssuer,
        transport: &'a dyn RemoteTransport,
    ) -> Self {
        Self {
            store,
            policy,
            inspector,
            issuer,
            transport,
        }
    }

    pub fn policy(&self) -> &RenewalPolicy {
        &self.policy
    }

    /// ストア内の証明書の状態
    pub fn state(&self, domain: &str) -> CertState {
        let paths = self.store.cert_paths(domain);
        if !paths.crt.is_file() {
            return CertState::Missing;
        }
        match self.inspector.expiry(&paths.crt) {
            Ok(expiry) => CertState::Expires(expiry),
            Err(e) => {
                warn!(crt = %paths.crt.display(), error = %e, "Could not read certificate expiry");
                CertState::Unreadable
            }
        }
    }

    /// 読み取り専用の状態表示
    pub fn status(&self, secrets: &CertSecrets, now: DateTime<Utc>) -> CertStatus {
        let state = self.state(&secrets.domain);
        let days_left = match state {
            CertState::Expires(expiry) => Some(days_left(expiry, now)),
            _ => None,
        };
        CertStatus {
            domains: vec![format!("*.{}", secrets.domain), secrets.domain.clone()],
            state,
            days_left,
            expiring: days_left.is_some_and(|d| self.policy.is_expiring(d)),
            targets: secrets.target_hosts(),
        }
    }

    /// 必要なら証明書を発行・更新する
    pub fn issue(
        &self,
        secrets: &CertSecrets,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<IssueOutcome> {
        let state = self.state(&secrets.domain);
        let action = match self.policy.decide(state, now, force) {
            Decision::Skip { days_left } => {
                info!(domain = %secrets.domain, days_left, "Certificate still valid");
                return Ok(IssueOutcome::Skipped { days_left });
            }
            Decision::Issue => LegoAction::Run,
            Decision::Renew { force } => LegoAction::Renew {
                days: self.policy.renew_days(force),
            },
        };

        self.store.ensure()?;
        self.issuer.issue(secrets, action)?;

        if !self.store.cert_paths(&secrets.domain).crt.is_file() {
            return Err(CertError::IssueFailed(
                "lego の実行後に証明書が見つかりません".to_string(),
            ));
        }
        info!(domain = %secrets.domain, action = ?action, "Certificate ready");
        Ok(IssueOutcome::Issued { action })
    }

    /// 証明書と秘密鍵を配布先の /etc/ssl/ に送る
    ///
    /// `only_host` を指定するとその配布先だけが対象になる。
    /// 配布先ごとの失敗は後続を止めない。
    pub fn distribute<R, F>(
        &self,
        secrets: &CertSecrets,
        only_host: Option<&str>,
        resolve: R,
        mut on_report: F,
    ) -> Result<DistributionReport>
    where
        R: Fn(&str) -> Target,
        F: FnMut(&TargetDistribution),
    {
        let paths = self.store.cert_paths(&secrets.domain);
        if !paths.exists() {
            return Err(CertError::NotIssued {
                domain: secrets.domain.clone(),
            });
        }

        let targets: Vec<_> = secrets
            .targets
            .iter()
            .filter(|t| only_host.is_none_or(|host| t.host == host))
            .collect();
        if let Some(host) = only_host
            && targets.is_empty()
        {
            return Err(CertError::UnknownHost {
                host: host.to_string(),
                available: secrets.target_hosts(),
            });
        }

        let (remote_crt, remote_key) = remote_cert_paths(&secrets.domain);
        let mut report = DistributionReport::default();

        for cert_target in targets {
            let target = resolve(&cert_target.host);
            let mut result = TargetDistribution {
                host: cert_target.host.clone(),
                target: target.clone(),
                unreachable: None,
                files: Vec::new(),
                permissions_error: None,
                post_deploy: RestartOutcome::NotConfigured,
            };

            match self.transport.run(&target, REMOTE_SSL_DIRS) {
                Ok(output) if output.success() => {}
                Ok(output) => result.unreachable = Some(output.failure_message()),
                Err(e) => result.unreachable = Some(e.to_string()),
            }

            if result.unreachable.is_none() {
                for (local, remote) in [(&paths.crt, &remote_crt), (&paths.key, &remote_key)] {
                    let status = match self.transport.sync_file(local, &target, remote) {
                        Ok(true) => FileStatus::Updated,
                        Ok(false) => FileStatus::Unchanged,
                        Err(e) => FileStatus::Failed {
                            kind: e.kind(),
                            message: e.to_string(),
                        },
                    };
                    result.files.push((remote.clone(), status));
                }

                let chmod = chmod_command(&remote_crt, &remote_key);
                match self.transport.run(&target, &chmod) {
                    Ok(output) if output.success() => {}
                    Ok(output) => result.permissions_error = Some(output.failure_message()),
                    Err(e) => result.permissions_error = Some(e.to_string()),
                }

                result.post_deploy = self.post_deploy(cert_target.post_deploy.as_deref(), &result);
            } else {
                warn!(host = %cert_target.host, target = %target, "Certificate target unreachable");
            }

            on_report(&result);
            report.targets.push(result);
        }

        Ok(report)
    }

    fn post_deploy(&self, command: Option<&str>, result: &TargetDistribution) -> RestartOutcome {
        let Some(command) = command else {
            return RestartOutcome::NotConfigured;
        };
        if result
            .files
            .iter()
            .any(|(_, s)| matches!(s, FileStatus::Failed { .. }))
        {
            return RestartOutcome::Withheld;
        }
        if !result.changed() {
            return RestartOutcome::NotNeeded;
        }
        match self.transport.run(&result.target, command) {
            Ok(output) if output.success() => RestartOutcome::Ran,
            Ok(output) => RestartOutcome::Failed {
                message: output.failure_message(),
            },
            Err(e) => RestartOutcome::Failed {
                message: e.to_string(),
            },
        }
    }

    /// issue（強制なし）の後、全配布先へ distribute
    pub fn renew<R, F>(
        &self,
        secrets: &CertSecrets,
        now: DateTime<Utc>,
        resolve: R,
        on_report: F,
    ) -> Result<(IssueOutcome, DistributionReport)>
    where
        R: Fn(&str) -> Target,
        F: FnMut(&TargetDistribution),
    {
        let outcome = self.issue(secrets, false, now)?;
        let report = self.distribute(secrets, None, resolve, on_report)?;
        Ok((outcome, report))
    }
}

/// 証明書は 644、秘密鍵は 600
fn chmod_command(remote_crt: &str, remote_key: &str) -> String {
    format!(
        "chmod 644 {} && chmod 600 {}",
        shell_quote(remote_crt),
        shell_quote(remote_key)
    )
}
