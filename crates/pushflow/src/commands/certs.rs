use colored::Colorize;
use pushflow_certs::{
    CertManager, CertSecrets, CertState, CertStore, DistributionReport, IssueOutcome, LegoIssuer,
    OpensslInspector, RenewalPolicy, TargetDistribution,
};
use pushflow_core::{FileStatus, RestartOutcome, SecretsProvider, SopsProvider, SshTransport};
use pushflow_project::Project;

/// certs コマンドで使う協調オブジェクト
struct CertsRuntime {
    secrets: CertSecrets,
    store: CertStore,
    policy: RenewalPolicy,
    inspector: OpensslInspector,
    issuer: LegoIssuer,
    transport: SshTransport,
}

impl CertsRuntime {
    fn load(project: &Project) -> anyhow::Result<Self> {
        let certs = project.certs()?;
        let decrypted = SopsProvider::new().decrypt(&project.resolve_path(&certs.secrets))?;
        let secrets = CertSecrets::from_value(decrypted)?;
        let store = CertStore::new(project.resolve_path(&certs.store));

        Ok(Self {
            issuer: LegoIssuer::new(store.lego_dir(), certs.doh_port),
            secrets,
            store,
            policy: RenewalPolicy::new(certs.renew_days),
            inspector: OpensslInspector,
            transport: SshTransport::new(project.ssh.connect_timeout),
        })
    }

    fn manager(&self) -> CertManager<'_> {
        CertManager::new(
            self.store.clone(),
            self.policy,
            &self.inspector,
            &self.issuer,
            &self.transport,
        )
    }
}

pub fn handle_status(project: &Project) -> anyhow::Result<()> {
    let runtime = CertsRuntime::load(project)?;
    let status = runtime.manager().status(&runtime.secrets, chrono::Utc::now());

    println!();
    println!("  domains:  {}", status.domains.join(", ").cyan());
    match status.state {
        CertState::Expires(expiry) => {
            let days = status.days_left.unwrap_or_default();
            let icon = if status.expiring { "⚠️ " } else { "✅" };
            let days_text = format!("{} days left", days);
            let days_text = if status.expiring {
                days_text.yellow()
            } else {
                days_text.green()
            };
            println!(
                "  status:   {} {} ({} UTC)",
                icon,
                days_text,
                expiry.format("%Y-%m-%d %H:%M")
            );
        }
        CertState::Unreadable => println!("  status:   ❌ {}", "unreadable".red()),
        CertState::Missing => println!("  status:   ❌ {}", "not issued".red()),
    }
    println!("  targets:  {}", status.targets.join(", "));
    println!();
    Ok(())
}

pub fn handle_issue(project: &Project, force: bool) -> anyhow::Result<()> {
    let runtime = CertsRuntime::load(project)?;
    let outcome = runtime
        .manager()
        .issue(&runtime.secrets, force, chrono::Utc::now())?;
    print_issue_outcome(&outcome);
    Ok(())
}

pub fn handle_distribute(project: &Project, host: Option<&str>) -> anyhow::Result<()> {
    let runtime = CertsRuntime::load(project)?;
    let report = runtime.manager().distribute(
        &runtime.secrets,
        host,
        |name| project.host_target(name),
        print_target,
    )?;
    print_summary(&report);
    report.into_result()?;
    Ok(())
}

pub fn handle_renew(project: &Project) -> anyhow::Result<()> {
    let runtime = CertsRuntime::load(project)?;
    let (outcome, report) = runtime.manager().renew(
        &runtime.secrets,
        chrono::Utc::now(),
        |name| project.host_target(name),
        print_target,
    )?;
    print_issue_outcome(&outcome);
    print_summary(&report);
    report.into_result()?;
    Ok(())
}

fn print_issue_outcome(outcome: &IssueOutcome) {
    match outcome {
        IssueOutcome::Skipped { .. } => println!("{} {}", "✓".green(), outcome),
        IssueOutcome::Issued { .. } => println!("{} {}", "✓".green().bold(), outcome),
    }
}

fn print_target(result: &TargetDistribution) {
    println!();
    println!(
        "{}",
        format!("── {} ({}) ──", result.host, result.target).cyan().bold()
    );

    if let Some(reason) = &result.unreachable {
        println!("  {} unreachable: {}", "✗".red(), reason);
        return;
    }

    for (remote, status) in &result.files {
        match status {
            FileStatus::Updated => println!("  {} {} updated", "→".yellow(), remote),
            FileStatus::Unchanged => println!("  {} {} unchanged", "✓".green(), remote),
            FileStatus::Failed { message, .. } => {
                println!("  {} {} failed: {}", "✗".red(), remote, message)
            }
        }
    }

    if let Some(reason) = &result.permissions_error {
        println!("  {} chmod failed: {}", "✗".red(), reason);
    }

    match &result.post_deploy {
        RestartOutcome::Ran => println!("  {} post-deploy done", "✓".green()),
        RestartOutcome::Failed { message } => {
            println!("  {} post-deploy failed: {}", "✗".red(), message)
        }
        RestartOutcome::Withheld => println!("  {} post-deploy withheld", "!".yellow()),
        _ if !result.changed() => println!("  {} no changes", "✓".green()),
        _ => {}
    }
}

fn print_summary(report: &DistributionReport) {
    println!();
    let line = format!(
        "{} targets, {} failed",
        report.targets.len(),
        report.failed_count()
    );
    if report.failed_count() == 0 {
        println!("{}", line.green().bold());
    } else {
        println!("{}", line.red().bold());
    }
}
