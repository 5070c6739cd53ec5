use crate::utils::{self, ServiceRuntime};
use colored::Colorize;
use pushflow_core::{
    DeployOptions, FileStatus, HookOutcome, InstanceReport, RestartOutcome, RunReport,
};
use pushflow_project::Project;

pub fn handle(
    project: &Project,
    service: &str,
    instance: Option<String>,
    all: bool,
    force: bool,
    no_restart: bool,
) -> anyhow::Result<()> {
    let spec = project.service_spec(service)?;
    let selection = utils::selection(&spec, instance, all)?;
    let runtime = ServiceRuntime::load(project, spec)?;
    let options = DeployOptions::from_flags(force, no_restart);
    let engine = runtime.engine();

    let instances = engine.instances(&runtime.spec, &selection)?;
    let report = engine.deploy_instances(&runtime.spec, &instances, &options, print_instance)?;

    print_summary(&report);
    report.into_result()?;
    Ok(())
}

fn print_instance(report: &InstanceReport) {
    utils::print_instance_header(&report.name, &report.target);

    if let Some(reason) = &report.unreachable {
        println!("  {} unreachable: {}", "✗".red(), reason);
        println!();
        return;
    }

    for file in &report.files {
        match &file.status {
            FileStatus::Updated => println!("  {} {} updated", "→".yellow(), file.artifact),
            FileStatus::Unchanged => println!("  {} {} unchanged", "✓".green(), file.artifact),
            FileStatus::Failed { message, .. } => {
                println!("  {} {} failed: {}", "✗".red(), file.artifact, message)
            }
        }
    }

    for (name, outcome) in &report.hooks {
        match outcome {
            HookOutcome::Written { remote } => {
                println!("  {} {} → {}", "✓".green(), name, remote.dimmed())
            }
            HookOutcome::Skipped { reason } => {
                println!("  {} {} skipped ({})", "-".dimmed(), name, reason)
            }
            HookOutcome::Failed { message } => {
                println!("  {} {} failed: {}", "✗".red(), name, message)
            }
        }
    }

    match &report.restart {
        RestartOutcome::NotConfigured => {}
        RestartOutcome::NotNeeded => {
            println!("  {} no changes, skipping restart", "✓".green())
        }
        RestartOutcome::Ran => println!("  {} restarted", "✓".green()),
        RestartOutcome::Suppressed => {
            println!("  {} restart suppressed (--no-restart)", "!".yellow())
        }
        RestartOutcome::Withheld => println!(
            "  {} restart withheld: {} file(s), {} hook(s) failed",
            "!".yellow(),
            report.failed_files().count(),
            report.failed_hooks().count()
        ),
        RestartOutcome::Failed { message } => {
            println!("  {} restart failed: {}", "✗".red(), message)
        }
    }

    let status = if report.failed() {
        "failed".red().bold()
    } else {
        "done".green().bold()
    };
    println!(
        "  {} ({}/{} changed)",
        status,
        report.changes.changed_count(),
        report.files.len()
    );
    println!();
}

fn print_summary(report: &RunReport) {
    let line = format!(
        "{} instances, {} failed",
        report.total(),
        report.failed_count()
    );
    if report.failed_count() == 0 {
        println!("{}", line.green().bold());
    } else {
        println!("{}", line.red().bold());
    }
}
