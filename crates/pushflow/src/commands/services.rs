use colored::Colorize;
use pushflow_project::Project;

pub fn handle(project: &Project) -> anyhow::Result<()> {
    println!(
        "プロジェクト: {} {}",
        project.name.cyan().bold(),
        format!("({})", project.root.display()).dimmed()
    );
    println!();

    if project.services.is_empty() {
        println!("{}", "サービスが定義されていません".dimmed());
        return Ok(());
    }

    println!(
        "{}",
        format!("{:<14} {:<8} {:<6} {}", "SERVICE", "MODE", "FILES", "RESTART").bold()
    );
    println!("{}", "─".repeat(60).dimmed());

    for service in &project.services {
        let mode = if service.multi_instance {
            "multi".yellow()
        } else {
            "single".normal()
        };
        let restart = service.restart.as_deref().unwrap_or("-");
        println!(
            "{:<14} {:<8} {:<6} {}",
            service.name.cyan(),
            mode,
            service.files.len(),
            restart.dimmed()
        );
    }

    if !project.hosts.is_empty() {
        println!();
        println!("ホスト: {}個", project.hosts.len());
        for host in &project.hosts {
            println!("  - {} ({})", host.name.cyan(), host.target());
        }
    }

    Ok(())
}
