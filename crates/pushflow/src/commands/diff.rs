use crate::utils::{self, ServiceRuntime};
use colored::Colorize;
use pushflow_project::Project;

pub fn handle(
    project: &Project,
    service: &str,
    instance: Option<String>,
    all: bool,
) -> anyhow::Result<()> {
    let spec = project.service_spec(service)?;
    let selection = utils::selection(&spec, instance, all)?;
    let runtime = ServiceRuntime::load(project, spec)?;
    let engine = runtime.engine();

    for instance in engine.instances(&runtime.spec, &selection)? {
        utils::print_instance_header(&instance.name, &instance.target);

        let diffs = engine.diff(&runtime.spec, &instance)?;
        let differing = diffs.iter().filter(|d| d.changed()).count();
        for diff in &diffs {
            if diff.changed() {
                println!("{} {}: 差分あり", "→".yellow(), diff.remote_path);
                print_colored_diff(&diff.unified());
            } else {
                println!("{} {}: 変更なし", "✓".green(), diff.remote_path);
            }
        }
        println!("  {}/{} ファイルに差分", differing, diffs.len());
        println!();
    }
    Ok(())
}

fn print_colored_diff(unified: &str) {
    for line in unified.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            println!("{}", line.bold());
        } else if line.starts_with('+') {
            println!("{}", line.green());
        } else if line.starts_with('-') {
            println!("{}", line.red());
        } else if line.starts_with("@@") {
            println!("{}", line.cyan());
        } else {
            println!("{}", line);
        }
    }
}
