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
        for file in engine.render(&runtime.spec, &instance)? {
            println!(
                "{} {}",
                format!("═══ {} ═══", file.artifact).yellow().bold(),
                file.remote_path.dimmed()
            );
            println!("{}", file.content);
        }
    }
    Ok(())
}
