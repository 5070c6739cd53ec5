use crate::utils::ServiceRuntime;
use pushflow_project::Project;

/// `name<TAB>host` を 1 行ずつ出力する
pub fn handle(project: &Project, service: &str) -> anyhow::Result<()> {
    let spec = project.service_spec(service)?;
    let runtime = ServiceRuntime::without_templates(project, spec)?;

    for (name, target) in runtime.engine().list(&runtime.spec)? {
        println!("{}\t{}", name, target.host);
    }
    Ok(())
}
