//! service 定義から ServiceSpec への変換

use crate::error::{ProjectError, Result};
use crate::model::{ContextKind, Project, ServiceDef};
use pushflow_core::{InstanceScoped, PassThrough, RemotePath, SecretFileHook, ServiceSpec};
use std::sync::Arc;

impl Project {
    /// 名前を指定して ServiceSpec を組み立てる
    pub fn service_spec(&self, name: &str) -> Result<ServiceSpec> {
        let def = self.service(name)?;
        build_service_spec(self, def)
    }
}

/// ServiceDef を、プロジェクトルート基準の絶対パスを持つ ServiceSpec にする
pub fn build_service_spec(project: &Project, def: &ServiceDef) -> Result<ServiceSpec> {
    let mut spec = ServiceSpec::new(
        def.name.clone(),
        project.resolve_path(&def.templates),
        project.resolve_path(&def.secrets),
    )
    .multi_instance(def.multi_instance);

    spec = match def.context_kind() {
        ContextKind::Secrets => spec.with_context_builder(Arc::new(PassThrough)),
        ContextKind::Instance => spec.with_context_builder(Arc::new(InstanceScoped)),
    };

    for dir in &def.setup_dirs {
        spec = spec.setup_dir(dir.clone());
    }

    for file in &def.files {
        let remote = parse_remote(&def.name, &file.remote)?;
        spec = spec.file(file.template.clone(), remote);
    }

    if let Some(restart) = &def.restart {
        spec = spec.restart(restart.clone());
    }

    for secret in &def.secret_files {
        let remote = parse_remote(&def.name, &secret.remote)?;
        let hook = SecretFileHook::new(secret.key.clone(), remote).optional(secret.optional);
        spec = spec.secrets_hook(Arc::new(hook));
    }

    spec.validate()
        .map_err(|e| ProjectError::InvalidConfig(e.to_string()))?;
    Ok(spec)
}

fn parse_remote(service: &str, pattern: &str) -> Result<RemotePath> {
    RemotePath::parse(pattern).map_err(|e| {
        ProjectError::InvalidConfig(format!(
            "サービス '{}' の remote \"{}\" が不正です: {}",
            service, pattern, e
        ))
    })
}
