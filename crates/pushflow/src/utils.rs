use colored::Colorize;
use pushflow_certs::CertError;
use pushflow_config::ConfigError;
use pushflow_core::{
    ErrorKind, PushError, Selection, ServiceSpec, SopsProvider, SshTransport, Target, TeraRenderer,
};
use pushflow_project::{Project, ProjectError};
use std::path::Path;

/// プロジェクトファイルを探して読み込む
///
/// `--project` / `PUSHFLOW_PROJECT` が指定されていればそれを使う。
pub fn load_project(explicit: Option<&Path>) -> anyhow::Result<Project> {
    let path = match explicit {
        Some(path) => pushflow_config::resolve_explicit(path)?,
        None => pushflow_config::find_project_file()?,
    };
    // 相対パスの基準をプロセスの状態から切り離す
    let path = path.canonicalize().unwrap_or(path);

    tracing::debug!(path = %path.display(), "Loading project file");
    Ok(pushflow_project::parse_project_file(&path)?)
}

/// インスタンスの指定を Selection にする
///
/// マルチインスタンスのサービスはインスタンス名か `--all` が必要。
pub fn selection(
    spec: &ServiceSpec,
    instance: Option<String>,
    all: bool,
) -> anyhow::Result<Selection> {
    match (instance, all) {
        (Some(name), _) if spec.multi_instance => Ok(Selection::Named(name)),
        (Some(name), _) => Err(PushError::InvalidConfig(format!(
            "サービス '{}' は単一ターゲットです（インスタンス '{}' は指定できません）",
            spec.name, name
        ))
        .into()),
        (None, true) => Ok(Selection::All),
        (None, false) if spec.multi_instance => Err(PushError::InvalidConfig(format!(
            "サービス '{}' はマルチインスタンスです。インスタンス名か --all を指定してください\nヒント: pushflow list {}",
            spec.name, spec.name
        ))
        .into()),
        (None, false) => Ok(Selection::All),
    }
}

/// サービスごとの協調オブジェクト
pub struct ServiceRuntime {
    pub spec: ServiceSpec,
    pub secrets: SopsProvider,
    pub renderer: TeraRenderer,
    pub transport: SshTransport,
}

impl ServiceRuntime {
    pub fn load(project: &Project, spec: ServiceSpec) -> anyhow::Result<Self> {
        let renderer = TeraRenderer::from_dir(&spec.templates_dir)?;
        Ok(Self::with_renderer(project, spec, renderer))
    }

    /// テンプレートを読み込まない（`list` 用）
    pub fn without_templates(project: &Project, spec: ServiceSpec) -> anyhow::Result<Self> {
        let renderer = TeraRenderer::from_raw(std::iter::empty::<(&str, &str)>())?;
        Ok(Self::with_renderer(project, spec, renderer))
    }

    fn with_renderer(project: &Project, spec: ServiceSpec, renderer: TeraRenderer) -> Self {
        Self {
            spec,
            secrets: SopsProvider::new(),
            renderer,
            transport: SshTransport::new(project.ssh.connect_timeout),
        }
    }

    pub fn engine(&self) -> pushflow_core::Engine<'_> {
        pushflow_core::Engine::new(&self.secrets, &self.renderer, &self.transport)
    }
}

/// インスタンスの見出し
pub fn print_instance_header(name: &str, target: &Target) {
    println!(
        "{} {} {}",
        "==>".cyan().bold(),
        name.bold(),
        format!("({})", target).dimmed()
    );
}

/// エラーから終了コードを決める
///
/// 0 成功または変更なし / 1 その他 / 2 設定 / 3 secrets / 4 レンダリング / 5 転送
pub fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<PushError>() {
            return e.kind().exit_code();
        }
        if let Some(e) = cause.downcast_ref::<CertError>() {
            return e.kind().exit_code();
        }
        if let Some(e) = cause.downcast_ref::<ProjectError>() {
            return e.kind().exit_code();
        }
        if let Some(e) = cause.downcast_ref::<ConfigError>() {
            return match e {
                ConfigError::Io(_) => ErrorKind::Io.exit_code(),
                _ => ErrorKind::Configuration.exit_code(),
            };
        }
    }
    ErrorKind::Io.exit_code()
}
