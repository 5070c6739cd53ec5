//! 調停エンジン
//!
//! render → diff → sync → 条件付き restart を、1 つ以上のインスタンスに対して
//! 順番に実行します。変更の有無は毎回リモートの内容との比較で求め、
//! 状態はどこにも保存しません。

use crate::diff::unified_diff;
use crate::error::{ErrorKind, PushError, Result};
use crate::hooks::HookOutcome;
use crate::instance::{InstanceResolver, ResolvedInstance, Selection};
use crate::model::{ServiceSpec, Target};
use crate::remote::{RemoteTransport, mkdir_command};
use crate::secrets::SecretsProvider;
use crate::template::TemplateRenderer;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// restart の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartMode {
    /// 変更があったときだけ
    #[default]
    OnChange,
    /// 変更がなくても実行（`--force`）
    Always,
    /// 実行しない（`--no-restart`）
    Never,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeployOptions {
    pub restart: RestartMode,
}

impl DeployOptions {
    /// CLI フラグから組み立てる（`--no-restart` が優先）
    pub fn from_flags(force: bool, no_restart: bool) -> Self {
        let restart = if no_restart {
            RestartMode::Never
        } else if force {
            RestartMode::Always
        } else {
            RestartMode::OnChange
        };
        Self { restart }
    }
}

/// レンダリング結果
#[derive(Debug, Clone)]
pub struct RenderedFile {
    pub template: String,
    pub artifact: String,
    pub remote_path: String,
    pub content: String,
}

/// リモートとの比較結果
#[derive(Debug, Clone)]
pub struct FileDiff {
    pub template: String,
    pub remote_path: String,
    pub current: String,
    pub rendered: String,
}

impl FileDiff {
    pub fn changed(&self) -> bool {
        self.current != self.rendered
    }

    pub fn unified(&self) -> String {
        unified_diff(&self.remote_path, &self.current, &self.rendered)
    }
}

/// 1 回のデプロイでのファイルごとの変更フラグ
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    entries: Vec<(String, bool)>,
}

impl ChangeSet {
    pub fn record(&mut self, remote_path: impl Into<String>, changed: bool) {
        self.entries.push((remote_path.into(), changed));
    }

    pub fn any_changed(&self) -> bool {
        self.entries.iter().any(|(_, changed)| *changed)
    }

    pub fn changed_count(&self) -> usize {
        self.entries.iter().filter(|(_, changed)| *changed).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Updated,
    Unchanged,
    Failed { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub template: String,
    pub artifact: String,
    pub remote_path: String,
    pub status: FileStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    /// restart コマンドが定義されていない
    NotConfigured,
    /// 変更がないため不要
    NotNeeded,
    Ran,
    /// `--no-restart` により抑止
    Suppressed,
    /// 失敗したファイルかフックがあるため保留
    Withheld,
    Failed { message: String },
}

/// 1 インスタンス分のデプロイ結果
#[derive(Debug, Clone)]
pub struct InstanceReport {
    pub name: String,
    pub target: Target,
    /// 接続確認（setup-dir の作成）に失敗した場合の理由
    pub unreachable: Option<String>,
    pub files: Vec<FileOutcome>,
    pub changes: ChangeSet,
    pub hooks: Vec<(String, HookOutcome)>,
    pub restart: RestartOutcome,
}

impl InstanceReport {
    fn new(instance: &ResolvedInstance) -> Self {
        Self {
            name: instance.name.clone(),
            target: instance.target.clone(),
            unreachable: None,
            files: Vec::new(),
            changes: ChangeSet::default(),
            hooks: Vec::new(),
            restart: RestartOutcome::NotConfigured,
        }
    }

    pub fn failed_files(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files
            .iter()
            .filter(|f| matches!(f.status, FileStatus::Failed { .. }))
    }

    pub fn failed_hooks(&self) -> impl Iterator<Item = (&str, &str)> {
        self.hooks.iter().filter_map(|(name, outcome)| match outcome {
            HookOutcome::Failed { message } => Some((name.as_str(), message.as_str())),
            _ => None,
        })
    }

    pub fn failed(&self) -> bool {
        self.unreachable.is_some()
            || self.failed_files().next().is_some()
            || self.failed_hooks().next().is_some()
            || matches!(self.restart, RestartOutcome::Failed { .. })
    }

    /// 失敗をエラーとして表す（成功なら None）
    pub fn error(&self) -> Option<PushError> {
        if let Some(reason) = &self.unreachable {
            return Some(PushError::Transport {
                target: self.target.to_string(),
                message: reason.clone(),
            });
        }
        if let Some(file) = self.failed_files().next()
            && let FileStatus::Failed { kind, message } = &file.status
        {
            return Some(match kind {
                ErrorKind::Render => PushError::TemplateError {
                    template: file.template.clone(),
                    message: message.clone(),
                },
                _ => PushError::Transport {
                    target: self.target.to_string(),
                    message: format!("{}: {}", file.remote_path, message),
                },
            });
        }
        if let Some((name, message)) = self.failed_hooks().next() {
            return Some(PushError::Transport {
                target: self.target.to_string(),
                message: format!("{}: {}", name, message),
            });
        }
        if let RestartOutcome::Failed { message } = &self.restart {
            return Some(PushError::Transport {
                target: self.target.to_string(),
                message: format!("restart 失敗: {}", message),
            });
        }
        None
    }
}

/// 複数インスタンスの実行結果
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub instances: Vec<InstanceReport>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.instances.len()
    }

    pub fn failed_count(&self) -> usize {
        self.instances.iter().filter(|r| r.failed()).count()
    }

    pub fn changed_count(&self) -> usize {
        self.instances
            .iter()
            .filter(|r| r.changes.any_changed())
            .count()
    }

    /// 全体の結果をエラーに変換する
    ///
    /// 単一インスタンスなら元のエラーをそのまま、複数なら集計した `PartialFailure` を返す。
    pub fn into_result(self) -> Result<RunReport> {
        let failed = self.failed_count();
        if failed == 0 {
            return Ok(self);
        }
        if self.total() == 1
            && let Some(err) = self.instances.first().and_then(InstanceReport::error)
        {
            return Err(err);
        }
        Err(PushError::PartialFailure {
            failed,
            total: self.total(),
        })
    }
}

/// 調停エンジン
///
/// サービスごとのレンダラーと、共通の secrets / transport を組み合わせて使う。
pub struct Engine<'a> {
    secrets: &'a dyn SecretsProvider,
    renderer: &'a dyn TemplateRenderer,
    transport: &'a dyn RemoteTransport,
}

impl<'a> Engine<'a> {
    pub fn new(
        secrets: &'a dyn SecretsProvider,
        renderer: &'a dyn TemplateRenderer,
        transport: &'a dyn RemoteTransport,
    ) -> Self {
        Self {
            secrets,
            renderer,
            transport,
        }
    }

    /// secrets を復号し、選択されたインスタンスを解決する
    ///
    /// リモートパスと secrets フックの必須キーも含めて全インスタンス分を解決し、
    /// どれか 1 つでも失敗すればリモートに触れる前にエラーを返す。
    pub fn instances(
        &self,
        spec: &ServiceSpec,
        selection: &Selection,
    ) -> Result<Vec<ResolvedInstance>> {
        spec.validate()?;
        let secrets = self.secrets.decrypt(&spec.secrets_path)?;
        InstanceResolver::new(spec, &secrets).resolve_selection(selection)
    }

    /// 全インスタンスの名前と接続先
    pub fn list(&self, spec: &ServiceSpec) -> Result<Vec<(String, Target)>> {
        Ok(self
            .instances(spec, &Selection::All)?
            .into_iter()
            .map(|instance| (instance.name, instance.target))
            .collect())
    }

    /// テンプレートを展開する（副作用なし）
    pub fn render(
        &self,
        spec: &ServiceSpec,
        instance: &ResolvedInstance,
    ) -> Result<Vec<RenderedFile>> {
        spec.files
            .iter()
            .zip(&instance.remote_paths)
            .map(|(file, remote_path)| {
                let content = self.renderer.render(&file.template, &instance.context)?;
                Ok(RenderedFile {
                    template: file.template.clone(),
                    artifact: file.artifact_name().to_string(),
                    remote_path: remote_path.clone(),
                    content,
                })
            })
            .collect()
    }

    /// レンダリング結果とリモートの現在の内容を比較する（読み取りのみ）
    pub fn diff(&self, spec: &ServiceSpec, instance: &ResolvedInstance) -> Result<Vec<FileDiff>> {
        let rendered = self.render(spec, instance)?;

        Ok(rendered
            .into_iter()
            .map(|file| {
                let current = self
                    .transport
                    .read_file(&instance.target, &file.remote_path)
                    .unwrap_or_else(|e| {
                        warn!(
                            target = %instance.target,
                            remote_path = %file.remote_path,
                            error = %e,
                            "Could not read remote file, treating as empty"
                        );
                        String::new()
                    });
                FileDiff {
                    template: file.template,
                    remote_path: file.remote_path,
                    current,
                    rendered: file.content,
                }
            })
            .collect())
    }

    /// 1 インスタンスへデプロイする
    ///
    /// 到達不能・ファイル単位の失敗はレポートに記録して `Ok` を返す。
    /// `instance` は [`Engine::instances`] で解決済みのものを渡す。
    #[tracing::instrument(skip_all, fields(service = %spec.name, instance = %instance.name))]
    pub fn deploy(
        &self,
        spec: &ServiceSpec,
        instance: &ResolvedInstance,
        options: &DeployOptions,
    ) -> Result<InstanceReport> {
        let target = &instance.target;
        let mut report = InstanceReport::new(instance);

        // 1. setup-dir（接続確認を兼ねる）
        let preflight = mkdir_command(&spec.setup_dirs);
        match self.transport.run(target, &preflight) {
            Ok(output) if output.success() => {}
            Ok(output) => {
                warn!(target = %target, reason = %output.failure_message(), "Target unreachable");
                report.unreachable = Some(output.failure_message());
                return Ok(report);
            }
            Err(e) => {
                warn!(target = %target, error = %e, "Target unreachable");
                report.unreachable = Some(e.to_string());
                return Ok(report);
            }
        }

        // 2. ファイルごとに render → sync
        let workdir = tempfile::tempdir()?;
        for (index, (file, remote_path)) in spec.files.iter().zip(&instance.remote_paths).enumerate() {
            let status = match self.renderer.render(&file.template, &instance.context) {
                Err(e) => {
                    warn!(template = %file.template, error = %e, "Render failed");
                    FileStatus::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    }
                }
                Ok(content) => {
                    let local: PathBuf = workdir
                        .path()
                        .join(format!("{:02}-{}", index, file.artifact_name()));
                    match std::fs::write(&local, content)
                        .map_err(|e| PushError::IoError {
                            path: local.clone(),
                            message: e.to_string(),
                        })
                        .and_then(|_| self.transport.sync_file(&local, target, remote_path))
                    {
                        Ok(true) => FileStatus::Updated,
                        Ok(false) => FileStatus::Unchanged,
                        Err(e) => {
                            warn!(target = %target, remote_path = %remote_path, error = %e, "Sync failed");
                            FileStatus::Failed {
                                kind: e.kind(),
                                message: e.to_string(),
                            }
                        }
                    }
                }
            };

            match status {
                FileStatus::Updated => report.changes.record(remote_path.clone(), true),
                FileStatus::Unchanged => report.changes.record(remote_path.clone(), false),
                FileStatus::Failed { .. } => {}
            }
            debug!(remote_path = %remote_path, status = ?status, "File processed");

            report.files.push(FileOutcome {
                template: file.template.clone(),
                artifact: file.artifact_name().to_string(),
                remote_path: remote_path.clone(),
                status,
            });
        }

        // 3. secrets フック（変更の有無に関係なく実行）
        for hook in &spec.secrets_hooks {
            let outcome = hook
                .apply(&instance.context, target, self.transport)
                .unwrap_or_else(|e| {
                    warn!(target = %target, hook = %hook.name(), error = %e, "Secrets hook failed");
                    HookOutcome::Failed {
                        message: e.to_string(),
                    }
                });
            report.hooks.push((hook.name(), outcome));
        }

        // 4. restart
        report.restart = self.restart(spec, target, &report, options.restart);

        info!(
            target = %target,
            changed = report.changes.changed_count(),
            failed = report.failed_files().count(),
            restart = ?report.restart,
            "Deploy finished"
        );

        Ok(report)
    }

    fn restart(
        &self,
        spec: &ServiceSpec,
        target: &Target,
        report: &InstanceReport,
        mode: RestartMode,
    ) -> RestartOutcome {
        let Some(cmd) = &spec.restart_cmd else {
            return RestartOutcome::NotConfigured;
        };

        let changed = report.changes.any_changed();
        match mode {
            RestartMode::Never if changed => return RestartOutcome::Suppressed,
            RestartMode::Never => return RestartOutcome::NotNeeded,
            _ => {}
        }
        if report.failed_files().next().is_some() || report.failed_hooks().next().is_some() {
            return RestartOutcome::Withheld;
        }
        if !changed && mode != RestartMode::Always {
            return RestartOutcome::NotNeeded;
        }

        info!(target = %target, command = %cmd, "Restarting service");
        match self.transport.run(target, cmd) {
            Ok(output) if output.success() => RestartOutcome::Ran,
            Ok(output) => RestartOutcome::Failed {
                message: output.failure_message(),
            },
            Err(e) => RestartOutcome::Failed {
                message: e.to_string(),
            },
        }
    }

    /// 複数インスタンスへ順番にデプロイする
    ///
    /// あるインスタンスの失敗は後続のインスタンスを止めない。
    /// 各インスタンスの完了ごとに `on_report` が呼ばれる。
    pub fn deploy_instances<F>(
        &self,
        spec: &ServiceSpec,
        instances: &[ResolvedInstance],
        options: &DeployOptions,
        mut on_report: F,
    ) -> Result<RunReport>
    where
        F: FnMut(&InstanceReport),
    {
        let mut run = RunReport::default();
        for instance in instances {
            let report = self.deploy(spec, instance, options)?;
            on_report(&report);
            run.instances.push(report);
        }

        info!(
            service = %spec.name,
            total = run.total(),
            failed = run.failed_count(),
            "Run finished"
        );
        Ok(run)
    }
}
