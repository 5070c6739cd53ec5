//! PushFlow コア
//!
//! テンプレート化された設定ファイルをリモートホストへ配布し、
//! 内容が実際に変わったときだけサービスを再起動する調停エンジンです。
//!
//! # 構成
//!
//! - [`secrets`]: 暗号化された secrets の復号（sops）
//! - [`template`]: テンプレート展開（Tera）
//! - [`remote`]: SSH / rsync によるリモート操作
//! - [`instance`]: 単一ターゲット / マルチインスタンスの解決
//! - [`engine`]: render → diff → sync → 条件付き restart

pub mod context;
pub mod diff;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod instance;
pub mod model;
pub mod remote;
pub mod secrets;
pub mod template;

pub use context::{ContextBuilder, InstanceScoped, PassThrough};
pub use diff::unified_diff;
pub use engine::{
    ChangeSet, DeployOptions, Engine, FileDiff, FileOutcome, FileStatus, InstanceReport,
    RenderedFile, RestartMode, RestartOutcome, RunReport,
};
pub use error::{ErrorKind, PushError, Result};
pub use hooks::{HookOutcome, SecretFileHook, SecretsHook};
pub use instance::{InstanceResolver, ResolvedInstance, Selection};
pub use model::{FieldPath, FileSpec, PathResolver, RemotePath, Secrets, ServiceSpec, Target};
pub use remote::{CommandOutput, RemoteTransport, SshTransport};
pub use secrets::{SecretsProvider, SopsProvider};
pub use template::{TemplateRenderer, TeraRenderer};
