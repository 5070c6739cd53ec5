//! secrets フック
//!
//! ファイル同期の後に、テンプレートを通さない生のシークレット
//! （署名鍵や API トークンなど）をリモートへ書き込みます。

use crate::error::{PushError, Result};
use crate::model::{RemotePath, RenderContext, Target, lookup, scalar_to_string};
use crate::remote::RemoteTransport;
use std::fmt;
use tracing::{debug, info};

/// フックの実行結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    Written { remote: String },
    Skipped { reason: String },
    /// 書き込みに失敗した（後続のインスタンスは止めない）
    Failed { message: String },
}

/// 同期後に実行されるシークレット書き込み
///
/// 必須キーの欠落やパスの未解決は `check` でインスタンス解決時に検出する。
/// `apply` のエラーはそのインスタンスの失敗として記録される。
pub trait SecretsHook: fmt::Debug + Send + Sync {
    fn name(&self) -> String;

    /// リモートに触れる前に、このインスタンスで実行できるかを確かめる
    fn check(&self, _context: &RenderContext) -> Result<()> {
        Ok(())
    }

    fn apply(
        &self,
        context: &RenderContext,
        target: &Target,
        transport: &dyn RemoteTransport,
    ) -> Result<HookOutcome>;
}

/// secrets の値を 1 つ、ファイルとして書き込む
#[derive(Debug, Clone)]
pub struct SecretFileHook {
    pub key: String,
    pub remote: RemotePath,
    pub optional: bool,
}

impl SecretFileHook {
    pub fn new(key: impl Into<String>, remote: RemotePath) -> Self {
        Self {
            key: key.into(),
            remote,
            optional: false,
        }
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    fn value(&self, context: &RenderContext) -> Option<String> {
        lookup(context, &self.key)
            .and_then(scalar_to_string)
            .filter(|v| !v.is_empty())
    }

    fn missing(&self) -> PushError {
        PushError::Secret(format!(
            "必須のシークレット `{}` が secrets にありません",
            self.key
        ))
    }
}

impl SecretsHook for SecretFileHook {
    fn name(&self) -> String {
        format!("secret-file {}", self.key)
    }

    fn check(&self, context: &RenderContext) -> Result<()> {
        if self.value(context).is_none() {
            if self.optional {
                return Ok(());
            }
            return Err(self.missing());
        }
        self.remote.resolve(context).map(|_| ())
    }

    fn apply(
        &self,
        context: &RenderContext,
        target: &Target,
        transport: &dyn RemoteTransport,
    ) -> Result<HookOutcome> {
        let Some(content) = self.value(context) else {
            if self.optional {
                debug!(key = %self.key, "Optional secret not present, skipping");
                return Ok(HookOutcome::Skipped {
                    reason: format!("{} が secrets にありません", self.key),
                });
            }
            return Err(self.missing());
        };

        let remote = self.remote.resolve(context)?;
        transport.write_secret(target, &content, &remote)?;
        info!(key = %self.key, target = %target, remote = %remote, "Wrote secret file");

        Ok(HookOutcome::Written { remote })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::CommandOutput;
    use serde_json::json;
    use std::cell::RefCell;
    use std::path::Path;

    #[derive(Default)]
    struct RecordingTransport {
        secrets: RefCell<Vec<(String, String)>>,
    }

    impl RemoteTransport for RecordingTransport {
        fn run(&self, _target: &Target, _command: &str) -> Result<CommandOutput> {
            Ok(CommandOutput::default())
        }

        fn read_file(&self, _target: &Target, _path: &str) -> Result<String> {
            Ok(String::new())
        }

        fn sync_file(&self, _local: &Path, _target: &Target, _remote: &str) -> Result<bool> {
            Ok(false)
        }

        fn write_secret(&self, _target: &Target, content: &str, remote_path: &str) -> Result<()> {
            self.secrets
                .borrow_mut()
                .push((remote_path.to_string(), content.to_string()));
            Ok(())
        }
    }

    fn target() -> Target {
        Target::new("matrix.example.org", 22, "root")
    }

    #[test]
    fn test_writes_secret_to_computed_path() {
        let transport = RecordingTransport::default();
        let hook = SecretFileHook::new(
            "synapse.signing_key",
            RemotePath::parse("/data/{synapse.server_name}.signing.key").unwrap(),
        );
        let ctx = json!({"synapse": {"server_name": "matrix.example.org", "signing_key": "ed25519 a_key"}});

        let outcome = hook.apply(&ctx, &target(), &transport).unwrap();
        assert_eq!(
            outcome,
            HookOutcome::Written {
                remote: "/data/matrix.example.org.signing.key".to_string()
            }
        );
        assert_eq!(
            transport.secrets.borrow().as_slice(),
            &[(
                "/data/matrix.example.org.signing.key".to_string(),
                "ed25519 a_key".to_string()
            )]
        );
    }

    #[test]
    fn test_optional_missing_is_skipped() {
        let transport = RecordingTransport::default();
        let hook = SecretFileHook::new("synapse.signing_key", RemotePath::from("/data/k")).optional(true);

        let outcome = hook.apply(&json!({"synapse": {}}), &target(), &transport).unwrap();
        assert!(matches!(outcome, HookOutcome::Skipped { .. }));
        assert!(transport.secrets.borrow().is_empty());
    }

    #[test]
    fn test_required_missing_is_secret_error() {
        let transport = RecordingTransport::default();
        let hook = SecretFileHook::new("common.cf_api_token", RemotePath::from("/opt/cf_token"));

        let err = hook.apply(&json!({"common": {}}), &target(), &transport).unwrap_err();
        assert!(matches!(err, PushError::Secret(_)));
    }

    #[test]
    fn test_check_reports_missing_key_and_unresolved_path() {
        let required = SecretFileHook::new("common.cf_api_token", RemotePath::from("/opt/cf_token"));
        assert!(matches!(
            required.check(&json!({"common": {}})).unwrap_err(),
            PushError::Secret(_)
        ));

        let computed = SecretFileHook::new(
            "synapse.signing_key",
            RemotePath::parse("/data/{synapse.server_name}.signing.key").unwrap(),
        );
        let err = computed
            .check(&json!({"synapse": {"signing_key": "ed25519 a_key"}}))
            .unwrap_err();
        assert!(matches!(err, PushError::UnresolvedPath { .. }));

        let optional = SecretFileHook::new("synapse.signing_key", RemotePath::from("/data/k")).optional(true);
        assert!(optional.check(&json!({"synapse": {}})).is_ok());
    }
}
