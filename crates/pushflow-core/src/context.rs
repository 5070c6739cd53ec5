//! レンダリングコンテキストの組み立て

use crate::error::{PushError, Result};
use crate::model::{RenderContext, Secrets};
use serde_json::{Map, Value};
use std::fmt;

/// secrets からインスタンスごとのコンテキストを作る
///
/// `instance` は単一ターゲットのサービスでは `None`。
pub trait ContextBuilder: fmt::Debug + Send + Sync {
    fn build(&self, secrets: &Secrets, instance: Option<&str>) -> Result<RenderContext>;
}

/// secrets をそのまま渡す
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl ContextBuilder for PassThrough {
    fn build(&self, secrets: &Secrets, _instance: Option<&str>) -> Result<RenderContext> {
        Ok(secrets.clone())
    }
}

/// `common` と対象インスタンスだけを含むコンテキスト
///
/// ```text
/// { "common": ..., "instance": ..., "instance_name": "edge-1" }
/// ```
///
/// 他のインスタンスの値は含まれない。
#[derive(Debug, Clone, Copy, Default)]
pub struct InstanceScoped;

impl ContextBuilder for InstanceScoped {
    fn build(&self, secrets: &Secrets, instance: Option<&str>) -> Result<RenderContext> {
        let name = instance.ok_or_else(|| {
            PushError::InvalidConfig(
                "instance コンテキストはマルチインスタンスのサービスでのみ使えます".to_string(),
            )
        })?;

        let data = secrets
            .get("instances")
            .and_then(|instances| instances.get(name))
            .cloned()
            .ok_or_else(|| PushError::InstanceNotFound {
                name: name.to_string(),
                available: instance_names(secrets),
            })?;

        let common = secrets
            .get("common")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));

        let mut ctx = Map::new();
        ctx.insert("common".to_string(), common);
        ctx.insert("instance".to_string(), data);
        ctx.insert("instance_name".to_string(), Value::String(name.to_string()));
        Ok(Value::Object(ctx))
    }
}

/// `instances` のキー一覧（記述順）
pub fn instance_names(secrets: &Secrets) -> Vec<String> {
    secrets
        .get("instances")
        .and_then(Value::as_object)
        .map(|instances| instances.keys().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fleet() -> Secrets {
        json!({
            "common": {"cf_email": "ops@example.org"},
            "instances": {
                "edge-1": {"domain": "edge1.example.org", "token": "alpha-secret"},
                "edge-2": {"domain": "edge2.example.org", "token": "bravo-secret"}
            }
        })
    }

    #[test]
    fn test_pass_through() {
        let secrets = json!({"ssh": {"host": "h"}});
        assert_eq!(PassThrough.build(&secrets, None).unwrap(), secrets);
    }

    #[test]
    fn test_instance_scoped_isolates_other_instances() {
        let ctx = InstanceScoped.build(&fleet(), Some("edge-1")).unwrap();
        let rendered = ctx.to_string();

        assert_eq!(ctx["instance"]["domain"], "edge1.example.org");
        assert_eq!(ctx["common"]["cf_email"], "ops@example.org");
        assert_eq!(ctx["instance_name"], "edge-1");
        assert!(!rendered.contains("bravo-secret"));
        assert!(!rendered.contains("edge-2"));
    }

    #[test]
    fn test_instance_scoped_unknown_instance() {
        let err = InstanceScoped.build(&fleet(), Some("edge-3")).unwrap_err();
        match err {
            PushError::InstanceNotFound { name, available } => {
                assert_eq!(name, "edge-3");
                assert_eq!(available, vec!["edge-1", "edge-2"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_instance_names_keeps_declaration_order() {
        let secrets = json!({"instances": {"zeta": {}, "alpha": {}, "mid": {}}});
        assert_eq!(instance_names(&secrets), vec!["zeta", "alpha", "mid"]);
    }
}
