//! サービス定義とデプロイ先のデータモデル

use crate::context::{ContextBuilder, InstanceScoped, PassThrough};
use crate::error::{PushError, Result};
use crate::hooks::SecretsHook;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// 復号済み secrets（YAML をそのまま JSON 値として保持）
pub type Secrets = serde_json::Value;

/// テンプレートに渡すコンテキスト
pub type RenderContext = serde_json::Value;

/// ドット区切りのパスで値を引く（`common.ssh_user` など）
pub fn lookup<'a>(value: &'a serde_json::Value, dotted: &str) -> Option<&'a serde_json::Value> {
    dotted
        .split('.')
        .try_fold(value, |current, key| current.as_object()?.get(key))
}

/// スカラー値を文字列として取り出す（null / object / array は None）
pub fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// デプロイ先
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub user: String,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
        }
    }

    /// SSH の接続先（`user@host`）
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// コンテキストからリモートパスを計算する
pub trait PathResolver: fmt::Debug + Send + Sync {
    fn resolve(&self, context: &RenderContext) -> Result<String>;
}

/// 配置先パス
#[derive(Debug, Clone)]
pub enum RemotePath {
    Literal(String),
    Computed(Arc<dyn PathResolver>),
}

impl RemotePath {
    /// `{field.path}` を含む文字列なら Computed、そうでなければ Literal
    pub fn parse(pattern: &str) -> Result<Self> {
        let field_path = FieldPath::parse(pattern)?;
        if field_path.has_fields() {
            Ok(RemotePath::Computed(Arc::new(field_path)))
        } else {
            Ok(RemotePath::Literal(pattern.to_string()))
        }
    }

    pub fn resolve(&self, context: &RenderContext) -> Result<String> {
        let path = match self {
            RemotePath::Literal(path) => path.clone(),
            RemotePath::Computed(resolver) => resolver.resolve(context)?,
        };
        if path.trim().is_empty() {
            return Err(PushError::InvalidConfig(
                "リモートパスが空です".to_string(),
            ));
        }
        Ok(path)
    }
}

impl From<&str> for RemotePath {
    fn from(path: &str) -> Self {
        RemotePath::Literal(path.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// `{synapse.server_name}` のようなプレースホルダを secrets の値で置き換えるパス
#[derive(Debug, Clone)]
pub struct FieldPath {
    pattern: String,
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn parse(pattern: &str) -> Result<Self> {
        let re = regex::Regex::new(r"\{([A-Za-z0-9_.\-]+)\}")
            .map_err(|e| PushError::InvalidConfig(format!("正規表現のコンパイルエラー: {}", e)))?;

        let mut segments = Vec::new();
        let mut last_end = 0;
        for cap in re.captures_iter(pattern) {
            let (Some(whole), Some(field)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            if whole.start() > last_end {
                segments.push(Segment::Literal(pattern[last_end..whole.start()].to_string()));
            }
            segments.push(Segment::Field(field.as_str().to_string()));
            last_end = whole.end();
        }
        if last_end < pattern.len() {
            segments.push(Segment::Literal(pattern[last_end..].to_string()));
        }

        Ok(Self {
            pattern: pattern.to_string(),
            segments,
        })
    }

    pub fn has_fields(&self) -> bool {
        !self.fields().is_empty()
    }

    /// 参照しているフィールド名の一覧
    fn fields(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Field(field) => Some(field.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }
}

impl PathResolver for FieldPath {
    fn resolve(&self, context: &RenderContext) -> Result<String> {
        let mut resolved = String::with_capacity(self.pattern.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => resolved.push_str(text),
                Segment::Field(field) => {
                    let value = lookup(context, field)
                        .and_then(scalar_to_string)
                        .filter(|s| !s.is_empty())
                        .ok_or_else(|| PushError::UnresolvedPath {
                            pattern: self.pattern.clone(),
                            field: field.clone(),
                        })?;
                    resolved.push_str(&value);
                }
            }
        }
        Ok(resolved)
    }
}

/// テンプレートと配置先の組
#[derive(Debug, Clone)]
pub struct FileSpec {
    pub template: String,
    pub remote: RemotePath,
}

impl FileSpec {
    pub fn new(template: impl Into<String>, remote: impl Into<RemotePath>) -> Self {
        Self {
            template: template.into(),
            remote: remote.into(),
        }
    }

    /// ローカルに書き出すときのファイル名（最後の拡張子を外す）
    ///
    /// `traefik.yml.tera` → `traefik.yml`
    pub fn artifact_name(&self) -> &str {
        let base = self
            .template
            .rsplit('/')
            .next()
            .unwrap_or(self.template.as_str());
        match base.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => base,
        }
    }
}

/// デプロイ可能なサービスの定義（不変）
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub templates_dir: PathBuf,
    pub secrets_path: PathBuf,
    pub files: Vec<FileSpec>,
    pub setup_dirs: Vec<String>,
    pub restart_cmd: Option<String>,
    pub multi_instance: bool,
    context_builder: Option<Arc<dyn ContextBuilder>>,
    pub secrets_hooks: Vec<Arc<dyn SecretsHook>>,
}

impl ServiceSpec {
    pub fn new(
        name: impl Into<String>,
        templates_dir: impl Into<PathBuf>,
        secrets_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            templates_dir: templates_dir.into(),
            secrets_path: secrets_path.into(),
            files: Vec::new(),
            setup_dirs: Vec::new(),
            restart_cmd: None,
            multi_instance: false,
            context_builder: None,
            secrets_hooks: Vec::new(),
        }
    }

    pub fn file(mut self, template: impl Into<String>, remote: impl Into<RemotePath>) -> Self {
        self.files.push(FileSpec::new(template, remote));
        self
    }

    pub fn setup_dir(mut self, dir: impl Into<String>) -> Self {
        self.setup_dirs.push(dir.into());
        self
    }

    pub fn restart(mut self, cmd: impl Into<String>) -> Self {
        self.restart_cmd = Some(cmd.into());
        self
    }

    pub fn multi_instance(mut self, multi: bool) -> Self {
        self.multi_instance = multi;
        self
    }

    pub fn with_context_builder(mut self, builder: Arc<dyn ContextBuilder>) -> Self {
        self.context_builder = Some(builder);
        self
    }

    pub fn secrets_hook(mut self, hook: Arc<dyn SecretsHook>) -> Self {
        self.secrets_hooks.push(hook);
        self
    }

    /// コンテキストビルダー
    ///
    /// 未指定の場合、単一ターゲットは secrets をそのまま渡し、
    /// マルチインスタンスは対象インスタンスだけを切り出す。
    pub fn context_builder(&self) -> &dyn ContextBuilder {
        match &self.context_builder {
            Some(builder) => builder.as_ref(),
            None if self.multi_instance => &InstanceScoped,
            None => &PassThrough,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.files.is_empty() {
            return Err(PushError::InvalidConfig(format!(
                "サービス '{}' に file が定義されていません",
                self.name
            )));
        }
        for file in &self.files {
            if file.template.trim().is_empty() {
                return Err(PushError::InvalidConfig(format!(
                    "サービス '{}' にテンプレート名が空の file があります",
                    self.name
                )));
            }
            if let RemotePath::Literal(path) = &file.remote
                && path.trim().is_empty()
            {
                return Err(PushError::InvalidConfig(format!(
                    "サービス '{}' の {} に配置先がありません",
                    self.name, file.template
                )));
            }
        }
        Ok(())
    }
}
