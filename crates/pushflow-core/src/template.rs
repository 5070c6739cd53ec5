//! テンプレート展開機能
//!
//! Teraを使用してサービスのテンプレートディレクトリを展開します。

use crate::error::{PushError, Result};
use crate::model::RenderContext;
use std::path::Path;
use tera::{Context, Tera};
use tracing::{debug, info};

/// 名前付きテンプレートをコンテキストで展開する
///
/// 同じテンプレートとコンテキストに対しては常に同じ結果を返すこと。
pub trait TemplateRenderer {
    fn render(&self, template: &str, context: &RenderContext) -> Result<String>;
}

/// Tera によるテンプレートレンダラー
pub struct TeraRenderer {
    tera: Tera,
}

impl TeraRenderer {
    /// ディレクトリ配下のテンプレートをすべて読み込む
    ///
    /// テンプレート名はディレクトリからの相対パス（`traefik.yml.tera` など）。
    #[tracing::instrument]
    pub fn from_dir(templates_dir: &Path) -> Result<Self> {
        if !templates_dir.is_dir() {
            return Err(PushError::TemplateError {
                template: templates_dir.display().to_string(),
                message: "テンプレートディレクトリが見つかりません".to_string(),
            });
        }

        let glob = format!("{}/**/*", templates_dir.display());
        let tera = Tera::new(&glob).map_err(|e| PushError::TemplateError {
            template: templates_dir.display().to_string(),
            message: extract_tera_error_detail(&e),
        })?;

        info!(
            templates_dir = %templates_dir.display(),
            template_count = tera.get_template_names().count(),
            "Loaded templates"
        );

        Ok(Self::configure(tera))
    }

    /// 文字列から直接テンプレートを登録する
    pub fn from_raw<I, N, C>(templates: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, C)>,
        N: AsRef<str>,
        C: AsRef<str>,
    {
        let mut tera = Tera::default();
        for (name, content) in templates {
            tera.add_raw_template(name.as_ref(), content.as_ref())
                .map_err(|e| PushError::TemplateError {
                    template: name.as_ref().to_string(),
                    message: extract_tera_error_detail(&e),
                })?;
        }
        Ok(Self::configure(tera))
    }

    fn configure(mut tera: Tera) -> Self {
        // 設定ファイル（*.xml の firewalld ゾーンなど）をエスケープしない
        tera.autoescape_on(vec![]);
        Self { tera }
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }
}

impl TemplateRenderer for TeraRenderer {
    fn render(&self, template: &str, context: &RenderContext) -> Result<String> {
        if !self.has_template(template) {
            return Err(PushError::TemplateError {
                template: template.to_string(),
                message: "テンプレートが見つかりません".to_string(),
            });
        }

        let ctx = Context::from_value(context.clone()).map_err(|e| PushError::TemplateError {
            template: template.to_string(),
            message: format!("コンテキストはマッピングである必要があります: {}", e),
        })?;

        debug!(template = %template, "Rendering template");
        self.tera
            .render(template, &ctx)
            .map_err(|e| PushError::TemplateError {
                template: template.to_string(),
                message: extract_tera_error_detail(&e),
            })
    }
}

/// Teraエラーから詳細情報を抽出
///
/// Teraのエラーメッセージを解析して、未定義変数などの具体的な情報を取得します。
fn extract_tera_error_detail(e: &tera::Error) -> String {
    use std::error::Error;

    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }

    let full_error = details.join(" | ");

    // "Variable `xxx` not found in context"
    if full_error.contains("not found in context")
        && let Some(start) = full_error.find("Variable `")
        && let Some(end) = full_error[start..].find("` not found")
    {
        let var_name = &full_error[start + 10..start + end];
        return format!(
            "未定義の変数: `{}`\nヒント: secrets に値があるか確認してください",
            var_name
        );
    }

    if full_error.contains("Filter") && full_error.contains("not found") {
        return format!("未定義のフィルター\n詳細: {full_error}");
    }

    full_error
}
