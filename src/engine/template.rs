//! テンプレート解決（`${...}` プレースホルダーの置換）
//!
//! # 責務
//!
//! - 文字列、またはネストしたマップ/配列に含まれる `${path}` を
//!   [`ExecutionContext`] の値で置換する
//! - 参照パスのルート（`trigger` / `steps`）の判別
//! - 静的バリデーション用に、テンプレートに含まれる参照パスを列挙する
//!
//! # パス構文
//!
//! | パス | 参照先 |
//! |------|--------|
//! | `trigger` | トリガーペイロード全体 |
//! | `trigger.<key>...` | トリガーペイロード内の値 |
//! | `steps.<id>` | 完了済みステップのコミット値 |
//! | `steps.<id>.<key>...` | 完了済みステップのコミット値内の値 |
//!
//! 数値のセグメントは配列のインデックスとして扱います（例: `steps.analyze.results.0`）。
//!
//! # 置換規則
//!
//! - テンプレート文字列全体が1つのプレースホルダーの場合、参照先の値を構造ごと返す
//! - 文字列中に埋め込まれている場合は [`canonical_string`] で文字列化して埋め込む
//! - 1つでも解決できない参照があればエラー（部分的な置換は行わない）
//!
//! # 使用例
//!
//! ```rust
//! use holon_engine::engine::context::ExecutionContext;
//! use holon_engine::engine::template::TemplateResolver;
//! use serde_json::json;
//!
//! let ctx = ExecutionContext::new("demo".to_string(), json!({"x": 5, "topic": "Rust"}));
//! let resolver = TemplateResolver::new(&ctx, "step1");
//!
//! assert_eq!(resolver.resolve_str("${trigger.x}").unwrap(), json!(5));
//! assert_eq!(
//!     resolver.render("Write about ${trigger.topic}").unwrap(),
//!     "Write about Rust"
//! );
//! ```

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use thiserror::Error;

use super::context::ExecutionContext;

/// トリガーペイロードを指すルートセグメント
pub const TRIGGER_ROOT: &str = "trigger";

/// ステップ出力を指すルートセグメント
pub const STEPS_ROOT: &str = "steps";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]*)\}").expect("placeholder pattern is valid"));

/// テンプレート解決のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// 参照先の値が存在しない
    #[error("参照を解決できません: ${{{path}}}（ステップ '{step_id}'）")]
    Reference {
        /// 解決できなかったパス
        path: String,
        /// 解決中のステップID
        step_id: String,
    },

    /// ルートセグメントが `trigger` / `steps` のいずれでもない
    #[error("不正な参照ルートです: ${{{path}}}（ステップ '{step_id}'、trigger または steps のみ使用できます）")]
    InvalidReferenceRoot {
        /// 不正なパス
        path: String,
        /// 解決中のステップID
        step_id: String,
    },
}

/// 参照パスのルート
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceRoot<'a> {
    /// `trigger...`
    Trigger,
    /// `steps.<id>...`（IDが省略されている場合は空文字列）
    Step(&'a str),
}

/// 参照パスのルートを判別する
///
/// ルートが `trigger` / `steps` 以外の場合は `None` を返します。
///
/// # 例
///
/// ```rust
/// use holon_engine::engine::template::{reference_root, ReferenceRoot};
///
/// assert_eq!(reference_root("trigger.topic"), Some(ReferenceRoot::Trigger));
/// assert_eq!(reference_root("steps.fetch.output"), Some(ReferenceRoot::Step("fetch")));
/// assert_eq!(reference_root("env.HOME"), None);
/// ```
pub fn reference_root(path: &str) -> Option<ReferenceRoot<'_>> {
    let mut segments = path.trim().split('.');
    match segments.next() {
        Some(TRIGGER_ROOT) => Some(ReferenceRoot::Trigger),
        Some(STEPS_ROOT) => Some(ReferenceRoot::Step(segments.next().unwrap_or(""))),
        _ => None,
    }
}

/// 文字列テンプレートに含まれる参照パスを列挙する
pub fn references(template: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .collect()
}

/// JSON値（ネストしたマップ/配列を含む）に含まれる参照パスを列挙する
pub fn references_in_value(value: &Value) -> Vec<&str> {
    let mut found = Vec::new();
    collect_references(value, &mut found);
    found
}

fn collect_references<'a>(value: &'a Value, found: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => found.extend(references(s)),
        Value::Array(items) => items.iter().for_each(|item| collect_references(item, found)),
        Value::Object(map) => map.values().for_each(|item| collect_references(item, found)),
        _ => {}
    }
}

/// 文字列コンテキストに埋め込む際の正規の文字列表現
///
/// 文字列はそのまま、それ以外はコンパクトなJSON表現になります。
pub fn canonical_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// テンプレートリゾルバー
///
/// 実行コンテキストを読み取り専用で参照し、解決中のステップIDをエラーに付与します。
/// 解決は副作用を持たないため、同じコンテキストに対して何度呼び出しても同じ結果になります。
pub struct TemplateResolver<'a> {
    context: &'a ExecutionContext,
    step_id: &'a str,
}

impl<'a> TemplateResolver<'a> {
    /// 新しいリゾルバーを生成
    ///
    /// # 引数
    ///
    /// - `context`: 参照する実行コンテキスト
    /// - `step_id`: 解決中のステップID（エラー報告用）
    pub fn new(context: &'a ExecutionContext, step_id: &'a str) -> Self {
        Self { context, step_id }
    }

    /// 参照パスを値に解決する
    pub fn lookup(&self, path: &str) -> Result<&'a Value, ResolveError> {
        let path = path.trim();
        let mut segments = path.split('.');

        let (base, rest) = match segments.next() {
            Some(TRIGGER_ROOT) => (Some(self.context.trigger()), segments),
            Some(STEPS_ROOT) => {
                let step_output = segments
                    .next()
                    .and_then(|id| self.context.step_output(id));
                (step_output, segments)
            }
            _ => return Err(self.invalid_root(path)),
        };

        let mut current = base.ok_or_else(|| self.missing(path))?;
        for segment in rest {
            current = descend(current, segment).ok_or_else(|| self.missing(path))?;
        }
        Ok(current)
    }

    /// 文字列テンプレートを解決する
    ///
    /// テンプレート全体が1つのプレースホルダーの場合は参照先の値をそのまま返し、
    /// それ以外の場合は置換後の文字列を [`Value::String`] で返します。
    pub fn resolve_str(&self, template: &str) -> Result<Value, ResolveError> {
        if let Some(path) = whole_placeholder(template) {
            return self.lookup(path).cloned();
        }

        let mut failure = None;
        let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures| {
            match self.lookup(&caps[1]) {
                Ok(value) => canonical_string(value),
                Err(e) => {
                    failure.get_or_insert(e);
                    String::new()
                }
            }
        });

        match failure {
            Some(e) => Err(e),
            None => Ok(Value::String(rendered.into_owned())),
        }
    }

    /// 文字列テンプレートを解決し、必ず文字列として返す
    ///
    /// 指示文（instruction）のように文字列が必要な箇所で使用します。
    pub fn render(&self, template: &str) -> Result<String, ResolveError> {
        self.resolve_str(template).map(|value| canonical_string(&value))
    }

    /// JSON値テンプレートを再帰的に解決する
    ///
    /// 文字列以外のリーフ値（数値・真偽値・null）はそのまま返します。
    pub fn resolve_value(&self, template: &Value) -> Result<Value, ResolveError> {
        match template {
            Value::String(s) => self.resolve_str(s),
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_value(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => map
                .iter()
                .map(|(key, item)| Ok((key.clone(), self.resolve_value(item)?)))
                .collect::<Result<Map<_, _>, _>>()
                .map(Value::Object),
            other => Ok(other.clone()),
        }
    }

    /// 名前付き入力（`inputs`）を解決する
    pub fn resolve_inputs(
        &self,
        inputs: &BTreeMap<String, Value>,
    ) -> Result<Map<String, Value>, ResolveError> {
        inputs
            .iter()
            .map(|(name, template)| Ok((name.clone(), self.resolve_value(template)?)))
            .collect()
    }

    fn missing(&self, path: &str) -> ResolveError {
        ResolveError::Reference {
            path: path.to_string(),
            step_id: self.step_id.to_string(),
        }
    }

    fn invalid_root(&self, path: &str) -> ResolveError {
        ResolveError::InvalidReferenceRoot {
            path: path.to_string(),
            step_id: self.step_id.to_string(),
        }
    }
}

/// テンプレート全体が1つのプレースホルダーであれば、そのパスを返す
fn whole_placeholder(template: &str) -> Option<&str> {
    let caps = PLACEHOLDER.captures(template)?;
    let whole = caps.get(0)?;
    if whole.start() == 0 && whole.end() == template.len() {
        caps.get(1).map(|m| m.as_str())
    } else {
        None
    }
}

fn descend<'v>(value: &'v Value, segment: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context_with_steps() -> ExecutionContext {
        let mut ctx = ExecutionContext::new(
            "wf".to_string(),
            json!({"x": 5, "topic": "foo", "nested": {"flag": true}}),
        );
        ctx.commit("research", json!({"output": {"summary": "s", "score": 0.5}}))
            .unwrap();
        ctx.commit("analyze", json!({"output": ["a", "b"], "results": ["a", "b"]}))
            .unwrap();
        ctx
    }

    #[test]
    fn test_resolve_trigger_number_is_structural() {
        let ctx = context_with_steps();
        let resolver = TemplateResolver::new(&ctx, "s");
        assert_eq!(resolver.resolve_str("${trigger.x}").unwrap(), json!(5));
    }

    #[test]
    fn test_whole_placeholder_yields_structured_value() {
        let ctx = context_with_steps();
        let resolver = TemplateResolver::new(&ctx, "s");
        assert_eq!(
            resolver.resolve_str("${steps.research.output}").unwrap(),
            json!({"summary": "s", "score": 0.5})
        );
    }

    #[test]
    fn test_embedded_placeholders_use_canonical_strings() {
        let ctx = context_with_steps();
        let resolver = TemplateResolver::new(&ctx, "s");
        let rendered = resolver
            .render("topic=${trigger.topic} x=${trigger.x} r=${steps.analyze.results}")
            .unwrap();
        assert_eq!(rendered, r#"topic=foo x=5 r=["a","b"]"#);
    }

    #[test]
    fn test_render_whole_structured_placeholder_as_json_text() {
        let ctx = context_with_steps();
        let resolver = TemplateResolver::new(&ctx, "s");
        assert_eq!(resolver.render("${trigger.nested}").unwrap(), r#"{"flag":true}"#);
    }

    #[test]
    fn test_array_index_segment() {
        let ctx = context_with_steps();
        let resolver = TemplateResolver::new(&ctx, "s");
        assert_eq!(resolver.resolve_str("${steps.analyze.results.1}").unwrap(), json!("b"));
    }

    #[test]
    fn test_missing_step_is_reference_error() {
        let ctx = context_with_steps();
        let resolver = TemplateResolver::new(&ctx, "report");
        let err = resolver.resolve_str("${steps.missing.output}").unwrap_err();
        assert_eq!(
            err,
            ResolveError::Reference {
                path: "steps.missing.output".to_string(),
                step_id: "report".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_embedded_reference_fails_whole_template() {
        let ctx = context_with_steps();
        let resolver = TemplateResolver::new(&ctx, "s");
        let err = resolver
            .resolve_str("ok ${trigger.topic} but ${trigger.nope}")
            .unwrap_err();
        assert!(matches!(err, ResolveError::Reference { ref path, .. } if path == "trigger.nope"));
    }

    #[test]
    fn test_invalid_root() {
        let ctx = context_with_steps();
        let resolver = TemplateResolver::new(&ctx, "s");
        let err = resolver.resolve_str("${env.HOME}").unwrap_err();
        assert!(matches!(err, ResolveError::InvalidReferenceRoot { .. }));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let ctx = context_with_steps();
        let resolver = TemplateResolver::new(&ctx, "s");
        let template = json!({
            "a": "${trigger.topic}",
            "b": ["${steps.research.output.summary}", 3, null],
            "c": {"d": "x=${trigger.x}"}
        });
        let first = resolver.resolve_value(&template).unwrap();
        let second = resolver.resolve_value(&template).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, json!({"a": "foo", "b": ["s", 3, null], "c": {"d": "x=5"}}));
    }

    #[test]
    fn test_template_without_placeholders_is_unchanged() {
        let ctx = context_with_steps();
        let resolver = TemplateResolver::new(&ctx, "s");
        assert_eq!(resolver.resolve_str("plain text").unwrap(), json!("plain text"));
    }

    #[test]
    fn test_references_and_roots() {
        let refs = references("a ${trigger.x} b ${ steps.fetch.output } c");
        assert_eq!(refs, vec!["trigger.x", "steps.fetch.output"]);
        assert_eq!(reference_root(refs[1]), Some(ReferenceRoot::Step("fetch")));
        assert_eq!(reference_root("steps"), Some(ReferenceRoot::Step("")));
        assert_eq!(reference_root("inputs.topic"), None);

        let nested = json!({"k": ["${trigger.a}", {"z": "${steps.b.output}"}]});
        assert_eq!(references_in_value(&nested), vec!["trigger.a", "steps.b.output"]);
    }
}
