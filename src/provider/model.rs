//! モデル名の解決
//!
//! # 責務
//!
//! - リソース定義で `model` が指定されていればそれを使用
//! - 未指定の場合はプロバイダーごとのデフォルトモデルを使用
//!
//! # デフォルトモデル
//!
//! | Provider  | Model             |
//! |-----------|-------------------|
//! | Anthropic | claude-sonnet-4-5 |
//! | OpenAI    | gpt-4o            |
//! | Simulated | simulated         |
//!
//! # 注意
//!
//! モデル名はCLIツールが受け付ける形式に合わせています。
//!
//! # 使用例
//!
//! ```rust
//! use holon_engine::provider::Provider;
//! use holon_engine::provider::model::resolve_model;
//!
//! assert_eq!(resolve_model(&Provider::Anthropic, None), "claude-sonnet-4-5");
//! assert_eq!(resolve_model(&Provider::OpenAI, Some("o1")), "o1");
//! ```

use super::Provider;

const ANTHROPIC_DEFAULT: &str = "claude-sonnet-4-5";
const OPENAI_DEFAULT: &str = "gpt-4o";
const SIMULATED_DEFAULT: &str = "simulated";

/// プロバイダーのデフォルトモデル名
pub fn default_model(provider: &Provider) -> &'static str {
    match provider {
        Provider::Anthropic => ANTHROPIC_DEFAULT,
        Provider::OpenAI => OPENAI_DEFAULT,
        Provider::Simulated => SIMULATED_DEFAULT,
    }
}

/// 使用するモデル名を解決する
///
/// 空文字列の指定は未指定として扱います。
pub fn resolve_model(provider: &Provider, requested: Option<&str>) -> String {
    match requested.map(str::trim) {
        Some(model) if !model.is_empty() => model.to_string(),
        _ => default_model(provider).to_string(),
    }
}
