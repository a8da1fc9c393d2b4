//! LLMプロバイダークライアントの共通インターフェース定義
//!
//! # 責務
//!
//! - プロバイダー（Anthropic, OpenAI等）ごとのクライアントが実装する [`ProviderClient`] を定義
//! - プロバイダー非依存のリクエスト型 [`ProviderRequest`] とレスポンス型 [`ProviderResponse`] を提供
//! - トークン使用量 [`TokenUsage`] と停止理由 [`StopReason`] の型を定義
//!
//! エンジン本体はこのトレイトを直接使いません。エンジンが使うのは
//! [`AgentInvoker`](super::invocation::AgentInvoker) で、
//! [`ProviderInvoker`](super::invoker::ProviderInvoker) がその実装としてこのトレイトを利用します。
//!
//! # 使用例
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use holon_engine::error::ProviderError;
//! use holon_engine::provider::{create_provider, Provider, ProviderRequest};
//!
//! async fn ask() -> Result<String, ProviderError> {
//!     let client = create_provider(&Provider::Simulated);
//!     let env = BTreeMap::new();
//!     let response = client
//!         .execute(&ProviderRequest {
//!             system_prompt: "You are agent `writer`.",
//!             user_input: "Summarize the release notes",
//!             model: "simulated",
//!             tools: &[],
//!             env: &env,
//!         })
//!         .await?;
//!     Ok(response.content)
//! }
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::resource::ToolProviderSpec;
use crate::error::ProviderError;

/// LLMプロバイダークライアントの共通インターフェース
///
/// 並列のエージェント呼び出しから共有されるため `Send + Sync` が必要です。
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// プロンプトを1回実行する
    ///
    /// # エラー
    ///
    /// CLIの未インストール、認証切れ、レート制限、不正な出力などを
    /// 対応する [`ProviderError`] の variant で返します。
    async fn execute(
        &self,
        request: &ProviderRequest<'_>,
    ) -> Result<ProviderResponse, ProviderError>;
}

/// プロバイダーへのリクエスト
#[derive(Debug, Clone, Copy)]
pub struct ProviderRequest<'a> {
    /// システムプロンプト（エージェントの役割・制約）
    pub system_prompt: &'a str,

    /// ユーザー入力（指示文、入力値、対話履歴を含む）
    pub user_input: &'a str,

    /// 使用するモデル名
    pub model: &'a str,

    /// エージェントが利用できるツールプロバイダー
    pub tools: &'a [ToolProviderSpec],

    /// CLIプロセスに渡す環境変数
    pub env: &'a BTreeMap<String, String>,
}

/// プロバイダー共通のレスポンス
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// 生成されたテキスト
    pub content: String,

    pub token_usage: TokenUsage,
    pub stop_reason: StopReason,

    /// 実際に応答したモデル（CLIが報告しない場合は要求したモデル）
    pub model: String,

    /// コスト（USD、プロバイダーが報告しない場合は 0.0）
    pub cost_usd: f64,
}

/// トークン使用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// 生成が止まった理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ContentFilter,
    /// CLIが報告しない、または未知の値
    Unknown,
}

impl StopReason {
    /// CLI出力の停止理由文字列から変換（未知の値は [`StopReason::Unknown`]）
    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "end_turn" => StopReason::EndTurn,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            "content_filter" => StopReason::ContentFilter,
            _ => StopReason::Unknown,
        }
    }
}
