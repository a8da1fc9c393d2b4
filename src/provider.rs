//! エージェント呼び出しとLLMプロバイダー抽象化レイヤー
//!
//! # 責務
//!
//! - エンジンが消費するエージェント呼び出しの能力 [`AgentInvoker`] を定義
//! - 複数のLLMプロバイダーを統一的に扱う [`ProviderClient`] と、そのファクトリー機能
//! - リソース定義の `provider` / `model` から実際のクライアントとモデル名を解決する
//!   [`ProviderInvoker`]
//!
//! エンジンはプロバイダーの種類で分岐しません。プロバイダーの選択はすべて
//! [`ProviderInvoker`] の中で、リソース定義の `provider` 文字列をもとに行われます。
//!
//! # アーキテクチャ
//!
//! このモジュールは **CLIツール呼び出しベース** で設計されています。
//! APIキーの管理や認証はCLIツールに委譲し、コード内では扱いません。
//!
//! - **Anthropic**: `claude` コマンド（Claude Code CLI）
//! - **OpenAI**: `codex` コマンド（Codex CLI）
//! - **Simulated**: 外部呼び出しを行わない決定的な応答（動作確認用）
//!
//! # モジュール構成
//!
//! - `traits` - プロバイダークライアントの共通インターフェース
//! - `invocation` - エンジン向けのエージェント呼び出しインターフェース
//! - `invoker` - プロバイダークライアントを使った [`AgentInvoker`] の実装
//! - `model` - デフォルトモデルの解決
//! - `anthropic` / `openai` / `simulated` - 各プロバイダーのクライアント
//! - `cli` - CLIツールの起動とエラー分類（`anthropic` / `openai` が共有）

pub mod traits;
pub mod invocation;
pub mod invoker;
pub mod model;
pub mod anthropic;
pub mod openai;
pub mod simulated;
mod cli;

// 公開APIの再エクスポート
pub use traits::{ProviderClient, ProviderRequest, ProviderResponse, StopReason, TokenUsage};
pub use invocation::{AgentInvoker, AgentRequest, AgentResponse, HistoryEntry, InvocationMetrics};
pub use invoker::ProviderInvoker;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// AI プロバイダー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Anthropic (Claude Code)
    Anthropic,
    /// OpenAI (Codex)
    OpenAI,
    /// 外部呼び出しを行わない模擬プロバイダー
    Simulated,
}

impl FromStr for Provider {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "openai" | "codex" => Ok(Provider::OpenAI),
            "simulated" | "mock" => Ok(Provider::Simulated),
            other => Err(ProviderError::UnsupportedProvider(other.to_string())),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAI => "openai",
            Provider::Simulated => "simulated",
        };
        f.write_str(name)
    }
}

/// プロバイダークライアントを生成するファクトリー関数
///
/// 指定されたプロバイダーの種類に応じて、適切なクライアントを生成します。
/// 認証は環境変数（`ANTHROPIC_API_KEY` / `OPENAI_API_KEY`）または
/// CLIツールの事前ログインに委譲されます。
///
/// # 例
///
/// ```rust,no_run
/// use holon_engine::provider::{create_provider, Provider};
///
/// let client = create_provider(&Provider::Anthropic);
/// ```
pub fn create_provider(provider: &Provider) -> Box<dyn ProviderClient> {
    match provider {
        Provider::Anthropic => Box::new(anthropic::AnthropicClient::new()),
        Provider::OpenAI => Box::new(openai::OpenAIClient::new()),
        Provider::Simulated => Box::new(simulated::SimulatedClient::new()),
    }
}
