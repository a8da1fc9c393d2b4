//! エージェント呼び出し（Agent Invocation）のインターフェース
//!
//! エンジンが消費する唯一の外部能力です。
//! 「エージェントIDと指示文（と任意の対話履歴）を渡し、結果とメトリクスを受け取る」だけを規定し、
//! HTTP呼び出し・サブプロセス・モックのどれで実装されているかには関知しません。
//! リトライやバックオフが必要な場合は実装側の責務です。

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::resource::{AgentSpec, ToolProviderSpec};
use crate::error::ProviderError;
use super::traits::TokenUsage;

/// エージェント呼び出しの共通インターフェース
///
/// 並列のサブタスクから同時に呼び出されるため `Send + Sync` が必要です。
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// エージェントを1回呼び出す
    async fn invoke(&self, request: AgentRequest) -> Result<AgentResponse, ProviderError>;
}

/// エージェント呼び出しのリクエスト
#[derive(Debug, Clone, Serialize)]
pub struct AgentRequest {
    /// 呼び出すエージェントのリソースID
    pub agent_id: String,

    /// エージェントのリソース定義
    pub agent: AgentSpec,

    /// 解決済みの指示文
    pub instruction: String,

    /// 解決済みの名前付き入力（プロンプトのコンテキストとして渡す）
    pub inputs: Map<String, Value>,

    /// 対話履歴（Debateのラウンド間で使用）
    pub history: Vec<HistoryEntry>,

    /// エージェントが利用できるツールプロバイダー
    pub tools: Vec<ToolProviderSpec>,
}

/// 対話履歴の1エントリ
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    /// 発言者の役割（例: "builder", "critic"）
    pub role: String,

    /// 発言内容
    pub content: Value,
}

/// エージェント呼び出しのレスポンス
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// 結果（テキストは [`Value::String`]、構造化された結果はそのままの値）
    pub content: Value,

    /// 呼び出しのメトリクス
    pub metrics: InvocationMetrics,
}

/// エージェント呼び出し1回分のメトリクス
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct InvocationMetrics {
    /// レイテンシー（ミリ秒）
    pub latency_ms: u64,

    /// コスト（USD）
    pub cost_usd: f64,

    /// トークン使用量
    pub token_usage: TokenUsage,
}
