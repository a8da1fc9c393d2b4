//! 実行結果・トレース・エラーの型定義
//!
//! # 責務
//!
//! - 実行状態 [`RunState`] とステップ状態 [`StepStatus`] の型定義
//! - ステップ単位のトレースレコード [`TraceRecord`] とメトリクス [`StepMetrics`] の型定義
//! - ステップ実行エラー [`StepError`] の型定義（エラー分類）
//! - ワークフロー実行結果 [`WorkflowResult`] の型定義
//!
//! # エラー分類
//!
//! | 種別 | 意味 |
//! |------|------|
//! | `ReferenceError` | テンプレートの参照先が存在しない |
//! | `InvalidReferenceRoot` | 参照ルートが `trigger` / `steps` 以外 |
//! | `AgentInvocationError` | エージェント呼び出しの失敗・タイムアウト |
//! | `CancelledError` | オペレーターによる実行の停止 |
//!
//! いずれもそのステップに対して致命的で、ステップは FAILED として記録されます。
//!
//! # 使用例
//!
//! ```rust,no_run
//! use holon_engine::engine::result::{RunState, WorkflowResult};
//!
//! fn handle_result(result: WorkflowResult) {
//!     if result.is_success() {
//!         println!("ワークフロー成功: {}", result.workflow_id);
//!         println!("完了ステップ数: {}/{}", result.completed_steps(), result.trace.len());
//!         println!("総トークン使用量: {}", result.metrics.total_tokens());
//!     } else {
//!         println!("ワークフロー失敗: {:?}", result.error);
//!     }
//!
//!     if let Ok(json) = result.to_json() {
//!         println!("JSON: {}", json);
//!     }
//! }
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ProviderError;
use crate::provider::InvocationMetrics;
use super::context::ContextError;
use super::template::ResolveError;

/// ワークフロー実行の状態
///
/// `Pending` → `Running` → `Completed` | `Failed` の順に遷移します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// 実行待ち
    Pending,
    /// ステップを順に実行中
    Running,
    /// すべてのステップが成功
    Completed,
    /// いずれかのステップが失敗、またはキャンセルされた
    Failed,
}

impl RunState {
    /// 終了状態かどうか
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }
}

/// ステップの終了状態
///
/// トレースは終了時に1度だけ書き込まれるため、実行中の状態は存在しません。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    /// 成功
    Completed,
    /// 失敗
    Failed,
}

/// ステップ単位のメトリクス
///
/// ステップ内で行われたすべてのエージェント呼び出しを集計したものです。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StepMetrics {
    /// ステップ全体の経過時間（ミリ秒）
    pub latency_ms: u64,
    /// 各呼び出しのレイテンシーの合計（ミリ秒、並列実行では経過時間を上回る）
    pub invocation_latency_ms: u64,
    /// コスト（USD）
    pub cost_usd: f64,
    /// 入力トークン数
    pub input_tokens: u32,
    /// 出力トークン数
    pub output_tokens: u32,
    /// エージェント呼び出しの回数（失敗した呼び出しを含む）
    pub invocations: u32,
}

impl StepMetrics {
    /// エージェント呼び出し1回分を加算
    pub fn record(&mut self, invocation: &InvocationMetrics) {
        self.invocation_latency_ms += invocation.latency_ms;
        self.cost_usd += invocation.cost_usd;
        self.input_tokens += invocation.token_usage.input_tokens;
        self.output_tokens += invocation.token_usage.output_tokens;
        self.invocations += 1;
    }

    /// 失敗したエージェント呼び出し1回分を加算
    ///
    /// コストとトークン数は得られないため、回数と経過時間だけを数えます。
    /// 実行のキャンセルで打ち切られた呼び出しは数えません。
    pub fn record_failure(&mut self, error: &StepError, latency_ms: u64) {
        if error.is_cancelled() {
            return;
        }
        self.invocation_latency_ms += latency_ms;
        self.invocations += 1;
    }

    /// 別のステップのメトリクスを加算
    pub fn merge(&mut self, other: &StepMetrics) {
        self.latency_ms += other.latency_ms;
        self.invocation_latency_ms += other.invocation_latency_ms;
        self.cost_usd += other.cost_usd;
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.invocations += other.invocations;
    }

    /// 総トークン数
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// トレースレコード
///
/// ステップ1つにつき、終了時（成功・失敗）に1件だけ作成され、以後変更されません。
#[derive(Debug, Clone, Serialize)]
pub struct TraceRecord {
    /// ステップID
    pub step_id: String,
    /// 終了状態
    pub status: StepStatus,
    /// 解決済みの入力スナップショット
    pub input: Value,
    /// 成功時は出力、失敗時はエラーの要約
    pub output: Value,
    /// 集計済みメトリクス
    pub metrics: StepMetrics,
    /// 終了時刻
    pub timestamp: DateTime<Utc>,
}

/// ディベートにおけるエージェントの役割
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DebateRole {
    /// 提案を作成・改訂する
    Builder,
    /// 提案を批評・評価する
    Critic,
    /// 最終判断を下す
    Judge,
}

impl DebateRole {
    /// 役割名
    pub fn as_str(&self) -> &'static str {
        match self {
            DebateRole::Builder => "builder",
            DebateRole::Critic => "critic",
            DebateRole::Judge => "judge",
        }
    }
}

impl fmt::Display for DebateRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// エージェント呼び出しがステップ内のどこで行われたか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvocationSite {
    /// Direct ステップの単一呼び出し
    Direct,
    /// Scatter-Gather ステップのサブタスク
    Task {
        /// 宣言順のインデックス（0始まり）
        index: usize,
    },
    /// Debate ステップのラウンド内の呼び出し
    Debate {
        /// ラウンド番号（1始まり、判定は最終ラウンドの番号）
        round: u32,
        /// 役割
        role: DebateRole,
    },
}

impl fmt::Display for InvocationSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationSite::Direct => write!(f, "direct"),
            InvocationSite::Task { index } => write!(f, "task #{index}"),
            InvocationSite::Debate { round, role } => write!(f, "round {round}, {role}"),
        }
    }
}

/// ステップ実行エラー
///
/// ステップに対して致命的なエラーです。エンジンはリトライしません。
#[derive(Debug, Error)]
pub enum StepError {
    /// テンプレートの解決に失敗（`ReferenceError` / `InvalidReferenceRoot`）
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// エージェント呼び出しの失敗（タイムアウトを含む）
    #[error("エージェント '{agent}' の呼び出しに失敗しました（{site}）: {source}")]
    AgentInvocation {
        /// 呼び出したエージェントID
        agent: String,
        /// ステップ内の呼び出し位置
        site: InvocationSite,
        /// 呼び出し側のエラー
        #[source]
        source: ProviderError,
    },

    /// 実行がキャンセルされた
    #[error("実行がキャンセルされました")]
    Cancelled,

    /// コンテキストへのコミットに失敗
    #[error(transparent)]
    Context(#[from] ContextError),
}

impl StepError {
    /// エラー分類名
    pub fn kind(&self) -> &'static str {
        match self {
            StepError::Resolve(ResolveError::Reference { .. }) => "ReferenceError",
            StepError::Resolve(ResolveError::InvalidReferenceRoot { .. }) => "InvalidReferenceRoot",
            StepError::AgentInvocation { .. } => "AgentInvocationError",
            StepError::Cancelled => "CancelledError",
            StepError::Context(_) => "ContextError",
        }
    }

    /// キャンセルによる失敗か
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StepError::Cancelled)
    }

    /// トレースに記録するエラーの要約
    pub fn summary(&self) -> Value {
        let mut summary = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        if let StepError::AgentInvocation { agent, site, .. } = self {
            summary["agent"] = json!(agent);
            summary["site"] = json!(site);
        }
        summary
    }
}

/// ワークフロー実行結果
///
/// 実行1回分の最終状態、トレース、最終コンテキストを保持します。
/// 失敗時もそれまでに完了したステップの出力とトレースは保持されます（ロールバックしない）。
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    /// 実行ID
    pub run_id: Uuid,

    /// ワークフローID
    pub workflow_id: String,

    /// 最終状態
    pub state: RunState,

    /// トレースレコード（ステップ完了順）
    pub trace: Vec<TraceRecord>,

    /// 最終コンテキストのスナップショット
    pub context: Value,

    /// 実行開始時刻
    pub started_at: DateTime<Utc>,

    /// 実行終了時刻
    pub ended_at: DateTime<Utc>,

    /// 総実行時間
    pub total_duration: Duration,

    /// 全ステップのメトリクス累積
    pub metrics: StepMetrics,

    /// エラーメッセージ（失敗時のみ）
    pub error: Option<String>,
}

impl WorkflowResult {
    /// 結果をJSON形式でシリアライズ
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// 成功したかどうか
    pub fn is_success(&self) -> bool {
        self.state == RunState::Completed
    }

    /// 完了したステップ数
    pub fn completed_steps(&self) -> usize {
        self.trace
            .iter()
            .filter(|record| record.status == StepStatus::Completed)
            .count()
    }

    /// コミット済みのステップ出力
    pub fn step_output(&self, step_id: &str) -> Option<&Value> {
        self.context.get("steps").and_then(|steps| steps.get(step_id))
    }
}

/// 経過時間（ミリ秒）
pub(crate) fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
