//! ステップ実行戦略
//!
//! # 責務
//!
//! - ステップ種別ごとの実行戦略（[`direct`] / [`scatter_gather`] / [`debate`]）への振り分け
//! - エージェント呼び出しの共通処理（タイムアウト、キャンセル、エラーへの呼び出し位置の付与）
//! - ステップ実行結果 [`StepOutcome`] / [`StepFailure`] の型定義
//!
//! 各戦略はコンテキストを読み取り専用で受け取り、コミットする値を返すだけです。
//! コンテキストへの書き込みとトレースの記録はインタープリターが行います。

pub mod debate;
pub mod direct;
pub mod scatter_gather;

pub use debate::{MarkerResolutionDetector, ResolutionDetector};

use std::time::Duration;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::step::{StepKind, StepSpec};
use crate::config::workflow::WorkflowDefinition;
use crate::error::ProviderError;
use crate::provider::{AgentInvoker, AgentRequest, AgentResponse, HistoryEntry};
use super::context::ExecutionContext;
use super::result::{InvocationSite, StepError, StepMetrics};

/// ステップ実行に必要な環境
pub struct StepEnv<'a> {
    /// 実行するステップ
    pub step: &'a StepSpec,
    /// 実行開始時点のコンテキスト（読み取り専用）
    pub context: &'a ExecutionContext,
    /// エージェント呼び出し
    pub dispatcher: AgentDispatcher<'a>,
    /// Debate の解決判定
    pub detector: &'a dyn ResolutionDetector,
}

/// 成功したステップの結果
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// 解決済みの入力スナップショット
    pub input: Value,
    /// コンテキストにコミットする値
    pub committed: Value,
    /// トレースに記録する出力（コミット値にステップ内の詳細を加えたもの）
    pub trace_output: Value,
    /// 呼び出しメトリクスの集計
    pub metrics: StepMetrics,
}

/// 失敗したステップの結果
#[derive(Debug)]
pub struct StepFailure {
    /// 失敗時点までに解決できた入力スナップショット
    pub input: Value,
    /// トレースに記録するエラーの要約
    pub output: Value,
    /// 失敗までに完了した呼び出しのメトリクス
    pub metrics: StepMetrics,
    pub error: StepError,
}

impl StepFailure {
    pub fn new(input: Value, error: StepError, metrics: StepMetrics) -> Self {
        Self {
            input,
            output: error.summary(),
            metrics,
            error,
        }
    }

    /// テンプレート解決前に失敗した場合の結果
    ///
    /// 入力スナップショットには未解決のステップ定義を記録します。
    pub fn unresolved(step: &StepSpec, error: StepError) -> Self {
        let input = serde_json::to_value(step).unwrap_or(Value::Null);
        Self::new(input, error, StepMetrics::default())
    }
}

/// ステップ種別に応じた戦略でステップを実行する
pub async fn run_step(env: &StepEnv<'_>) -> Result<StepOutcome, StepFailure> {
    match &env.step.kind {
        StepKind::Direct(spec) => direct::run(env, spec).await,
        StepKind::ScatterGather(spec) => scatter_gather::run(env, spec).await,
        StepKind::Debate(spec) => debate::run(env, spec).await,
    }
}

/// エージェント呼び出しの共通処理
///
/// すべての呼び出しを実行のキャンセルトークンと競合させ、タイムアウトを適用します。
/// 失敗はエージェントIDと呼び出し位置を付けた [`StepError::AgentInvocation`] になります。
pub struct AgentDispatcher<'a> {
    workflow: &'a WorkflowDefinition,
    invoker: &'a dyn AgentInvoker,
    cancellation: &'a CancellationToken,
    timeout: Duration,
    step_id: &'a str,
}

impl<'a> AgentDispatcher<'a> {
    pub fn new(
        workflow: &'a WorkflowDefinition,
        invoker: &'a dyn AgentInvoker,
        cancellation: &'a CancellationToken,
        timeout: Duration,
        step_id: &'a str,
    ) -> Self {
        Self {
            workflow,
            invoker,
            cancellation,
            timeout,
            step_id,
        }
    }

    /// エージェントを1回呼び出す
    ///
    /// # エラー
    ///
    /// - [`StepError::Cancelled`] - 呼び出し前または呼び出し中に実行がキャンセルされた
    /// - [`StepError::AgentInvocation`] - 呼び出しの失敗、またはタイムアウト
    pub async fn invoke(
        &self,
        agent_id: &str,
        site: InvocationSite,
        instruction: String,
        inputs: Map<String, Value>,
        history: Vec<HistoryEntry>,
    ) -> Result<AgentResponse, StepError> {
        let failure = |source: ProviderError| StepError::AgentInvocation {
            agent: agent_id.to_string(),
            site,
            source,
        };

        let agent = self.workflow.agent(agent_id).ok_or_else(|| {
            failure(ProviderError::Invocation(format!(
                "エージェント '{}' が定義されていません",
                agent_id
            )))
        })?;

        let request = AgentRequest {
            agent_id: agent_id.to_string(),
            agent: agent.clone(),
            instruction,
            inputs,
            history,
            tools: self.workflow.tool_providers_for(agent),
        };

        debug!(step_id = %self.step_id, agent = %agent_id, %site, "dispatching agent invocation");

        let outcome = tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => return Err(StepError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, self.invoker.invoke(request)) => outcome,
        };

        match outcome {
            Ok(Ok(response)) => {
                debug!(
                    step_id = %self.step_id,
                    agent = %agent_id,
                    %site,
                    latency_ms = response.metrics.latency_ms,
                    "agent invocation completed"
                );
                Ok(response)
            }
            Ok(Err(source)) => Err(failure(source)),
            Err(_) => Err(failure(ProviderError::Timeout(format!(
                "{}ms 以内に応答がありませんでした",
                self.timeout.as_millis()
            )))),
        }
    }
}
