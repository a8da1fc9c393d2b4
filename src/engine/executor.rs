//! ワークフロー実行エンジン（インタープリター）
//!
//! # 責務
//!
//! このモジュールは、ワークフローの実行を制御する `WorkflowExecutor` を提供します。
//! Workflow 定義を受け取り、各ステップを宣言順に実行し、ステップの出力をコンテキストにコミットします。
//!
//! # 主要な型
//!
//! - [`WorkflowExecutor`][]: ワークフロー実行の中核となる構造体
//!
//! # 実行フロー
//!
//! 1. トリガーペイロードでコンテキストを初期化し、状態を RUNNING にする
//! 2. 各ステップを宣言順に実行
//!    - ステップ種別に応じた戦略を選ぶ
//!    - 成功: 出力をコンテキストにコミットし、COMPLETED のトレースを記録
//!    - 失敗: FAILED のトレースを記録し、以降のステップは実行しない（fail-fast）
//! 3. 最終状態（COMPLETED / FAILED）と最終コンテキストを返す
//!
//! 並列実行はステップの内部（Scatter-Gather のサブタスク、Debate の第1ラウンド）に限られ、
//! ステップ同士が並行して動くことはありません。コンテキストを変更するのはこのモジュールだけです。
//!
//! # キャンセル
//!
//! [`WorkflowExecutor::cancellation_token`] をキャンセルすると、
//!
//! - ステップの開始前であれば、新しいトレースを記録せずに FAILED で終了
//! - ステップの実行中であれば、そのステップを `CancelledError` で FAILED として記録して終了
//!
//! # 使用例
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use holon_engine::config::workflow::WorkflowDefinition;
//! use holon_engine::engine::executor::WorkflowExecutor;
//! use holon_engine::provider::ProviderInvoker;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let workflow = WorkflowDefinition::from_file("workflows/example.toml")?;
//!     let executor = WorkflowExecutor::new(workflow, Arc::new(ProviderInvoker::new()))
//!         .with_trigger(json!({"topic": "Rust"}));
//!
//!     let result = executor.execute().await;
//!
//!     if result.is_success() {
//!         println!("ワークフロー成功!");
//!         println!("総コスト: {} USD", result.metrics.cost_usd);
//!     }
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::settings::EngineSettings;
use crate::config::step::StepSpec;
use crate::config::workflow::WorkflowDefinition;
use crate::provider::AgentInvoker;
use crate::trace::TraceSink;
use super::context::ExecutionContext;
use super::result::{
    RunState, StepError, StepMetrics, StepStatus, TraceRecord, WorkflowResult, elapsed_ms,
};
use super::status::{RunMonitor, StatusPublisher};
use super::strategy::{
    self, AgentDispatcher, MarkerResolutionDetector, ResolutionDetector, StepEnv, StepFailure,
};

/// ワークフロー実行エンジン
///
/// 1インスタンスが1回の実行に対応し、[`execute`](Self::execute) で消費されます。
/// 実行ごとに独立したコンテキストを持つため、複数の実行を並行して動かせます。
///
/// # フィールド
///
/// - `workflow`: 実行するワークフロー定義
/// - `invoker`: エージェント呼び出しの実装
/// - `trigger`: トリガーペイロード
/// - `sinks`: トレースの出力先
/// - `settings`: タイムアウトなどのエンジン設定
/// - `detector`: Debate の解決判定
/// - `cancellation`: 実行のキャンセルトークン
pub struct WorkflowExecutor {
    run_id: Uuid,
    workflow: WorkflowDefinition,
    invoker: Arc<dyn AgentInvoker>,
    trigger: Value,
    sinks: Vec<Arc<dyn TraceSink>>,
    settings: EngineSettings,
    detector: Arc<dyn ResolutionDetector>,
    cancellation: CancellationToken,
    publisher: StatusPublisher,
}

impl WorkflowExecutor {
    /// 新しいエグゼキューターを生成
    ///
    /// # 引数
    ///
    /// - `workflow`: 実行するワークフロー定義（バリデーション済み）
    /// - `invoker`: エージェント呼び出しの実装
    pub fn new(workflow: WorkflowDefinition, invoker: Arc<dyn AgentInvoker>) -> Self {
        let run_id = Uuid::new_v4();
        let trigger = Value::Null;
        let publisher = StatusPublisher::new(
            run_id,
            &ExecutionContext::new(workflow.id().to_string(), trigger.clone()),
        );

        Self {
            run_id,
            workflow,
            invoker,
            trigger,
            sinks: Vec::new(),
            settings: EngineSettings::default(),
            detector: Arc::new(MarkerResolutionDetector::default()),
            cancellation: CancellationToken::new(),
            publisher,
        }
    }

    /// トリガーペイロードを設定
    ///
    /// テンプレートからは `${trigger...}` で参照されます。
    pub fn with_trigger(mut self, trigger: Value) -> Self {
        self.trigger = trigger;
        self.publisher.publish(RunState::Pending, &self.initial_context());
        self
    }

    /// トレースの出力先を追加
    pub fn with_trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// エンジン設定を指定
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Debate の解決判定を差し替える
    pub fn with_resolution_detector(mut self, detector: Arc<dyn ResolutionDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// 外部のキャンセルトークンを使用する
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// 実行ID
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// 実行するワークフロー定義
    pub fn workflow(&self) -> &WorkflowDefinition {
        &self.workflow
    }

    /// 実行状態の参照ハンドル
    pub fn monitor(&self) -> RunMonitor {
        self.publisher.subscribe()
    }

    /// 実行を停止するためのキャンセルトークン
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// ワークフローを実行
    ///
    /// 失敗した場合も `WorkflowResult` を返します。状態は [`WorkflowResult::state`] で確認してください。
    /// 失敗時もそれまでに完了したステップの出力とトレースは保持されます。
    pub async fn execute(self) -> WorkflowResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut context = self.initial_context();
        let mut trace: Vec<TraceRecord> = Vec::new();
        let mut error: Option<String> = None;

        info!(
            run_id = %self.run_id,
            workflow = %self.workflow.id(),
            steps = self.workflow.steps().len(),
            "workflow run started"
        );
        self.publisher.publish(RunState::Running, &context);

        for step in self.workflow.steps() {
            if self.cancellation.is_cancelled() {
                warn!(
                    run_id = %self.run_id,
                    step_id = %step.id,
                    "run cancelled before step started"
                );
                error = Some(StepError::Cancelled.to_string());
                break;
            }

            context.start_step(&step.id);
            self.publisher.publish(RunState::Running, &context);
            info!(
                run_id = %self.run_id,
                step_id = %step.id,
                kind = step.kind.name(),
                "step started"
            );

            let step_clock = Instant::now();
            let result = self.run_step(step, &context).await;
            let latency_ms = elapsed_ms(step_clock);

            match result {
                Ok(outcome) => {
                    let mut metrics = outcome.metrics;
                    metrics.latency_ms = latency_ms;

                    if let Err(e) = context.commit(&step.id, outcome.committed) {
                        let failure = StepFailure::new(outcome.input, e.into(), metrics);
                        let message =
                            self.record_failure(step, failure, &mut context, &mut trace).await;
                        error = Some(message);
                        break;
                    }
                    context.record_metrics(&metrics);

                    info!(
                        run_id = %self.run_id,
                        step_id = %step.id,
                        latency_ms,
                        invocations = metrics.invocations,
                        cost_usd = metrics.cost_usd,
                        "step completed"
                    );

                    let record = TraceRecord {
                        step_id: step.id.clone(),
                        status: StepStatus::Completed,
                        input: outcome.input,
                        output: outcome.trace_output,
                        metrics,
                        timestamp: Utc::now(),
                    };
                    self.emit(record, &mut trace).await;
                    self.publisher.publish(RunState::Running, &context);
                }
                Err(mut failure) => {
                    failure.metrics.latency_ms = latency_ms;
                    let message =
                        self.record_failure(step, failure, &mut context, &mut trace).await;
                    error = Some(message);
                    break;
                }
            }
        }

        let state = if error.is_none() {
            RunState::Completed
        } else {
            RunState::Failed
        };
        self.publisher.publish(state, &context);

        let metrics = trace.iter().fold(StepMetrics::default(), |mut total, record| {
            total.merge(&record.metrics);
            total
        });

        info!(
            run_id = %self.run_id,
            workflow = %self.workflow.id(),
            state = ?state,
            completed = context.steps_executed().len(),
            duration_ms = elapsed_ms(clock),
            "workflow run finished"
        );

        WorkflowResult {
            run_id: self.run_id,
            workflow_id: self.workflow.id().to_string(),
            state,
            trace,
            context: context.snapshot(),
            started_at,
            ended_at: Utc::now(),
            total_duration: clock.elapsed(),
            metrics,
            error,
        }
    }

    /// 単一ステップを実行（プライベートメソッド）
    ///
    /// ステップの `timeout_secs`、なければエンジン設定のタイムアウトを各呼び出しに適用します。
    async fn run_step(
        &self,
        step: &StepSpec,
        context: &ExecutionContext,
    ) -> Result<strategy::StepOutcome, StepFailure> {
        let timeout = step
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.settings.agent_timeout());

        let env = StepEnv {
            step,
            context,
            dispatcher: AgentDispatcher::new(
                &self.workflow,
                self.invoker.as_ref(),
                &self.cancellation,
                timeout,
                &step.id,
            ),
            detector: self.detector.as_ref(),
        };

        strategy::run_step(&env).await
    }

    /// 失敗したステップを記録し、実行結果のエラーメッセージを返す
    async fn record_failure(
        &self,
        step: &StepSpec,
        failure: StepFailure,
        context: &mut ExecutionContext,
        trace: &mut Vec<TraceRecord>,
    ) -> String {
        context.finish_step();

        if failure.error.is_cancelled() {
            warn!(run_id = %self.run_id, step_id = %step.id, "step cancelled");
        } else {
            error!(
                run_id = %self.run_id,
                step_id = %step.id,
                kind = failure.error.kind(),
                error = %failure.error,
                "step failed"
            );
        }

        let message = format!("ステップ '{}' が失敗しました: {}", step.id, failure.error);
        let record = TraceRecord {
            step_id: step.id.clone(),
            status: StepStatus::Failed,
            input: failure.input,
            output: failure.output,
            metrics: failure.metrics,
            timestamp: Utc::now(),
        };
        self.emit(record, trace).await;
        message
    }

    /// トレースを出力先と実行結果に追記する
    async fn emit(&self, record: TraceRecord, trace: &mut Vec<TraceRecord>) {
        for sink in &self.sinks {
            sink.append(self.run_id, &record).await;
        }
        trace.push(record);
    }

    fn initial_context(&self) -> ExecutionContext {
        ExecutionContext::new(self.workflow.id().to_string(), self.trigger.clone())
    }
}
