//! Scatter-Gather ステップ: サブタスクを並列に実行し、宣言順に集約する
//!
//! # 実行規則
//!
//! 1. すべてのサブタスクの指示文を、同じコンテキストのスナップショットに対して解決する
//!    （1つでも解決できなければ、どのサブタスクも起動しない）
//! 2. すべてのサブタスクを同時に起動し、全件が終了するまで待つ（バリア）
//! 3. 結果は完了順ではなく宣言順に並べる
//! 4. 1件でも失敗すればステップ全体が失敗。コンテキストには何も書き込まず、
//!    トレースにはエラーの要約とサブタスクごとの成否（`tasks`）を記録する
//!
//! コミット値は `{"output": [...], "results": [...]}` です（どちらも宣言順の結果配列）。

use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::step::ScatterGatherStep;
use crate::engine::result::{InvocationSite, StepError, StepMetrics, elapsed_ms};
use crate::engine::template::TemplateResolver;
use crate::provider::AgentResponse;
use super::{StepEnv, StepFailure, StepOutcome};

pub(super) async fn run(
    env: &StepEnv<'_>,
    spec: &ScatterGatherStep,
) -> Result<StepOutcome, StepFailure> {
    let resolver = TemplateResolver::new(env.context, &env.step.id);

    let inputs = resolver
        .resolve_inputs(&env.step.inputs)
        .map_err(|e| StepFailure::unresolved(env.step, e.into()))?;
    let instructions = spec
        .tasks
        .iter()
        .map(|task| resolver.render(&task.instruction))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StepFailure::unresolved(env.step, e.into()))?;

    let input = json!({
        "inputs": inputs,
        "tasks": spec
            .tasks
            .iter()
            .zip(&instructions)
            .map(|(task, instruction)| json!({"agent": task.agent, "instruction": instruction}))
            .collect::<Vec<_>>(),
    });

    let mut pending: FuturesUnordered<_> = spec
        .tasks
        .iter()
        .zip(instructions)
        .enumerate()
        .map(|(index, (task, instruction))| {
            let inputs = inputs.clone();
            async move {
                let started = Instant::now();
                let result = env
                    .dispatcher
                    .invoke(
                        &task.agent,
                        InvocationSite::Task { index },
                        instruction,
                        inputs,
                        Vec::new(),
                    )
                    .await;
                let latency_ms = elapsed_ms(started);
                (index, TaskResult { result, latency_ms })
            }
        })
        .collect();

    let mut slots: Vec<Option<TaskResult>> = (0..spec.tasks.len()).map(|_| None).collect();

    while let Some((index, finished)) = pending.next().await {
        debug!(
            step_id = %env.step.id,
            task_index = index,
            ok = finished.result.is_ok(),
            "sub-task finished"
        );
        slots[index] = Some(finished);
    }

    gather(input, slots)
}

/// サブタスク1件の結果
struct TaskResult {
    result: Result<AgentResponse, StepError>,
    latency_ms: u64,
}

/// 宣言順に並べた結果を集約する
fn gather(input: Value, slots: Vec<Option<TaskResult>>) -> Result<StepOutcome, StepFailure> {
    let mut metrics = StepMetrics::default();
    let mut results = Vec::with_capacity(slots.len());
    let mut statuses = Vec::with_capacity(slots.len());
    let mut first_error: Option<StepError> = None;

    for (index, slot) in slots.into_iter().enumerate() {
        match slot.map(|task| (task.result, task.latency_ms)) {
            Some((Ok(response), _)) => {
                metrics.record(&response.metrics);
                statuses.push(json!({
                    "index": index,
                    "status": "COMPLETED",
                    "output": response.content,
                }));
                results.push(response.content);
            }
            Some((Err(error), latency_ms)) => {
                metrics.record_failure(&error, latency_ms);
                statuses.push(json!({
                    "index": index,
                    "status": "FAILED",
                    "error": error.summary(),
                }));
                prefer(&mut first_error, error);
            }
            None => {
                statuses.push(json!({"index": index, "status": "FAILED"}));
            }
        }
    }

    if let Some(error) = first_error {
        warn!(error = %error, "scatter-gather step failed");
        let mut failure = StepFailure::new(input, error, metrics);
        failure.output["tasks"] = Value::Array(statuses);
        return Err(failure);
    }

    let committed = json!({
        "output": results,
        "results": results,
    });
    let mut trace_output = committed.clone();
    trace_output["tasks"] = Value::Array(statuses);

    Ok(StepOutcome {
        input,
        committed,
        trace_output,
        metrics,
    })
}

/// ステップのエラーとして報告する失敗を選ぶ
///
/// 宣言順で最初の失敗を優先しますが、キャンセル以外の失敗があればそちらを報告します。
fn prefer(current: &mut Option<StepError>, candidate: StepError) {
    let replace = match current {
        None => true,
        Some(existing) => existing.is_cancelled() && !candidate.is_cancelled(),
    };
    if replace {
        *current = Some(candidate);
    }
}
