//! Debate ステップ: builder と critic の討論を judge が裁定する
//!
//! # 状態遷移
//!
//! ```text
//! ラウンド1:  builder ─┐ （同時に起動し、両方の完了を待つ）
//!             critic  ─┘
//!                │ 解決判定 ── 解決 ──────────────┐
//!                ▼                                 │
//! ラウンド2..=max_rounds:                          │
//!             builder（critic の最新の指摘に反論）  │
//!                ▼                                 │
//!             critic（反論を評価）                  │
//!                │ 解決判定 ── 解決 ──────────────┤
//!                ▼                                 ▼
//!             judge（全発言を受け取り最終判断） ◀───┘
//! ```
//!
//! ラウンド内の builder → critic は逐次で、前のラウンドの両方の発言が揃うまで次のラウンドは始まりません。
//! 発言の記録（transcript）はステップ内に閉じており、トレースには残りますがコンテキストには入りません。
//!
//! コミット値は `{"output": <judge の判断>, "rounds": <実行ラウンド数>, "resolved": <解決判定>}` です。

use std::time::Instant;

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::config::step::DebateStep;
use crate::engine::result::{DebateRole, InvocationSite, StepError, StepMetrics, elapsed_ms};
use crate::engine::template::TemplateResolver;
use crate::provider::{AgentResponse, HistoryEntry};
use super::{StepEnv, StepFailure, StepOutcome};

/// critic の発言から、未解決の懸念が残っていないかを判定する
///
/// 判定方法はワークフローごとに差し替えられます。
pub trait ResolutionDetector: Send + Sync {
    /// 懸念がすべて解消されていれば `true`
    fn is_resolved(&self, critique: &Value) -> bool;
}

/// デフォルトの解決判定
///
/// - JSONオブジェクトの場合: `"resolved": true` を含めば解決
/// - 文字列の場合: いずれかのマーカー（デフォルトは `[RESOLVED]` / `NO_CONCERNS`）を含めば解決
#[derive(Debug, Clone)]
pub struct MarkerResolutionDetector {
    markers: Vec<String>,
}

impl MarkerResolutionDetector {
    pub const DEFAULT_MARKERS: [&'static str; 2] = ["[RESOLVED]", "NO_CONCERNS"];

    /// マーカーを指定して生成
    pub fn with_markers<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for MarkerResolutionDetector {
    fn default() -> Self {
        Self::with_markers(Self::DEFAULT_MARKERS)
    }
}

impl ResolutionDetector for MarkerResolutionDetector {
    fn is_resolved(&self, critique: &Value) -> bool {
        match critique {
            Value::Object(map) => map.get("resolved").and_then(Value::as_bool).unwrap_or(false),
            Value::String(text) => self.markers.iter().any(|marker| text.contains(marker.as_str())),
            _ => false,
        }
    }
}

pub(super) async fn run(env: &StepEnv<'_>, spec: &DebateStep) -> Result<StepOutcome, StepFailure> {
    let resolver = TemplateResolver::new(env.context, &env.step.id);

    let instruction = resolver
        .render(&spec.instruction)
        .map_err(|e| StepFailure::unresolved(env.step, e.into()))?;
    let inputs = resolver
        .resolve_inputs(&env.step.inputs)
        .map_err(|e| StepFailure::unresolved(env.step, e.into()))?;

    let input = json!({
        "builder": spec.builder,
        "critic": spec.critic,
        "judge": spec.judge,
        "instruction": instruction,
        "inputs": inputs,
        "max_rounds": spec.max_rounds,
    });

    let mut debate = Debate::new(env, &instruction, &inputs);

    // ラウンド1: builder と critic を同時に起動
    let (proposal, critique) = tokio::join!(
        debate.call(&spec.builder, 1, DebateRole::Builder, Vec::new()),
        debate.call(&spec.critic, 1, DebateRole::Critic, Vec::new()),
    );
    let proposal = debate.settle(proposal);
    let critique = debate.settle(critique);

    // 片方だけ成功した場合も、その発言は失敗時の記録に残す
    match (proposal, critique) {
        (Ok(proposal), Ok(critique)) => {
            debate.push(1, DebateRole::Builder, proposal.content);
            debate.push(1, DebateRole::Critic, critique.content);
        }
        (Ok(proposal), Err(error)) => {
            debate.push(1, DebateRole::Builder, proposal.content);
            return Err(debate.fail(&input, error));
        }
        (Err(error), Ok(critique)) => {
            debate.push(1, DebateRole::Critic, critique.content);
            return Err(debate.fail(&input, error));
        }
        (Err(error), Err(_)) => return Err(debate.fail(&input, error)),
    }

    let mut rounds = 1;
    let mut resolved = debate.resolved();

    while !resolved && rounds < spec.max_rounds {
        rounds += 1;

        let attempt = debate
            .call(&spec.builder, rounds, DebateRole::Builder, debate.history.clone())
            .await;
        let rebuttal = debate.settle(attempt).map_err(|e| debate.fail(&input, e))?;
        debate.push(rounds, DebateRole::Builder, rebuttal.content);

        let attempt = debate
            .call(&spec.critic, rounds, DebateRole::Critic, debate.history.clone())
            .await;
        let evaluation = debate.settle(attempt).map_err(|e| debate.fail(&input, e))?;
        debate.push(rounds, DebateRole::Critic, evaluation.content);

        resolved = debate.resolved();
    }

    let attempt = debate
        .call(&spec.judge, rounds, DebateRole::Judge, debate.history.clone())
        .await;
    let decision = debate.settle(attempt).map_err(|e| debate.fail(&input, e))?;

    let committed = json!({
        "output": decision.content,
        "rounds": rounds,
        "resolved": resolved,
    });
    let mut trace_output = committed.clone();
    trace_output["transcript"] = Value::Array(debate.transcript);

    Ok(StepOutcome {
        input,
        committed,
        trace_output,
        metrics: debate.metrics,
    })
}

/// 1回の呼び出し結果と経過時間
struct Attempt {
    result: Result<AgentResponse, StepError>,
    latency_ms: u64,
}

/// 1つの Debate ステップの進行状態
struct Debate<'e, 'a> {
    env: &'e StepEnv<'a>,
    instruction: &'e str,
    inputs: &'e Map<String, Value>,
    history: Vec<HistoryEntry>,
    transcript: Vec<Value>,
    metrics: StepMetrics,
}

impl<'e, 'a> Debate<'e, 'a> {
    fn new(env: &'e StepEnv<'a>, instruction: &'e str, inputs: &'e Map<String, Value>) -> Self {
        Self {
            env,
            instruction,
            inputs,
            history: Vec::new(),
            transcript: Vec::new(),
            metrics: StepMetrics::default(),
        }
    }

    async fn call(
        &self,
        agent: &str,
        round: u32,
        role: DebateRole,
        history: Vec<HistoryEntry>,
    ) -> Attempt {
        let started = Instant::now();
        let result = self
            .env
            .dispatcher
            .invoke(
                agent,
                InvocationSite::Debate { round, role },
                role_instruction(role, round, self.instruction),
                self.inputs.clone(),
                history,
            )
            .await;
        Attempt {
            result,
            latency_ms: elapsed_ms(started),
        }
    }

    /// 呼び出し結果をメトリクスに加算する
    fn settle(&mut self, attempt: Attempt) -> Result<AgentResponse, StepError> {
        match &attempt.result {
            Ok(response) => self.metrics.record(&response.metrics),
            Err(error) => self.metrics.record_failure(error, attempt.latency_ms),
        }
        attempt.result
    }

    fn push(&mut self, round: u32, role: DebateRole, content: Value) {
        debug!(step_id = %self.env.step.id, round, role = %role, "debate turn recorded");
        self.transcript.push(json!({
            "round": round,
            "role": role,
            "content": content,
        }));
        self.history.push(HistoryEntry {
            role: role.to_string(),
            content,
        });
    }

    /// 最新の critic の発言が解決を示しているか
    fn resolved(&self) -> bool {
        let resolved = self
            .history
            .last()
            .is_some_and(|entry| self.env.detector.is_resolved(&entry.content));
        debug!(step_id = %self.env.step.id, resolved, "debate resolution checked");
        resolved
    }

    fn fail(&self, input: &Value, error: StepError) -> StepFailure {
        let mut failure = StepFailure::new(input.clone(), error, self.metrics);
        failure.output["transcript"] = Value::Array(self.transcript.clone());
        failure
    }
}

/// 役割とラウンドに応じた指示文
fn role_instruction(role: DebateRole, round: u32, instruction: &str) -> String {
    match (role, round) {
        (DebateRole::Builder, 1) => instruction.to_string(),
        (DebateRole::Critic, 1) => format!(
            "Critically review the following task and list any concerns a proposal must address.\n\
             Reply with [RESOLVED] if you have no concerns.\n\n{}",
            instruction
        ),
        (DebateRole::Builder, _) => format!(
            "Revise your proposal to answer the critic's latest concerns.\n\n{}",
            instruction
        ),
        (DebateRole::Critic, _) => format!(
            "Evaluate the builder's latest revision.\n\
             Reply with [RESOLVED] if no concerns remain, otherwise list the outstanding ones.\n\n{}",
            instruction
        ),
        (DebateRole::Judge, _) => format!(
            "Review the full debate transcript and give the final decision.\n\n{}",
            instruction
        ),
    }
}
