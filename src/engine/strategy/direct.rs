//! Direct ステップ: 単一エージェントを1回だけ呼び出す
//!
//! コミット値は `{"output": <エージェントの結果>}` です。結果はそのまま格納されます。

use std::time::Instant;

use serde_json::json;

use crate::config::step::DirectStep;
use crate::engine::result::{InvocationSite, StepMetrics, elapsed_ms};
use crate::engine::template::TemplateResolver;
use super::{StepEnv, StepFailure, StepOutcome};

pub(super) async fn run(env: &StepEnv<'_>, spec: &DirectStep) -> Result<StepOutcome, StepFailure> {
    let resolver = TemplateResolver::new(env.context, &env.step.id);

    let instruction = resolver
        .render(&spec.instruction)
        .map_err(|e| StepFailure::unresolved(env.step, e.into()))?;
    let inputs = resolver
        .resolve_inputs(&env.step.inputs)
        .map_err(|e| StepFailure::unresolved(env.step, e.into()))?;

    let input = json!({
        "agent": spec.agent,
        "instruction": instruction,
        "inputs": inputs,
    });

    let mut metrics = StepMetrics::default();
    let started = Instant::now();
    let response = match env
        .dispatcher
        .invoke(&spec.agent, InvocationSite::Direct, instruction, inputs, Vec::new())
        .await
    {
        Ok(response) => response,
        Err(error) => {
            metrics.record_failure(&error, elapsed_ms(started));
            return Err(StepFailure::new(input, error, metrics));
        }
    };
    metrics.record(&response.metrics);

    let committed = json!({ "output": response.content });

    Ok(StepOutcome {
        input,
        trace_output: committed.clone(),
        committed,
        metrics,
    })
}
