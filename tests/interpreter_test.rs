use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use holon_engine::config::settings::EngineSettings;
use holon_engine::config::workflow::WorkflowDefinition;
use holon_engine::engine::{RunState, StepStatus, WorkflowExecutor};
use holon_engine::error::ProviderError;
use holon_engine::provider::{AgentInvoker, AgentRequest, AgentResponse, InvocationMetrics};
use holon_engine::trace::MemoryTraceSink;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// エージェントごとの振る舞い
#[derive(Clone)]
enum Behavior {
    Reply(Value),
    Delayed(u64, Value),
    Replies(Vec<Value>),
    Fail,
    /// 実行のキャンセルトークンを止めてから応答する
    CancelRun(CancellationToken, Value),
}

#[derive(Default)]
struct MockInvoker {
    behaviors: HashMap<String, Behavior>,
    requests: Mutex<Vec<AgentRequest>>,
}

impl MockInvoker {
    fn new() -> Self {
        Self::default()
    }

    fn with(mut self, agent: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(agent.to_string(), behavior);
        self
    }

    fn requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn agents_called(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.agent_id).collect()
    }

    fn calls_to(&self, agent: &str) -> usize {
        self.agents_called().iter().filter(|id| *id == agent).count()
    }
}

#[async_trait]
impl AgentInvoker for MockInvoker {
    async fn invoke(&self, request: AgentRequest) -> Result<AgentResponse, ProviderError> {
        let nth = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.iter().filter(|r| r.agent_id == request.agent_id).count()
        };
        let metrics = InvocationMetrics {
            latency_ms: 1,
            cost_usd: 0.25,
            ..Default::default()
        };

        let content = match self.behaviors.get(&request.agent_id).cloned() {
            Some(Behavior::Reply(value)) => value,
            Some(Behavior::Delayed(ms, value)) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                value
            }
            Some(Behavior::Replies(values)) => values
                .get(nth - 1)
                .or_else(|| values.last())
                .cloned()
                .unwrap_or(Value::Null),
            Some(Behavior::Fail) => {
                return Err(ProviderError::Invocation(format!("{} is down", request.agent_id)));
            }
            Some(Behavior::CancelRun(token, value)) => {
                token.cancel();
                value
            }
            None => json!(format!("{}: {}", request.agent_id, request.instruction)),
        };

        Ok(AgentResponse { content, metrics })
    }
}

fn workflow(agents: &[&str], steps: &str) -> WorkflowDefinition {
    let mut doc = String::from("version = \"1\"\nproject = \"interpreter\"\n\n");
    for agent in agents {
        doc.push_str(&format!("[[resources]]\nid = \"{agent}\"\nprovider = \"simulated\"\n\n"));
    }
    doc.push_str("[workflow]\ntype = \"sequential\"\n\n");
    doc.push_str(steps);
    WorkflowDefinition::from_toml(&doc).expect("invalid test workflow")
}

const THREE_STEPS: &str = r#"
[[workflow.steps]]
id = "one"
agent = "a"
instruction = "first"

[[workflow.steps]]
id = "two"
agent = "b"
instruction = "second after ${steps.one.output}"

[[workflow.steps]]
id = "three"
agent = "c"
instruction = "third after ${steps.two.output}"
"#;

#[tokio::test]
async fn test_steps_run_in_declaration_order() {
    let invoker = Arc::new(MockInvoker::new());
    let sink = MemoryTraceSink::new();

    let result = WorkflowExecutor::new(workflow(&["a", "b", "c"], THREE_STEPS), invoker.clone())
        .with_trace_sink(Arc::new(sink.clone()))
        .execute()
        .await;

    assert_eq!(result.state, RunState::Completed);
    assert_eq!(invoker.agents_called(), vec!["a", "b", "c"]);

    let order: Vec<_> = result.trace.iter().map(|r| r.step_id.as_str()).collect();
    assert_eq!(order, vec!["one", "two", "three"]);
    let sunk: Vec<_> = sink.records().into_iter().map(|r| r.step_id).collect();
    assert_eq!(sunk, vec!["one", "two", "three"]);

    assert_eq!(invoker.requests()[1].instruction, "second after a: first");
    assert_eq!(result.metrics.invocations, 3);
    assert!((result.metrics.cost_usd - 0.75).abs() < 1e-9);
}

#[tokio::test]
async fn test_failure_stops_remaining_steps() {
    let invoker = Arc::new(MockInvoker::new().with("b", Behavior::Fail));

    let result = WorkflowExecutor::new(workflow(&["a", "b", "c"], THREE_STEPS), invoker.clone())
        .execute()
        .await;

    assert_eq!(result.state, RunState::Failed);
    assert_eq!(invoker.agents_called(), vec!["a", "b"]);

    assert_eq!(result.trace.len(), 2);
    assert_eq!(result.trace[0].status, StepStatus::Completed);
    assert_eq!(result.trace[1].status, StepStatus::Failed);
    assert_eq!(result.trace[1].output["kind"], "AgentInvocationError");
    assert_eq!(result.trace[1].output["agent"], "b");

    // 完了済みのステップだけがコンテキストに残る
    assert_eq!(result.context["steps"].as_object().unwrap().len(), 1);
    assert!(result.step_output("one").is_some());
    assert!(result.error.as_deref().unwrap().contains("two"));
}

const FAN_OUT: &str = r#"
[[workflow.steps]]
id = "fan"
type = "scatter-gather"

[[workflow.steps.tasks]]
agent = "slow"
instruction = "task one"

[[workflow.steps.tasks]]
agent = "medium"
instruction = "task two"

[[workflow.steps.tasks]]
agent = "fast"
instruction = "task three"

[[workflow.steps]]
id = "after"
agent = "fast"
instruction = "combine ${steps.fan.results}"
"#;

#[tokio::test]
async fn test_scatter_gather_keeps_declaration_order() {
    let invoker = Arc::new(
        MockInvoker::new()
            .with("slow", Behavior::Delayed(250, json!("S")))
            .with("medium", Behavior::Delayed(200, json!("M")))
            .with("fast", Behavior::Reply(json!("F"))),
    );

    let started = Instant::now();
    let definition = workflow(&["slow", "medium", "fast"], FAN_OUT);
    let result = WorkflowExecutor::new(definition, invoker.clone()).execute().await;

    assert!(result.is_success(), "error: {:?}", result.error);
    assert_eq!(result.step_output("fan").unwrap()["results"], json!(["S", "M", "F"]));
    assert_eq!(invoker.requests()[3].instruction, r#"combine ["S","M","F"]"#);
    // サブタスクは並行して実行される
    assert!(started.elapsed() < Duration::from_millis(420));
    assert_eq!(result.trace[0].metrics.invocations, 3);
}

#[tokio::test]
async fn test_scatter_gather_failure_commits_nothing() {
    let invoker = Arc::new(
        MockInvoker::new()
            .with("slow", Behavior::Delayed(60, json!("S")))
            .with("medium", Behavior::Fail)
            .with("fast", Behavior::Reply(json!("F"))),
    );

    let definition = workflow(&["slow", "medium", "fast"], FAN_OUT);
    let result = WorkflowExecutor::new(definition, invoker.clone()).execute().await;

    assert_eq!(result.state, RunState::Failed);
    assert!(result.step_output("fan").is_none());
    // 失敗後も他のサブタスクは完了まで待たれる
    assert_eq!(invoker.calls_to("slow"), 1);
    assert_eq!(invoker.calls_to("fast"), 1);

    let record = &result.trace[0];
    assert_eq!(record.status, StepStatus::Failed);
    let tasks = record.output["tasks"].as_array().unwrap();
    assert_eq!(tasks[0]["status"], "COMPLETED");
    assert_eq!(tasks[1]["status"], "FAILED");
    assert_eq!(tasks[2]["status"], "COMPLETED");
    assert_eq!(record.output["site"], json!({"kind": "task", "index": 1}));
    assert_eq!(result.trace.len(), 1);
}

#[tokio::test]
async fn test_trigger_values_reach_the_agent() {
    let steps = r#"
[[workflow.steps]]
id = "calc"
agent = "a"
instruction = "x is ${trigger.x}"

[workflow.steps.inputs]
x = "${trigger.x}"
label = "value ${trigger.x}"
"#;
    let invoker = Arc::new(MockInvoker::new());

    let result = WorkflowExecutor::new(workflow(&["a"], steps), invoker.clone())
        .with_trigger(json!({"x": 5}))
        .execute()
        .await;

    assert!(result.is_success());
    let request = &invoker.requests()[0];
    assert_eq!(request.instruction, "x is 5");
    assert_eq!(request.inputs["x"], json!(5));
    assert_eq!(request.inputs["label"], json!("value 5"));
    assert_eq!(result.context["trigger"], json!({"x": 5}));
}

#[tokio::test]
async fn test_missing_reference_fails_without_invocation() {
    let steps = r#"
[[workflow.steps]]
id = "calc"
agent = "a"
instruction = "topic is ${trigger.missing}"
"#;
    let invoker = Arc::new(MockInvoker::new());

    let result = WorkflowExecutor::new(workflow(&["a"], steps), invoker.clone())
        .with_trigger(json!({"x": 5}))
        .execute()
        .await;

    assert_eq!(result.state, RunState::Failed);
    assert!(invoker.requests().is_empty());
    assert_eq!(result.trace[0].output["kind"], "ReferenceError");
    assert!(result.trace[0].output["message"].as_str().unwrap().contains("trigger.missing"));
}

const DEBATE: &str = r#"
[[workflow.steps]]
id = "design"
type = "debate"
builder = "builder"
critic = "critic"
judge = "judge"
max_rounds = 3
instruction = "Design a cache for ${trigger.service}"
"#;

#[tokio::test]
async fn test_debate_stops_at_max_rounds() {
    let invoker = Arc::new(
        MockInvoker::new()
            .with("critic", Behavior::Reply(json!("still has problems")))
            .with("judge", Behavior::Reply(json!("go with the last draft"))),
    );

    let definition = workflow(&["builder", "critic", "judge"], DEBATE);
    let result = WorkflowExecutor::new(definition, invoker.clone())
        .with_trigger(json!({"service": "search"}))
        .execute()
        .await;

    assert!(result.is_success(), "error: {:?}", result.error);
    assert_eq!(invoker.calls_to("builder"), 3);
    assert_eq!(invoker.calls_to("critic"), 3);
    assert_eq!(invoker.calls_to("judge"), 1);

    let design = result.step_output("design").unwrap();
    assert_eq!(design["output"], "go with the last draft");
    assert_eq!(design["rounds"], 3);
    assert_eq!(design["resolved"], false);

    let judge = invoker.requests().into_iter().find(|r| r.agent_id == "judge").unwrap();
    assert_eq!(judge.history.len(), 6);
}

#[tokio::test]
async fn test_debate_ends_early_when_critic_resolves() {
    let invoker = Arc::new(
        MockInvoker::new()
            .with("critic", Behavior::Replies(vec![json!("add TTLs"), json!("[RESOLVED]")]))
            .with("judge", Behavior::Reply(json!({"decision": "ship"}))),
    );

    let definition = workflow(&["builder", "critic", "judge"], DEBATE);
    let result = WorkflowExecutor::new(definition, invoker.clone())
        .with_trigger(json!({"service": "search"}))
        .execute()
        .await;

    assert!(result.is_success());
    assert_eq!(invoker.calls_to("builder"), 2);
    assert_eq!(invoker.calls_to("critic"), 2);
    let design = result.step_output("design").unwrap();
    assert_eq!(design["rounds"], 2);
    assert_eq!(design["resolved"], true);
    assert_eq!(design["output"], json!({"decision": "ship"}));
}

#[tokio::test]
async fn test_fetch_analyze_report() {
    let steps = r#"
[[workflow.steps]]
id = "fetch"
agent = "researcher"
instruction = "news about ${trigger.topic}"

[[workflow.steps]]
id = "analyze"
type = "scatter-gather"

[[workflow.steps.tasks]]
agent = "tech"
instruction = "tech view of ${steps.fetch.output}"

[[workflow.steps.tasks]]
agent = "market"
instruction = "market view of ${steps.fetch.output}"

[[workflow.steps]]
id = "report"
agent = "writer"
instruction = "${steps.analyze.results}"
"#;
    let invoker = Arc::new(
        MockInvoker::new()
            .with("researcher", Behavior::Reply(json!("N")))
            .with("tech", Behavior::Reply(json!("T")))
            .with("market", Behavior::Reply(json!("M")))
            .with("writer", Behavior::Reply(json!("final report"))),
    );
    let sink = MemoryTraceSink::new();

    let result = WorkflowExecutor::new(
        workflow(&["researcher", "tech", "market", "writer"], steps),
        invoker.clone(),
    )
    .with_trigger(json!({"topic": "AI"}))
    .with_trace_sink(Arc::new(sink.clone()))
    .execute()
    .await;

    assert!(result.is_success(), "error: {:?}", result.error);
    let requests = invoker.requests();
    assert_eq!(requests[0].instruction, "news about AI");
    let analyses: Vec<_> = requests[1..3].iter().map(|r| r.instruction.clone()).collect();
    assert!(analyses.contains(&"tech view of N".to_string()));
    assert!(analyses.contains(&"market view of N".to_string()));
    assert_eq!(requests[3].instruction, r#"["T","M"]"#);

    assert_eq!(result.step_output("report").unwrap()["output"], "final report");
    assert_eq!(sink.records_for(result.run_id).len(), 3);
    assert_eq!(result.completed_steps(), 3);
}

#[tokio::test]
async fn test_cancel_during_step_records_cancelled_failure() {
    let steps = r#"
[[workflow.steps]]
id = "slow"
agent = "a"
instruction = "take your time"
"#;
    let invoker = Arc::new(MockInvoker::new().with("a", Behavior::Delayed(10_000, json!("late"))));
    let executor = WorkflowExecutor::new(workflow(&["a"], steps), invoker);
    let token = executor.cancellation_token();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    let started = Instant::now();
    let result = executor.execute().await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(result.state, RunState::Failed);
    assert_eq!(result.trace.len(), 1);
    assert_eq!(result.trace[0].status, StepStatus::Failed);
    assert_eq!(result.trace[0].output["kind"], "CancelledError");
    assert!(result.step_output("slow").is_none());
}

/// 100ms 後に実行をキャンセルする
fn cancel_soon(executor: &WorkflowExecutor) {
    let token = executor.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });
}

#[tokio::test]
async fn test_cancel_reaches_every_scatter_gather_task() {
    let invoker = Arc::new(
        MockInvoker::new()
            .with("slow", Behavior::Delayed(10_000, json!("S")))
            .with("medium", Behavior::Delayed(10_000, json!("M")))
            .with("fast", Behavior::Delayed(10_000, json!("F"))),
    );
    let definition = workflow(&["slow", "medium", "fast"], FAN_OUT);
    let executor = WorkflowExecutor::new(definition, invoker.clone());
    cancel_soon(&executor);

    let started = Instant::now();
    let result = executor.execute().await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.state, RunState::Failed);
    assert_eq!(result.trace.len(), 1);
    assert_eq!(result.trace[0].output["kind"], "CancelledError");
    assert!(result.step_output("fan").is_none());

    let tasks = result.trace[0].output["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 3);
    assert!(tasks.iter().all(|task| task["status"] == "FAILED"));
    // 後続ステップは起動されない
    assert_eq!(invoker.calls_to("fast"), 1);
}

#[tokio::test]
async fn test_cancel_reaches_debate_first_round() {
    let invoker = Arc::new(
        MockInvoker::new()
            .with("builder", Behavior::Delayed(10_000, json!("draft")))
            .with("critic", Behavior::Delayed(10_000, json!("[RESOLVED]"))),
    );
    let definition = workflow(&["builder", "critic", "judge"], DEBATE);
    let executor = WorkflowExecutor::new(definition, invoker.clone())
        .with_trigger(json!({"service": "search"}));
    cancel_soon(&executor);

    let started = Instant::now();
    let result = executor.execute().await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.state, RunState::Failed);
    assert_eq!(result.trace.len(), 1);
    assert_eq!(result.trace[0].output["kind"], "CancelledError");
    assert_eq!(result.trace[0].output["transcript"], json!([]));
    assert!(result.step_output("design").is_none());
    assert_eq!(invoker.calls_to("builder"), 1);
    assert_eq!(invoker.calls_to("critic"), 1);
    assert_eq!(invoker.calls_to("judge"), 0);
}

#[tokio::test]
async fn test_cancel_between_steps_skips_the_rest() {
    let token = CancellationToken::new();
    let invoker =
        Arc::new(MockInvoker::new().with("a", Behavior::CancelRun(token.clone(), json!("done"))));

    let result = WorkflowExecutor::new(workflow(&["a", "b", "c"], THREE_STEPS), invoker.clone())
        .with_cancellation_token(token)
        .execute()
        .await;

    assert_eq!(result.state, RunState::Failed);
    assert_eq!(invoker.agents_called(), vec!["a"]);
    // キャンセル後のステップはトレースに現れない
    assert_eq!(result.trace.len(), 1);
    assert_eq!(result.trace[0].status, StepStatus::Completed);
    assert_eq!(result.step_output("one").unwrap()["output"], "done");
}

#[tokio::test]
async fn test_engine_timeout_applies_to_agents() {
    let steps = r#"
[[workflow.steps]]
id = "slow"
agent = "a"
instruction = "hurry"
"#;
    let invoker = Arc::new(MockInvoker::new().with("a", Behavior::Delayed(5_000, json!("late"))));

    let started = Instant::now();
    let result = WorkflowExecutor::new(workflow(&["a"], steps), invoker)
        .with_settings(EngineSettings { agent_timeout_secs: 1 })
        .execute()
        .await;

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(result.state, RunState::Failed);
    assert_eq!(result.trace[0].output["kind"], "AgentInvocationError");
}

#[tokio::test]
async fn test_monitor_observes_run() {
    let invoker = Arc::new(MockInvoker::new().with("b", Behavior::Delayed(50, json!("b done"))));
    let executor = WorkflowExecutor::new(workflow(&["a", "b", "c"], THREE_STEPS), invoker)
        .with_trigger(json!({"who": "monitor"}));
    let mut monitor = executor.monitor();
    let run_id = executor.run_id();

    assert_eq!(monitor.snapshot().state, RunState::Pending);

    let handle = tokio::spawn(executor.execute());
    let last = monitor.wait_for_terminal().await;
    let result = handle.await.unwrap();

    assert_eq!(last.run_id, run_id);
    assert_eq!(last.state, RunState::Completed);
    assert_eq!(last.completed_steps, vec!["one", "two", "three"]);
    assert!(last.current_step.is_none());
    assert_eq!(last.context, result.context);
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let steps = r#"
[[workflow.steps]]
id = "echo"
agent = "a"
instruction = "${trigger.name}"
"#;
    let invoker = Arc::new(MockInvoker::new());
    let first = WorkflowExecutor::new(workflow(&["a"], steps), invoker.clone())
        .with_trigger(json!({"name": "first"}));
    let second = WorkflowExecutor::new(workflow(&["a"], steps), invoker.clone())
        .with_trigger(json!({"name": "second"}));
    assert_ne!(first.run_id(), second.run_id());

    let (a, b) = tokio::join!(first.execute(), second.execute());

    assert_eq!(a.step_output("echo").unwrap()["output"], "a: first");
    assert_eq!(b.step_output("echo").unwrap()["output"], "a: second");
}

#[test]
fn test_invalid_workflows_are_rejected_before_running() {
    let forward = r#"
[[workflow.steps]]
id = "one"
agent = "a"
instruction = "${steps.two.output}"

[[workflow.steps]]
id = "two"
agent = "a"
instruction = "hi"
"#;
    let unknown_agent = r#"
[[workflow.steps]]
id = "one"
agent = "ghost"
instruction = "hi"
"#;
    let bad_root = r#"
[[workflow.steps]]
id = "one"
agent = "a"
instruction = "${env.HOME}"
"#;

    for steps in [forward, unknown_agent, bad_root] {
        let mut doc = String::from(
            "version = \"1\"\nproject = \"p\"\n\n[[resources]]\nid = \"a\"\nprovider = \"simulated\"\n\n[workflow]\ntype = \"sequential\"\n",
        );
        doc.push_str(steps);
        assert!(WorkflowDefinition::from_toml(&doc).is_err(), "accepted: {steps}");
    }
}
