//! 実行状態の参照
//!
//! # 責務
//!
//! 実行中のワークフローの状態（[`RunState`]、実行中のステップ、最新のコンテキスト）を
//! 実行を止めずに外部から参照できるようにします。
//!
//! インタープリターはステップの開始時とコミットのたびに [`RunSnapshot`] を
//! [`tokio::sync::watch`] チャネルに公開します。参照側は [`RunMonitor::snapshot`] で
//! 最新の値を取得するか、[`RunMonitor::changed`] で更新を待ちます。
//!
//! # 使用例
//!
//! ```rust,no_run
//! use holon_engine::engine::WorkflowExecutor;
//!
//! async fn watch(executor: &WorkflowExecutor) {
//!     let mut monitor = executor.monitor();
//!     while let Some(snapshot) = monitor.changed().await {
//!         println!("{:?} {:?}", snapshot.state, snapshot.current_step);
//!         if snapshot.state.is_terminal() {
//!             break;
//!         }
//!     }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use uuid::Uuid;

use super::context::ExecutionContext;
use super::result::RunState;

/// ある時点の実行状態
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub run_id: Uuid,
    pub workflow_id: String,
    pub state: RunState,
    /// 実行中のステップID
    pub current_step: Option<String>,
    /// コミット済みのステップID（実行順）
    pub completed_steps: Vec<String>,
    /// コンテキストのスナップショット（`{"trigger": ..., "steps": {...}}`）
    pub context: Value,
    pub updated_at: DateTime<Utc>,
}

/// 実行状態の参照ハンドル
///
/// 複製して複数の参照元から使用できます。
#[derive(Debug, Clone)]
pub struct RunMonitor {
    receiver: watch::Receiver<RunSnapshot>,
}

impl RunMonitor {
    /// 最新の実行状態
    pub fn snapshot(&self) -> RunSnapshot {
        self.receiver.borrow().clone()
    }

    /// 実行状態の更新を待つ
    ///
    /// 実行が終了してインタープリターが破棄された場合は `None` を返します。
    pub async fn changed(&mut self) -> Option<RunSnapshot> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// 実行が終了状態（COMPLETED / FAILED）になるまで待つ
    pub async fn wait_for_terminal(&mut self) -> RunSnapshot {
        loop {
            let snapshot = self.receiver.borrow_and_update().clone();
            if snapshot.state.is_terminal() {
                return snapshot;
            }
            if self.receiver.changed().await.is_err() {
                return self.snapshot();
            }
        }
    }
}

/// 実行状態の公開側
pub(crate) struct StatusPublisher {
    run_id: Uuid,
    sender: watch::Sender<RunSnapshot>,
}

impl StatusPublisher {
    pub(crate) fn new(run_id: Uuid, context: &ExecutionContext) -> Self {
        let (sender, _) = watch::channel(snapshot(run_id, RunState::Pending, context));
        Self { run_id, sender }
    }

    pub(crate) fn subscribe(&self) -> RunMonitor {
        RunMonitor {
            receiver: self.sender.subscribe(),
        }
    }

    /// 状態を公開する（参照側がいなくても失敗しない）
    pub(crate) fn publish(&self, state: RunState, context: &ExecutionContext) {
        self.sender.send_replace(snapshot(self.run_id, state, context));
    }
}

fn snapshot(run_id: Uuid, state: RunState, context: &ExecutionContext) -> RunSnapshot {
    RunSnapshot {
        run_id,
        workflow_id: context.workflow_id().to_string(),
        state,
        current_step: context.current_step().map(str::to_string),
        completed_steps: context.steps_executed().to_vec(),
        context: context.snapshot(),
        updated_at: Utc::now(),
    }
}
