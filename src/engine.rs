//! ワークフロー実行エンジン
//!
//! # 責務
//!
//! - ワークフロー定義を受け取り、各ステップを宣言順に実行（fail-fast）
//! - テンプレート `${...}` の解決によるステップ間データ受け渡し
//! - Direct / Scatter-Gather / Debate の実行戦略
//! - タイムアウトとキャンセルの制御
//! - トレースの記録と実行状態の公開
//!
//! # モジュール構成
//!
//! - [`executor`][]: ワークフロー実行エンジン本体（インタープリター）
//! - [`context`][]: 実行コンテキスト（ブラックボード）
//! - [`template`][]: テンプレート解決
//! - [`strategy`][]: ステップ種別ごとの実行戦略
//! - [`result`][]: 実行結果・トレース・エラーの型
//! - [`status`][]: 実行状態の参照
//!
//! # 使用例
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use holon_engine::config::workflow::WorkflowDefinition;
//! use holon_engine::engine::WorkflowExecutor;
//! use holon_engine::provider::ProviderInvoker;
//! use holon_engine::trace::MemoryTraceSink;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1. ワークフローを読み込む
//!     let workflow = WorkflowDefinition::from_file("workflows/example.toml")?;
//!
//!     // 2. Executorを生成
//!     let sink = MemoryTraceSink::new();
//!     let executor = WorkflowExecutor::new(workflow, Arc::new(ProviderInvoker::new()))
//!         .with_trigger(json!({"topic": "Rust"}))
//!         .with_trace_sink(Arc::new(sink.clone()));
//!
//!     // 3. ワークフローを実行
//!     let result = executor.execute().await;
//!
//!     // 4. 結果を出力
//!     println!("Workflow: {}", result.workflow_id);
//!     println!("State: {:?}", result.state);
//!     println!("Total tokens: {}", result.metrics.total_tokens());
//!     println!("Duration: {:?}", result.total_duration);
//!
//!     for record in &result.trace {
//!         println!("  Step {}: {:?}", record.step_id, record.status);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod executor;
pub mod result;
pub mod status;
pub mod strategy;
pub mod template;

// 公開APIの再エクスポート
pub use context::{ContextError, ExecutionContext};
pub use executor::WorkflowExecutor;
pub use result::{
    DebateRole, InvocationSite, RunState, StepError, StepMetrics, StepStatus, TraceRecord,
    WorkflowResult,
};
pub use status::{RunMonitor, RunSnapshot};
pub use strategy::{MarkerResolutionDetector, ResolutionDetector};
pub use template::{ResolveError, TemplateResolver};
