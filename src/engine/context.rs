//! 実行コンテキスト（ブラックボード）の管理
//!
//! # 責務
//!
//! - トリガーペイロード（実行開始時に一度だけ設定、以後不変）の保持
//! - 完了したステップの出力を、ステップIDをキーとして保持（ステップ間データ受け渡し）
//! - ステップ実行の進行状況と、テレメトリー情報（トークン使用量、コスト）の累積
//!
//! # 不変条件
//!
//! - ステップ出力は追加のみ。一度コミットされたステップIDは上書き・削除されない
//! - コンテキストを変更するのはインタープリター（[`WorkflowExecutor`](super::executor::WorkflowExecutor)）のみで、
//!   ステップの実行中は読み取り専用で各エグゼキューターに渡される
//!
//! # 主要な型
//!
//! - [`ExecutionContext`][]: 1回の実行全体のコンテキスト
//! - [`ContextError`][]: コミット時の不変条件違反
//!
//! # 使用例
//!
//! ```rust
//! use holon_engine::engine::context::ExecutionContext;
//! use serde_json::json;
//!
//! let mut ctx = ExecutionContext::new("daily-briefing".to_string(), json!({"topic": "Rust"}));
//!
//! ctx.start_step("fetch");
//! ctx.commit("fetch", json!({"output": "news"})).unwrap();
//!
//! assert_eq!(ctx.step_output("fetch"), Some(&json!({"output": "news"})));
//! assert_eq!(ctx.steps_executed(), ["fetch"]);
//! ```

use serde_json::{Map, Value, json};
use thiserror::Error;

use super::result::StepMetrics;

/// コンテキストのコミットエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// 同じステップIDの出力がすでにコミットされている
    #[error("ステップ '{0}' の出力はすでにコミットされています")]
    AlreadyCommitted(String),
}

/// 実行コンテキスト
///
/// ワークフロー1回分の実行状態を保持します。
/// 実行ごとに独立したインスタンスを持ち、複数の実行間で状態は共有されません。
///
/// # フィールド
///
/// - `workflow_id`: 実行中のワークフローID
/// - `trigger`: トリガーペイロード
/// - `steps`: ステップIDごとのコミット済み出力
/// - `steps_executed`: コミットされたステップIDのリスト（実行順）
/// - `current_step`: 現在実行中のステップID
/// - `metrics`: コミット済みステップのメトリクス累積
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    workflow_id: String,
    trigger: Value,

    // ステップ間データ受け渡し
    steps: Map<String, Value>,
    steps_executed: Vec<String>,
    current_step: Option<String>,

    // テレメトリー情報
    metrics: StepMetrics,
}

impl ExecutionContext {
    /// 新しい実行コンテキストを生成
    ///
    /// # 引数
    ///
    /// - `workflow_id`: 実行するワークフローのID
    /// - `trigger`: トリガーペイロード（任意のJSON値）
    pub fn new(workflow_id: String, trigger: Value) -> Self {
        Self {
            workflow_id,
            trigger,
            steps: Map::new(),
            steps_executed: Vec::new(),
            current_step: None,
            metrics: StepMetrics::default(),
        }
    }

    /// ワークフローID
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// トリガーペイロード
    pub fn trigger(&self) -> &Value {
        &self.trigger
    }

    /// ステップ実行を開始
    ///
    /// 現在実行中のステップとして記録します。コンテキストの内容は変更しません。
    pub fn start_step(&mut self, step_id: &str) {
        self.current_step = Some(step_id.to_string());
    }

    /// 実行中のステップを終了（失敗時など、コミットせずに終える場合）
    pub fn finish_step(&mut self) {
        self.current_step = None;
    }

    /// ステップ出力をコミット
    ///
    /// ステップ1つにつき1回だけ呼び出されます。
    ///
    /// # エラー
    ///
    /// - [`ContextError::AlreadyCommitted`] - 同じIDの出力がすでに存在する
    pub fn commit(&mut self, step_id: &str, output: Value) -> Result<(), ContextError> {
        if self.steps.contains_key(step_id) {
            return Err(ContextError::AlreadyCommitted(step_id.to_string()));
        }

        self.steps.insert(step_id.to_string(), output);
        self.steps_executed.push(step_id.to_string());
        self.current_step = None;
        Ok(())
    }

    /// コミット済みステップのメトリクスを累積
    pub fn record_metrics(&mut self, metrics: &StepMetrics) {
        self.metrics.merge(metrics);
    }

    /// 特定のステップの出力を取得
    ///
    /// # 戻り値
    ///
    /// - `Some(&Value)`: コミット済みの出力
    /// - `None`: 指定されたステップが存在しない、またはまだ完了していない場合
    pub fn step_output(&self, step_id: &str) -> Option<&Value> {
        self.steps.get(step_id)
    }

    /// 最後にコミットされたステップの出力を取得
    pub fn get_last_output(&self) -> Option<(&str, &Value)> {
        let step_id = self.steps_executed.last()?;
        self.steps.get(step_id).map(|output| (step_id.as_str(), output))
    }

    /// 指定したステップがコミット済みか
    pub fn contains(&self, step_id: &str) -> bool {
        self.steps.contains_key(step_id)
    }

    /// コミットされたステップIDのリスト（実行順）
    pub fn steps_executed(&self) -> &[String] {
        &self.steps_executed
    }

    /// 現在実行中のステップID
    pub fn current_step(&self) -> Option<&str> {
        self.current_step.as_deref()
    }

    /// コミット済みステップのメトリクス累積
    pub fn metrics(&self) -> &StepMetrics {
        &self.metrics
    }

    /// コンテキストのスナップショットをJSONで取得
    ///
    /// `{"trigger": ..., "steps": {...}}` の形式です。ステータス参照や最終結果の出力に使用します。
    pub fn snapshot(&self) -> Value {
        json!({
            "trigger": self.trigger,
            "steps": self.steps,
        })
    }
}
