//! ワークフロー定義とランタイム設定
//!
//! # モジュール構成
//!
//! - `dto` - デシリアライズ専用の生データ（内部用）
//! - [`resource`] - エージェント / ツールプロバイダーの定義
//! - [`step`] - ステップと実行戦略の定義
//! - [`workflow`] - ワークフロー定義（読み込みの入口）
//! - [`validation`] - 参照の整合性チェック
//! - [`settings`] - 実行環境ごとの設定

mod dto;
pub mod resource;
pub mod settings;
pub mod step;
pub mod validation;
pub mod workflow;

pub use resource::{AgentSpec, ResourceSpec, ToolProviderSpec};
pub use settings::{LogFormat, LogSettings, RuntimeSettings};
pub use step::{DebateStep, DirectStep, ScatterGatherStep, ScatterTask, StepKind, StepSpec};
pub use workflow::WorkflowDefinition;
