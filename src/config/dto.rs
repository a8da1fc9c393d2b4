//! ワークフロー文書のデシリアライズ用 DTO (Data Transfer Object)
//!
//! # 責務
//!
//! このモジュールは、TOML / YAML ファイルからのデータ読み込み専用の構造体を提供します。
//! DTO はバリデーション前の「生データ」を表現し、ドメインモデルとは分離されています。
//!
//! ## 設計思想
//!
//! - **単一責務**: デシリアライズのみを担当
//! - **文書構造への密結合**: TOML と YAML で同じ構造を受け付ける
//! - **バリデーション前の状態**: 不正なデータも一旦受け入れる
//! - **カプセル化**: config モジュール内部のみで使用（外部非公開）
//!
//! ## 変換フロー
//!
//! ```text
//! TOML / YAML ファイル
//!   ↓ (デシリアライズ)
//! WorkflowDocumentDto
//!   ↓ (TryFrom でバリデーション)
//! WorkflowDefinition (ドメインモデル)
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

/// ワークフロー文書 DTO
///
/// 文書のトップレベル（`version` / `project` / `trigger` / `resources` / `workflow`）を
/// デシリアライズします。
///
/// **注**: この構造体は config モジュール内部の実装詳細です。
/// 外部からは [`WorkflowDefinition`](super::workflow::WorkflowDefinition) を使用してください。
#[derive(Debug, Deserialize)]
pub(super) struct WorkflowDocumentDto {
    /// 文書フォーマットのバージョン（文字列・数値のどちらも可）
    pub(super) version: VersionDto,
    /// プロジェクト名（ワークフローID として使用）
    pub(super) project: String,
    /// トリガー定義（エンジンは解釈しない）
    #[serde(default)]
    pub(super) trigger: Option<Value>,
    /// リソースの配列
    #[serde(default)]
    pub(super) resources: Vec<ResourceDto>,
    /// ワークフロー本体
    pub(super) workflow: WorkflowBodyDto,
}

/// バージョン表記
///
/// `version = "1.0"` と `version = 1.0` の両方を受け付けます。
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum VersionDto {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl VersionDto {
    pub(super) fn into_string(self) -> String {
        match self {
            VersionDto::Integer(n) => n.to_string(),
            VersionDto::Float(n) => n.to_string(),
            VersionDto::Text(s) => s,
        }
    }
}

/// ワークフロー本体 DTO
#[derive(Debug, Deserialize)]
pub(super) struct WorkflowBodyDto {
    /// 実行パターン（`sequential` のみ実行可能）
    #[serde(rename = "type")]
    pub(super) kind: String,
    /// ステップの配列
    #[serde(default)]
    pub(super) steps: Vec<StepDto>,
}

/// リソース DTO
///
/// エージェントとツールプロバイダー（`type = "mcp-server"`）の両方を同じ形で受け取ります。
#[derive(Debug, Deserialize)]
pub(super) struct ResourceDto {
    pub(super) id: String,
    #[serde(default, rename = "type")]
    pub(super) kind: Option<String>,
    #[serde(default)]
    pub(super) provider: Option<String>,
    #[serde(default)]
    pub(super) model: Option<String>,
    #[serde(default)]
    pub(super) command: Option<String>,
    #[serde(default)]
    pub(super) args: Vec<String>,
    #[serde(default)]
    pub(super) tools: Vec<String>,
    #[serde(default)]
    pub(super) env: BTreeMap<String, String>,
}

/// ステップ DTO
///
/// ステップ種別ごとのフィールドをすべて省略可能として受け取り、
/// 種別に応じた必須チェックは [`StepSpec`](super::step::StepSpec) への変換時に行います。
#[derive(Debug, Deserialize)]
pub(super) struct StepDto {
    pub(super) id: String,
    #[serde(default, rename = "type")]
    pub(super) kind: Option<String>,
    #[serde(default)]
    pub(super) agent: Option<String>,
    #[serde(default)]
    pub(super) instruction: Option<String>,
    #[serde(default)]
    pub(super) inputs: Option<InputsDto>,
    #[serde(default, alias = "parallel_tasks")]
    pub(super) tasks: Vec<TaskDto>,
    #[serde(default)]
    pub(super) builder: Option<String>,
    #[serde(default)]
    pub(super) critic: Option<String>,
    #[serde(default)]
    pub(super) judge: Option<String>,
    #[serde(default)]
    pub(super) max_rounds: Option<u32>,
    #[serde(default)]
    pub(super) timeout_secs: Option<u64>,
}

/// ステップ入力 DTO
///
/// 名前付きのマップ形式と、参照テンプレートを並べたリスト形式の両方を受け付けます。
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum InputsDto {
    Named(BTreeMap<String, Value>),
    List(Vec<Value>),
}

/// Scatter-Gather のサブタスク DTO
#[derive(Debug, Deserialize)]
pub(super) struct TaskDto {
    #[serde(default)]
    pub(super) agent: Option<String>,
    #[serde(default)]
    pub(super) instruction: Option<String>,
}
