//! Workflow 定義の読み込みと管理を行うモジュール
//!
//! # 責務
//!
//! このモジュールは、エージェントを組み合わせたワークフローを TOML / YAML 形式で定義し、
//! それを Rust の型として扱うための機能を提供します。
//!
//! ## 主な機能
//!
//! - **文書パース**: TOML / YAML ファイルを読み込み、[`WorkflowDefinition`] に変換
//! - **静的バリデーション**: 参照の整合性を実行前に検査
//!   （詳細は [`validation`](super::validation)）
//! - **リソース参照**: ステップが使うエージェントとツールプロバイダーの解決
//!
//! ## 設計思想
//!
//! - **宣言的定義**: 手続き的なコードではなく、宣言的な文書でワークフローを記述する
//! - **不変性**: 構築後のワークフロー定義は変更されない
//! - **検証済みの状態**: バリデーションを通過しない定義は構築できない
//!
//! ## 使用例
//!
//! ```toml
//! version = "1.0"
//! project = "daily-briefing"
//!
//! [[resources]]
//! id = "researcher"
//! provider = "anthropic"
//!
//! [workflow]
//! type = "sequential"
//!
//! [[workflow.steps]]
//! id = "fetch"
//! agent = "researcher"
//! instruction = "Collect news about ${trigger.topic}"
//!
//! [[workflow.steps]]
//! id = "summarize"
//! agent = "researcher"
//! instruction = "Summarize: ${steps.fetch.output}"
//! ```
//!
//! ## 関連モジュール
//!
//! - [`crate::config::step`]: 各ステップの定義
//! - [`crate::config::resource`]: リソースの定義
//! - [`crate::engine::executor`]: ワークフローの実行エンジン

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::error::ConfigError;
use super::dto::WorkflowDocumentDto;
use super::resource::{AgentSpec, ResourceSpec, ToolProviderSpec};
use super::step::StepSpec;
use super::validation;

/// ワークフロー定義（ドメインモデル）
///
/// バリデーション済みの状態を保証します。構築後は変更されません。
///
/// ## DTO との違い
///
/// - [`WorkflowDocumentDto`]: デシリアライズ専用、バリデーション前の生データ
/// - [`WorkflowDefinition`]: バリデーション済み、参照の解決機能を持つ
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    id: String,
    version: String,
    trigger: Option<Value>,
    resources: BTreeMap<String, ResourceSpec>,
    steps: Vec<StepSpec>,
}

impl WorkflowDefinition {
    /// ファイルからワークフローを読み込む
    ///
    /// 拡張子で形式を判別します（`.toml` / `.yaml` / `.yml`）。
    ///
    /// # 処理フロー
    ///
    /// 1. ファイル読み込み
    /// 2. デシリアライズ → [`WorkflowDocumentDto`]
    /// 3. バリデーション & 変換 → [`WorkflowDefinition`]
    ///
    /// # エラー
    ///
    /// * [`ConfigError::UnsupportedFormat`] - 拡張子が未対応の場合
    /// * その他 - ファイルの読み込み、パース、バリデーションに失敗した場合
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("toml") => Self::from_toml(&std::fs::read_to_string(path)?),
            Some("yaml") | Some("yml") => Self::from_yaml(&std::fs::read_to_string(path)?),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// TOML 文字列からワークフローを読み込む
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let dto: WorkflowDocumentDto = toml::from_str(toml)?;
        Self::try_from(dto)
    }

    /// YAML 文字列からワークフローを読み込む
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let dto: WorkflowDocumentDto = serde_yaml::from_str(yaml)?;
        Self::try_from(dto)
    }

    /// ワークフローID（文書の `project`）
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// 文書に記述されたトリガー定義（エンジンは解釈しない）
    pub fn trigger(&self) -> Option<&Value> {
        self.trigger.as_ref()
    }

    pub fn resources(&self) -> &BTreeMap<String, ResourceSpec> {
        &self.resources
    }

    /// 宣言順のステップ
    pub fn steps(&self) -> &[StepSpec] {
        &self.steps
    }

    pub fn step(&self, id: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|step| step.id == id)
    }

    /// エージェント定義を取得する
    pub fn agent(&self, id: &str) -> Option<&AgentSpec> {
        self.resources.get(id).and_then(ResourceSpec::as_agent)
    }

    /// エージェントが利用するツールプロバイダー定義（`tools` の宣言順）
    pub fn tool_providers_for(&self, agent: &AgentSpec) -> Vec<ToolProviderSpec> {
        agent
            .tools
            .iter()
            .filter_map(|id| self.resources.get(id).and_then(ResourceSpec::as_tool_provider))
            .cloned()
            .collect()
    }
}

/// DTO からドメインモデルへの変換（読み込み方向）
///
/// # 処理フロー
///
/// 1. リソースの変換と重複チェック
/// 2. ステップの変換（`StepDto` → `StepSpec`）
/// 3. 参照の整合性チェック
/// 4. `WorkflowDefinition` の構築
impl TryFrom<WorkflowDocumentDto> for WorkflowDefinition {
    type Error = ConfigError;

    fn try_from(dto: WorkflowDocumentDto) -> Result<Self, Self::Error> {
        let id = dto.project.trim().to_string();
        if id.is_empty() {
            return Err(ConfigError::Validation("project が空です".to_string()));
        }

        let mut resources = BTreeMap::new();
        for raw in dto.resources {
            let resource = ResourceSpec::try_from(raw)?;
            let key = resource.id().to_string();
            if resources.insert(key.clone(), resource).is_some() {
                return Err(ConfigError::Validation(format!(
                    "リソースID '{}' が重複しています",
                    key
                )));
            }
        }

        let steps = dto
            .workflow
            .steps
            .into_iter()
            .map(StepSpec::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        validation::validate(&dto.workflow.kind, &resources, &steps)?;

        Ok(WorkflowDefinition {
            id,
            version: dto.version.into_string(),
            trigger: dto.trigger,
            resources,
            steps,
        })
    }
}
