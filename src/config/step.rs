//! ワークフローステップの定義
//!
//! # 責務
//!
//! Workflowを構成するStepの定義体を提供するモジュール。
//! アプリケーションに対して、[`StepSpec`] と実行戦略ごとの [`StepKind`] を提供する。
//!
//! # ステップ種別
//!
//! | `type` | 種別 | 必須フィールド |
//! |--------|------|----------------|
//! | 省略 / `agent` / `direct` | [`StepKind::Direct`] | `agent`, `instruction` |
//! | `scatter-gather` / `parallel` | [`StepKind::ScatterGather`] | `tasks`（または `parallel_tasks`） |
//! | `debate` | [`StepKind::Debate`] | `builder`, `critic`, `judge`, `instruction` |

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::engine::template::{references, references_in_value};
use crate::error::ConfigError;
use super::dto::{InputsDto, StepDto, TaskDto};

/// Debate の最大ラウンド数のデフォルト値
pub const DEFAULT_MAX_ROUNDS: u32 = 3;

/// ワークフローステップ（ドメインモデル）
///
/// ワークフロー内の1つの処理単位を表します。
///
/// ## DTO との違い
///
/// - [`StepDto`](super::dto::StepDto): デシリアライズ専用
/// - [`StepSpec`]: 種別ごとの必須チェック済み
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSpec {
    /// ステップID（ワークフロー内で一意）
    pub id: String,

    /// 名前付き入力（値はテンプレート）
    pub inputs: BTreeMap<String, Value>,

    /// エージェント呼び出し1回あたりのタイムアウト（秒）
    pub timeout_secs: Option<u64>,

    /// 実行戦略
    pub kind: StepKind,
}

/// ステップの実行戦略
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StepKind {
    /// 単一エージェントを1回呼び出す
    Direct(DirectStep),
    /// 複数のサブタスクを並列に実行し、宣言順に集約する
    ScatterGather(ScatterGatherStep),
    /// builder / critic の討論を judge が裁定する
    Debate(DebateStep),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectStep {
    pub agent: String,
    pub instruction: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterGatherStep {
    pub tasks: Vec<ScatterTask>,
}

/// Scatter-Gather のサブタスク
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterTask {
    pub agent: String,
    pub instruction: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebateStep {
    pub builder: String,
    pub critic: String,
    pub judge: String,
    pub instruction: String,
    /// 最大ラウンド数（1以上）
    pub max_rounds: u32,
}

impl StepKind {
    /// 種別名（トレースやログ用）
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Direct(_) => "direct",
            StepKind::ScatterGather(_) => "scatter-gather",
            StepKind::Debate(_) => "debate",
        }
    }
}

impl StepSpec {
    /// このステップが呼び出すエージェントのID（宣言順、重複あり）
    pub fn agents(&self) -> Vec<&str> {
        match &self.kind {
            StepKind::Direct(step) => vec![step.agent.as_str()],
            StepKind::ScatterGather(step) => step.tasks.iter().map(|t| t.agent.as_str()).collect(),
            StepKind::Debate(step) => vec![
                step.builder.as_str(),
                step.critic.as_str(),
                step.judge.as_str(),
            ],
        }
    }

    /// 指示文と入力に含まれる参照パス
    pub fn references(&self) -> Vec<&str> {
        let mut found: Vec<&str> = match &self.kind {
            StepKind::Direct(step) => references(&step.instruction),
            StepKind::ScatterGather(step) => step
                .tasks
                .iter()
                .flat_map(|t| references(&t.instruction))
                .collect(),
            StepKind::Debate(step) => references(&step.instruction),
        };
        for value in self.inputs.values() {
            found.extend(references_in_value(value));
        }
        found
    }
}

/// DTO からドメインモデルへの変換（読み込み方向）
///
/// 種別ごとの必須チェックを実施し、不正なデータの場合は [`ConfigError::Validation`] を返します。
/// 他のステップやリソースとの整合性は [`validation`](super::validation) で検査します。
impl TryFrom<StepDto> for StepSpec {
    type Error = ConfigError;

    fn try_from(dto: StepDto) -> Result<Self, Self::Error> {
        let id = dto.id.trim().to_string();
        if id.is_empty() {
            return Err(ConfigError::Validation("ステップIDが空です".to_string()));
        }

        if dto.timeout_secs == Some(0) {
            return Err(ConfigError::Validation(format!(
                "ステップ '{}': timeout_secs は1以上である必要があります",
                id
            )));
        }

        let kind = match dto.kind.as_deref().map(str::trim) {
            None | Some("agent") | Some("direct") => StepKind::Direct(DirectStep {
                agent: required(&id, "agent", dto.agent)?,
                instruction: required(&id, "instruction", dto.instruction)?,
            }),
            Some("scatter-gather") | Some("scatter_gather") | Some("parallel") => {
                if dto.tasks.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "ステップ '{}': scatter-gather には1つ以上の tasks が必要です",
                        id
                    )));
                }
                let tasks = dto
                    .tasks
                    .into_iter()
                    .enumerate()
                    .map(|(index, task)| scatter_task(&id, index, task))
                    .collect::<Result<Vec<_>, _>>()?;
                StepKind::ScatterGather(ScatterGatherStep { tasks })
            }
            Some("debate") => {
                let max_rounds = dto.max_rounds.unwrap_or(DEFAULT_MAX_ROUNDS);
                if max_rounds == 0 {
                    return Err(ConfigError::Validation(format!(
                        "ステップ '{}': max_rounds は1以上である必要があります",
                        id
                    )));
                }
                StepKind::Debate(DebateStep {
                    builder: required(&id, "builder", dto.builder)?,
                    critic: required(&id, "critic", dto.critic)?,
                    judge: required(&id, "judge", dto.judge)?,
                    instruction: required(&id, "instruction", dto.instruction)?,
                    max_rounds,
                })
            }
            Some(other) => {
                return Err(ConfigError::Validation(format!(
                    "ステップ '{}': 未対応のステップ種別です: {}",
                    id, other
                )));
            }
        };

        Ok(StepSpec {
            inputs: dto.inputs.map(named_inputs).unwrap_or_default(),
            timeout_secs: dto.timeout_secs,
            kind,
            id,
        })
    }
}

fn scatter_task(step_id: &str, index: usize, task: TaskDto) -> Result<ScatterTask, ConfigError> {
    let owner = format!("{}.tasks[{}]", step_id, index);
    Ok(ScatterTask {
        agent: required(&owner, "agent", task.agent)?,
        instruction: required(&owner, "instruction", task.instruction)?,
    })
}

fn required(owner: &str, field: &str, value: Option<String>) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Validation(format!(
            "ステップ '{}': {} が指定されていません",
            owner, field
        ))),
    }
}

/// リスト形式の入力に名前を付ける
///
/// 要素全体が1つの参照であればその参照パスを、そうでなければ `input_<index>` を名前にします。
fn named_inputs(inputs: InputsDto) -> BTreeMap<String, Value> {
    match inputs {
        InputsDto::Named(map) => map,
        InputsDto::List(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                let name = value
                    .as_str()
                    .and_then(whole_reference)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("input_{}", index));
                (name, value)
            })
            .collect(),
    }
}

fn whole_reference(template: &str) -> Option<&str> {
    template
        .trim()
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .map(str::trim)
        .filter(|path| !path.is_empty() && !path.contains('}'))
}
