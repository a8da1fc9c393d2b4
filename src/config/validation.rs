//! ワークフロー定義の静的バリデーション
//!
//! # 責務
//!
//! 実行前に検出できる不整合をすべて洗い出します。
//!
//! - ワークフロー種別が `sequential` であること
//! - ステップIDが一意であること
//! - ステップが参照するエージェントが Agent リソースとして定義されていること
//! - エージェントの `tools` が Tool Provider リソースとして定義されていること
//! - テンプレート参照のルートが `trigger` / `steps` であること
//! - `steps.<id>` 参照が自分より前に宣言されたステップを指していること
//!   （前方参照・自己参照・循環参照の禁止）
//!
//! 見つかった問題はまとめて1つの [`ConfigError::Validation`] として返します。

use std::collections::{BTreeMap, HashSet};

use crate::engine::template::{ReferenceRoot, reference_root};
use crate::error::ConfigError;
use super::resource::ResourceSpec;
use super::step::StepSpec;

/// 実行可能なワークフロー種別
pub const SEQUENTIAL: &str = "sequential";

/// ワークフロー定義全体を検査する
pub(super) fn validate(
    workflow_kind: &str,
    resources: &BTreeMap<String, ResourceSpec>,
    steps: &[StepSpec],
) -> Result<(), ConfigError> {
    let mut problems = Vec::new();

    check_workflow_kind(workflow_kind, &mut problems);
    check_tools(resources, &mut problems);
    check_steps(resources, steps, &mut problems);

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(problems.join("; ")))
    }
}

fn check_workflow_kind(kind: &str, problems: &mut Vec<String>) {
    match kind.trim() {
        SEQUENTIAL => {}
        "scatter-gather" | "parallel" => problems.push(format!(
            "ワークフロー種別 '{}' は実行できません。並列実行はステップの type = \"scatter-gather\" で記述してください",
            kind
        )),
        other => problems.push(format!("未対応のワークフロー種別です: {}", other)),
    }
}

fn check_tools(resources: &BTreeMap<String, ResourceSpec>, problems: &mut Vec<String>) {
    for agent in resources.values().filter_map(ResourceSpec::as_agent) {
        for tool in &agent.tools {
            match resources.get(tool) {
                Some(ResourceSpec::ToolProvider(_)) => {}
                Some(ResourceSpec::Agent(_)) => problems.push(format!(
                    "エージェント '{}' の tools '{}' はツールプロバイダーではありません",
                    agent.id, tool
                )),
                None => problems.push(format!(
                    "エージェント '{}' の tools '{}' が resources に定義されていません",
                    agent.id, tool
                )),
            }
        }
    }
}

fn check_steps(
    resources: &BTreeMap<String, ResourceSpec>,
    steps: &[StepSpec],
    problems: &mut Vec<String>,
) {
    let mut declared: HashSet<&str> = HashSet::new();
    let all_ids: HashSet<&str> = steps.iter().map(|s| s.id.as_str()).collect();

    for step in steps {
        if declared.contains(step.id.as_str()) {
            problems.push(format!("ステップID '{}' が重複しています", step.id));
        }

        for agent in step.agents() {
            match resources.get(agent) {
                Some(ResourceSpec::Agent(_)) => {}
                Some(ResourceSpec::ToolProvider(_)) => problems.push(format!(
                    "ステップ '{}': '{}' はエージェントではありません",
                    step.id, agent
                )),
                None => problems.push(format!(
                    "ステップ '{}': エージェント '{}' が resources に定義されていません",
                    step.id, agent
                )),
            }
        }

        for path in step.references() {
            match reference_root(path) {
                Some(ReferenceRoot::Trigger) => {}
                Some(ReferenceRoot::Step(target)) if declared.contains(target) => {}
                Some(ReferenceRoot::Step(target)) if target == step.id => problems.push(format!(
                    "ステップ '{}': 自分自身の出力は参照できません: ${{{}}}",
                    step.id, path
                )),
                Some(ReferenceRoot::Step(target)) if all_ids.contains(target) => {
                    problems.push(format!(
                        "ステップ '{}': 後続のステップ '{}' は参照できません: ${{{}}}",
                        step.id, target, path
                    ))
                }
                Some(ReferenceRoot::Step(_)) => problems.push(format!(
                    "ステップ '{}': 存在しないステップを参照しています: ${{{}}}",
                    step.id, path
                )),
                None => problems.push(format!(
                    "ステップ '{}': 不正な参照ルートです: ${{{}}}（trigger または steps のみ使用できます）",
                    step.id, path
                )),
            }
        }

        declared.insert(step.id.as_str());
    }
}
