//! リソース（エージェント / ツールプロバイダー）の定義
//!
//! # 責務
//!
//! ワークフロー文書の `resources` を、バリデーション済みの [`ResourceSpec`] として提供します。
//! エンジンはリソースの `provider` を解釈しません。解釈するのはエージェント呼び出しの実装側です。

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::ConfigError;
use super::dto::ResourceDto;

/// ツールプロバイダーを表す `type` の値
pub const TOOL_PROVIDER_TYPE: &str = "mcp-server";

/// エージェントを表す `type` の値（省略時のデフォルト）
pub const AGENT_TYPE: &str = "agent";

/// リソース定義（ドメインモデル）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceSpec {
    /// エージェント（LLMプロバイダー上のモデル）
    Agent(AgentSpec),
    /// エージェントが利用するツールのプロバイダー
    ToolProvider(ToolProviderSpec),
}

impl ResourceSpec {
    /// リソースID
    pub fn id(&self) -> &str {
        match self {
            ResourceSpec::Agent(agent) => &agent.id,
            ResourceSpec::ToolProvider(tool) => &tool.id,
        }
    }

    /// エージェントであれば定義を返す
    pub fn as_agent(&self) -> Option<&AgentSpec> {
        match self {
            ResourceSpec::Agent(agent) => Some(agent),
            ResourceSpec::ToolProvider(_) => None,
        }
    }

    /// ツールプロバイダーであれば定義を返す
    pub fn as_tool_provider(&self) -> Option<&ToolProviderSpec> {
        match self {
            ResourceSpec::Agent(_) => None,
            ResourceSpec::ToolProvider(tool) => Some(tool),
        }
    }
}

/// エージェント定義
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSpec {
    pub id: String,
    /// プロバイダー名（例: "anthropic", "openai"）
    pub provider: String,
    /// モデル名（省略時はプロバイダーのデフォルト）
    pub model: Option<String>,
    /// 利用するツールプロバイダーのID
    pub tools: Vec<String>,
    /// 呼び出し時の環境変数
    pub env: BTreeMap<String, String>,
}

/// ツールプロバイダー定義
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolProviderSpec {
    pub id: String,
    /// 起動コマンド
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// DTO からドメインモデルへの変換（読み込み方向）
///
/// `type` が省略または `agent` の場合はエージェント、`mcp-server` の場合はツールプロバイダーとして扱います。
/// 種別ごとの必須フィールドが欠けている場合は [`ConfigError::Validation`] を返します。
impl TryFrom<ResourceDto> for ResourceSpec {
    type Error = ConfigError;

    fn try_from(dto: ResourceDto) -> Result<Self, Self::Error> {
        let id = dto.id.trim().to_string();
        if id.is_empty() {
            return Err(ConfigError::Validation(
                "リソースIDが空です".to_string(),
            ));
        }

        match dto.kind.as_deref().map(str::trim) {
            None | Some(AGENT_TYPE) => {
                let provider = non_empty(dto.provider).ok_or_else(|| {
                    ConfigError::Validation(format!(
                        "エージェント '{}' に provider が指定されていません",
                        id
                    ))
                })?;

                Ok(ResourceSpec::Agent(AgentSpec {
                    id,
                    provider,
                    model: non_empty(dto.model),
                    tools: dto.tools,
                    env: dto.env,
                }))
            }
            Some(TOOL_PROVIDER_TYPE) => {
                let command = non_empty(dto.command).ok_or_else(|| {
                    ConfigError::Validation(format!(
                        "ツールプロバイダー '{}' に command が指定されていません",
                        id
                    ))
                })?;

                Ok(ResourceSpec::ToolProvider(ToolProviderSpec {
                    id,
                    command,
                    args: dto.args,
                    env: dto.env,
                }))
            }
            Some(other) => Err(ConfigError::Validation(format!(
                "リソース '{}' の type '{}' は未対応です（agent / {} のみ使用できます）",
                id, other, TOOL_PROVIDER_TYPE
            ))),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
