//! プロバイダークライアントを使った [`AgentInvoker`] の実装
//!
//! # 責務
//!
//! - エージェントのリソース定義（`provider` / `model` / `env` / `tools`）から
//!   呼び出すクライアントとモデル名を決定する
//! - 指示文・入力・対話履歴からプロンプトを組み立てる
//! - レイテンシー・トークン使用量・コストを [`InvocationMetrics`] にまとめる
//!
//! # プロンプト構成
//!
//! ```text
//! (system) You are agent `<agent_id>` taking part in a Holon workflow.
//! (user)   <instruction>
//!
//!          ## Inputs
//!          { ...解決済み入力のJSON... }
//!
//!          ## Discussion so far
//!          [builder]
//!          ...
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::engine::template::canonical_string;
use crate::error::ProviderError;
use super::invocation::{AgentInvoker, AgentRequest, AgentResponse, InvocationMetrics};
use super::model::resolve_model;
use super::traits::ProviderRequest;
use super::{ProviderClient, Provider, create_provider};

/// リソース定義の `provider` に応じてクライアントを選ぶ [`AgentInvoker`]
pub struct ProviderInvoker {
    clients: HashMap<Provider, Arc<dyn ProviderClient>>,
}

impl ProviderInvoker {
    /// すべての組み込みプロバイダーのクライアントを持つインボーカーを生成
    pub fn new() -> Self {
        let clients = [Provider::Anthropic, Provider::OpenAI, Provider::Simulated]
            .into_iter()
            .map(|provider| (provider, Arc::from(create_provider(&provider))))
            .collect();

        Self { clients }
    }

    /// 指定プロバイダーのクライアントを差し替える
    ///
    /// テストやカスタムコマンドのCLIを使う場合に使用します。
    pub fn with_client(mut self, provider: Provider, client: Arc<dyn ProviderClient>) -> Self {
        self.clients.insert(provider, client);
        self
    }

    fn client(&self, provider: &Provider) -> Result<Arc<dyn ProviderClient>, ProviderError> {
        self.clients
            .get(provider)
            .cloned()
            .ok_or_else(|| ProviderError::UnsupportedProvider(provider.to_string()))
    }
}

impl Default for ProviderInvoker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentInvoker for ProviderInvoker {
    async fn invoke(&self, request: AgentRequest) -> Result<AgentResponse, ProviderError> {
        let provider: Provider = request.agent.provider.parse()?;
        let client = self.client(&provider)?;
        let model = resolve_model(&provider, request.agent.model.as_deref());

        let system_prompt = system_prompt(&request.agent_id);
        let user_input = user_input(&request);

        debug!(
            agent = %request.agent_id,
            provider = %provider,
            model = %model,
            history = request.history.len(),
            "invoking agent"
        );

        let started = Instant::now();
        let response = client
            .execute(&ProviderRequest {
                system_prompt: &system_prompt,
                user_input: &user_input,
                model: &model,
                tools: &request.tools,
                env: &request.agent.env,
            })
            .await?;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        Ok(AgentResponse {
            content: parse_content(&response.content),
            metrics: InvocationMetrics {
                latency_ms,
                cost_usd: response.cost_usd,
                token_usage: response.token_usage,
            },
        })
    }
}

fn system_prompt(agent_id: &str) -> String {
    format!("You are agent `{}` taking part in a Holon workflow.", agent_id)
}

/// 指示文・入力・対話履歴からユーザー入力を組み立てる
fn user_input(request: &AgentRequest) -> String {
    let mut prompt = request.instruction.clone();

    if !request.inputs.is_empty() {
        let inputs = Value::Object(request.inputs.clone());
        let rendered = serde_json::to_string_pretty(&inputs).unwrap_or_else(|_| inputs.to_string());
        prompt.push_str("\n\n## Inputs\n");
        prompt.push_str(&rendered);
    }

    if !request.history.is_empty() {
        prompt.push_str("\n\n## Discussion so far");
        for entry in &request.history {
            prompt.push_str(&format!("\n[{}]\n{}", entry.role, canonical_string(&entry.content)));
        }
    }

    prompt
}

/// JSONオブジェクトとして読める応答は構造化された値として扱う
fn parse_content(content: &str) -> Value {
    let trimmed = content.trim();
    if trimmed.starts_with('{') {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
            return value;
        }
    }
    Value::String(content.to_string())
}
