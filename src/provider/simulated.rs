//! 外部呼び出しを行わない模擬プロバイダー
//!
//! ワークフロー定義の動作確認用です。CLIツールを起動せず、
//! 指示文の先頭行を `[SIMULATED]` 付きで返します。
//! 同じリクエストに対しては常に同じレスポンスを返します。

use async_trait::async_trait;

use crate::error::ProviderError;
use super::traits::{ProviderClient, ProviderRequest, ProviderResponse, StopReason, TokenUsage};

/// 模擬応答の接頭辞
pub const SIMULATED_PREFIX: &str = "[SIMULATED]";

/// 模擬プロバイダークライアント
#[derive(Debug, Default)]
pub struct SimulatedClient;

impl SimulatedClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProviderClient for SimulatedClient {
    async fn execute(
        &self,
        request: &ProviderRequest<'_>,
    ) -> Result<ProviderResponse, ProviderError> {
        let headline = request
            .user_input
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default();

        let content = format!("{} {}", SIMULATED_PREFIX, headline);

        Ok(ProviderResponse {
            token_usage: TokenUsage {
                input_tokens: word_count(request.system_prompt) + word_count(request.user_input),
                output_tokens: word_count(&content),
            },
            content,
            stop_reason: StopReason::EndTurn,
            model: request.model.to_string(),
            cost_usd: 0.0,
        })
    }
}

fn word_count(text: &str) -> u32 {
    u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX)
}
