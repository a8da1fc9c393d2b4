//! Anthropic Claude Code CLI クライアント
//!
//! # 責務
//!
//! - `claude -p` を非対話モードで呼び出し、結果オブジェクトを [`ProviderResponse`] に変換する
//! - エージェントに割り当てられたツールプロバイダーを `--mcp-config` として渡す
//!
//! # CLIツール
//!
//! - **コマンド**: `claude -p "prompt" --output-format json --model <model>`
//! - **インストール**: `npm install -g @anthropic-ai/claude-code`
//! - **認証方法**: 環境変数 `ANTHROPIC_API_KEY`、または `claude` を起動して `/login`
//!
//! # 出力形式
//!
//! ```json
//! {
//!   "type": "result",
//!   "is_error": false,
//!   "result": "...",
//!   "total_cost_usd": 0.0042,
//!   "usage": { "input_tokens": 100, "output_tokens": 250 }
//! }
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::config::resource::ToolProviderSpec;
use crate::error::ProviderError;
use super::cli::CliTool;
use super::traits::{ProviderClient, ProviderRequest, ProviderResponse, StopReason, TokenUsage};

const DEFAULT_COMMAND: &str = "claude";
const NPM_PACKAGE: &str = "@anthropic-ai/claude-code";

/// Anthropic Claude Code CLI クライアント
///
/// 認証は環境変数またはCLIツールの事前ログインに依存します。
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    cli: CliTool,
}

impl AnthropicClient {
    pub fn new() -> Self {
        Self::with_command(DEFAULT_COMMAND)
    }

    /// コマンド名またはパスを指定してクライアントを生成
    ///
    /// # 例
    ///
    /// ```rust
    /// use holon_engine::provider::anthropic::AnthropicClient;
    ///
    /// let client = AnthropicClient::with_command("claude-dev");
    /// ```
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            cli: CliTool::new(command, NPM_PACKAGE),
        }
    }

    fn arguments(request: &ProviderRequest<'_>) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            format!("{}\n\n{}", request.system_prompt, request.user_input),
            "--output-format".to_string(),
            "json".to_string(),
            "--model".to_string(),
            request.model.to_string(),
        ];

        if !request.tools.is_empty() {
            args.push("--mcp-config".to_string());
            args.push(mcp_config(request.tools).to_string());
        }

        args
    }
}

impl Default for AnthropicClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    async fn execute(
        &self,
        request: &ProviderRequest<'_>,
    ) -> Result<ProviderResponse, ProviderError> {
        self.cli.ensure_installed().await?;

        let stdout = self.cli.run(&Self::arguments(request), request.env).await?;
        let result: ClaudeResult = serde_json::from_str(stdout.trim()).map_err(|e| {
            ProviderError::InvalidResponse(format!("claude の JSON 出力を解釈できません: {e}: {stdout}"))
        })?;

        result.into_response(request.model)
    }
}

/// ツールプロバイダーの定義から `--mcp-config` 用のJSONを組み立てる
fn mcp_config(tools: &[ToolProviderSpec]) -> Value {
    let servers: Map<String, Value> = tools
        .iter()
        .map(|tool| {
            (
                tool.id.clone(),
                json!({
                    "command": tool.command,
                    "args": tool.args,
                    "env": tool.env,
                }),
            )
        })
        .collect();

    json!({ "mcpServers": servers })
}

/// `--output-format json` の結果オブジェクト
#[derive(Debug, Deserialize)]
struct ClaudeResult {
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    result: String,
    #[serde(default)]
    total_cost_usd: Option<f64>,
    #[serde(default)]
    usage: ClaudeUsage,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ClaudeUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl ClaudeResult {
    fn into_response(self, requested_model: &str) -> Result<ProviderResponse, ProviderError> {
        if self.is_error {
            return Err(ProviderError::Invocation(self.result));
        }

        Ok(ProviderResponse {
            content: self.result,
            token_usage: TokenUsage {
                input_tokens: self.usage.input_tokens,
                output_tokens: self.usage.output_tokens,
            },
            // 結果オブジェクトは停止理由を含まない
            stop_reason: StopReason::EndTurn,
            model: self.model.unwrap_or_else(|| requested_model.to_string()),
            cost_usd: self.total_cost_usd.unwrap_or(0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn request<'a>(
        tools: &'a [ToolProviderSpec],
        env: &'a BTreeMap<String, String>,
    ) -> ProviderRequest<'a> {
        ProviderRequest {
            system_prompt: "You are agent `writer`.",
            user_input: "Write it",
            model: "claude-sonnet-4-5",
            tools,
            env,
        }
    }

    fn filesystem_tool() -> ToolProviderSpec {
        ToolProviderSpec {
            id: "filesystem".to_string(),
            command: "npx".to_string(),
            args: vec!["-y".to_string(), "@modelcontextprotocol/server-filesystem".to_string()],
            env: BTreeMap::from([("ROOT".to_string(), "/tmp".to_string())]),
        }
    }

    #[test]
    fn test_default_command() {
        assert_eq!(AnthropicClient::new().cli.command(), DEFAULT_COMMAND);
        assert_eq!(AnthropicClient::default().cli.command(), DEFAULT_COMMAND);
        assert_eq!(AnthropicClient::with_command("claude-dev").cli.command(), "claude-dev");
    }

    #[test]
    fn test_arguments_without_tools() {
        let env = BTreeMap::new();
        let args = AnthropicClient::arguments(&request(&[], &env));

        assert_eq!(args[0], "-p");
        assert_eq!(args[1], "You are agent `writer`.\n\nWrite it");
        assert_eq!(&args[2..], ["--output-format", "json", "--model", "claude-sonnet-4-5"]);
    }

    #[test]
    fn test_arguments_with_tools() {
        let env = BTreeMap::new();
        let tools = [filesystem_tool()];
        let args = AnthropicClient::arguments(&request(&tools, &env));

        let position = args.iter().position(|arg| arg == "--mcp-config").unwrap();
        let config: Value = serde_json::from_str(&args[position + 1]).unwrap();
        assert_eq!(config["mcpServers"]["filesystem"]["command"], "npx");
    }

    #[test]
    fn test_mcp_config_shape() {
        let config = mcp_config(&[filesystem_tool()]);
        assert_eq!(config["mcpServers"]["filesystem"]["args"][0], "-y");
        assert_eq!(config["mcpServers"]["filesystem"]["env"]["ROOT"], "/tmp");
    }

    #[test]
    fn test_result_into_response() {
        let json = r#"{
            "type": "result",
            "subtype": "success",
            "is_error": false,
            "result": "Hello! How can I help you?",
            "total_cost_usd": 0.0012,
            "usage": {"input_tokens": 10, "output_tokens": 20, "cache_read_input_tokens": 0}
        }"#;

        let result: ClaudeResult = serde_json::from_str(json).unwrap();
        let response = result.into_response("claude-sonnet-4-5").unwrap();
        assert_eq!(response.content, "Hello! How can I help you?");
        assert_eq!(response.model, "claude-sonnet-4-5");
        assert_eq!(response.token_usage.total(), 30);
        assert_eq!(response.cost_usd, 0.0012);
    }

    #[test]
    fn test_error_result() {
        let json = r#"{"type": "result", "is_error": true, "result": "max turns reached"}"#;
        let result: ClaudeResult = serde_json::from_str(json).unwrap();

        let err = result.into_response("m").unwrap_err();
        assert!(matches!(err, ProviderError::Invocation(ref msg) if msg == "max turns reached"));
    }
}
