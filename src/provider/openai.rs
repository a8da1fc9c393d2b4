//! OpenAI Codex CLI クライアント
//!
//! # 責務
//!
//! - `codex exec --json` を呼び出し、JSONL形式のイベント列を [`ProviderResponse`] に集約する
//! - エージェントの環境変数をサブプロセスに渡す
//!
//! # CLIツール
//!
//! - **コマンド**: `codex exec --json --model <model> "prompt"`
//! - **インストール**: `npm install -g @openai/codex`
//! - **認証方法**: 環境変数 `OPENAI_API_KEY`、または `codex login`
//!
//! # 出力形式
//!
//! 1行に1イベントが出力されます。使用するのは次の3種類で、それ以外は読み飛ばします。
//!
//! ```json
//! {"type":"turn.started","model":"gpt-4o"}
//! {"type":"item.completed","item":{"type":"text","text":"Hello, world!"}}
//! {"type":"turn.completed","usage":{"input_tokens":10,"output_tokens":5},"stop_reason":"end_turn"}
//! ```
//!
//! # ツールプロバイダー
//!
//! Codex CLI にはツールプロバイダーを呼び出し単位で渡す手段がないため、
//! エージェントに `tools` が割り当てられていても警告を出して無視します。

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::error::ProviderError;
use super::cli::CliTool;
use super::traits::{ProviderClient, ProviderRequest, ProviderResponse, StopReason, TokenUsage};

const DEFAULT_COMMAND: &str = "codex";
const NPM_PACKAGE: &str = "@openai/codex";

/// OpenAI Codex CLI クライアント
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    cli: CliTool,
}

impl OpenAIClient {
    pub fn new() -> Self {
        Self::with_command(DEFAULT_COMMAND)
    }

    /// コマンド名またはパスを指定してクライアントを生成
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            cli: CliTool::new(command, NPM_PACKAGE),
        }
    }

    fn arguments(request: &ProviderRequest<'_>) -> Vec<String> {
        vec![
            "exec".to_string(),
            "--json".to_string(),
            "--model".to_string(),
            request.model.to_string(),
            format!("{}\n\n{}", request.system_prompt, request.user_input),
        ]
    }
}

impl Default for OpenAIClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderClient for OpenAIClient {
    async fn execute(
        &self,
        request: &ProviderRequest<'_>,
    ) -> Result<ProviderResponse, ProviderError> {
        self.cli.ensure_installed().await?;

        if !request.tools.is_empty() {
            warn!(
                command = %self.cli.command(),
                tools = request.tools.len(),
                "codex CLI does not accept per-call tool providers; ignoring them"
            );
        }

        let stdout = self.cli.run(&Self::arguments(request), request.env).await?;
        CodexTurn::from_jsonl(&stdout)?.into_response(request.model)
    }
}

/// Codex CLI のイベント
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum CodexEvent {
    #[serde(rename = "turn.started")]
    TurnStarted {
        #[serde(default)]
        model: Option<String>,
    },

    #[serde(rename = "item.completed")]
    ItemCompleted { item: CodexItem },

    #[serde(rename = "turn.completed")]
    TurnCompleted {
        #[serde(default)]
        usage: CodexUsage,
        #[serde(default)]
        stop_reason: Option<String>,
    },

    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct CodexItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CodexUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// 1回の実行（ターン）で受け取ったイベントの集約
#[derive(Debug, Default)]
struct CodexTurn {
    model: Option<String>,
    text: String,
    usage: CodexUsage,
    stop_reason: Option<String>,
}

impl CodexTurn {
    fn from_jsonl(stdout: &str) -> Result<Self, ProviderError> {
        let mut turn = Self::default();

        for line in stdout.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let event: CodexEvent = serde_json::from_str(line).map_err(|e| {
                ProviderError::InvalidResponse(format!("JSONL parse error: {e}: {line}"))
            })?;
            turn.apply(event);
        }

        Ok(turn)
    }

    fn apply(&mut self, event: CodexEvent) {
        match event {
            CodexEvent::TurnStarted { model } => {
                if model.is_some() {
                    self.model = model;
                }
            }
            CodexEvent::ItemCompleted { item } => {
                if let ("text", Some(text)) = (item.kind.as_str(), item.text) {
                    self.text.push_str(&text);
                }
            }
            CodexEvent::TurnCompleted { usage, stop_reason } => {
                self.usage = usage;
                self.stop_reason = stop_reason;
            }
            CodexEvent::Other => {}
        }
    }

    /// 集約結果をレスポンスに変換する
    ///
    /// テキストが1つもない場合は不正なレスポンスとして扱います。
    fn into_response(self, requested_model: &str) -> Result<ProviderResponse, ProviderError> {
        if self.text.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "codex returned no text items".to_string(),
            ));
        }

        Ok(ProviderResponse {
            content: self.text,
            token_usage: TokenUsage {
                input_tokens: self.usage.input_tokens,
                output_tokens: self.usage.output_tokens,
            },
            stop_reason: self
                .stop_reason
                .as_deref()
                .map_or(StopReason::Unknown, StopReason::from_wire),
            model: self.model.unwrap_or_else(|| requested_model.to_string()),
            cost_usd: 0.0,
        })
    }
}
