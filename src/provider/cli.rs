//! CLIツール呼び出しの共通処理
//!
//! # 責務
//!
//! - CLIツールのインストール確認（`which` / `where`）
//! - サブプロセスの起動と標準出力の取得
//! - 失敗時の標準エラー出力から [`ProviderError`] への分類
//!
//! 各プロバイダークライアントは引数の組み立てと出力のパースだけを行い、
//! プロセスの扱いはこのモジュールに任せます。

use std::collections::BTreeMap;

use tokio::process::Command;
use tracing::debug;

use crate::error::ProviderError;

/// 外部CLIツール
#[derive(Debug, Clone)]
pub(crate) struct CliTool {
    command: String,
    package: &'static str,
}

impl CliTool {
    /// # 引数
    ///
    /// - `command`: コマンド名またはパス
    /// - `package`: インストール案内に表示するNPMパッケージ名
    pub(crate) fn new(command: impl Into<String>, package: &'static str) -> Self {
        Self {
            command: command.into(),
            package,
        }
    }

    pub(crate) fn command(&self) -> &str {
        &self.command
    }

    /// CLIツールがインストールされているか確認する
    ///
    /// # エラー
    ///
    /// - [`ProviderError::CliNotFound`] - PATH 上にコマンドが見つからない
    pub(crate) async fn ensure_installed(&self) -> Result<(), ProviderError> {
        let locator = if cfg!(target_os = "windows") { "where" } else { "which" };

        let found = Command::new(locator)
            .arg(&self.command)
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false);

        if found {
            Ok(())
        } else {
            Err(ProviderError::CliNotFound(self.command.clone(), self.package.to_string()))
        }
    }

    /// コマンドを実行し、標準出力を返す
    ///
    /// 終了コードが 0 以外の場合は標準エラー出力の内容からエラーを分類します。
    /// 成功時の標準エラー出力（進捗表示など）は無視されます。
    ///
    /// 返されたフューチャーが完了前に破棄された場合（キャンセルやタイムアウト）、
    /// 子プロセスは強制終了されます。
    pub(crate) async fn run(
        &self,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<String, ProviderError> {
        debug!(command = %self.command, args = args.len(), "spawning CLI");

        let output = Command::new(&self.command)
            .args(args)
            .envs(env)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(
                &self.command,
                output.status.code(),
                stderr.trim(),
            ));
        }

        Ok(String::from_utf8(output.stdout)?)
    }
}

/// 失敗したCLI実行の標準エラー出力をエラー種別に分類する
pub(crate) fn classify_failure(
    command: &str,
    exit_code: Option<i32>,
    stderr: &str,
) -> ProviderError {
    let lower = stderr.to_lowercase();
    let mentions = |needles: &[&str]| needles.iter().any(|needle| lower.contains(needle));

    const AUTH_HINTS: [&str; 6] = [
        "authentication",
        "unauthorized",
        "invalid api key",
        "api key",
        "please log in",
        "/login",
    ];

    if mentions(&AUTH_HINTS) {
        return ProviderError::AuthenticationError(stderr.to_string(), command.to_string());
    }
    if mentions(&["rate limit", "too many requests", "429"]) {
        return ProviderError::RateLimitExceeded;
    }
    if mentions(&["timeout", "timed out"]) {
        return ProviderError::Timeout(stderr.to_string());
    }

    let code = exit_code.map_or_else(|| "signal".to_string(), |code| code.to_string());
    ProviderError::CliExecutionError(format!("{command} exited with {code}: {stderr}"))
}
