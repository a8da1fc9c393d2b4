//! エラー型の定義
//!
//! このモジュールは、Holon Engine 全体で使用されるエラー型を定義します。
//!
//! - [`ConfigError`]: ワークフロー定義・ランタイム設定の読み込みとバリデーション
//! - [`ProviderError`]: エージェント呼び出し（LLMプロバイダー）の失敗
//!
//! ステップ実行時のエラー分類は [`crate::engine::result::StepError`] を参照してください。

use thiserror::Error;

/// 設定関連のエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    /// ファイルの読み込みに失敗
    #[error("設定ファイルの読み込みに失敗しました: {0}")]
    FileRead(#[from] std::io::Error),

    /// TOML のデシリアライズに失敗
    #[error("TOML のデシリアライズに失敗しました: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    /// YAML のデシリアライズに失敗
    #[error("YAML のデシリアライズに失敗しました: {0}")]
    YamlDeserialize(#[from] serde_yaml::Error),

    /// 拡張子から形式を判別できない
    #[error("未対応の設定ファイル形式です: {0}（.toml / .yaml / .yml のみ対応）")]
    UnsupportedFormat(String),

    /// バリデーションエラー
    #[error("設定のバリデーションに失敗しました: {0}")]
    Validation(String),
}

/// エージェント呼び出しのエラー
///
/// Agent Invocation 側（CLIクライアントやモック）が返す失敗です。
/// エンジンはこれをリトライせず、そのままステップの失敗として扱います。
#[derive(Debug, Error)]
pub enum ProviderError {
    /// CLIツールが見つからない（コマンド名, インストール用パッケージ名）
    #[error("CLIツール '{0}' が見つかりません。`npm install -g {1}` でインストールしてください")]
    CliNotFound(String, String),

    /// 認証エラー（エラー詳細, コマンド名）
    #[error("認証に失敗しました: {0}（`{1}` でログインしてください）")]
    AuthenticationError(String, String),

    /// CLIの実行に失敗
    #[error("CLIの実行に失敗しました: {0}")]
    CliExecutionError(String),

    /// レート制限
    #[error("レート制限を超えました")]
    RateLimitExceeded,

    /// タイムアウト（CLI側の検出、またはエンジンの制限時間超過）
    #[error("タイムアウトしました: {0}")]
    Timeout(String),

    /// 不正なレスポンス
    #[error("不正なレスポンスです: {0}")]
    InvalidResponse(String),

    /// 未対応のプロバイダー
    #[error("未対応のプロバイダーです: {0}")]
    UnsupportedProvider(String),

    /// エージェント側で発生したその他の失敗
    #[error("エージェントの呼び出しに失敗しました: {0}")]
    Invocation(String),

    /// プロセス起動などの I/O エラー
    #[error("I/O エラー: {0}")]
    Io(#[from] std::io::Error),

    /// CLI出力が UTF-8 ではない
    #[error("CLI出力のデコードに失敗しました: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_validation_message() {
        let err = ConfigError::Validation("ステップIDが重複しています".to_string());
        assert_eq!(
            err.to_string(),
            "設定のバリデーションに失敗しました: ステップIDが重複しています"
        );
    }

    #[test]
    fn test_provider_error_timeout_message() {
        let err = ProviderError::Timeout("30秒以内に応答がありません".to_string());
        assert_eq!(err.to_string(), "タイムアウトしました: 30秒以内に応答がありません");
    }

    #[test]
    fn test_provider_error_cli_not_found_message() {
        let err = ProviderError::CliNotFound(
            "claude".to_string(),
            "@anthropic-ai/claude-code".to_string(),
        );
        assert!(err.to_string().contains("claude"));
        assert!(err.to_string().contains("@anthropic-ai/claude-code"));
    }
}
