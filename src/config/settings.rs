//! ランタイム設定
//!
//! ワークフロー定義とは別に、実行環境ごとに変わる値（タイムアウト、トレース出力先、ログ形式）を
//! TOML ファイルから読み込みます。すべての項目は省略可能です。
//!
//! ```toml
//! [engine]
//! agent_timeout_secs = 120
//!
//! [trace]
//! file = "runs/trace.jsonl"
//!
//! [log]
//! format = "json"
//! directory = "logs"
//! filter = "holon_engine=debug"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::Deserialize;

use crate::error::ConfigError;

/// エージェント呼び出しタイムアウトのデフォルト値（秒）
pub const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 300;

/// ランタイム設定
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub engine: EngineSettings,
    pub trace: TraceSettings,
    pub log: LogSettings,
}

/// エンジンの設定
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// ステップに `timeout_secs` がない場合のエージェント呼び出しタイムアウト（秒）
    pub agent_timeout_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            agent_timeout_secs: DEFAULT_AGENT_TIMEOUT_SECS,
        }
    }
}

impl EngineSettings {
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }
}

/// トレース出力の設定
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TraceSettings {
    /// JSON Lines 形式のトレース出力先
    pub file: Option<PathBuf>,
}

/// ログの設定
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub format: LogFormat,
    /// 日次ローテーションのログファイル出力先ディレクトリ
    pub directory: Option<PathBuf>,
    /// `RUST_LOG` 未設定時のフィルター
    pub filter: Option<String>,
}

/// ログの出力形式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl RuntimeSettings {
    /// TOML ファイルから設定を読み込む
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// TOML 文字列から設定を読み込む
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let settings: RuntimeSettings = toml::from_str(toml)?;
        if settings.engine.agent_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "engine.agent_timeout_secs は1以上である必要があります".to_string(),
            ));
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = RuntimeSettings::from_toml("").unwrap();
        assert_eq!(settings.engine.agent_timeout_secs, DEFAULT_AGENT_TIMEOUT_SECS);
        assert_eq!(settings.log.format, LogFormat::Text);
        assert!(settings.trace.file.is_none());
    }

    #[test]
    fn test_partial_override() {
        let settings = RuntimeSettings::from_toml(
            "[engine]\nagent_timeout_secs = 5\n[log]\nformat = \"json\"\n",
        )
        .unwrap();
        assert_eq!(settings.engine.agent_timeout(), Duration::from_secs(5));
        assert_eq!(settings.log.format, LogFormat::Json);
        assert!(settings.log.directory.is_none());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = RuntimeSettings::from_toml("[engine]\nagent_timeout_secs = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[trace]\nfile = \"trace.jsonl\"").unwrap();

        let settings = RuntimeSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.trace.file, Some(PathBuf::from("trace.jsonl")));
    }
}
