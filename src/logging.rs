//! ログ出力の初期化
//!
//! `tracing` のサブスクライバーを組み立てます。
//!
//! - 標準エラー出力: [`LogFormat`] に応じてテキストまたは JSON
//! - ファイル出力（任意）: 日次ローテーションの JSON ログ
//!
//! フィルターは `RUST_LOG` が優先され、未設定の場合は設定ファイルの `log.filter`、
//! それもなければ `holon_engine=info,holon=info` を使用します。

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::settings::{LogFormat, LogSettings};

/// フィルターのデフォルト値
pub const DEFAULT_FILTER: &str = "holon_engine=info,holon=info";

/// ログファイル名の接頭辞
pub const LOG_FILE_PREFIX: &str = "holon.log";

/// グローバルなサブスクライバーを設定する
///
/// # 戻り値
///
/// ファイル出力を有効にした場合はバックグラウンド書き込みのガードを返します。
/// ガードを破棄すると未書き込みのログが失われるため、プロセス終了まで保持してください。
/// すでにサブスクライバーが設定されている場合は何もしません。
pub fn init(settings: &LogSettings) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directive(settings)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stderr = match settings.format {
        LogFormat::Text => fmt::layer().with_writer(std::io::stderr).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    };

    let (file, guard) = match &settings.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .try_init();

    guard
}

/// `RUST_LOG` 未設定時に使うフィルター
fn filter_directive(settings: &LogSettings) -> &str {
    settings
        .filter
        .as_deref()
        .filter(|filter| !filter.trim().is_empty())
        .unwrap_or(DEFAULT_FILTER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_default() {
        let settings = LogSettings::default();
        assert_eq!(filter_directive(&settings), DEFAULT_FILTER);
    }

    #[test]
    fn test_default_filter_covers_binary_target() {
        let targets: Vec<&str> = DEFAULT_FILTER
            .split(',')
            .filter_map(|directive| directive.split('=').next())
            .collect();
        assert!(targets.contains(&"holon_engine"));
        assert!(targets.contains(&"holon"));
        assert!(DEFAULT_FILTER.parse::<EnvFilter>().is_ok());
    }

    #[test]
    fn test_filter_directive_from_settings() {
        let settings = LogSettings {
            filter: Some("holon_engine=debug".to_string()),
            ..Default::default()
        };
        assert_eq!(filter_directive(&settings), "holon_engine=debug");

        let blank = LogSettings {
            filter: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(filter_directive(&blank), DEFAULT_FILTER);
    }
}
