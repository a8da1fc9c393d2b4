//! Holon CLI
//!
//! ワークフロー定義の検証と実行を行うコマンドラインツールです。
//!
//! ```text
//! holon validate workflows/example.toml
//! holon run workflows/example.toml --trigger '{"topic": "Rust"}' --trace-file trace.jsonl
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use holon_engine::config::settings::{LogFormat, LogSettings, RuntimeSettings};
use holon_engine::config::workflow::WorkflowDefinition;
use holon_engine::engine::WorkflowExecutor;
use holon_engine::error::ConfigError;
use holon_engine::logging;
use holon_engine::provider::ProviderInvoker;
use holon_engine::trace::JsonlTraceSink;

/// Holon - マルチエージェント・ワークフローの実行エンジン
#[derive(Parser)]
#[command(name = "holon", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// ワークフロー定義を検証する（エージェントは呼び出さない）
    Validate {
        /// ワークフロー定義ファイル（.toml / .yaml / .yml）
        workflow: PathBuf,
    },

    /// ワークフローを実行する
    Run {
        /// ワークフロー定義ファイル（.toml / .yaml / .yml）
        workflow: PathBuf,

        /// トリガーペイロード（JSON文字列）
        #[arg(long, conflicts_with = "trigger_file")]
        trigger: Option<String>,

        /// トリガーペイロードを含む JSON ファイル
        #[arg(long)]
        trigger_file: Option<PathBuf>,

        /// ランタイム設定ファイル（TOML）
        #[arg(long)]
        settings: Option<PathBuf>,

        /// トレースの出力先（JSON Lines、設定ファイルより優先）
        #[arg(long)]
        trace_file: Option<PathBuf>,

        /// エージェント呼び出しのタイムアウト（秒、設定ファイルより優先）
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,

        /// ログの出力形式
        #[arg(long, value_enum)]
        log_format: Option<LogFormat>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("トリガーペイロードの読み込みに失敗しました: {0}")]
    TriggerRead(#[from] std::io::Error),

    #[error("JSON の処理に失敗しました: {0}")]
    Json(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Validate { workflow } => validate(workflow),
        Commands::Run {
            workflow,
            trigger,
            trigger_file,
            settings,
            trace_file,
            timeout,
            log_format,
        } => {
            run(RunArgs {
                workflow,
                trigger,
                trigger_file,
                settings,
                trace_file,
                timeout,
                log_format,
            })
            .await
        }
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("エラー: {e}");
            ExitCode::FAILURE
        }
    }
}

fn validate(path: PathBuf) -> Result<ExitCode, CliError> {
    let _guard = logging::init(&LogSettings::default());

    let workflow = WorkflowDefinition::from_file(&path)?;
    println!(
        "OK: {} (version {}, {} resources, {} steps)",
        workflow.id(),
        workflow.version(),
        workflow.resources().len(),
        workflow.steps().len()
    );
    Ok(ExitCode::SUCCESS)
}

struct RunArgs {
    workflow: PathBuf,
    trigger: Option<String>,
    trigger_file: Option<PathBuf>,
    settings: Option<PathBuf>,
    trace_file: Option<PathBuf>,
    timeout: Option<u64>,
    log_format: Option<LogFormat>,
}

async fn run(args: RunArgs) -> Result<ExitCode, CliError> {
    let mut settings = match &args.settings {
        Some(path) => RuntimeSettings::from_file(path)?,
        None => RuntimeSettings::default(),
    };
    if let Some(timeout) = args.timeout {
        settings.engine.agent_timeout_secs = timeout;
    }
    if let Some(format) = args.log_format {
        settings.log.format = format;
    }
    let _guard = logging::init(&settings.log);

    let workflow = WorkflowDefinition::from_file(&args.workflow)?;
    let trigger = read_trigger(args.trigger.as_deref(), args.trigger_file.as_ref())?;

    let mut executor = WorkflowExecutor::new(workflow, Arc::new(ProviderInvoker::new()))
        .with_trigger(trigger)
        .with_settings(settings.engine.clone());

    if let Some(path) = args.trace_file.or(settings.trace.file) {
        info!(path = %path.display(), "writing trace records");
        executor = executor.with_trace_sink(Arc::new(JsonlTraceSink::new(path)));
    }

    let token = executor.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            token.cancel();
        }
    });

    let result = executor.execute().await;
    println!("{}", result.to_json()?);

    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// トリガーペイロードを読み込む（指定がなければ空のオブジェクト）
fn read_trigger(inline: Option<&str>, file: Option<&PathBuf>) -> Result<Value, CliError> {
    match (inline, file) {
        (Some(json), _) => Ok(serde_json::from_str(json)?),
        (None, Some(path)) => {
            let content = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&content)?)
        }
        (None, None) => Ok(Value::Object(Default::default())),
    }
}
