//! Holon Engine
//!
//! 宣言的に定義されたマルチエージェント・ワークフローを実行するインタープリターです。
//!
//! # モジュール構成
//!
//! - [`config`] - ワークフロー定義とランタイム設定の読み込み・バリデーション
//! - [`engine`] - ステップの逐次実行、テンプレート解決、実行戦略
//! - [`provider`] - エージェント呼び出しと LLM プロバイダー
//! - [`trace`] - トレースの出力先
//! - [`logging`] - ログ出力の初期化
//! - [`error`] - エラー型

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod provider;
pub mod trace;
