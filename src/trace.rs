//! トレースの出力先（Trace Sink）
//!
//! # 責務
//!
//! ステップが終了するたびに作成される [`TraceRecord`] を受け取り、保存します。
//! インタープリターは記録を追記するだけで、保存の成否によって実行を止めません。
//! 出力先のエラーは各実装がログに記録します。
//!
//! # モジュール構成
//!
//! - [`memory`] - メモリ上に保持する（テストや埋め込み用途）
//! - [`jsonl`] - JSON Lines 形式でファイルに追記する

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlTraceSink;
pub use memory::MemoryTraceSink;

use async_trait::async_trait;
use uuid::Uuid;

use crate::engine::result::TraceRecord;

/// トレース出力先の共通インターフェース
///
/// 記録はステップの完了順に1件ずつ追記されます。
#[async_trait]
pub trait TraceSink: Send + Sync {
    /// 記録を1件追記する
    async fn append(&self, run_id: Uuid, record: &TraceRecord);
}
