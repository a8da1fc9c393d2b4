//! メモリ上のトレース出力先

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::engine::result::TraceRecord;
use super::TraceSink;

/// 追記された記録をメモリに保持する出力先
///
/// 複製したハンドルは同じ記録を共有します。
#[derive(Debug, Clone, Default)]
pub struct MemoryTraceSink {
    records: Arc<Mutex<Vec<(Uuid, TraceRecord)>>>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追記された記録（追記順）
    pub fn records(&self) -> Vec<TraceRecord> {
        self.lock().iter().map(|(_, record)| record.clone()).collect()
    }

    /// 指定した実行の記録（追記順）
    pub fn records_for(&self, run_id: Uuid) -> Vec<TraceRecord> {
        self.lock()
            .iter()
            .filter(|(id, _)| *id == run_id)
            .map(|(_, record)| record.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(Uuid, TraceRecord)>> {
        // ポイズンは無視する
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TraceSink for MemoryTraceSink {
    async fn append(&self, run_id: Uuid, record: &TraceRecord) {
        self.lock().push((run_id, record.clone()));
    }
}
