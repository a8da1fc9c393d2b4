//! JSON Lines 形式のトレース出力先
//!
//! 1行に1件、実行IDを付けた記録を追記します。
//!
//! ```json
//! {"run_id":"...","step_id":"fetch","status":"COMPLETED","input":{...},"output":{...},"metrics":{...},"timestamp":"..."}
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::error;
use uuid::Uuid;

use crate::engine::result::TraceRecord;
use super::TraceSink;

/// ファイルに追記する出力先
///
/// 同じ出力先への追記は直列化されます。ファイルが存在しなければ作成します。
#[derive(Debug)]
pub struct JsonlTraceSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

#[derive(Serialize)]
struct Line<'a> {
    run_id: Uuid,
    #[serde(flatten)]
    record: &'a TraceRecord,
}

impl JsonlTraceSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_line(&self, run_id: Uuid, record: &TraceRecord) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(&Line { run_id, record })?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await
    }
}

#[async_trait]
impl TraceSink for JsonlTraceSink {
    async fn append(&self, run_id: Uuid, record: &TraceRecord) {
        if let Err(e) = self.write_line(run_id, record).await {
            error!(
                path = %self.path.display(),
                %run_id,
                step_id = %record.step_id,
                error = %e,
                "failed to append trace record"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::{Value, json};

    use crate::engine::result::{StepMetrics, StepStatus};

    fn record(step_id: &str, status: StepStatus) -> TraceRecord {
        TraceRecord {
            step_id: step_id.to_string(),
            status,
            input: json!({"instruction": "hi"}),
            output: json!({"output": 1}),
            metrics: StepMetrics::default(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.jsonl");
        let sink = JsonlTraceSink::new(&path);
        let run_id = Uuid::new_v4();

        sink.append(run_id, &record("fetch", StepStatus::Completed)).await;
        sink.append(run_id, &record("report", StepStatus::Failed)).await;

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["run_id"], run_id.to_string());
        assert_eq!(lines[0]["step_id"], "fetch");
        assert_eq!(lines[0]["status"], "COMPLETED");
        assert_eq!(lines[1]["status"], "FAILED");
        assert_eq!(lines[1]["input"]["instruction"], "hi");
    }

    #[tokio::test]
    async fn test_write_failure_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlTraceSink::new(dir.path().join("missing").join("trace.jsonl"));

        sink.append(Uuid::new_v4(), &record("fetch", StepStatus::Completed)).await;
        assert!(!sink.path().exists());
    }
}
